//! SMTP client with STARTTLS and AUTH support.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use drip_common::{incoming, outgoing, tracing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
};

use super::{
    error::{ClientError, Result},
    response::Response,
};

const BUFFER_SIZE: usize = 8192;

/// Replies larger than this are treated as a protocol violation.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };

        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }

        Ok(n)
    }

    async fn upgrade_to_tls(self, domain: &str) -> Result<Self> {
        let Self::Plain(stream) = self else {
            return Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            ));
        };

        let mut root_store = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        if !certs.errors.is_empty() {
            tracing::warn!(errors = ?certs.errors, "Some native certificates could not be loaded");
        }
        let (added, ignored) = root_store.add_parsable_certificates(certs.certs);
        tracing::trace!(added, ignored, "Loaded native root certificates");

        let config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| ClientError::TlsError(format!("Invalid domain '{domain}': {e}")))?;

        let stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::TlsError(e.to_string()))?;

        Ok(Self::Tls(Box::new(stream)))
    }
}

/// SASL mechanisms the client knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    Plain,
    Login,
}

/// A single SMTP session.
///
/// Every command method returns the server's reply as-is; deciding whether a
/// reply is acceptable is left to the caller.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_domain: String,
    capabilities: Vec<String>,
}

impl SmtpClient {
    /// Opens a plain TCP connection to `addr`. `server_domain` is the name
    /// the certificate is checked against if STARTTLS is negotiated later.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str, server_domain: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;

        Ok(Self {
            connection: Some(ClientConnection::Plain(stream)),
            buffer: vec![0u8; BUFFER_SIZE],
            buffer_pos: 0,
            server_domain: server_domain.into(),
            capabilities: Vec::new(),
        })
    }

    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// The AUTH mechanism this client would use, preferring PLAIN.
    pub fn preferred_auth_mechanism(&self) -> Option<AuthMechanism> {
        let offered = self
            .capabilities
            .iter()
            .find_map(|cap| cap.strip_prefix("AUTH "))?;

        let mut mechanisms = offered.split_whitespace();
        if mechanisms.clone().any(|m| m == "PLAIN") {
            Some(AuthMechanism::Plain)
        } else if mechanisms.any(|m| m == "LOGIN") {
            Some(AuthMechanism::Login)
        } else {
            None
        }
    }

    /// # Errors
    ///
    /// Returns an error if sending fails.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        outgoing!("{command}");
        self.write_line(command).await
    }

    /// Sends `command` and reads the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// Sends EHLO and records the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        let response = self.command(&format!("EHLO {domain}")).await?;

        self.capabilities = if response.is_success() {
            response
                .lines
                .iter()
                .skip(1)
                .map(|line| line.trim().to_ascii_uppercase())
                .collect()
        } else {
            Vec::new()
        };

        Ok(response)
    }

    /// Sends STARTTLS and, if the server agrees, upgrades the connection.
    ///
    /// The capability list is cleared on upgrade; EHLO must be sent again.
    ///
    /// # Errors
    ///
    /// Returns an error if the command or the TLS handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.is_success() {
            let connection = self
                .connection
                .take()
                .ok_or(ClientError::ConnectionClosed)?;
            self.connection = Some(connection.upgrade_to_tls(&self.server_domain).await?);
            self.buffer_pos = 0;
            self.capabilities.clear();
        }

        Ok(response)
    }

    /// Authenticates with whichever supported mechanism the server offers.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AuthUnsupported`] if the server offers neither
    /// PLAIN nor LOGIN, or any error from the exchange itself.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<Response> {
        match self.preferred_auth_mechanism() {
            Some(AuthMechanism::Plain) => self.auth_plain(username, password).await,
            Some(AuthMechanism::Login) => self.auth_login(username, password).await,
            None => Err(ClientError::AuthUnsupported(
                self.capabilities
                    .iter()
                    .find_map(|cap| cap.strip_prefix("AUTH "))
                    .unwrap_or("none")
                    .to_string(),
            )),
        }
    }

    /// AUTH PLAIN with an initial response (RFC 4616).
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let token = STANDARD.encode(format!("\0{username}\0{password}"));

        outgoing!("AUTH PLAIN <redacted>");
        self.write_line(&format!("AUTH PLAIN {token}")).await?;
        self.read_response().await
    }

    /// AUTH LOGIN. The reply to the password is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnexpectedResponse`] if the server answers the
    /// command or the username with anything but a 334 challenge, or an
    /// error if sending or reading fails.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<Response> {
        let challenge = self.command("AUTH LOGIN").await?;
        expect_challenge(&challenge)?;

        outgoing!("<username>");
        self.write_line(&STANDARD.encode(username)).await?;
        let challenge = self.read_response().await?;
        expect_challenge(&challenge)?;

        outgoing!("<password>");
        self.write_line(&STANDARD.encode(password)).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message body (dot-stuffed, CRLF line endings) and the
    /// terminating `.` line, then reads the final reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn send_data(&mut self, data: &str) -> Result<Response> {
        let payload = dot_stuff(data);
        outgoing!("<{} bytes of message data>", payload.len());

        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(payload.as_bytes())
            .await?;

        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?
            .send(format!("{line}\r\n").as_bytes())
            .await
    }

    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) = Response::parse(&self.buffer[..self.buffer_pos])? {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_BUFFER_SIZE {
                    return Err(ClientError::ParseError(format!(
                        "Response too large (exceeds {MAX_BUFFER_SIZE} bytes)"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let n = connection.read(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += n;
        }
    }
}

fn expect_challenge(response: &Response) -> Result<()> {
    if response.code == 334 {
        Ok(())
    } else {
        Err(ClientError::UnexpectedResponse {
            code: response.code,
            message: response.message(),
        })
    }
}

/// Normalises line endings to CRLF, doubles any leading `.` (RFC 5321
/// section 4.5.2) and appends the end-of-data marker.
fn dot_stuff(data: &str) -> String {
    let mut out = String::with_capacity(data.len() + data.len() / 32 + 5);

    let body = data.strip_suffix('\n').unwrap_or(data);
    let body = body.strip_suffix('\r').unwrap_or(body);

    if !body.is_empty() {
        for line in body.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.starts_with('.') {
                out.push('.');
            }
            out.push_str(line);
            out.push_str("\r\n");
        }
    }

    out.push_str(".\r\n");
    out
}
