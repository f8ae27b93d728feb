//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The server sent something that is not an SMTP reply.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    /// AUTH was requested but the server offers neither PLAIN nor LOGIN.
    #[error("Server does not offer a supported AUTH mechanism (offered: {0})")]
    AuthUnsupported(String),

    /// The server replied, mid-exchange, with a code that does not fit the
    /// exchange (e.g. a 250 where a 334 challenge was required).
    #[error("Unexpected SMTP status code: {code} - {message}")]
    UnexpectedResponse { code: u16, message: String },

    /// The message could not be assembled.
    #[error("Invalid message: {0}")]
    BuilderError(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

impl From<std::fmt::Error> for ClientError {
    fn from(err: std::fmt::Error) -> Self {
        Self::BuilderError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
