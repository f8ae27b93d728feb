//! Hand-off of a rendered message to the sender's SMTP server.

use std::{fmt, future::Future, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use drip_common::{CampaignContactId, Sender, config::ClientTimeouts, internal, tracing};
use drip_smtp::client::{self, MessageBuilder, Response, SmtpClient};

use crate::error::{DeliveryError, Phase};

/// What happened to one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The server accepted the message for delivery.
    Delivered,
    /// Authentication succeeded but a later step failed; the message may
    /// or may not have gone out.
    SentOnly,
    /// Nothing was handed to the server.
    Failed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Delivered => "delivered",
            Self::SentOnly => "sent",
            Self::Failed => "failed",
        })
    }
}

/// A fully rendered message for one ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub campaign_contact_id: CampaignContactId,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    /// Value of the `List-Unsubscribe` header, angle brackets included.
    pub list_unsubscribe: String,
}

#[async_trait]
pub trait Mailer: Send + Sync + fmt::Debug {
    /// Sends `message` through `sender`'s server. Transport failures are
    /// reported through the returned [`Outcome`], never as an error.
    async fn send(&self, sender: &Sender, message: &OutgoingMessage) -> Outcome;
}

/// A [`Mailer`] that opens one SMTP session per message.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    timeouts: ClientTimeouts,
    helo_domain: String,
}

impl SmtpMailer {
    pub fn new(timeouts: ClientTimeouts, helo_domain: impl Into<String>) -> Self {
        Self {
            timeouts,
            helo_domain: helo_domain.into(),
        }
    }

    /// Runs the whole session. QUIT is attempted whenever a connection was
    /// made, regardless of how the transaction went.
    ///
    /// # Errors
    ///
    /// Returns the first phase that failed, timed out or was refused.
    pub async fn deliver(
        &self,
        sender: &Sender,
        message: &OutgoingMessage,
    ) -> Result<(), DeliveryError> {
        let payload = build_message(sender, message)?;
        let address = format!("{}:{}", sender.host, sender.port);

        let mut client = timed(
            Phase::Connect,
            self.timeouts.connect(),
            SmtpClient::connect(&address, sender.host.clone()),
        )
        .await?;

        let result = self.transaction(&mut client, sender, message, &payload).await;

        let quit_timeout = self.timeouts.quit();
        match tokio::time::timeout(quit_timeout, client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => internal!(level = DEBUG, server = %address, "QUIT failed: {err}"),
            Err(_) => internal!(
                level = DEBUG,
                server = %address,
                "QUIT timed out after {quit_timeout:?}"
            ),
        }

        result
    }

    async fn transaction(
        &self,
        client: &mut SmtpClient,
        sender: &Sender,
        message: &OutgoingMessage,
        payload: &str,
    ) -> Result<(), DeliveryError> {
        let timeouts = &self.timeouts;

        let greeting = timed(Phase::Greeting, timeouts.connect(), client.read_greeting()).await?;
        expect(Phase::Greeting, &greeting, Response::is_success)?;

        let ehlo = timed(Phase::Ehlo, timeouts.ehlo(), client.ehlo(&self.helo_domain)).await?;
        expect(Phase::Ehlo, &ehlo, Response::is_success)?;

        if sender.tls {
            let starttls = timed(Phase::StartTls, timeouts.starttls(), client.starttls()).await?;
            expect(Phase::StartTls, &starttls, Response::is_success)?;

            let ehlo = timed(Phase::Ehlo, timeouts.ehlo(), client.ehlo(&self.helo_domain)).await?;
            expect(Phase::Ehlo, &ehlo, Response::is_success)?;
        }

        let auth = timed(
            Phase::Auth,
            timeouts.auth(),
            client.authenticate(&sender.email_address, sender.credential.expose()),
        )
        .await?;
        expect(Phase::Auth, &auth, Response::is_success)?;

        let mail = timed(
            Phase::MailFrom,
            timeouts.mail_from(),
            client.mail_from(&sender.email_address),
        )
        .await?;
        expect(Phase::MailFrom, &mail, Response::is_success)?;

        let rcpt = timed(Phase::RcptTo, timeouts.rcpt_to(), client.rcpt_to(&message.to)).await?;
        expect(Phase::RcptTo, &rcpt, Response::is_success)?;

        let data = timed(Phase::Data, timeouts.data(), client.data()).await?;
        expect(Phase::Data, &data, |response| response.code == 354)?;

        let accepted = timed(Phase::Data, timeouts.data(), client.send_data(payload)).await?;
        expect(Phase::Data, &accepted, Response::is_success)?;

        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[tracing::instrument(
        skip_all,
        fields(campaign_contact_id = %message.campaign_contact_id, server = %sender.host)
    )]
    async fn send(&self, sender: &Sender, message: &OutgoingMessage) -> Outcome {
        match self.deliver(sender, message).await {
            Ok(()) => {
                tracing::debug!(to = %message.to, "Message accepted");
                Outcome::Delivered
            }
            Err(err) => {
                let outcome = err.outcome();
                tracing::warn!(to = %message.to, %outcome, "Delivery failed: {err}");
                outcome
            }
        }
    }
}

fn build_message(sender: &Sender, message: &OutgoingMessage) -> Result<String, DeliveryError> {
    MessageBuilder::new()
        .from(sender.email_address.as_str())
        .to(message.to.as_str())
        .subject(message.subject.as_str())
        .header("List-Unsubscribe", message.list_unsubscribe.as_str())
        .header("List-Unsubscribe-Post", "List-Unsubscribe=One-Click")
        .html(message.html_body.as_str())
        .date(Utc::now())
        .build()
        .map_err(|source| DeliveryError::Client {
            phase: Phase::Build,
            source,
        })
}

async fn timed<T>(
    phase: Phase,
    after: Duration,
    future: impl Future<Output = client::Result<T>>,
) -> Result<T, DeliveryError> {
    tokio::time::timeout(after, future)
        .await
        .map_err(|_| DeliveryError::Timeout { phase, after })?
        .map_err(|source| DeliveryError::Client { phase, source })
}

fn expect(
    phase: Phase,
    response: &Response,
    accept: impl Fn(&Response) -> bool,
) -> Result<(), DeliveryError> {
    if accept(response) {
        Ok(())
    } else {
        Err(DeliveryError::Rejected {
            phase,
            code: response.code,
            message: response.message(),
        })
    }
}
