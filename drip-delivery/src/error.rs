//! Typed errors for the delivery pipeline.
//!
//! Transport problems ([`DeliveryError`]) never escape the [`crate::Mailer`];
//! they are folded into an [`crate::Outcome`]. Storage problems surface as
//! [`SchedulerError`], tagged with the campaign and the [`Stage`] that failed.

use std::{fmt, time::Duration};

use drip_common::CampaignId;
use drip_smtp::client::ClientError;
use drip_store::StoreError;
use thiserror::Error;

use crate::Outcome;

/// The step of the SMTP session a [`DeliveryError`] happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Build,
    Connect,
    Greeting,
    Ehlo,
    StartTls,
    Auth,
    MailFrom,
    RcptTo,
    Data,
}

impl Phase {
    /// Whether authentication had already succeeded when this phase ran.
    pub const fn is_after_auth(self) -> bool {
        matches!(self, Self::MailFrom | Self::RcptTo | Self::Data)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Build => "message build",
            Self::Connect => "connect",
            Self::Greeting => "greeting",
            Self::Ehlo => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth => "AUTH",
            Self::MailFrom => "MAIL FROM",
            Self::RcptTo => "RCPT TO",
            Self::Data => "DATA",
        })
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("{phase} failed: {source}")]
    Client {
        phase: Phase,
        #[source]
        source: ClientError,
    },

    #[error("{phase} rejected: {code} {message}")]
    Rejected {
        phase: Phase,
        code: u16,
        message: String,
    },

    #[error("{phase} timed out after {after:?}")]
    Timeout { phase: Phase, after: Duration },
}

impl DeliveryError {
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Client { phase, .. } | Self::Rejected { phase, .. } | Self::Timeout { phase, .. } => {
                *phase
            }
        }
    }

    /// How this failure is reported: nothing reached the server before
    /// authentication completed, anything later may have been accepted.
    pub const fn outcome(&self) -> Outcome {
        if self.phase().is_after_auth() {
            Outcome::SentOnly
        } else {
            Outcome::Failed
        }
    }
}

/// Where in the per-campaign pipeline a storage operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveSender,
    SelectContact,
    RecordOutcome,
    Reschedule,
    Pause,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResolveSender => "resolve sender",
            Self::SelectContact => "select contact",
            Self::RecordOutcome => "record outcome",
            Self::Reschedule => "reschedule",
            Self::Pause => "pause",
        })
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The due-campaign query itself failed; nothing was processed.
    #[error("Failed to list due campaigns: {0}")]
    ListDue(#[source] StoreError),

    #[error("Campaign {campaign_id}: {stage} failed: {source}")]
    Campaign {
        campaign_id: CampaignId,
        stage: Stage,
        #[source]
        source: StoreError,
    },
}

impl SchedulerError {
    pub(crate) fn campaign(campaign_id: &CampaignId, stage: Stage) -> impl FnOnce(StoreError) -> Self {
        let campaign_id = campaign_id.clone();
        move |source| Self::Campaign {
            campaign_id,
            stage,
            source,
        }
    }
}
