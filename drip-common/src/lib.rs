//! Shared building blocks for the drip campaign daemon.
//!
//! - [`model`]: typed records for campaigns, senders, contacts and the
//!   per-campaign delivery ledger
//! - [`logging`]: subscriber bootstrap and the `internal!`/`outgoing!`/`incoming!` macros
//! - [`config`]: configuration shared between crates (SMTP client timeouts)

pub mod config;
pub mod error;
pub mod logging;
pub mod model;

pub use error::ModelError;
pub use model::{
    Campaign, CampaignContact, CampaignContactId, CampaignId, Contact, ContactId, Credential,
    DueCampaign, ProjectId, SendInterval, Sender, SenderId, UnsubscribeTarget,
};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
