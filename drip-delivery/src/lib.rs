//! The drip delivery pipeline.
//!
//! One poll cycle of the [`Scheduler`] looks up every due campaign and, per
//! campaign, resolves its sender, asks the [`ContactCursor`] for the next
//! eligible contact, renders the templates, hands the message to a
//! [`Mailer`], records the outcome through the [`CampaignTracker`] and
//! reschedules (or pauses) the campaign.

pub mod cursor;
pub mod error;
pub mod mailer;
pub mod policy;
pub mod scheduler;
pub mod template;
pub mod tracker;

pub use cursor::{ContactCursor, DiscardReason, NextContact};
pub use error::{DeliveryError, Phase, SchedulerError, Stage};
pub use mailer::{Mailer, OutgoingMessage, Outcome, SmtpMailer};
pub use policy::{ExhaustedPolicy, ReschedulePolicy};
pub use scheduler::{CampaignResult, CycleReport, Scheduler, SchedulerConfig};
pub use template::{Bindings, Links, render};
pub use tracker::CampaignTracker;
