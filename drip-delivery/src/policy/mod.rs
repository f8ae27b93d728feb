//! Scheduling policies.
//!
//! - [`ReschedulePolicy`]: picks when a campaign fires next
//! - [`ExhaustedPolicy`]: what a poll cycle does after a campaign runs out of contacts

pub mod exhausted;
pub mod reschedule;

pub use exhausted::ExhaustedPolicy;
pub use reschedule::ReschedulePolicy;
