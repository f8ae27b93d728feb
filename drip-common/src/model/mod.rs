//! Typed records shared by the store, the delivery pipeline and the daemon.

mod campaign;
mod contact;
mod ids;
mod sender;

pub use campaign::{Campaign, CampaignContact, DueCampaign, SendInterval, UnsubscribeTarget};
pub use contact::Contact;
pub use ids::{CampaignContactId, CampaignId, ContactId, ProjectId, SenderId};
pub use sender::{Credential, Sender};
