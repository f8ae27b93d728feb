use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_common::{
    Campaign, CampaignContact, CampaignContactId, CampaignId, Contact, ContactId, DueCampaign,
    ProjectId, Sender, SenderId, UnsubscribeTarget,
};

use crate::Result;

/// The data operations the delivery pipeline and its collaborators need.
///
/// Implementations must be safe to share between tasks. All timestamps are
/// supplied by the caller so that a whole poll cycle works from one clock
/// reading.
#[async_trait]
pub trait CampaignStore: Send + Sync + std::fmt::Debug {
    /// Campaigns with a `next_trigger` at or before `now`, in a stable order.
    async fn list_due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<DueCampaign>>;

    async fn get_campaign(&self, id: &CampaignId) -> Result<Option<Campaign>>;

    async fn get_sender(&self, id: &SenderId) -> Result<Option<Sender>>;

    /// Some ledger row for `campaign` with neither `sent` nor `unsubscribed`
    /// set. Rows are returned in insertion order.
    async fn next_eligible_campaign_contact(
        &self,
        campaign: &CampaignId,
    ) -> Result<Option<CampaignContact>>;

    async fn get_contact(&self, id: &ContactId) -> Result<Option<Contact>>;

    /// Deletes a ledger row. Removing a row that does not exist is not an error.
    async fn remove_campaign_contact(&self, id: &CampaignContactId) -> Result<()>;

    /// Whether `email` is on `project`'s suppression list. Addresses compare
    /// case-insensitively.
    async fn is_globally_unsubscribed(&self, project: &ProjectId, email: &str) -> Result<bool>;

    /// Sets `sent` on a row that has not been sent yet. Returns `false` if the
    /// row is missing or another worker already claimed it.
    async fn mark_sent_only(&self, id: &CampaignContactId, at: DateTime<Utc>) -> Result<bool>;

    /// Sets `sent` and `delivered` together, with the same claim rule as
    /// [`CampaignStore::mark_sent_only`].
    async fn mark_sent_and_delivered(
        &self,
        id: &CampaignContactId,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Sets (or overwrites) `opened`. Returns `false` if the row is missing.
    async fn mark_opened(&self, id: &CampaignContactId, at: DateTime<Utc>) -> Result<bool>;

    /// Sets `unsubscribed` on the row (keeping an earlier timestamp if there
    /// is one) and the contact's own opt-out flag, as one atomic change.
    /// Returns `false` if the row is missing.
    async fn mark_unsubscribed(
        &self,
        id: &CampaignContactId,
        contact: &ContactId,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Clears `next_trigger`.
    async fn pause_campaign(&self, id: &CampaignId) -> Result<()>;

    async fn set_next_trigger(&self, id: &CampaignId, at: DateTime<Utc>) -> Result<()>;

    /// The ledger row joined to its contact, for the unsubscribe
    /// confirmation page.
    async fn campaign_contact_with_contact(
        &self,
        id: &CampaignContactId,
    ) -> Result<Option<UnsubscribeTarget>>;

    /// Number of still-eligible ledger rows per campaign. Campaigns without
    /// any are left out of the map.
    async fn unsent_by_campaigns(&self, ids: &[CampaignId]) -> Result<HashMap<CampaignId, u64>>;
}
