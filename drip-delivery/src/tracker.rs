//! State transitions on campaigns and their delivery ledger.
//!
//! The scheduler records send outcomes and reschedules or pauses campaigns
//! through here; the tracking-pixel and unsubscribe collaborators use
//! [`CampaignTracker::mark_opened`], [`CampaignTracker::mark_unsubscribed`]
//! and [`CampaignTracker::unsubscribe_target`].

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use drip_common::{
    CampaignContactId, CampaignId, ContactId, SendInterval, UnsubscribeTarget, tracing,
};
use drip_store::{CampaignStore, Result};

use crate::{Outcome, policy::ReschedulePolicy};

#[derive(Debug, Clone)]
pub struct CampaignTracker {
    store: Arc<dyn CampaignStore>,
}

impl CampaignTracker {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    /// Writes the ledger effect of one send.
    ///
    /// `Delivered` sets `sent` and `delivered` together. `SentOnly` and
    /// `Failed` both set only `sent`, so the row is never selected again.
    /// Returns `false` if the row had already been claimed by someone else.
    ///
    /// # Errors
    ///
    /// Returns any storage failure.
    pub async fn record_outcome(
        &self,
        id: &CampaignContactId,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let claimed = match outcome {
            Outcome::Delivered => self.store.mark_sent_and_delivered(id, now).await?,
            Outcome::SentOnly => self.store.mark_sent_only(id, now).await?,
            Outcome::Failed => {
                tracing::warn!(
                    campaign_contact_id = %id,
                    "Nothing reached the server, recording as sent without delivery"
                );
                self.store.mark_sent_only(id, now).await?
            }
        };

        if !claimed {
            tracing::warn!(
                campaign_contact_id = %id,
                %outcome,
                "Ledger row was already marked sent or no longer exists"
            );
        }

        Ok(claimed)
    }

    /// Sets the campaign's next trigger a random interval after `now` and
    /// returns it.
    ///
    /// # Errors
    ///
    /// Returns any storage failure.
    pub async fn reschedule(
        &self,
        campaign: &CampaignId,
        interval: SendInterval,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let next_trigger = ReschedulePolicy::next_trigger(interval, now);
        self.store.set_next_trigger(campaign, next_trigger).await?;
        Ok(next_trigger)
    }

    /// # Errors
    ///
    /// Returns any storage failure.
    pub async fn pause(&self, campaign: &CampaignId) -> Result<()> {
        self.store.pause_campaign(campaign).await
    }

    /// Records a tracking-pixel fetch. Repeated fetches move the timestamp.
    ///
    /// # Errors
    ///
    /// Returns any storage failure.
    pub async fn mark_opened(&self, id: &CampaignContactId, now: DateTime<Utc>) -> Result<bool> {
        self.store.mark_opened(id, now).await
    }

    /// Unsubscribes the ledger row and the contact behind it in one step.
    ///
    /// # Errors
    ///
    /// Returns any storage failure.
    pub async fn mark_unsubscribed(
        &self,
        id: &CampaignContactId,
        contact: &ContactId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.store.mark_unsubscribed(id, contact, now).await
    }

    /// # Errors
    ///
    /// Returns any storage failure.
    pub async fn unsubscribe_target(
        &self,
        id: &CampaignContactId,
    ) -> Result<Option<UnsubscribeTarget>> {
        self.store.campaign_contact_with_contact(id).await
    }

    /// # Errors
    ///
    /// Returns any storage failure.
    pub async fn unsent_by_campaigns(&self, ids: &[CampaignId]) -> Result<HashMap<CampaignId, u64>> {
        self.store.unsent_by_campaigns(ids).await
    }
}
