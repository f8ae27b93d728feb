//! Selection of the next contact to mail for a campaign.
//!
//! The cursor repairs the ledger as it goes: a row whose contact is gone,
//! has opted out, or is on the project suppression list is deleted and the
//! search continues. Every discard removes one row from a finite set, so the
//! search always ends in [`State::Found`] or [`State::Exhausted`].

use std::fmt;

use drip_common::{CampaignContact, CampaignContactId, CampaignId, Contact, tracing};
use drip_store::{CampaignStore, StoreError};

/// A contact ready to be mailed, with the ledger row that selected it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextContact {
    pub campaign_contact_id: CampaignContactId,
    pub contact: Contact,
}

/// Why a ledger row was dropped instead of being returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The row points at a contact that no longer exists.
    StaleContactReference,
    /// The contact's own opt-out flag is set.
    ContactUnsubscribedLocally,
    /// The contact's address is on the project suppression list.
    ContactGloballySuppressed,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StaleContactReference => "contact no longer exists",
            Self::ContactUnsubscribedLocally => "contact unsubscribed",
            Self::ContactGloballySuppressed => "address suppressed for project",
        })
    }
}

enum State {
    Searching,
    Found(NextContact),
    Exhausted,
}

enum Verdict {
    Send(Contact),
    Discard(DiscardReason),
}

pub struct ContactCursor<'a> {
    store: &'a dyn CampaignStore,
}

impl<'a> ContactCursor<'a> {
    pub const fn new(store: &'a dyn CampaignStore) -> Self {
        Self { store }
    }

    /// Returns the next sendable contact for `campaign`, or `None` once the
    /// campaign has no eligible rows left.
    ///
    /// # Errors
    ///
    /// Returns any storage failure, and [`StoreError::InvalidRecord`] if the
    /// store hands back a row the cursor has just deleted.
    pub async fn next(&self, campaign: &CampaignId) -> Result<Option<NextContact>, StoreError> {
        let mut state = State::Searching;
        let mut last_removed: Option<CampaignContactId> = None;

        loop {
            state = match state {
                State::Searching => self.step(campaign, &mut last_removed).await?,
                State::Found(next) => return Ok(Some(next)),
                State::Exhausted => return Ok(None),
            };
        }
    }

    async fn step(
        &self,
        campaign: &CampaignId,
        last_removed: &mut Option<CampaignContactId>,
    ) -> Result<State, StoreError> {
        let Some(row) = self.store.next_eligible_campaign_contact(campaign).await? else {
            return Ok(State::Exhausted);
        };

        if last_removed.as_ref() == Some(&row.id) {
            return Err(StoreError::InvalidRecord {
                kind: "campaign contact",
                id: row.id.to_string(),
                reason: "row is still selectable after being removed".to_string(),
            });
        }

        match self.vet(&row).await? {
            Verdict::Send(contact) => Ok(State::Found(NextContact {
                campaign_contact_id: row.id,
                contact,
            })),
            Verdict::Discard(reason) => {
                tracing::debug!(
                    campaign_id = %campaign,
                    campaign_contact_id = %row.id,
                    contact_id = %row.contact_id,
                    %reason,
                    "Discarding campaign contact"
                );
                self.store.remove_campaign_contact(&row.id).await?;
                *last_removed = Some(row.id);
                Ok(State::Searching)
            }
        }
    }

    async fn vet(&self, row: &CampaignContact) -> Result<Verdict, StoreError> {
        let Some(contact) = self.store.get_contact(&row.contact_id).await? else {
            return Ok(Verdict::Discard(DiscardReason::StaleContactReference));
        };

        if contact.unsubscribed {
            return Ok(Verdict::Discard(DiscardReason::ContactUnsubscribedLocally));
        }

        if self
            .store
            .is_globally_unsubscribed(&contact.project_id, &contact.email_address)
            .await?
        {
            return Ok(Verdict::Discard(DiscardReason::ContactGloballySuppressed));
        }

        Ok(Verdict::Send(contact))
    }
}
