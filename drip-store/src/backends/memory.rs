use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_common::{
    Campaign, CampaignContact, CampaignContactId, CampaignId, Contact, ContactId, DueCampaign,
    ProjectId, Sender, SenderId, UnsubscribeTarget,
};
use parking_lot::RwLock;

use crate::{CampaignStore, Result};

#[derive(Debug, Default)]
struct Tables {
    campaigns: Vec<Campaign>,
    senders: HashMap<SenderId, Sender>,
    contacts: HashMap<ContactId, Contact>,
    ledger: Vec<CampaignContact>,
    /// (project, lower-cased address)
    unsubscribes: HashSet<(ProjectId, String)>,
}

impl Tables {
    fn ledger_row_mut(&mut self, id: &CampaignContactId) -> Option<&mut CampaignContact> {
        self.ledger.iter_mut().find(|row| &row.id == id)
    }

    fn campaign_mut(&mut self, id: &CampaignId) -> Option<&mut Campaign> {
        self.campaigns.iter_mut().find(|campaign| &campaign.id == id)
    }
}

/// In-memory store.
///
/// All tables live behind a single lock, so multi-record updates such as
/// [`CampaignStore::mark_unsubscribed`] are atomic. Campaigns and ledger rows
/// keep insertion order.
///
/// The `insert_*`/`remove_*` methods stand in for the administration API that
/// owns these records in a real deployment.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a campaign, replacing any existing campaign with the same id.
    pub fn insert_campaign(&self, campaign: Campaign) {
        let mut tables = self.tables.write();
        if let Some(existing) = tables.campaign_mut(&campaign.id) {
            *existing = campaign;
        } else {
            tables.campaigns.push(campaign);
        }
    }

    pub fn insert_sender(&self, sender: Sender) {
        self.tables.write().senders.insert(sender.id.clone(), sender);
    }

    pub fn insert_contact(&self, contact: Contact) {
        self.tables
            .write()
            .contacts
            .insert(contact.id.clone(), contact);
    }

    /// Adds a ledger row. Returns `false`, leaving the store untouched, if the
    /// campaign already has a row for this contact.
    pub fn insert_campaign_contact(&self, row: CampaignContact) -> bool {
        let mut tables = self.tables.write();
        if tables.ledger.iter().any(|existing| {
            existing.id == row.id
                || (existing.campaign_id == row.campaign_id && existing.contact_id == row.contact_id)
        }) {
            return false;
        }

        tables.ledger.push(row);
        true
    }

    pub fn insert_unsubscribe(&self, project: ProjectId, email: &str) {
        self.tables
            .write()
            .unsubscribes
            .insert((project, email.to_ascii_lowercase()));
    }

    pub fn remove_contact(&self, id: &ContactId) -> Option<Contact> {
        self.tables.write().contacts.remove(id)
    }

    pub fn remove_sender(&self, id: &SenderId) -> Option<Sender> {
        self.tables.write().senders.remove(id)
    }

    pub fn campaign_contact(&self, id: &CampaignContactId) -> Option<CampaignContact> {
        self.tables
            .read()
            .ledger
            .iter()
            .find(|row| &row.id == id)
            .cloned()
    }

    pub fn contact(&self, id: &ContactId) -> Option<Contact> {
        self.tables.read().contacts.get(id).cloned()
    }

    pub fn campaign(&self, id: &CampaignId) -> Option<Campaign> {
        self.tables
            .read()
            .campaigns
            .iter()
            .find(|campaign| &campaign.id == id)
            .cloned()
    }

    fn claim(&self, id: &CampaignContactId, at: DateTime<Utc>, delivered: bool) -> bool {
        let mut tables = self.tables.write();
        match tables.ledger_row_mut(id) {
            Some(row) if row.sent.is_none() => {
                row.sent = Some(at);
                if delivered {
                    row.delivered = Some(at);
                }
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn list_due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<DueCampaign>> {
        Ok(self
            .tables
            .read()
            .campaigns
            .iter()
            .filter(|campaign| campaign.is_due(now))
            .map(DueCampaign::from)
            .collect())
    }

    async fn get_campaign(&self, id: &CampaignId) -> Result<Option<Campaign>> {
        Ok(self.campaign(id))
    }

    async fn get_sender(&self, id: &SenderId) -> Result<Option<Sender>> {
        Ok(self.tables.read().senders.get(id).cloned())
    }

    async fn next_eligible_campaign_contact(
        &self,
        campaign: &CampaignId,
    ) -> Result<Option<CampaignContact>> {
        Ok(self
            .tables
            .read()
            .ledger
            .iter()
            .find(|row| &row.campaign_id == campaign && row.is_eligible())
            .cloned())
    }

    async fn get_contact(&self, id: &ContactId) -> Result<Option<Contact>> {
        Ok(self.contact(id))
    }

    async fn remove_campaign_contact(&self, id: &CampaignContactId) -> Result<()> {
        self.tables.write().ledger.retain(|row| &row.id != id);
        Ok(())
    }

    async fn is_globally_unsubscribed(&self, project: &ProjectId, email: &str) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .unsubscribes
            .contains(&(project.clone(), email.to_ascii_lowercase())))
    }

    async fn mark_sent_only(&self, id: &CampaignContactId, at: DateTime<Utc>) -> Result<bool> {
        Ok(self.claim(id, at, false))
    }

    async fn mark_sent_and_delivered(
        &self,
        id: &CampaignContactId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.claim(id, at, true))
    }

    async fn mark_opened(&self, id: &CampaignContactId, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.write();
        let Some(row) = tables.ledger_row_mut(id) else {
            return Ok(false);
        };

        row.opened = Some(at);
        Ok(true)
    }

    async fn mark_unsubscribed(
        &self,
        id: &CampaignContactId,
        contact: &ContactId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.write();

        let Some(row) = tables.ledger_row_mut(id) else {
            return Ok(false);
        };
        row.unsubscribed.get_or_insert(at);

        if let Some(contact) = tables.contacts.get_mut(contact) {
            contact.unsubscribed = true;
        }

        Ok(true)
    }

    async fn pause_campaign(&self, id: &CampaignId) -> Result<()> {
        if let Some(campaign) = self.tables.write().campaign_mut(id) {
            campaign.next_trigger = None;
        }
        Ok(())
    }

    async fn set_next_trigger(&self, id: &CampaignId, at: DateTime<Utc>) -> Result<()> {
        if let Some(campaign) = self.tables.write().campaign_mut(id) {
            campaign.next_trigger = Some(at);
        }
        Ok(())
    }

    async fn campaign_contact_with_contact(
        &self,
        id: &CampaignContactId,
    ) -> Result<Option<UnsubscribeTarget>> {
        let tables = self.tables.read();

        Ok(tables.ledger.iter().find(|row| &row.id == id).map(|row| {
            let contact = tables.contacts.get(&row.contact_id);
            UnsubscribeTarget {
                campaign_contact_id: row.id.clone(),
                contact_id: row.contact_id.clone(),
                unsubscribed: row.unsubscribed,
                project_id: contact.map(|contact| contact.project_id.clone()),
                email_address: contact.map(|contact| contact.email_address.clone()),
            }
        }))
    }

    async fn unsent_by_campaigns(&self, ids: &[CampaignId]) -> Result<HashMap<CampaignId, u64>> {
        let tables = self.tables.read();
        let mut counts = HashMap::new();

        for row in tables
            .ledger
            .iter()
            .filter(|row| row.is_eligible() && ids.contains(&row.campaign_id))
        {
            *counts.entry(row.campaign_id.clone()).or_insert(0) += 1;
        }

        Ok(counts)
    }
}
