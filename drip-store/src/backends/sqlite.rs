use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drip_common::{
    Campaign, CampaignContact, CampaignContactId, CampaignId, Contact, ContactId, Credential,
    DueCampaign, ProjectId, SendInterval, Sender, SenderId, UnsubscribeTarget,
};
use rusqlite::{OptionalExtension, params, params_from_iter};
use tokio_rusqlite::Connection;

use crate::{CampaignStore, Result, StoreError};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Tables are created if missing. Timestamps are whole unix seconds; a NULL
/// `next_trigger` means the campaign is paused. There are no foreign keys,
/// ledger rows may outlive the contact they point at.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sender (
    id            TEXT PRIMARY KEY,
    project_id    TEXT NOT NULL,
    email_address TEXT NOT NULL,
    host          TEXT NOT NULL,
    port          INTEGER NOT NULL,
    tls           INTEGER NOT NULL DEFAULT 0,
    credential    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contact (
    id            TEXT PRIMARY KEY,
    project_id    TEXT NOT NULL,
    email_address TEXT NOT NULL,
    name          TEXT NOT NULL,
    alias         TEXT,
    company       TEXT NOT NULL DEFAULT '',
    unsubscribed  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS campaign (
    id           TEXT PRIMARY KEY,
    project_id   TEXT NOT NULL,
    sender_id    TEXT NOT NULL,
    min_interval INTEGER NOT NULL,
    max_interval INTEGER NOT NULL,
    subject      TEXT NOT NULL,
    body         TEXT NOT NULL,
    next_trigger INTEGER
);
CREATE INDEX IF NOT EXISTS i_campaign_next_trigger ON campaign (next_trigger);

CREATE TABLE IF NOT EXISTS campaign_contact (
    id           TEXT PRIMARY KEY,
    campaign_id  TEXT NOT NULL,
    contact_id   TEXT NOT NULL,
    sent         INTEGER,
    delivered    INTEGER,
    opened       INTEGER,
    unsubscribed INTEGER,
    UNIQUE (campaign_id, contact_id)
);
CREATE INDEX IF NOT EXISTS i_campaign_contact_contact ON campaign_contact (contact_id);

CREATE TABLE IF NOT EXISTS unsubscribe (
    project_id    TEXT NOT NULL,
    email_address TEXT NOT NULL COLLATE NOCASE,
    created       INTEGER NOT NULL DEFAULT (unixepoch()),
    UNIQUE (project_id, email_address)
);
";

const CAMPAIGN_COLUMNS: &str =
    "id, project_id, sender_id, min_interval, max_interval, subject, body, next_trigger";

const LEDGER_COLUMNS: &str =
    "id, campaign_id, contact_id, sent, delivered, opened, unsubscribed";

fn to_timestamp(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

fn from_timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// A campaign as stored, before its interval has been validated.
struct CampaignRow {
    id: String,
    project_id: String,
    sender_id: String,
    min_interval: i64,
    max_interval: i64,
    subject: String,
    body: String,
    next_trigger: Option<i64>,
}

impl CampaignRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            sender_id: row.get(2)?,
            min_interval: row.get(3)?,
            max_interval: row.get(4)?,
            subject: row.get(5)?,
            body: row.get(6)?,
            next_trigger: row.get(7)?,
        })
    }
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = StoreError;

    fn try_from(row: CampaignRow) -> Result<Self> {
        let invalid = |reason: String| StoreError::InvalidRecord {
            kind: "campaign",
            id: row.id.clone(),
            reason,
        };
        let seconds = |value: i64| {
            u32::try_from(value)
                .map_err(|_| invalid(format!("interval bound {value}s is out of range")))
        };

        let interval = SendInterval::new(seconds(row.min_interval)?, seconds(row.max_interval)?)
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            id: row.id.into(),
            project_id: row.project_id.into(),
            sender_id: row.sender_id.into(),
            interval,
            subject: row.subject,
            body: row.body,
            next_trigger: from_timestamp(row.next_trigger),
        })
    }
}

fn ledger_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CampaignContact> {
    Ok(CampaignContact {
        id: row.get::<_, String>(0)?.into(),
        campaign_id: row.get::<_, String>(1)?.into(),
        contact_id: row.get::<_, String>(2)?.into(),
        sent: from_timestamp(row.get(3)?),
        delivered: from_timestamp(row.get(4)?),
        opened: from_timestamp(row.get(5)?),
        unsubscribed: from_timestamp(row.get(6)?),
    })
}

fn contact_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get::<_, String>(0)?.into(),
        project_id: row.get::<_, String>(1)?.into(),
        email_address: row.get(2)?,
        name: row.get(3)?,
        alias: row.get(4)?,
        company: row.get(5)?,
        unsubscribed: row.get(6)?,
    })
}

/// SQLite backed store.
///
/// Every statement is parameterised and runs on the `tokio-rusqlite`
/// background thread, so callers never block the runtime.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Connection>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and ensures the
    /// tables exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Schema`] if the database cannot be opened or the
    /// schema cannot be applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .await
            .map_err(|e| StoreError::Schema(format!("{}: {e}", path.as_ref().display())))?;

        Self::with_connection(conn).await
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Schema`] if the schema cannot be applied.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;

        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch(SCHEMA)
        })
        .await
        .map_err(|e: tokio_rusqlite::Error<rusqlite::Error>| StoreError::Schema(e.to_string()))?;

        tracing::debug!("SQLite schema ready");

        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    async fn call<F, R>(&self, operation: &'static str, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.conn
            .call(function)
            .await
            .map_err(|e: tokio_rusqlite::Error<rusqlite::Error>| StoreError::backend(operation, e))
    }

    /// Adds or replaces a campaign.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the write fails.
    pub async fn insert_campaign(&self, campaign: Campaign) -> Result<()> {
        self.call("insert campaign", move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO campaign
                 (id, project_id, sender_id, min_interval, max_interval, subject, body, next_trigger)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    campaign.id.as_str(),
                    campaign.project_id.as_str(),
                    campaign.sender_id.as_str(),
                    campaign.interval.min_secs(),
                    campaign.interval.max_secs(),
                    campaign.subject,
                    campaign.body,
                    campaign.next_trigger.map(to_timestamp),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Adds or replaces a sender.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the write fails.
    pub async fn insert_sender(&self, sender: Sender) -> Result<()> {
        self.call("insert sender", move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sender
                 (id, project_id, email_address, host, port, tls, credential)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    sender.id.as_str(),
                    sender.project_id.as_str(),
                    sender.email_address,
                    sender.host,
                    sender.port,
                    sender.tls,
                    sender.credential.expose(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Adds or replaces a contact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the write fails.
    pub async fn insert_contact(&self, contact: Contact) -> Result<()> {
        self.call("insert contact", move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO contact
                 (id, project_id, email_address, name, alias, company, unsubscribed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    contact.id.as_str(),
                    contact.project_id.as_str(),
                    contact.email_address,
                    contact.name,
                    contact.alias,
                    contact.company,
                    contact.unsubscribed,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Adds a ledger row. Returns `false` if the campaign already has a row
    /// for this contact.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the write fails.
    pub async fn insert_campaign_contact(&self, row: CampaignContact) -> Result<bool> {
        self.call("insert campaign contact", move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO campaign_contact
                 (id, campaign_id, contact_id, sent, delivered, opened, unsubscribed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.id.as_str(),
                    row.campaign_id.as_str(),
                    row.contact_id.as_str(),
                    row.sent.map(to_timestamp),
                    row.delivered.map(to_timestamp),
                    row.opened.map(to_timestamp),
                    row.unsubscribed.map(to_timestamp),
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the write fails.
    pub async fn insert_unsubscribe(&self, project: ProjectId, email: &str) -> Result<()> {
        let email = email.to_string();
        self.call("insert unsubscribe", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO unsubscribe (project_id, email_address) VALUES (?1, ?2)",
                params![project.as_str(), email],
            )?;
            Ok(())
        })
        .await
    }

    /// Returns `true` if a contact was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the delete fails.
    pub async fn remove_contact(&self, id: &ContactId) -> Result<bool> {
        let id = id.clone();
        self.call("remove contact", move |conn| {
            Ok(conn.execute("DELETE FROM contact WHERE id = ?1", params![id.as_str()])? == 1)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the read fails.
    pub async fn campaign_contact(&self, id: &CampaignContactId) -> Result<Option<CampaignContact>> {
        let id = id.clone();
        self.call("get campaign contact", move |conn| {
            conn.query_row(
                &format!("SELECT {LEDGER_COLUMNS} FROM campaign_contact WHERE id = ?1"),
                params![id.as_str()],
                ledger_from_row,
            )
            .optional()
        })
        .await
    }

    async fn claim(
        &self,
        operation: &'static str,
        id: &CampaignContactId,
        at: DateTime<Utc>,
        delivered: bool,
    ) -> Result<bool> {
        let id = id.clone();
        let at = to_timestamp(at);
        self.call(operation, move |conn| {
            let updated = conn.execute(
                "UPDATE campaign_contact
                 SET sent = ?2, delivered = CASE WHEN ?3 THEN ?2 ELSE delivered END
                 WHERE id = ?1 AND sent IS NULL",
                params![id.as_str(), at, delivered],
            )?;
            Ok(updated == 1)
        })
        .await
    }
}

#[async_trait]
impl CampaignStore for SqliteStore {
    async fn list_due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<DueCampaign>> {
        let now = to_timestamp(now);
        let rows = self
            .call("list due campaigns", move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CAMPAIGN_COLUMNS} FROM campaign
                     WHERE next_trigger IS NOT NULL AND next_trigger <= ?1
                     ORDER BY rowid"
                ))?;
                let rows = stmt
                    .query_map(params![now], CampaignRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match Campaign::try_from(row) {
                Ok(campaign) => Some(DueCampaign::from(&campaign)),
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unusable campaign");
                    None
                }
            })
            .collect())
    }

    async fn get_campaign(&self, id: &CampaignId) -> Result<Option<Campaign>> {
        let id = id.clone();
        let row = self
            .call("get campaign", move |conn| {
                conn.query_row(
                    &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaign WHERE id = ?1"),
                    params![id.as_str()],
                    CampaignRow::from_row,
                )
                .optional()
            })
            .await?;

        row.map(Campaign::try_from).transpose()
    }

    async fn get_sender(&self, id: &SenderId) -> Result<Option<Sender>> {
        let id = id.clone();
        self.call("get sender", move |conn| {
            conn.query_row(
                "SELECT id, project_id, email_address, host, port, tls, credential
                 FROM sender WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(Sender {
                        id: row.get::<_, String>(0)?.into(),
                        project_id: row.get::<_, String>(1)?.into(),
                        email_address: row.get(2)?,
                        host: row.get(3)?,
                        port: row.get(4)?,
                        tls: row.get(5)?,
                        credential: Credential::new(row.get::<_, String>(6)?),
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn next_eligible_campaign_contact(
        &self,
        campaign: &CampaignId,
    ) -> Result<Option<CampaignContact>> {
        let campaign = campaign.clone();
        self.call("next eligible campaign contact", move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {LEDGER_COLUMNS} FROM campaign_contact
                     WHERE campaign_id = ?1 AND sent IS NULL AND unsubscribed IS NULL
                     ORDER BY rowid
                     LIMIT 1"
                ),
                params![campaign.as_str()],
                ledger_from_row,
            )
            .optional()
        })
        .await
    }

    async fn get_contact(&self, id: &ContactId) -> Result<Option<Contact>> {
        let id = id.clone();
        self.call("get contact", move |conn| {
            conn.query_row(
                "SELECT id, project_id, email_address, name, alias, company, unsubscribed
                 FROM contact WHERE id = ?1",
                params![id.as_str()],
                contact_from_row,
            )
            .optional()
        })
        .await
    }

    async fn remove_campaign_contact(&self, id: &CampaignContactId) -> Result<()> {
        let id = id.clone();
        self.call("remove campaign contact", move |conn| {
            conn.execute(
                "DELETE FROM campaign_contact WHERE id = ?1",
                params![id.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    async fn is_globally_unsubscribed(&self, project: &ProjectId, email: &str) -> Result<bool> {
        let project = project.clone();
        let email = email.to_string();
        self.call("check suppression list", move |conn| {
            conn.query_row(
                "SELECT EXISTS (
                     SELECT 1 FROM unsubscribe WHERE project_id = ?1 AND email_address = ?2
                 )",
                params![project.as_str(), email],
                |row| row.get(0),
            )
        })
        .await
    }

    async fn mark_sent_only(&self, id: &CampaignContactId, at: DateTime<Utc>) -> Result<bool> {
        self.claim("mark sent", id, at, false).await
    }

    async fn mark_sent_and_delivered(
        &self,
        id: &CampaignContactId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.claim("mark sent and delivered", id, at, true).await
    }

    async fn mark_opened(&self, id: &CampaignContactId, at: DateTime<Utc>) -> Result<bool> {
        let id = id.clone();
        let at = to_timestamp(at);
        self.call("mark opened", move |conn| {
            let updated = conn.execute(
                "UPDATE campaign_contact SET opened = ?2 WHERE id = ?1",
                params![id.as_str(), at],
            )?;
            Ok(updated == 1)
        })
        .await
    }

    async fn mark_unsubscribed(
        &self,
        id: &CampaignContactId,
        contact: &ContactId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let id = id.clone();
        let contact = contact.clone();
        let at = to_timestamp(at);
        self.call("mark unsubscribed", move |conn| {
            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE campaign_contact SET unsubscribed = COALESCE(unsubscribed, ?2)
                 WHERE id = ?1",
                params![id.as_str(), at],
            )?;
            if updated == 0 {
                return Ok(false);
            }

            tx.execute(
                "UPDATE contact SET unsubscribed = 1 WHERE id = ?1",
                params![contact.as_str()],
            )?;
            tx.commit()?;

            Ok(true)
        })
        .await
    }

    async fn pause_campaign(&self, id: &CampaignId) -> Result<()> {
        let id = id.clone();
        self.call("pause campaign", move |conn| {
            conn.execute(
                "UPDATE campaign SET next_trigger = NULL WHERE id = ?1",
                params![id.as_str()],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_next_trigger(&self, id: &CampaignId, at: DateTime<Utc>) -> Result<()> {
        let id = id.clone();
        let at = to_timestamp(at);
        self.call("reschedule campaign", move |conn| {
            conn.execute(
                "UPDATE campaign SET next_trigger = ?2 WHERE id = ?1",
                params![id.as_str(), at],
            )?;
            Ok(())
        })
        .await
    }

    async fn campaign_contact_with_contact(
        &self,
        id: &CampaignContactId,
    ) -> Result<Option<UnsubscribeTarget>> {
        let id = id.clone();
        self.call("get campaign contact with contact", move |conn| {
            conn.query_row(
                "SELECT cc.id, cc.contact_id, cc.unsubscribed, c.project_id, c.email_address
                 FROM campaign_contact AS cc
                 LEFT OUTER JOIN contact AS c ON cc.contact_id = c.id
                 WHERE cc.id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(UnsubscribeTarget {
                        campaign_contact_id: row.get::<_, String>(0)?.into(),
                        contact_id: row.get::<_, String>(1)?.into(),
                        unsubscribed: from_timestamp(row.get(2)?),
                        project_id: row.get::<_, Option<String>>(3)?.map(ProjectId::from),
                        email_address: row.get(4)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn unsent_by_campaigns(&self, ids: &[CampaignId]) -> Result<HashMap<CampaignId, u64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        self.call("count unsent", move |conn| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT campaign_id, COUNT(*) FROM campaign_contact
                 WHERE campaign_id IN ({placeholders})
                 AND sent IS NULL AND unsubscribed IS NULL
                 GROUP BY campaign_id"
            ))?;

            let counts = stmt
                .query_map(params_from_iter(ids.iter()), |row| {
                    Ok((
                        CampaignId::from(row.get::<_, String>(0)?),
                        row.get::<_, u64>(1)?,
                    ))
                })?
                .collect::<rusqlite::Result<HashMap<_, _>>>()?;
            Ok(counts)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;

    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap()
    }

    fn campaign(id: &str, next_trigger: Option<DateTime<Utc>>) -> Campaign {
        Campaign {
            id: id.into(),
            project_id: "project".into(),
            sender_id: "sender".into(),
            interval: SendInterval::new(60, 120).unwrap(),
            subject: "Hi {name}".to_string(),
            body: "<p>{company}</p>".to_string(),
            next_trigger,
        }
    }

    fn contact(id: &str) -> Contact {
        Contact {
            id: id.into(),
            project_id: "project".into(),
            email_address: format!("{id}@example.com"),
            name: "Ann".to_string(),
            alias: Some("Annie".to_string()),
            company: "Acme".to_string(),
            unsubscribed: false,
        }
    }

    #[tokio::test]
    async fn test_campaign_round_trip_and_due() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let now = now();

        store.insert_campaign(campaign("b", Some(now - TimeDelta::seconds(5)))).await.unwrap();
        store.insert_campaign(campaign("later", Some(now + TimeDelta::seconds(5)))).await.unwrap();
        store.insert_campaign(campaign("paused", None)).await.unwrap();
        store.insert_campaign(campaign("a", Some(now))).await.unwrap();

        let due: Vec<_> = store
            .list_due_campaigns(now)
            .await
            .unwrap()
            .into_iter()
            .map(|campaign| campaign.id)
            .collect();
        assert_eq!(due, vec![CampaignId::from("b"), CampaignId::from("a")]);

        let stored = store.get_campaign(&"paused".into()).await.unwrap().unwrap();
        assert_eq!(stored, campaign("paused", None));

        store.pause_campaign(&"a".into()).await.unwrap();
        store.set_next_trigger(&"paused".into(), now).await.unwrap();
        let due: Vec<_> = store
            .list_due_campaigns(now)
            .await
            .unwrap()
            .into_iter()
            .map(|campaign| campaign.id)
            .collect();
        assert_eq!(due, vec![CampaignId::from("b"), CampaignId::from("paused")]);
    }

    #[tokio::test]
    async fn test_invalid_interval_rows_are_skipped() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let now = now();
        store.insert_campaign(campaign("ok", Some(now))).await.unwrap();
        store
            .call("corrupt", |conn| {
                conn.execute(
                    "INSERT INTO campaign
                     (id, project_id, sender_id, min_interval, max_interval, subject, body, next_trigger)
                     VALUES ('bad', 'p', 's', 50, 10, '', '', 0)",
                    [],
                )?;
                conn.execute(
                    "INSERT INTO campaign
                     (id, project_id, sender_id, min_interval, max_interval, subject, body, next_trigger)
                     VALUES ('negative', 'p', 's', -5, 10, '', '', 0)",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let due = store.list_due_campaigns(now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, CampaignId::from("ok"));

        assert!(matches!(
            store.get_campaign(&"bad".into()).await,
            Err(StoreError::InvalidRecord { kind: "campaign", .. })
        ));
        assert!(matches!(
            store.get_campaign(&"negative".into()).await,
            Err(StoreError::InvalidRecord { kind: "campaign", .. })
        ));
    }

    #[tokio::test]
    async fn test_sender_and_contact_round_trip() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let sender = Sender {
            id: "sender".into(),
            project_id: "project".into(),
            email_address: "team@example.com".to_string(),
            host: "smtp.example.com".to_string(),
            port: 587,
            tls: true,
            credential: Credential::new("secret"),
        };
        store.insert_sender(sender.clone()).await.unwrap();
        store.insert_contact(contact("x")).await.unwrap();

        assert_eq!(store.get_sender(&"sender".into()).await.unwrap(), Some(sender));
        assert_eq!(store.get_contact(&"x".into()).await.unwrap(), Some(contact("x")));
        assert!(store.get_contact(&"y".into()).await.unwrap().is_none());

        assert!(store.remove_contact(&"x".into()).await.unwrap());
        assert!(store.get_contact(&"x".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ledger_selection_and_claim() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let now = now();

        for (id, contact) in [("cc-1", "x"), ("cc-2", "y")] {
            assert!(
                store
                    .insert_campaign_contact(CampaignContact::new(id.into(), "c".into(), contact.into()))
                    .await
                    .unwrap()
            );
        }
        assert!(
            !store
                .insert_campaign_contact(CampaignContact::new("cc-3".into(), "c".into(), "x".into()))
                .await
                .unwrap()
        );

        let next = store.next_eligible_campaign_contact(&"c".into()).await.unwrap().unwrap();
        assert_eq!(next.id, CampaignContactId::from("cc-1"));

        assert!(store.mark_sent_and_delivered(&next.id, now).await.unwrap());
        assert!(!store.mark_sent_only(&next.id, now).await.unwrap());

        let row = store.campaign_contact(&next.id).await.unwrap().unwrap();
        assert_eq!(row.sent, Some(now));
        assert_eq!(row.delivered, Some(now));

        let next = store.next_eligible_campaign_contact(&"c".into()).await.unwrap().unwrap();
        assert_eq!(next.id, CampaignContactId::from("cc-2"));

        assert!(store.mark_sent_only(&next.id, now).await.unwrap());
        let row = store.campaign_contact(&next.id).await.unwrap().unwrap();
        assert_eq!(row.sent, Some(now));
        assert_eq!(row.delivered, None);

        assert!(store.next_eligible_campaign_contact(&"c".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_campaign_contact() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store
            .insert_campaign_contact(CampaignContact::new("cc".into(), "c".into(), "x".into()))
            .await
            .unwrap();

        store.remove_campaign_contact(&"cc".into()).await.unwrap();
        store.remove_campaign_contact(&"cc".into()).await.unwrap();
        assert!(store.next_eligible_campaign_contact(&"c".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_opened_and_unsubscribed() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let now = now();
        let id = CampaignContactId::from("cc");
        store.insert_contact(contact("x")).await.unwrap();
        store
            .insert_campaign_contact(CampaignContact::new(id.clone(), "c".into(), "x".into()))
            .await
            .unwrap();

        assert!(store.mark_opened(&id, now).await.unwrap());
        assert!(store.mark_opened(&id, now + TimeDelta::seconds(3)).await.unwrap());
        assert!(!store.mark_opened(&"missing".into(), now).await.unwrap());

        assert!(store.mark_unsubscribed(&id, &"x".into(), now).await.unwrap());
        assert!(
            store
                .mark_unsubscribed(&id, &"x".into(), now + TimeDelta::seconds(9))
                .await
                .unwrap()
        );
        assert!(!store.mark_unsubscribed(&"missing".into(), &"x".into(), now).await.unwrap());

        let row = store.campaign_contact(&id).await.unwrap().unwrap();
        assert_eq!(row.opened, Some(now + TimeDelta::seconds(3)));
        assert_eq!(row.unsubscribed, Some(now));
        assert!(store.get_contact(&"x".into()).await.unwrap().unwrap().unsubscribed);
        assert!(store.next_eligible_campaign_contact(&"c".into()).await.unwrap().is_none());

        let target = store.campaign_contact_with_contact(&id).await.unwrap().unwrap();
        assert_eq!(
            target,
            UnsubscribeTarget {
                campaign_contact_id: id.clone(),
                contact_id: "x".into(),
                unsubscribed: Some(now),
                project_id: Some("project".into()),
                email_address: Some("x@example.com".to_string()),
            }
        );

        store.remove_contact(&"x".into()).await.unwrap();
        let target = store.campaign_contact_with_contact(&id).await.unwrap().unwrap();
        assert_eq!(target.project_id, None);
        assert_eq!(target.email_address, None);
    }

    #[tokio::test]
    async fn test_suppression_list() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.insert_unsubscribe("project".into(), "Ann@Example.com").await.unwrap();
        store.insert_unsubscribe("project".into(), "ann@example.com").await.unwrap();

        assert!(
            store
                .is_globally_unsubscribed(&"project".into(), "ANN@example.com")
                .await
                .unwrap()
        );
        assert!(
            !store
                .is_globally_unsubscribed(&"other".into(), "ann@example.com")
                .await
                .unwrap()
        );

        // Only ASCII letters fold
        store.insert_unsubscribe("project".into(), "Zoë@example.com").await.unwrap();
        assert!(
            store
                .is_globally_unsubscribed(&"project".into(), "zoë@example.com")
                .await
                .unwrap()
        );
        assert!(
            !store
                .is_globally_unsubscribed(&"project".into(), "ZOË@example.com")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unsent_by_campaigns() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let now = now();
        for (id, campaign, contact) in [("1", "a", "x"), ("2", "a", "y"), ("3", "b", "x")] {
            store
                .insert_campaign_contact(CampaignContact::new(id.into(), campaign.into(), contact.into()))
                .await
                .unwrap();
        }
        store.mark_sent_only(&"3".into(), now).await.unwrap();

        let counts = store
            .unsent_by_campaigns(&["a".into(), "b".into(), "z".into()])
            .await
            .unwrap();
        assert_eq!(counts, HashMap::from([(CampaignId::from("a"), 2)]));

        assert!(store.unsent_by_campaigns(&[]).await.unwrap().is_empty());
    }
}
