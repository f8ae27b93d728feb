use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CampaignContactId, CampaignId, ContactId, ProjectId, SenderId};
use crate::ModelError;

/// Bounds, in seconds, for the randomised gap between two sends of a campaign.
///
/// Always satisfies `min_secs < max_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInterval", into = "RawInterval")]
pub struct SendInterval {
    min_secs: u32,
    max_secs: u32,
}

#[derive(Serialize, Deserialize)]
struct RawInterval {
    min: u32,
    max: u32,
}

impl TryFrom<RawInterval> for SendInterval {
    type Error = ModelError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        Self::new(raw.min, raw.max)
    }
}

impl From<SendInterval> for RawInterval {
    fn from(interval: SendInterval) -> Self {
        Self {
            min: interval.min_secs,
            max: interval.max_secs,
        }
    }
}

impl SendInterval {
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidInterval`] unless `min_secs < max_secs`.
    pub const fn new(min_secs: u32, max_secs: u32) -> Result<Self, ModelError> {
        if min_secs >= max_secs {
            return Err(ModelError::InvalidInterval {
                min: min_secs,
                max: max_secs,
            });
        }

        Ok(Self { min_secs, max_secs })
    }

    pub const fn min_secs(&self) -> u32 {
        self.min_secs
    }

    pub const fn max_secs(&self) -> u32 {
        self.max_secs
    }
}

/// A drip campaign.
///
/// `next_trigger` being `None` means the campaign is paused and will not be
/// picked up by the scheduler until something external sets it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub project_id: ProjectId,
    pub sender_id: SenderId,
    pub interval: SendInterval,
    pub subject: String,
    pub body: String,
    pub next_trigger: Option<DateTime<Utc>>,
}

impl Campaign {
    pub const fn is_paused(&self) -> bool {
        self.next_trigger.is_none()
    }

    /// A campaign is due once its trigger is set and has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_trigger.is_some_and(|trigger| trigger <= now)
    }
}

/// The projection of a [`Campaign`] the scheduler works from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueCampaign {
    pub id: CampaignId,
    pub sender_id: SenderId,
    pub interval: SendInterval,
    pub subject: String,
    pub body: String,
}

impl From<&Campaign> for DueCampaign {
    fn from(campaign: &Campaign) -> Self {
        Self {
            id: campaign.id.clone(),
            sender_id: campaign.sender_id.clone(),
            interval: campaign.interval,
            subject: campaign.subject.clone(),
            body: campaign.body.clone(),
        }
    }
}

/// One row of a campaign's delivery ledger.
///
/// Each timestamp is set at most once by the scheduler (`opened` may be
/// overwritten by repeated pixel fetches). A row is selectable for sending
/// only while both `sent` and `unsubscribed` are unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignContact {
    pub id: CampaignContactId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub sent: Option<DateTime<Utc>>,
    pub delivered: Option<DateTime<Utc>>,
    pub opened: Option<DateTime<Utc>>,
    pub unsubscribed: Option<DateTime<Utc>>,
}

impl CampaignContact {
    /// Creates a fresh, untouched ledger row.
    #[must_use]
    pub const fn new(id: CampaignContactId, campaign_id: CampaignId, contact_id: ContactId) -> Self {
        Self {
            id,
            campaign_id,
            contact_id,
            sent: None,
            delivered: None,
            opened: None,
            unsubscribed: None,
        }
    }

    pub const fn is_eligible(&self) -> bool {
        self.sent.is_none() && self.unsubscribed.is_none()
    }
}

/// What the unsubscribe confirmation page needs to know about a ledger row.
///
/// `project_id` and `email_address` are `None` when the referenced contact no
/// longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeTarget {
    pub campaign_contact_id: CampaignContactId,
    pub contact_id: ContactId,
    pub unsubscribed: Option<DateTime<Utc>>,
    pub project_id: Option<ProjectId>,
    pub email_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn campaign(next_trigger: Option<DateTime<Utc>>) -> Campaign {
        Campaign {
            id: "campaign".into(),
            project_id: "project".into(),
            sender_id: "sender".into(),
            interval: SendInterval::new(60, 120).unwrap(),
            subject: "Hi {name}".to_string(),
            body: "<p>Hello</p>".to_string(),
            next_trigger,
        }
    }

    #[test]
    fn test_send_interval_validation() {
        assert!(SendInterval::new(10, 20).is_ok());
        assert_eq!(
            SendInterval::new(20, 20),
            Err(ModelError::InvalidInterval { min: 20, max: 20 })
        );
        assert_eq!(
            SendInterval::new(30, 20),
            Err(ModelError::InvalidInterval { min: 30, max: 20 })
        );
    }

    #[test]
    fn test_send_interval_deserialize_validates() {
        let ok: SendInterval = ron::from_str("(min: 5, max: 10)").unwrap();
        assert_eq!(ok.min_secs(), 5);
        assert_eq!(ok.max_secs(), 10);

        assert!(ron::from_str::<SendInterval>("(min: 10, max: 5)").is_err());
    }

    #[test]
    fn test_campaign_due() {
        let now = Utc::now();

        assert!(campaign(Some(now)).is_due(now));
        assert!(campaign(Some(now - TimeDelta::seconds(5))).is_due(now));
        assert!(!campaign(Some(now + TimeDelta::seconds(5))).is_due(now));

        let paused = campaign(None);
        assert!(paused.is_paused());
        assert!(!paused.is_due(now));
    }

    #[test]
    fn test_campaign_contact_eligibility() {
        let mut row = CampaignContact::new("cc".into(), "campaign".into(), "contact".into());
        assert!(row.is_eligible());

        row.opened = Some(Utc::now());
        assert!(row.is_eligible());

        row.sent = Some(Utc::now());
        assert!(!row.is_eligible());

        row.sent = None;
        row.unsubscribed = Some(Utc::now());
        assert!(!row.is_eligible());
    }
}
