//! One poll cycle: every due campaign gets at most one send.

use chrono::{DateTime, Utc};
use drip_common::{DueCampaign, tracing};
use tokio::task::JoinSet;

use super::Scheduler;
use crate::{
    cursor::{ContactCursor, NextContact},
    error::{SchedulerError, Stage},
    mailer::{OutgoingMessage, Outcome},
    template::{Bindings, render, render_body},
};

/// How one due campaign was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignResult {
    /// A message went out (or was attempted) and the campaign was rescheduled.
    Sent {
        outcome: Outcome,
        next_trigger: DateTime<Utc>,
    },
    /// The campaign's sender no longer exists.
    PausedSenderMissing,
    /// No eligible contacts are left.
    PausedExhausted,
}

/// Tally of a poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub due: usize,
    pub delivered: usize,
    pub sent_only: usize,
    pub failed: usize,
    pub paused: usize,
    /// Campaigns abandoned for this cycle after a storage failure.
    pub errors: usize,
    /// Due campaigns never started, because the cycle ended early or the
    /// scheduler is stopping.
    pub skipped: usize,
}

impl CycleReport {
    fn record(&mut self, result: &CampaignResult) {
        match result {
            CampaignResult::Sent { outcome, .. } => match outcome {
                Outcome::Delivered => self.delivered += 1,
                Outcome::SentOnly => self.sent_only += 1,
                Outcome::Failed => self.failed += 1,
            },
            CampaignResult::PausedSenderMissing | CampaignResult::PausedExhausted => {
                self.paused += 1;
            }
        }
    }

    /// Whether the cycle changed nothing, in which case the scheduler waits
    /// before polling again.
    pub const fn is_idle(&self) -> bool {
        self.delivered + self.sent_only + self.failed + self.paused == 0
    }
}

impl Scheduler {
    /// Runs one poll cycle over the campaigns due at `now`.
    ///
    /// Campaigns are started in the order the store lists them, at most
    /// `max_concurrent_campaigns` at a time. A storage failure inside one
    /// campaign is logged and counted; the cycle moves on.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ListDue`] if the due campaigns cannot be
    /// listed.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport, SchedulerError> {
        let due = self
            .store
            .list_due_campaigns(now)
            .await
            .map_err(SchedulerError::ListDue)?;

        let mut report = CycleReport {
            due: due.len(),
            ..CycleReport::default()
        };

        if due.is_empty() {
            return Ok(report);
        }

        tracing::debug!(due = due.len(), "Processing due campaigns");

        let limit = self.config.max_concurrent_campaigns.max(1);
        let mut pending = due.into_iter();
        let mut join_set = JoinSet::new();
        let mut ending = false;

        loop {
            while !ending && !self.is_stopping() && join_set.len() < limit {
                let Some(campaign) = pending.next() else {
                    break;
                };

                let scheduler = self.clone();
                join_set.spawn(async move { scheduler.process_campaign(&campaign).await });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };

            match joined {
                Ok(Ok(result)) => {
                    report.record(&result);
                    if result == CampaignResult::PausedExhausted
                        && self.config.exhausted_policy.ends_cycle()
                    {
                        ending = true;
                    }
                }
                Ok(Err(err)) => {
                    log_campaign_error(&err);
                    report.errors += 1;
                }
                Err(err) => {
                    tracing::error!("Campaign task failed: {err}");
                    report.errors += 1;
                }
            }
        }

        report.skipped = pending.len();
        if report.skipped > 0 {
            if ending {
                tracing::info!(
                    skipped = report.skipped,
                    "A campaign ran out of contacts, leaving the remaining due campaigns for the next cycle"
                );
            } else {
                tracing::info!(
                    skipped = report.skipped,
                    "Stopping, leaving the remaining due campaigns for the next run"
                );
            }
        }

        Ok(report)
    }

    /// Handles one due campaign: resolve the sender, pick a contact, send,
    /// record the outcome and reschedule. A missing sender or an exhausted
    /// contact list pauses the campaign instead.
    ///
    /// The ledger and the next trigger are stamped with the time the send
    /// finished.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Campaign`] for any storage failure, tagged
    /// with the stage it happened in.
    #[tracing::instrument(skip_all, fields(campaign_id = %campaign.id))]
    pub async fn process_campaign(
        &self,
        campaign: &DueCampaign,
    ) -> Result<CampaignResult, SchedulerError> {
        let id = &campaign.id;

        let Some(sender) = self
            .store
            .get_sender(&campaign.sender_id)
            .await
            .map_err(SchedulerError::campaign(id, Stage::ResolveSender))?
        else {
            tracing::warn!(sender_id = %campaign.sender_id, "Sender no longer exists, pausing campaign");
            self.tracker
                .pause(id)
                .await
                .map_err(SchedulerError::campaign(id, Stage::Pause))?;
            return Ok(CampaignResult::PausedSenderMissing);
        };

        let Some(next) = ContactCursor::new(self.store.as_ref())
            .next(id)
            .await
            .map_err(SchedulerError::campaign(id, Stage::SelectContact))?
        else {
            tracing::info!("No eligible contacts left, pausing campaign");
            self.tracker
                .pause(id)
                .await
                .map_err(SchedulerError::campaign(id, Stage::Pause))?;
            return Ok(CampaignResult::PausedExhausted);
        };

        let message = self.compose(campaign, &next);
        let outcome = self.mailer.send(&sender, &message).await;
        let sent_at = Utc::now();

        self.tracker
            .record_outcome(&next.campaign_contact_id, outcome, sent_at)
            .await
            .map_err(SchedulerError::campaign(id, Stage::RecordOutcome))?;

        let next_trigger = self
            .tracker
            .reschedule(id, campaign.interval, sent_at)
            .await
            .map_err(SchedulerError::campaign(id, Stage::Reschedule))?;

        tracing::info!(
            campaign_contact_id = %next.campaign_contact_id,
            %outcome,
            %next_trigger,
            "Campaign sent"
        );

        Ok(CampaignResult::Sent {
            outcome,
            next_trigger,
        })
    }

    fn compose(&self, campaign: &DueCampaign, next: &NextContact) -> OutgoingMessage {
        let links = &self.config.links;
        let id = &next.campaign_contact_id;
        let bindings = Bindings::for_contact(id, &next.contact, links.unsubscribe(id));

        OutgoingMessage {
            campaign_contact_id: id.clone(),
            to: next.contact.email_address.clone(),
            subject: render(&campaign.subject, &bindings),
            html_body: render_body(&campaign.body, &bindings, &links.tracking(id)),
            list_unsubscribe: links.list_unsubscribe_header(id),
        }
    }
}

fn log_campaign_error(err: &SchedulerError) {
    match err {
        SchedulerError::Campaign {
            campaign_id,
            stage,
            source,
        } => tracing::error!(
            %campaign_id,
            %stage,
            error = %source,
            "Campaign processing failed"
        ),
        SchedulerError::ListDue(_) => tracing::error!("{err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_tally() {
        let mut report = CycleReport::default();
        assert!(report.is_idle());

        report.record(&CampaignResult::Sent {
            outcome: Outcome::SentOnly,
            next_trigger: Utc::now(),
        });
        report.record(&CampaignResult::PausedExhausted);
        report.record(&CampaignResult::PausedSenderMissing);

        assert_eq!(report.sent_only, 1);
        assert_eq!(report.paused, 2);
        assert!(!report.is_idle());
    }

    #[test]
    fn test_errors_alone_are_idle() {
        let report = CycleReport {
            due: 3,
            errors: 3,
            ..CycleReport::default()
        };
        assert!(report.is_idle());
    }
}
