//! Randomised spacing between sends of a campaign.

use chrono::{DateTime, TimeDelta, Utc};
use drip_common::SendInterval;
use rand::Rng;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReschedulePolicy;

impl ReschedulePolicy {
    /// A whole number of seconds drawn uniformly from
    /// `[interval.min_secs(), interval.max_secs()]`, both ends inclusive.
    pub fn draw_delay<R: Rng>(interval: SendInterval, rng: &mut R) -> u32 {
        rng.random_range(interval.min_secs()..=interval.max_secs())
    }

    /// The trigger following a send at `now`.
    pub fn next_trigger(interval: SendInterval, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = Self::draw_delay(interval, &mut rand::rng());
        now + TimeDelta::seconds(i64::from(delay))
    }
}
