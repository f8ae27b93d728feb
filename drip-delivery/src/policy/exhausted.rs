use serde::Deserialize;

/// Behaviour of the rest of a poll cycle once one campaign has been paused
/// for running out of contacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ExhaustedPolicy {
    /// Stop the cycle. Remaining due campaigns are picked up by the next one.
    #[default]
    EndCycle,
    /// Keep going with the remaining due campaigns.
    ContinueCycle,
}

impl ExhaustedPolicy {
    pub const fn ends_cycle(self) -> bool {
        matches!(self, Self::EndCycle)
    }
}
