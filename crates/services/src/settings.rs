use std::time::Duration;

use quiz_core::model::default_snapshot_max_age;

/// Tunables of the session engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Ticks during which the countdown is held after a resume from the local cache.
    pub resume_grace_ticks: u32,
    /// Oldest snapshot that is still honoured for resume.
    pub snapshot_max_age: chrono::Duration,
    /// Period of the countdown ticker.
    pub tick_period: Duration,
    /// Shuffle option display order of freshly loaded question sets.
    pub shuffle_options: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            resume_grace_ticks: 3,
            snapshot_max_age: default_snapshot_max_age(),
            tick_period: Duration::from_secs(1),
            shuffle_options: false,
        }
    }
}

impl SessionSettings {
    #[must_use]
    pub fn with_shuffle_options(mut self, shuffle: bool) -> Self {
        self.shuffle_options = shuffle;
        self
    }

    #[must_use]
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    #[must_use]
    pub fn with_resume_grace_ticks(mut self, ticks: u32) -> Self {
        self.resume_grace_ticks = ticks;
        self
    }
}
