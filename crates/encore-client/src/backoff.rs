use std::time::Duration;

/// Delays between reconnection attempts, in milliseconds.
pub const RECONNECT_SCHEDULE_MS: [u64; 6] = [100, 500, 1000, 2000, 5000, 10000];

pub fn default_schedule() -> Vec<Duration> {
    RECONNECT_SCHEDULE_MS
        .iter()
        .map(|&ms| Duration::from_millis(ms))
        .collect()
}

/// Fixed-schedule reconnect backoff.
///
/// Each consecutive failure advances one step, holding at the last entry.
/// A successful connection resets to the first step.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    schedule: Vec<Duration>,
    attempt: usize,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectBackoff {
    pub fn new() -> Self {
        Self::with_schedule(default_schedule())
    }

    /// An empty schedule falls back to the default one.
    pub fn with_schedule(schedule: Vec<Duration>) -> Self {
        let schedule = if schedule.is_empty() {
            default_schedule()
        } else {
            schedule
        };
        Self {
            schedule,
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the step.
    pub fn next_delay(&mut self) -> Duration {
        let step = self.attempt.min(self.schedule.len() - 1);
        self.attempt = self.attempt.saturating_add(1);
        self.schedule[step]
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn attempt(&self) -> usize {
        self.attempt
    }
}
