//! Reconnect backoff.

use std::time::Duration;

/// Delays between reconnect attempts, in seconds. The last entry repeats.
const RECONNECT_DELAYS: &[u64] = &[1, 2, 5, 10, 30, 60];

/// Bounded backoff: attempts walk the schedule and then stay at its last
/// delay, so a flapping server never triggers a tight reconnect loop.
#[derive(Debug, Clone)]
pub struct Backoff {
  delays: Vec<Duration>,
  attempt: usize,
}

impl Backoff {
  pub fn new(delays: Vec<Duration>) -> Self {
    Self { delays, attempt: 0 }
  }

  /// Delay before the next attempt; advances the schedule.
  pub fn next_delay(&mut self) -> Duration {
    let delay = match self.delays.len() {
      0 => Duration::from_secs(RECONNECT_DELAYS[RECONNECT_DELAYS.len() - 1]),
      len => self.delays[self.attempt.min(len - 1)],
    };
    self.attempt += 1;
    delay
  }

  pub fn attempt(&self) -> usize {
    self.attempt
  }

  pub fn reset(&mut self) {
    self.attempt = 0;
  }
}

impl Default for Backoff {
  fn default() -> Self {
    Self::new(RECONNECT_DELAYS.iter().copied().map(Duration::from_secs).collect())
  }
}
