//! Timeout & deadline model (§4.3).
//!
//! A `Timeout` is an immutable policy (`connect`/`read`/`total` budgets); a
//! `Deadline` is what you get by `start()`-ing one — the monotonic instant
//! bookkeeping that survives across a single attempt's connect + read calls.
//! Deadlines are never reused across retries: the retry controller (C7)
//! starts a fresh `Deadline` for each attempt, per §4.3's closing note.

use std::time::{Duration, Instant};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeout {
    pub connect: Option<Duration>,
    pub read: Option<Duration>,
    pub total: Option<Duration>,
}

impl Default for Timeout {
    fn default() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            read: Some(Duration::from_secs(30)),
            total: None,
        }
    }
}

impl Timeout {
    pub fn new(connect: Option<Duration>, read: Option<Duration>, total: Option<Duration>) -> Self {
        Self { connect, read, total }
    }

    /// A single combined budget applied to every phase (the "combined float"
    /// form mentioned in §6's `timeout` option).
    pub fn combined(d: Duration) -> Self {
        Self {
            connect: Some(d),
            read: Some(d),
            total: Some(d),
        }
    }

    pub fn none() -> Self {
        Self {
            connect: None,
            read: None,
            total: None,
        }
    }

    pub fn start(&self) -> Deadline {
        Deadline {
            policy: *self,
            start: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    policy: Timeout,
    start: Instant,
}

impl Deadline {
    /// Remaining time for the whole single-attempt request, or `None` if
    /// `total` is unset (no bound).
    pub fn total_remaining(&self) -> Option<Duration> {
        self.policy.total.map(|total| {
            let elapsed = self.start.elapsed();
            total.saturating_sub(elapsed)
        })
    }

    /// Raises `ReadTimeout` if the total budget is already exhausted.
    pub fn check_total(&self) -> Result<(), Error> {
        if let Some(total) = self.policy.total {
            if self.start.elapsed() >= total {
                return Err(Error::ReadTimeout);
            }
        }
        Ok(())
    }

    /// Budget for the next connect attempt: `min(connect, total_remaining)`.
    pub fn connect_timeout(&self) -> Option<Duration> {
        clamp_to_total(self.policy.connect, self.total_remaining())
    }

    /// Budget for the next individual socket read.
    pub fn read_timeout(&self) -> Option<Duration> {
        clamp_to_total(self.policy.read, self.total_remaining())
    }
}

fn clamp_to_total(phase: Option<Duration>, total_remaining: Option<Duration>) -> Option<Duration> {
    match (phase, total_remaining) {
        (Some(p), Some(t)) => Some(p.min(t)),
        (Some(p), None) => Some(p),
        (None, Some(t)) => Some(t),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn no_total_means_unbounded() {
        let t = Timeout::new(Some(Duration::from_secs(1)), Some(Duration::from_secs(1)), None);
        let d = t.start();
        assert_eq!(d.total_remaining(), None);
        assert_eq!(d.connect_timeout(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn connect_timeout_is_clamped_by_total_remaining() {
        let t = Timeout::new(
            Some(Duration::from_secs(10)),
            Some(Duration::from_secs(10)),
            Some(Duration::from_millis(30)),
        );
        let d = t.start();
        sleep(Duration::from_millis(20));
        let ct = d.connect_timeout().unwrap();
        assert!(ct <= Duration::from_millis(15), "got {ct:?}");
    }

    #[test]
    fn total_exhausted_raises_read_timeout() {
        let t = Timeout::combined(Duration::from_millis(5));
        let d = t.start();
        sleep(Duration::from_millis(10));
        assert!(matches!(d.check_total(), Err(Error::ReadTimeout)));
    }

    #[test]
    fn combined_applies_same_budget_everywhere() {
        let t = Timeout::combined(Duration::from_secs(2));
        assert_eq!(t.connect, Some(Duration::from_secs(2)));
        assert_eq!(t.read, Some(Duration::from_secs(2)));
        assert_eq!(t.total, Some(Duration::from_secs(2)));
    }
}
