//! Single-page-app navigation produces no load event, so the only
//! reliable signal is comparing the current URL against the last
//! observed value on a fixed interval. The settle delay before the
//! rescan is a pragmatic wait, not a readiness proof: a scan that fires
//! before content exists fails soft and the next trigger retries it.

use std::time::{Duration, Instant};

use tracing::debug;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub from: String,
    pub to: String,
}

#[derive(Debug)]
pub struct Watcher {
    last_url: Option<String>,
    poll_interval: Duration,
    settle_delay: Duration,
    last_poll: Option<Instant>,
    settle_at: Option<Instant>,
}

impl Watcher {
    pub fn new(poll_interval: Duration, settle_delay: Duration) -> Self {
        Watcher {
            last_url: None,
            poll_interval,
            settle_delay,
            last_poll: None,
            settle_at: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Compare the current URL against the last observed value. Returns
    /// a navigation when the URL changed since the previous observation
    /// and schedules the post-settle rescan. Observations arriving
    /// faster than the poll interval are ignored, matching the original
    /// timer cadence.
    pub fn observe(&mut self, href: &str, now: Instant) -> Option<Navigation> {
        if let Some(last_poll) = self.last_poll {
            if now.duration_since(last_poll) < self.poll_interval {
                return None;
            }
        }
        self.last_poll = Some(now);

        let previous = self.last_url.replace(href.to_string());
        match previous {
            Some(previous) if previous != href => {
                debug!(from = %previous, to = %href, "navigation detected");
                self.settle_at = Some(now + self.settle_delay);
                Some(Navigation {
                    from: previous,
                    to: href.to_string(),
                })
            }
            _ => None,
        }
    }

    /// One-shot: true once the settle delay after the last navigation
    /// has elapsed, then never again until the next navigation.
    pub fn settle_due(&mut self, now: Instant) -> bool {
        match self.settle_at {
            Some(at) if now >= at => {
                self.settle_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn rescan_pending(&self) -> bool {
        self.settle_at.is_some()
    }
}
