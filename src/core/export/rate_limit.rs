//! Rate limiting for the remote analytics API
//!
//! A [`RateLimiter`] bounds how many fetches are in flight at once (a tokio
//! semaphore) and, optionally, how many may start inside sliding one-second and
//! one-hour windows. Ceilings are per API family, so they are passed in as a
//! [`RateLimitPolicy`] rather than hard-coded.

use crate::config::{ApiLimitsConfig, RateLimitConfig};
use crate::domain::RecordKind;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Instant};

/// Group of remote endpoints sharing one set of ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFamily {
    /// Raw event export
    Export,
    /// Query endpoints (profiles)
    Query,
}

impl ApiFamily {
    /// Family serving records of `kind`
    pub fn for_kind(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Event => ApiFamily::Export,
            RecordKind::Profile => ApiFamily::Query,
        }
    }
}

/// Concurrency and throughput ceilings of one API family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_concurrent: usize,
    pub per_second: Option<u32>,
    pub per_hour: Option<u32>,
}

impl RateLimitPolicy {
    /// Default ceilings of the raw export API
    pub fn export_default() -> Self {
        Self {
            max_concurrent: 100,
            per_second: Some(3),
            per_hour: Some(60),
        }
    }

    /// Default ceilings of the query API
    pub fn query_default() -> Self {
        Self {
            max_concurrent: 5,
            per_second: None,
            per_hour: Some(60),
        }
    }

    /// Only a concurrency ceiling, no windows
    pub fn concurrency_only(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            per_second: None,
            per_hour: None,
        }
    }

    fn windows(&self) -> Vec<SlidingWindow> {
        let mut windows = Vec::new();
        if let Some(limit) = self.per_second {
            windows.push(SlidingWindow::new(Duration::from_secs(1), limit));
        }
        if let Some(limit) = self.per_hour {
            windows.push(SlidingWindow::new(Duration::from_secs(3600), limit));
        }
        windows
    }
}

impl From<&RateLimitConfig> for RateLimitPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            per_second: config.per_second,
            per_hour: config.per_hour,
        }
    }
}

/// Ceilings for every API family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiLimits {
    pub export: RateLimitPolicy,
    pub query: RateLimitPolicy,
}

impl ApiLimits {
    pub fn for_family(&self, family: ApiFamily) -> &RateLimitPolicy {
        match family {
            ApiFamily::Export => &self.export,
            ApiFamily::Query => &self.query,
        }
    }
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            export: RateLimitPolicy::export_default(),
            query: RateLimitPolicy::query_default(),
        }
    }
}

impl From<&ApiLimitsConfig> for ApiLimits {
    fn from(config: &ApiLimitsConfig) -> Self {
        Self {
            export: (&config.export).into(),
            query: (&config.query).into(),
        }
    }
}

/// Clamp a requested worker count to the family's concurrency ceiling
///
/// Asking for more workers than the API allows is not an error: the count is
/// reduced and a warning is logged.
pub fn effective_workers(requested: usize, family: ApiFamily, policy: &RateLimitPolicy) -> usize {
    let ceiling = policy.max_concurrent.max(1);
    if requested > ceiling {
        tracing::warn!(
            requested,
            ceiling,
            family = ?family,
            "Requested workers exceed API concurrency ceiling, clamping"
        );
        ceiling
    } else {
        requested.max(1)
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The limiter was closed while waiting
    #[error("rate limiter closed: {0}")]
    Closed(String),
}

/// Start times of recent requests inside one window
#[derive(Debug)]
struct SlidingWindow {
    span: Duration,
    limit: u32,
    starts: VecDeque<Instant>,
}

impl SlidingWindow {
    fn new(span: Duration, limit: u32) -> Self {
        Self {
            span,
            limit: limit.max(1),
            starts: VecDeque::new(),
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.starts.front() {
            if now.duration_since(*oldest) >= self.span {
                self.starts.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long until one more request fits, `None` if it fits now
    fn wait_time(&self, now: Instant) -> Option<Duration> {
        if self.starts.len() < self.limit as usize {
            return None;
        }
        self.starts
            .front()
            .map(|oldest| self.span.saturating_sub(now.duration_since(*oldest)))
    }
}

/// Proof that a fetch may proceed; dropping it frees the concurrency slot
#[derive(Debug)]
pub struct RatePermit {
    _slot: OwnedSemaphorePermit,
}

impl RatePermit {
    /// Give the slot back before the end of scope
    pub fn release(self) {}
}

/// Concurrency and sliding-window gate shared by all workers
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    slots: Arc<Semaphore>,
    windows: Mutex<Vec<SlidingWindow>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        let slots = Arc::new(Semaphore::new(policy.max_concurrent.max(1)));
        let windows = Mutex::new(policy.windows());
        Self {
            policy,
            slots,
            windows,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Number of permits currently held
    pub fn in_flight(&self) -> usize {
        self.policy.max_concurrent.max(1) - self.slots.available_permits()
    }

    /// Wait for a concurrency slot and room in every window
    ///
    /// The window check and the recording of the new start time happen under
    /// one lock, so concurrent callers can never overshoot a window.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Closed`] only if the semaphore was closed,
    /// which this type never does itself.
    pub async fn acquire(&self) -> Result<RatePermit, RateLimitError> {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::Closed(e.to_string()))?;

        loop {
            let wait = {
                let mut windows = self
                    .windows
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let now = Instant::now();
                for window in windows.iter_mut() {
                    window.evict(now);
                }

                match windows.iter().filter_map(|w| w.wait_time(now)).max() {
                    None => {
                        for window in windows.iter_mut() {
                            window.starts.push_back(now);
                        }
                        break;
                    }
                    Some(wait) => wait,
                }
            };

            tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate window full, waiting");
            sleep(wait.max(Duration::from_millis(1))).await;
        }

        Ok(RatePermit { _slot: slot })
    }
}
