//! Adaptive token-bucket rate governor for archive requests.
//!
//! All outbound calls to the filing archive pass through one shared
//! governor. The bucket refills continuously from elapsed monotonic time;
//! observed 429 responses either impose a wall-clock hold (when the server
//! sent Retry-After) or halve the current rate, and successes recover the
//! rate geometrically back to its configured ceiling.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Shared handle to the process-wide governor.
pub type SharedGovernor = Arc<RateGovernor>;

struct GovernorState {
    tokens: f64,
    current_rate: f64,
    last_update: Instant,
    hold_until: Option<Instant>,
}

/// Adaptive token bucket.
///
/// Tokens stay within `[0, burst]`. `current_rate` moves between
/// `min_rate` and the configured steady-state rate.
pub struct RateGovernor {
    state: Mutex<GovernorState>,
    base_rate: f64,
    burst: f64,
    min_rate: f64,
}

impl std::fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGovernor")
            .field("base_rate", &self.base_rate)
            .field("burst", &self.burst)
            .field("min_rate", &self.min_rate)
            .finish_non_exhaustive()
    }
}

impl RateGovernor {
    /// Create a governor with the given steady-state rate (requests/second),
    /// burst capacity and rate floor.
    ///
    /// The bucket starts full so short runs never wait on startup.
    pub fn new(rate: f64, burst: f64, min_rate: f64) -> Self {
        let rate = rate.max(f64::EPSILON);
        let burst = burst.max(1.0);
        Self {
            state: Mutex::new(GovernorState {
                tokens: burst,
                current_rate: rate,
                last_update: Instant::now(),
                hold_until: None,
            }),
            base_rate: rate,
            burst,
            min_rate: min_rate.clamp(f64::EPSILON, rate),
        }
    }

    /// Governor with the spec defaults: rate 8/s, burst 2x rate, floor 1/s.
    pub fn with_defaults() -> Self {
        Self::new(8.0, 16.0, 1.0)
    }

    /// Shared handle suitable for cloning into every archive caller.
    pub fn shared(self) -> SharedGovernor {
        Arc::new(self)
    }

    fn refill(state: &mut GovernorState, burst: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update).as_secs_f64();
        state.tokens = (state.tokens + elapsed * state.current_rate).min(burst);
        state.last_update = now;
    }

    /// Block until one token is available, then consume it.
    pub async fn wait(&self) {
        loop {
            let wait_for = {
                let mut state = self.state.lock().await;

                if let Some(hold) = state.hold_until {
                    let now = Instant::now();
                    if now < hold {
                        hold.duration_since(now)
                    } else {
                        state.hold_until = None;
                        // Fall through to normal token accounting
                        Self::refill(&mut state, self.burst);
                        if state.tokens >= 1.0 {
                            state.tokens -= 1.0;
                            return;
                        }
                        Duration::from_secs_f64((1.0 - state.tokens) / state.current_rate)
                    }
                } else {
                    Self::refill(&mut state, self.burst);
                    if state.tokens >= 1.0 {
                        state.tokens -= 1.0;
                        return;
                    }
                    Duration::from_secs_f64((1.0 - state.tokens) / state.current_rate)
                }
            };
            sleep(wait_for.min(Duration::from_millis(100))).await;
        }
    }

    /// Try to consume a token within `timeout`.
    ///
    /// Returns `false` without consuming anything when the timeout elapses.
    pub async fn acquire(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let wait_for = {
                let mut state = self.state.lock().await;
                if let Some(hold) = state.hold_until {
                    let now = Instant::now();
                    if now < hold {
                        hold.duration_since(now)
                    } else {
                        state.hold_until = None;
                        continue;
                    }
                } else {
                    Self::refill(&mut state, self.burst);
                    if state.tokens >= 1.0 {
                        state.tokens -= 1.0;
                        return true;
                    }
                    Duration::from_secs_f64((1.0 - state.tokens) / state.current_rate)
                }
            };

            let now = Instant::now();
            if now + wait_for > deadline {
                // Give the clock one last chance right at the deadline
                if now >= deadline {
                    return false;
                }
                sleep(deadline.duration_since(now)).await;
                let mut state = self.state.lock().await;
                if state.hold_until.is_some_and(|h| Instant::now() < h) {
                    return false;
                }
                Self::refill(&mut state, self.burst);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return true;
                }
                return false;
            }
            sleep(wait_for.min(Duration::from_millis(100))).await;
        }
    }

    /// Record a 429 (or equivalent) observed by a caller.
    ///
    /// With `retry_after`, all acquirers are held until that deadline.
    /// Without, the current rate is halved, floored at the configured
    /// minimum.
    pub async fn report_rate_limit(&self, retry_after: Option<Duration>) {
        let mut state = self.state.lock().await;
        match retry_after {
            Some(after) => {
                let hold = Instant::now() + after;
                state.hold_until = Some(match state.hold_until {
                    Some(existing) if existing > hold => existing,
                    _ => hold,
                });
                warn!(hold_secs = after.as_secs_f64(), "archive requested hold");
            }
            None => {
                let new_rate = (state.current_rate / 2.0).max(self.min_rate);
                warn!(old_rate = state.current_rate, new_rate, "rate limited, backing off");
                state.current_rate = new_rate;
            }
        }
    }

    /// Record a successful request: recover the rate by x1.1, capped at the
    /// configured steady-state rate.
    pub async fn report_success(&self) {
        let mut state = self.state.lock().await;
        if state.current_rate < self.base_rate {
            state.current_rate = (state.current_rate * 1.1).min(self.base_rate);
            debug!(rate = state.current_rate, "rate recovering");
        }
    }

    /// Current requests-per-second setting (for logs and tests).
    pub async fn current_rate(&self) -> f64 {
        self.state.lock().await.current_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_admits_immediately() {
        let governor = RateGovernor::new(2.0, 4.0, 1.0);
        let start = Instant::now();
        for _ in 0..4 {
            governor.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_rate_one_burst_one_admits_two_in_a_second() {
        let governor = RateGovernor::new(1.0, 1.0, 1.0);
        let start = Instant::now();
        governor.wait().await; // token from the full bucket
        governor.wait().await; // refilled after ~1s
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(900), "elapsed {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(1500), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_acquire_timeout_returns_false() {
        let governor = RateGovernor::new(1.0, 1.0, 1.0);
        assert!(governor.acquire(Duration::from_millis(10)).await);
        // Bucket empty, refill takes ~1s; a 50ms timeout must fail
        assert!(!governor.acquire(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_rate_limit_halves_rate() {
        let governor = RateGovernor::new(8.0, 16.0, 1.0);
        governor.report_rate_limit(None).await;
        assert_eq!(governor.current_rate().await, 4.0);
        governor.report_rate_limit(None).await;
        governor.report_rate_limit(None).await;
        governor.report_rate_limit(None).await;
        // Floored at min_rate
        assert_eq!(governor.current_rate().await, 1.0);
    }

    #[tokio::test]
    async fn test_success_recovers_geometrically() {
        let governor = RateGovernor::new(8.0, 16.0, 1.0);
        governor.report_rate_limit(None).await; // 4.0
        governor.report_success().await;
        let rate = governor.current_rate().await;
        assert!((rate - 4.4).abs() < 1e-9);

        // Recovery is capped at the base rate
        for _ in 0..50 {
            governor.report_success().await;
        }
        assert_eq!(governor.current_rate().await, 8.0);
    }

    #[tokio::test]
    async fn test_retry_after_holds_acquirers() {
        let governor = RateGovernor::new(8.0, 16.0, 1.0);
        governor
            .report_rate_limit(Some(Duration::from_millis(200)))
            .await;
        let start = Instant::now();
        governor.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_hold_blocks_acquire_within_timeout() {
        let governor = RateGovernor::new(8.0, 16.0, 1.0);
        governor
            .report_rate_limit(Some(Duration::from_millis(500)))
            .await;
        assert!(!governor.acquire(Duration::from_millis(50)).await);
    }
}
