//! Dual sliding-window rate limiter for outbound catalog calls.
//!
//! Every call must go through [`RateLimiter::acquire`], which blocks for the
//! exact deficit (never polls, never rejects) and then records the call.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Wait applied when the provider says "slow down" without a Retry-After hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Caps enforced by [`RateLimiter`]. A cap of 0 disables that window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_minute: usize,
    pub per_hour: usize,
    pub min_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 90,
            per_hour: 4500,
            min_interval: Duration::from_millis(700),
        }
    }
}

/// Call history. Instants are clock offsets (see [`Clock::now`]).
#[derive(Debug, Default)]
struct RateWindow {
    minute: VecDeque<Duration>,
    hour: VecDeque<Duration>,
    last_call: Option<Duration>,
    blocked_until: Option<Duration>,
}

impl RateWindow {
    fn prune(&mut self, now: Duration) {
        while self.minute.front().is_some_and(|&t| t + MINUTE <= now) {
            self.minute.pop_front();
        }
        while self.hour.front().is_some_and(|&t| t + HOUR <= now) {
            self.hour.pop_front();
        }
        if self.blocked_until.is_some_and(|b| b <= now) {
            self.blocked_until = None;
        }
    }

    /// Earliest instant at which one more call is legal.
    fn ready_at(&self, config: &RateLimitConfig) -> Duration {
        let mut ready = Duration::ZERO;
        if config.per_minute > 0 && self.minute.len() >= config.per_minute {
            ready = ready.max(self.minute[self.minute.len() - config.per_minute] + MINUTE);
        }
        if config.per_hour > 0 && self.hour.len() >= config.per_hour {
            ready = ready.max(self.hour[self.hour.len() - config.per_hour] + HOUR);
        }
        if let Some(last) = self.last_call {
            ready = ready.max(last + config.min_interval);
        }
        if let Some(blocked) = self.blocked_until {
            ready = ready.max(blocked);
        }
        ready
    }

    fn record(&mut self, now: Duration) {
        self.minute.push_back(now);
        self.hour.push_back(now);
        self.last_call = Some(now);
    }
}

/// Thread-safe limiter shared by every worker in a run.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    window: Mutex<RateWindow>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            window: Mutex::new(RateWindow::default()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Block until a call may proceed, then record it.
    ///
    /// The window is unlocked while sleeping and re-checked on waking, so a
    /// 429 reported meanwhile extends the wait.
    pub fn acquire(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().unwrap();
                let now = self.clock.now();
                window.prune(now);
                let ready = window.ready_at(&self.config);
                if ready <= now {
                    window.record(now);
                    return;
                }
                ready - now
            };
            if wait >= Duration::from_secs(5) {
                log::info!("rate limit reached, waiting {:.1}s", wait.as_secs_f64());
            } else {
                log::trace!("rate limiter: sleeping {wait:?}");
            }
            self.clock.sleep(wait);
        }
    }

    /// Provider reported rate limiting: hold every caller until `now + retry_after`.
    pub fn on_rate_limited(&self, retry_after: Option<Duration>) {
        let wait = retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
        let mut window = self.window.lock().unwrap();
        let until = self.clock.now() + wait;
        window.blocked_until = Some(window.blocked_until.map_or(until, |b| b.max(until)));
        log::warn!("destination rate limited us, pausing {}s", wait.as_secs());
    }

    /// Calls recorded in the trailing minute and hour.
    pub fn window_counts(&self) -> (usize, usize) {
        let mut window = self.window.lock().unwrap();
        window.prune(self.clock.now());
        (window.minute.len(), window.hour.len())
    }
}
