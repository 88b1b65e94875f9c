//! Counter state machines
//!
//! Each algorithm keeps a small serializable state in the counter store.
//! A state is first advanced to the current time, then asked for a
//! [`Decision`], and finally consumed when a request is recorded. All times
//! are milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};

use crate::types::RateLimitAlgorithm;

// Absorbs float drift in refill/drain arithmetic
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum CounterState {
    FixedWindow { window_start_ms: i64, count: u32 },
    SlidingWindow { timestamps: Vec<i64> },
    TokenBucket { tokens: f64, last_refill_ms: i64 },
    LeakyBucket { level: f64, last_leak_ms: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub current_count: u32,
    pub retry_after_ms: Option<i64>,
    pub reset_at_ms: i64,
}

fn window_start(now_ms: i64, window_ms: i64) -> i64 {
    now_ms - now_ms.rem_euclid(window_ms)
}

fn rate_per_ms(limit: u32, window_ms: i64) -> f64 {
    limit as f64 / window_ms as f64
}

/// Milliseconds until `units` of capacity come back at `limit / window`
fn time_for(units: f64, limit: u32, window_ms: i64) -> i64 {
    if limit == 0 {
        return window_ms;
    }
    (units.max(0.0) / rate_per_ms(limit, window_ms)).ceil() as i64
}

impl CounterState {
    pub fn fresh(algorithm: RateLimitAlgorithm, limit: u32, window_ms: i64, now_ms: i64) -> Self {
        match algorithm {
            RateLimitAlgorithm::FixedWindow => CounterState::FixedWindow {
                window_start_ms: window_start(now_ms, window_ms),
                count: 0,
            },
            RateLimitAlgorithm::SlidingWindow => CounterState::SlidingWindow {
                timestamps: Vec::new(),
            },
            RateLimitAlgorithm::TokenBucket => CounterState::TokenBucket {
                tokens: limit as f64,
                last_refill_ms: now_ms,
            },
            RateLimitAlgorithm::LeakyBucket => CounterState::LeakyBucket {
                level: 0.0,
                last_leak_ms: now_ms,
            },
        }
    }

    /// Resume a stored state, or start fresh when there is none or it was
    /// written under a different algorithm.
    pub fn resume(
        previous: Option<CounterState>,
        algorithm: RateLimitAlgorithm,
        limit: u32,
        window_ms: i64,
        now_ms: i64,
    ) -> Self {
        match previous {
            Some(mut state) if state.algorithm() == algorithm => {
                state.advance(limit, window_ms, now_ms);
                state
            }
            _ => Self::fresh(algorithm, limit, window_ms, now_ms),
        }
    }

    pub fn algorithm(&self) -> RateLimitAlgorithm {
        match self {
            CounterState::FixedWindow { .. } => RateLimitAlgorithm::FixedWindow,
            CounterState::SlidingWindow { .. } => RateLimitAlgorithm::SlidingWindow,
            CounterState::TokenBucket { .. } => RateLimitAlgorithm::TokenBucket,
            CounterState::LeakyBucket { .. } => RateLimitAlgorithm::LeakyBucket,
        }
    }

    /// Roll windows, expire timestamps, refill or drain up to `now_ms`.
    pub fn advance(&mut self, limit: u32, window_ms: i64, now_ms: i64) {
        match self {
            CounterState::FixedWindow {
                window_start_ms,
                count,
            } => {
                let current = window_start(now_ms, window_ms);
                if *window_start_ms != current {
                    *window_start_ms = current;
                    *count = 0;
                }
            }
            CounterState::SlidingWindow { timestamps } => {
                let cutoff = now_ms - window_ms;
                timestamps.retain(|&ts| ts > cutoff);
            }
            CounterState::TokenBucket {
                tokens,
                last_refill_ms,
            } => {
                let elapsed = (now_ms - *last_refill_ms).max(0) as f64;
                *tokens = (*tokens + elapsed * rate_per_ms(limit, window_ms)).min(limit as f64);
                *last_refill_ms = now_ms.max(*last_refill_ms);
            }
            CounterState::LeakyBucket { level, last_leak_ms } => {
                let elapsed = (now_ms - *last_leak_ms).max(0) as f64;
                *level = (*level - elapsed * rate_per_ms(limit, window_ms)).max(0.0);
                *last_leak_ms = now_ms.max(*last_leak_ms);
            }
        }
    }

    /// Whether one more request fits. Does not change the state.
    pub fn decide(&self, limit: u32, window_ms: i64, now_ms: i64) -> Decision {
        match self {
            CounterState::FixedWindow {
                window_start_ms,
                count,
            } => {
                let reset_at_ms = window_start_ms + window_ms;
                let allowed = *count < limit;
                Decision {
                    allowed,
                    remaining: limit.saturating_sub(*count),
                    current_count: *count,
                    retry_after_ms: (!allowed).then(|| reset_at_ms - now_ms),
                    reset_at_ms,
                }
            }
            CounterState::SlidingWindow { timestamps } => {
                let count = u32::try_from(timestamps.len()).unwrap_or(u32::MAX);
                let allowed = count < limit;
                let reset_at_ms = timestamps
                    .first()
                    .map_or(now_ms + window_ms, |oldest| oldest + window_ms);
                // a slot frees when the admission `count - limit` places back expires
                let retry_after_ms = (!allowed).then(|| {
                    if limit == 0 {
                        window_ms
                    } else {
                        let index = (count - limit) as usize;
                        timestamps[index] + window_ms - now_ms
                    }
                });
                Decision {
                    allowed,
                    remaining: limit.saturating_sub(count),
                    current_count: count,
                    retry_after_ms,
                    reset_at_ms,
                }
            }
            CounterState::TokenBucket { tokens, .. } => {
                let available = (tokens + EPSILON).floor().clamp(0.0, limit as f64) as u32;
                let allowed = available >= 1;
                Decision {
                    allowed,
                    remaining: available,
                    current_count: limit - available,
                    retry_after_ms: (!allowed).then(|| time_for(1.0 - tokens, limit, window_ms)),
                    reset_at_ms: now_ms + time_for(limit as f64 - tokens, limit, window_ms),
                }
            }
            CounterState::LeakyBucket { level, .. } => {
                let free = (limit as f64 - level + EPSILON).floor().clamp(0.0, limit as f64) as u32;
                let allowed = free >= 1;
                Decision {
                    allowed,
                    remaining: free,
                    current_count: (level - EPSILON).ceil().max(0.0) as u32,
                    retry_after_ms: (!allowed)
                        .then(|| time_for(level + 1.0 - limit as f64, limit, window_ms)),
                    reset_at_ms: now_ms + time_for(*level, limit, window_ms),
                }
            }
        }
    }

    /// Count one request at `now_ms`.
    pub fn consume(&mut self, now_ms: i64) {
        match self {
            CounterState::FixedWindow { count, .. } => *count = count.saturating_add(1),
            CounterState::SlidingWindow { timestamps } => timestamps.push(now_ms),
            CounterState::TokenBucket { tokens, .. } => *tokens = (*tokens - 1.0).max(0.0),
            CounterState::LeakyBucket { level, .. } => *level += 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: i64 = 60_000;

    /// Admit requests at `now` until refused; returns how many got through.
    fn drain(state: &mut CounterState, limit: u32, now: i64) -> u32 {
        let mut admitted = 0;
        loop {
            state.advance(limit, WINDOW, now);
            if !state.decide(limit, WINDOW, now).allowed {
                return admitted;
            }
            state.consume(now);
            admitted += 1;
        }
    }

    #[test]
    fn test_fixed_window_resets_at_boundary() {
        let start = 120_000;
        let mut state = CounterState::fresh(RateLimitAlgorithm::FixedWindow, 3, WINDOW, start + 10);
        assert_eq!(drain(&mut state, 3, start + 10), 3);

        let refused = state.decide(3, WINDOW, start + 20_000);
        assert!(!refused.allowed);
        assert_eq!(refused.remaining, 0);
        assert_eq!(refused.reset_at_ms, start + WINDOW);
        assert_eq!(refused.retry_after_ms, Some(WINDOW - 20_000));

        state.advance(3, WINDOW, start + WINDOW);
        let fresh = state.decide(3, WINDOW, start + WINDOW);
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 3);
    }

    #[test]
    fn test_sliding_window_expires_individually() {
        let mut state = CounterState::fresh(RateLimitAlgorithm::SlidingWindow, 2, WINDOW, 0);
        state.consume(1_000);
        state.consume(30_000);

        state.advance(2, WINDOW, 40_000);
        let refused = state.decide(2, WINDOW, 40_000);
        assert!(!refused.allowed);
        assert_eq!(refused.current_count, 2);
        assert_eq!(refused.retry_after_ms, Some(61_000 - 40_000));

        state.advance(2, WINDOW, 61_000);
        let one_free = state.decide(2, WINDOW, 61_000);
        assert!(one_free.allowed);
        assert_eq!(one_free.remaining, 1);
        assert_eq!(one_free.reset_at_ms, 90_000);
    }

    #[test]
    fn test_token_bucket_bursts_then_refills() {
        let mut state = CounterState::fresh(RateLimitAlgorithm::TokenBucket, 6, WINDOW, 0);
        assert_eq!(drain(&mut state, 6, 0), 6);

        let refused = state.decide(6, WINDOW, 0);
        assert_eq!(refused.retry_after_ms, Some(10_000));
        assert_eq!(refused.current_count, 6);

        // one token every 10s
        assert_eq!(drain(&mut state, 6, 25_000), 2);
        assert_eq!(drain(&mut state, 6, 25_000 + WINDOW * 5), 6);
    }

    #[test]
    fn test_leaky_bucket_drains() {
        let mut state = CounterState::fresh(RateLimitAlgorithm::LeakyBucket, 4, WINDOW, 0);
        assert_eq!(drain(&mut state, 4, 0), 4);
        let refused = state.decide(4, WINDOW, 0);
        assert!(!refused.allowed);
        assert_eq!(refused.current_count, 4);
        assert_eq!(refused.retry_after_ms, Some(15_000));
        assert_eq!(refused.reset_at_ms, WINDOW);

        state.advance(4, WINDOW, 30_000);
        let decision = state.decide(4, WINDOW, 30_000);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.current_count, 2);
    }

    #[test]
    fn test_zero_limit_always_refuses() {
        for algorithm in [
            RateLimitAlgorithm::FixedWindow,
            RateLimitAlgorithm::SlidingWindow,
            RateLimitAlgorithm::TokenBucket,
            RateLimitAlgorithm::LeakyBucket,
        ] {
            let state = CounterState::fresh(algorithm, 0, WINDOW, 5_000);
            let decision = state.decide(0, WINDOW, 5_000);
            assert!(!decision.allowed, "{}", algorithm);
            assert_eq!(decision.remaining, 0);
            assert!(decision.retry_after_ms.unwrap() > 0, "{}", algorithm);
        }
    }

    #[test]
    fn test_resume_discards_state_of_other_algorithm() {
        let stored = CounterState::FixedWindow {
            window_start_ms: 0,
            count: 9,
        };
        let state = CounterState::resume(Some(stored), RateLimitAlgorithm::SlidingWindow, 10, WINDOW, 1);
        assert_eq!(state, CounterState::SlidingWindow { timestamps: vec![] });
    }

    #[test]
    fn test_state_serialization_is_tagged() {
        let state = CounterState::TokenBucket {
            tokens: 2.5,
            last_refill_ms: 7,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["algorithm"], "token_bucket");
        assert_eq!(json["tokens"], 2.5);
    }
}
