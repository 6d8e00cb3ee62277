use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use terralens_common::config::BreakerConfig;

/// State of the engine circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Breaker tripped, calls are rejected without touching the engine.
    Open,
    /// Cooldown elapsed, one probe call allowed.
    HalfOpen,
}

/// Circuit breaker guarding the remote engine. Opens after consecutive
/// failures reach the threshold and closes again after a successful probe
/// during half-open state.
pub struct CircuitBreaker {
    failure_count: AtomicU32,
    failure_threshold: u32,
    cooldown: Duration,
    /// Guards (state, last_failure). std::sync::Mutex because it is never
    /// held across an await point.
    inner: Mutex<BreakerInner>,
}

struct BreakerInner {
    state: CircuitState,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            failure_threshold: config.failure_threshold,
            cooldown: Duration::from_secs(config.cooldown_seconds),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                last_failure: None,
            }),
        }
    }

    /// Check whether a call toward the engine should be allowed.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => match inner.last_failure {
                Some(last) if last.elapsed() >= self.cooldown => {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!("Engine circuit transitioning to half-open");
                    true
                }
                Some(_) => false,
                None => {
                    inner.state = CircuitState::Closed;
                    true
                }
            },
            // One probe call is allowed; the transition already happened.
            CircuitState::HalfOpen => true,
        }
    }

    /// Record a successful engine call.
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        if inner.state != CircuitState::Closed {
            tracing::info!(previous_state = ?inner.state, "Engine circuit closing after success");
            inner.state = CircuitState::Closed;
            metrics::counter!("circuit_breaker.recoveries").increment(1);
        }
    }

    /// Record a failed engine call, opening the circuit at the threshold.
    pub fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut inner = self.inner.lock().unwrap();
        inner.last_failure = Some(Instant::now());
        if count >= self.failure_threshold && inner.state != CircuitState::Open {
            tracing::warn!(
                failures = count,
                threshold = self.failure_threshold,
                "Engine circuit OPEN"
            );
            inner.state = CircuitState::Open;
            metrics::counter!("circuit_breaker.trips").increment(1);
        }
    }

    pub fn current_state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_seconds: u64) -> CircuitBreaker {
        CircuitBreaker::new(&BreakerConfig {
            failure_threshold: threshold,
            cooldown_seconds,
        })
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(3, 60);
        assert!(cb.allow());

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn test_success_resets_the_count() {
        let cb = breaker(2, 60);
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_after_cooldown() {
        let cb = breaker(1, 0);
        cb.record_failure();
        assert_eq!(cb.current_state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(5));

        // Cooldown of zero: the next check allows a probe.
        assert!(cb.allow());
        assert_eq!(cb.current_state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.current_state(), CircuitState::Closed);
    }
}
