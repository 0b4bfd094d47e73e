//! # Circuit Breaker Module
//!
//! Per-provider fault isolator with three states governing admission:
//! CLOSED (normal operation), OPEN (fail fast), HALF_OPEN (probing recovery).
//!
//! ## State machine
//!
//! | From | Event | To | Effect |
//! |------|-------|----|--------|
//! | CLOSED | success | CLOSED | `failure_count = max(0, failure_count - 1)` |
//! | CLOSED | failure | CLOSED if `failure_count + 1 < threshold`, else OPEN | record `last_failure_time` |
//! | OPEN | probe after `now - last_failure_time > timeout` | HALF_OPEN | reset `success_count = 0` |
//! | OPEN | any request | (stay OPEN) | reject fast |
//! | HALF_OPEN | success | HALF_OPEN if `success_count + 1 < half_open_success_threshold`, else CLOSED | on close, reset `failure_count` |
//! | HALF_OPEN | failure | OPEN | update `last_failure_time` |
//!
//! # Examples
//!
//! ```rust
//! use gateway_core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//!
//! # async fn run() {
//! let breaker = CircuitBreaker::new("openai".to_string(), CircuitBreakerConfig::default());
//!
//! let result = breaker.call(|| async { Ok::<_, std::io::Error>("ok") }).await;
//! assert!(result.is_ok());
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

/// Outcome of a call attempted through a [`CircuitBreaker`].
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker is OPEN; the call was rejected without being attempted.
    #[error("circuit breaker is open")]
    Open,
    /// The call was attempted but exceeded `request_timeout`.
    #[error("circuit breaker call timed out")]
    Timeout,
    /// The call was attempted and failed with the wrapped error.
    #[error(transparent)]
    Inner(E),
}

/// Circuit breaker operational states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures (from zero) before the breaker opens.
    pub failure_threshold: u32,
    /// Time an OPEN breaker waits before allowing a HALF_OPEN probe.
    #[serde(with = "crate::common::duration_serde")]
    pub recovery_timeout: Duration,
    /// Maximum time to wait for an individual call.
    #[serde(with = "crate::common::duration_serde")]
    pub request_timeout: Duration,
    /// Consecutive successes required in HALF_OPEN before closing.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            half_open_success_threshold: 3,
        }
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
    last_success_time: Option<Instant>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
            last_success_time: None,
        }
    }
}

/// Per-provider circuit breaker.
///
/// Thread-safe; clone the `Arc` around it rather than the breaker itself.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<State>>,
    name: String,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(State::default())),
            name,
        }
    }

    /// Execute `operation` under circuit breaker protection.
    ///
    /// Rejects immediately with [`CircuitBreakerError::Open`] if the breaker
    /// is OPEN and the recovery timeout has not elapsed. Otherwise runs the
    /// operation under `request_timeout` and updates state from the
    /// outcome. Every `Err` counts against the breaker; callers that need
    /// to exempt certain error kinds (e.g. a non-retryable 4xx) should use
    /// [`CircuitBreaker::call_classified`] instead.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.call_classified(operation, |_| true).await
    }

    /// Like [`CircuitBreaker::call`], but `counts_as_failure` decides
    /// whether a returned `Err` is charged against the breaker's failure
    /// count. A timeout always counts, since it always reflects the
    /// provider being unresponsive regardless of what the never-produced
    /// error would have classified as. Use this to keep errors the
    /// orchestrator treats as non-retryable (auth failures, validation,
    /// rate limits) from tripping the breaker the way a transient failure
    /// would.
    pub async fn call_classified<F, Fut, T, E>(
        &self,
        operation: F,
        counts_as_failure: impl FnOnce(&E) -> bool,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.can_execute().await {
            tracing::warn!(breaker = %self.name, "circuit breaker open, rejecting call");
            return Err(CircuitBreakerError::Open);
        }

        match tokio::time::timeout(self.config.request_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.on_success().await;
                Ok(value)
            }
            Ok(Err(err)) => {
                if counts_as_failure(&err) {
                    self.on_failure().await;
                }
                Err(CircuitBreakerError::Inner(err))
            }
            Err(_) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Timeout)
            }
        }
    }

    /// Admission check without running anything. Performs the OPEN→HALF_OPEN
    /// probe transition as a side effect, matching `call()`'s behavior.
    pub async fn can_execute(&self) -> bool {
        let mut state = self.state.write().await;

        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = state
                    .last_failure_time
                    .map(|t| t.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(false);
                if elapsed {
                    state.state = CircuitState::HalfOpen;
                    state.success_count = 0;
                    tracing::info!(breaker = %self.name, "transitioning to HALF_OPEN");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.write().await;
        state.last_success_time = Some(Instant::now());

        match state.state {
            CircuitState::Closed => {
                state.failure_count = state.failure_count.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.half_open_success_threshold {
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    tracing::info!(breaker = %self.name, "transitioning to CLOSED");
                }
            }
            CircuitState::Open => {
                tracing::warn!(breaker = %self.name, "success observed while OPEN");
            }
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.write().await;
        state.last_failure_time = Some(Instant::now());

        match state.state {
            CircuitState::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    state.state = CircuitState::Open;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = state.failure_count,
                        "transitioning to OPEN"
                    );
                }
            }
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.success_count = 0;
                tracing::warn!(breaker = %self.name, "probe failed, back to OPEN");
            }
            CircuitState::Open => {}
        }
    }

    pub async fn get_state(&self) -> CircuitState {
        self.state.read().await.state
    }

    pub async fn get_metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state.read().await;
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure_time: state.last_failure_time,
            last_success_time: state.last_success_time,
        }
    }

    /// For tests and operator intervention.
    pub async fn force_open(&self) {
        let mut state = self.state.write().await;
        state.state = CircuitState::Open;
        state.last_failure_time = Some(Instant::now());
    }

    pub async fn force_closed(&self) {
        let mut state = self.state.write().await;
        *state = State::default();
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<Instant>,
    pub last_success_time: Option<Instant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32, recovery: Duration, half_open_success: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: recovery,
            request_timeout: Duration::from_secs(1),
            half_open_success_threshold: half_open_success,
        }
    }

    #[tokio::test]
    async fn closed_success_decrements_failure_count_not_resets() {
        let cb = CircuitBreaker::new("t".into(), config(5, Duration::from_secs(60), 3));
        // two failures
        let _ = cb.call(|| async { Err::<(), _>("x") }).await;
        let _ = cb.call(|| async { Err::<(), _>("x") }).await;
        assert_eq!(cb.get_metrics().await.failure_count, 2);
        // one success decrements by one, does not reset to zero
        let _ = cb.call(|| async { Ok::<_, &str>(()) }).await;
        assert_eq!(cb.get_metrics().await.failure_count, 1);
        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("t".into(), config(2, Duration::from_secs(60), 3));
        let _ = cb.call(|| async { Err::<(), _>("x") }).await;
        assert_eq!(cb.get_state().await, CircuitState::Closed);
        let _ = cb.call(|| async { Err::<(), _>("x") }).await;
        assert_eq!(cb.get_state().await, CircuitState::Open);

        let result = cb.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn half_open_requires_success_threshold_before_closing() {
        let cb = CircuitBreaker::new("t".into(), config(1, Duration::from_millis(20), 2));
        let _ = cb.call(|| async { Err::<(), _>("x") }).await;
        assert_eq!(cb.get_state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let _ = cb.call(|| async { Ok::<_, &str>(()) }).await;
        assert_eq!(cb.get_state().await, CircuitState::HalfOpen);

        let _ = cb.call(|| async { Ok::<_, &str>(()) }).await;
        assert_eq!(cb.get_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new("t".into(), config(1, Duration::from_millis(20), 3));
        let _ = cb.call(|| async { Err::<(), _>("x") }).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        let result = cb.call(|| async { Err::<(), _>("still failing") }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Inner("still failing"))));
        assert_eq!(cb.get_state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn call_times_out() {
        let cb = CircuitBreaker::new(
            "t".into(),
            CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_timeout: Duration::from_secs(60),
                request_timeout: Duration::from_millis(20),
                half_open_success_threshold: 3,
            },
        );
        let result = cb
            .call(|| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, &str>(())
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Timeout)));
    }
}
