//! Circuit breaker guarding the Grok API
//!
//! One breaker is shared by every tool call. It opens after
//! `failure_threshold` consecutive transient failures and fails calls locally
//! until `retry_timeout` has passed, then lets a single probe through.
//!
//! [`CircuitBreaker::check`] hands out an [`Admission`] that the caller passes
//! back with the outcome. Only the holder of the current probe can close,
//! reopen or release a half-open circuit; late results from calls admitted
//! earlier are ignored there.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::QueryError;
use crate::grok::clock::{duration_millis, Clock, SystemClock};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker thresholds and timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub retry_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            retry_timeout: Duration::from_secs(30),
        }
    }
}

/// Permission to call the upstream, returned by [`CircuitBreaker::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted while the circuit was closed.
    Normal,
    /// Holds the half-open probe slot identified by the id.
    Probe(u64),
}

#[derive(Debug, Clone, Copy)]
struct Probe {
    id: u64,
    started_at: u64,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    failure_count: u32,
    next_attempt_at: u64,
    /// Set while a half-open probe is outstanding.
    probe: Option<Probe>,
    last_probe_id: u64,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            next_attempt_at: 0,
            probe: None,
            last_probe_id: 0,
        }
    }
}

impl CircuitInner {
    fn claim_probe(&mut self, now: u64) -> Admission {
        self.last_probe_id += 1;
        self.probe = Some(Probe {
            id: self.last_probe_id,
            started_at: now,
        });
        Admission::Probe(self.last_probe_id)
    }

    fn owns_probe(&self, admission: Admission) -> bool {
        match (admission, self.probe) {
            (Admission::Probe(id), Some(probe)) => {
                self.state == CircuitState::HalfOpen && probe.id == id
            }
            _ => false,
        }
    }
}

/// Thread-safe three-state circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn retry_timeout_millis(&self) -> u64 {
        duration_millis(self.config.retry_timeout)
    }

    /// Gate a call to the upstream.
    ///
    /// Fails with [`QueryError::CircuitOpen`] while the circuit is open. Once
    /// the retry window has elapsed the circuit moves to half-open and this
    /// call becomes the probe; other callers are turned away until the probe
    /// resolves or its lease (one `retry_timeout`) runs out.
    pub fn check(&self) -> Result<Admission, QueryError> {
        let now = self.clock.now_millis();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                if now < inner.next_attempt_at {
                    return Err(QueryError::CircuitOpen {
                        retry_in: Duration::from_millis(inner.next_attempt_at - now),
                    });
                }
                inner.state = CircuitState::HalfOpen;
                tracing::info!("Circuit breaker half-open, allowing probe request");
                Ok(inner.claim_probe(now))
            }
            CircuitState::HalfOpen => {
                let lease_ends = inner
                    .probe
                    .map(|probe| probe.started_at.saturating_add(self.retry_timeout_millis()));
                match lease_ends {
                    Some(ends) if now < ends => Err(QueryError::CircuitOpen {
                        retry_in: Duration::from_millis(ends - now),
                    }),
                    _ => Ok(inner.claim_probe(now)),
                }
            }
        }
    }

    /// Record a successful upstream call.
    pub fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match admission {
            Admission::Normal => {
                if inner.state == CircuitState::Closed {
                    inner.failure_count = 0;
                }
            }
            Admission::Probe(_) => {
                if inner.owns_probe(admission) {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.probe = None;
                    tracing::info!("Circuit breaker closed, upstream recovered");
                }
            }
        }
    }

    /// Record a transient upstream failure.
    ///
    /// Auth and rate-limit failures must not be reported here.
    pub fn on_failure(&self, admission: Admission) {
        let now = self.clock.now_millis();
        let mut inner = self.lock();

        match admission {
            Admission::Normal => {
                // A call admitted before the circuit opened finished late.
                if inner.state != CircuitState::Closed {
                    return;
                }
                inner.failure_count = inner.failure_count.saturating_add(1);
                if inner.failure_count >= self.config.failure_threshold {
                    let failures = inner.failure_count;
                    self.trip(&mut inner, now);
                    tracing::warn!(
                        failures,
                        retry_in_ms = self.retry_timeout_millis(),
                        "Circuit breaker opened"
                    );
                }
            }
            Admission::Probe(_) => {
                if inner.owns_probe(admission) {
                    self.trip(&mut inner, now);
                    tracing::warn!("Circuit breaker probe failed, reopening");
                }
            }
        }
    }

    /// Give up an outstanding half-open probe without resolving it.
    ///
    /// Used when the probe ended in a non-transient failure that says nothing
    /// about upstream health. Has no effect unless `admission` holds the
    /// current probe.
    pub fn release_probe(&self, admission: Admission) {
        let mut inner = self.lock();
        if inner.owns_probe(admission) {
            inner.probe = None;
        }
    }

    fn trip(&self, inner: &mut CircuitInner, now: u64) {
        inner.state = CircuitState::Open;
        inner.failure_count = 0;
        inner.probe = None;
        inner.next_attempt_at = now.saturating_add(self.retry_timeout_millis());
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }
}
