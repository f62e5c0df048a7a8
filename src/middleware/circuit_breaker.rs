use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Circuit breaker state as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls go through
    Closed,
    /// Calls are refused until the recovery timeout elapses
    Open,
    /// One probe call is allowed to test the collaborator
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { consecutive_failures: usize },
    Open { since: Instant },
    HalfOpen { probe_in_flight: bool },
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: usize,
    /// Time the circuit stays open before a probe is allowed
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Guards calls to the external translator
///
/// After `failure_threshold` consecutive failures the circuit opens and calls
/// are refused without touching the network. Once `recovery_timeout` has
/// passed a single probe is let through; its outcome closes or re-opens the
/// circuit.
#[derive(Clone)]
pub struct CircuitBreaker {
    phase: Arc<Mutex<Phase>>,
    totals: Arc<Totals>,
    config: CircuitBreakerConfig,
}

#[derive(Default)]
struct Totals {
    successes: AtomicU64,
    failures: AtomicU64,
    rejected: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            phase: Arc::new(Mutex::new(Phase::Closed {
                consecutive_failures: 0,
            })),
            totals: Arc::new(Totals::default()),
            config,
        }
    }

    /// Ask to make a call; false means fail fast
    pub fn try_acquire(&self) -> bool {
        let mut phase = self.phase.lock();
        let current = *phase;
        let allowed = match current {
            Phase::Closed { .. } => true,
            Phase::Open { since } if since.elapsed() >= self.config.recovery_timeout => {
                debug!("Circuit recovery timeout elapsed, letting one probe through");
                *phase = Phase::HalfOpen {
                    probe_in_flight: true,
                };
                true
            }
            Phase::Open { .. } => false,
            Phase::HalfOpen { probe_in_flight } => {
                if probe_in_flight {
                    false
                } else {
                    *phase = Phase::HalfOpen {
                        probe_in_flight: true,
                    };
                    true
                }
            }
        };

        if !allowed {
            self.totals.rejected.fetch_add(1, Ordering::Relaxed);
        }
        allowed
    }

    pub fn record_success(&self) {
        self.totals.successes.fetch_add(1, Ordering::Relaxed);
        let mut phase = self.phase.lock();
        if matches!(*phase, Phase::HalfOpen { .. }) {
            debug!("Probe succeeded, closing circuit");
        }
        *phase = Phase::Closed {
            consecutive_failures: 0,
        };
    }

    pub fn record_failure(&self) {
        self.totals.failures.fetch_add(1, Ordering::Relaxed);
        let mut phase = self.phase.lock();
        let current = *phase;
        *phase = match current {
            Phase::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.failure_threshold {
                    warn!(
                        "Opening circuit after {} consecutive failures (retry in {:?})",
                        failures, self.config.recovery_timeout
                    );
                    Phase::Open {
                        since: Instant::now(),
                    }
                } else {
                    Phase::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            Phase::HalfOpen { .. } => {
                warn!("Probe failed, re-opening circuit");
                Phase::Open {
                    since: Instant::now(),
                }
            }
            Phase::Open { since } => Phase::Open { since },
        };
    }

    /// Like `try_acquire`, but hands out a permit that settles the call.
    /// A permit dropped unsettled (e.g. a cancelled future) counts as a failure.
    pub fn permit(&self) -> Option<CallPermit> {
        self.try_acquire().then(|| CallPermit {
            breaker: self.clone(),
            settled: false,
        })
    }

    pub fn state(&self) -> CircuitState {
        match *self.phase.lock() {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state(),
            total_successes: self.totals.successes.load(Ordering::Relaxed),
            total_failures: self.totals.failures.load(Ordering::Relaxed),
            total_rejected: self.totals.rejected.load(Ordering::Relaxed),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// One admitted call through a [`CircuitBreaker`]
pub struct CallPermit {
    breaker: CircuitBreaker,
    settled: bool,
}

impl CallPermit {
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.record_failure();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_rejected: u64,
}
