use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Breaker state as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub failure_count: u32,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "duration_secs", rename = "recovery_timeout_secs")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the consecutive-failure threshold (minimum 1)
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set how long the breaker stays open after the last failure
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct State {
    circuit: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    /// When the current half-open trial was handed out.
    trial_started: Option<Instant>,
}

/// Consecutive-failure circuit breaker with lazy half-open recovery.
///
/// - Closed: operations permitted, failures counted
/// - Open: operations short-circuited until `recovery_timeout` has elapsed
///   since the last failure
/// - HalfOpen: exactly one trial permitted; its outcome closes or reopens
///
/// There is no background timer; the Open -> HalfOpen move happens inside
/// [`CircuitBreaker::can_execute`]. All transitions run under one mutex, so
/// concurrent failures never lose an increment.
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(State {
                circuit: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_started: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panicking holder: every mutation is a
        // plain field assignment.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether an operation may be attempted now.
    ///
    /// The only side effect is the Open -> HalfOpen transition, which hands the
    /// single trial permit to this caller.
    pub fn can_execute(&self) -> bool {
        let mut st = self.lock();
        match st.circuit {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = st
                    .last_failure
                    .map(|t| t.elapsed() >= self.cfg.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    st.circuit = CircuitState::HalfOpen;
                    st.trial_started = Some(Instant::now());
                    info!("circuit breaker entering half-open state");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                // A trial whose outcome was never reported stops blocking after
                // one recovery window.
                let stale = st
                    .trial_started
                    .map(|t| t.elapsed() >= self.cfg.recovery_timeout)
                    .unwrap_or(true);
                if stale {
                    st.trial_started = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut st = self.lock();
        if st.circuit != CircuitState::Closed {
            info!(previous = st.circuit.as_str(), "circuit breaker closed");
        }
        st.circuit = CircuitState::Closed;
        st.failure_count = 0;
        st.trial_started = None;
    }

    pub fn record_failure(&self) {
        let mut st = self.lock();
        st.failure_count = st.failure_count.saturating_add(1);
        st.last_failure = Some(Instant::now());
        match st.circuit {
            CircuitState::HalfOpen => {
                st.circuit = CircuitState::Open;
                st.trial_started = None;
                warn!(
                    failure_count = st.failure_count,
                    "circuit breaker trial failed, reopening"
                );
            }
            CircuitState::Closed if st.failure_count >= self.cfg.failure_threshold => {
                st.circuit = CircuitState::Open;
                warn!(
                    failure_count = st.failure_count,
                    threshold = self.cfg.failure_threshold,
                    "circuit breaker opened"
                );
            }
            _ => {}
        }
    }

    /// Current state without triggering the lazy transition.
    pub fn state(&self) -> CircuitState {
        self.lock().circuit
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let st = self.lock();
        let open_remaining_ms = match (st.circuit, st.last_failure) {
            (CircuitState::Open, Some(last)) => {
                let until = last + self.cfg.recovery_timeout;
                let now = Instant::now();
                if until > now {
                    Some((until - now).as_millis() as u64)
                } else {
                    Some(0)
                }
            }
            _ => None,
        };
        CircuitBreakerSnapshot {
            state: st.circuit,
            failure_threshold: self.cfg.failure_threshold,
            recovery_timeout_ms: self.cfg.recovery_timeout.as_millis() as u64,
            failure_count: st.failure_count,
            open_remaining_ms,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("cfg", &self.cfg)
            .field("state", &self.state())
            .finish()
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
