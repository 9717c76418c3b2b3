//! Circuit breaker over heal attempts.
//!
//! ```text
//!  CLOSED --(failures in window >= threshold)--> OPEN
//!  OPEN   --(cooldown elapsed, next attempt)---> HALF_OPEN (one trial)
//!  HALF_OPEN --(trial success)--> CLOSED
//!  HALF_OPEN --(trial failure)--> OPEN
//! ```
//!
//! Every method takes `now` so transitions can be driven deterministically.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// How an attempt was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Normal,
    /// The single half-open trial, numbered so a late release cannot free a
    /// later trial's slot.
    Trial(u64),
}

/// Why an attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitRejection {
    pub state: CircuitState,
    pub retry_after: Duration,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    trials: u64,
    threshold: usize,
    window: Duration,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: usize, window: Duration, cooldown: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            trial_in_flight: false,
            trials: 0,
            threshold: threshold.max(1),
            window,
            cooldown,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failures_in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.failures.len()
    }

    /// Admit or refuse a heal attempt. Moving OPEN → HALF_OPEN happens here so
    /// that the check and the transition are one step.
    pub fn try_acquire(&mut self, now: Instant) -> Result<Admission, CircuitRejection> {
        match self.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(self.cooldown);
                if elapsed >= self.cooldown {
                    info!("Circuit breaker half-open: admitting one trial heal");
                    self.state = CircuitState::HalfOpen;
                    Ok(self.admit_trial())
                } else {
                    Err(CircuitRejection {
                        state: CircuitState::Open,
                        retry_after: self.cooldown - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    Err(CircuitRejection {
                        state: CircuitState::HalfOpen,
                        retry_after: Duration::ZERO,
                    })
                } else {
                    Ok(self.admit_trial())
                }
            }
        }
    }

    pub fn on_success(&mut self, _now: Instant) {
        if self.state == CircuitState::HalfOpen {
            info!("Circuit breaker closed after successful trial heal");
            self.state = CircuitState::Closed;
            self.failures.clear();
            self.opened_at = None;
            self.trial_in_flight = false;
        }
    }

    pub fn on_failure(&mut self, now: Instant) {
        match self.state {
            CircuitState::HalfOpen => {
                warn!("Trial heal failed, circuit breaker re-opened");
                self.open(now);
            }
            CircuitState::Closed => {
                self.failures.push_back(now);
                self.prune(now);
                if self.failures.len() >= self.threshold {
                    warn!(
                        failures = self.failures.len(),
                        window_secs = self.window.as_secs(),
                        "Circuit breaker opened, healing disabled"
                    );
                    self.open(now);
                }
            }
            // Late outcome of an attempt admitted before the circuit opened.
            CircuitState::Open => {}
        }
    }

    /// Neither success nor failure: frees the half-open trial slot.
    pub fn on_neutral(&mut self) {
        if self.state == CircuitState::HalfOpen {
            self.trial_in_flight = false;
        }
    }

    /// Give back the slot of a trial that ended without an outcome. Returns
    /// whether the slot was still held by that trial.
    pub fn release_trial(&mut self, trial: u64) -> bool {
        let held = self.state == CircuitState::HalfOpen && self.trial_in_flight && self.trials == trial;
        if held {
            self.trial_in_flight = false;
        }
        held
    }

    fn admit_trial(&mut self) -> Admission {
        self.trial_in_flight = true;
        self.trials += 1;
        Admission::Trial(self.trials)
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.failures.front() {
            if now.saturating_duration_since(front) > self.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}
