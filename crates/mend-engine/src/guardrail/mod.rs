//! Guardrails decide whether healing may run at all and how much it may do
//! on its own.
//!
//! The circuit breaker, trust ladder, per-locator stability and blacklist sit
//! behind a single mutex. Each public method takes the lock once, so a check
//! and the transition it causes, or a failure and its demotion, are never
//! observed half-done by another session.

pub mod blacklist;
pub mod breaker;
pub mod stability;
pub mod trust;

pub use blacklist::{Blacklist, BlacklistEntry};
pub use breaker::{Admission, CircuitBreaker, CircuitRejection, CircuitState};
pub use stability::{LocatorStabilityEntry, StabilityLevel, StabilitySummary, StabilityTracker};
pub use trust::{ReviewPolicy, TrustLadder, TrustLevel, TrustSnapshot};

use crate::config::{ConfigError, GuardrailConfig};
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
struct GuardrailState {
    breaker: CircuitBreaker,
    trust: TrustLadder,
    stability: StabilityTracker,
    blacklist: Blacklist,
}

#[derive(Debug)]
pub struct Guardrails {
    state: Mutex<GuardrailState>,
}

/// An admitted heal attempt. Dropping the permit of a half-open trial whose
/// outcome was never recorded, e.g. because its caller was cancelled during
/// approval, hands the trial slot back so the circuit can recover.
#[must_use = "dropping the permit ends the heal attempt"]
#[derive(Debug)]
pub struct HealPermit<'a> {
    guardrails: &'a Guardrails,
    trial: Option<u64>,
}

impl HealPermit<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }
}

impl Drop for HealPermit<'_> {
    fn drop(&mut self) {
        if let Some(trial) = self.trial.take()
            && self.guardrails.lock().breaker.release_trial(trial)
        {
            debug!(trial, "Trial heal ended without an outcome, slot released");
        }
    }
}

impl Guardrails {
    /// Fails on unknown trust level names: a corrupt guardrail setup must not
    /// surface halfway through a run.
    pub fn new(config: &GuardrailConfig) -> Result<Self, ConfigError> {
        let initial: TrustLevel = config.initial_trust_level.parse()?;
        let max: TrustLevel = config.max_trust_level.parse()?;
        if initial > max {
            return Err(ConfigError::TrustLevelAboveMax { initial, max });
        }

        Ok(Self {
            state: Mutex::new(GuardrailState {
                breaker: CircuitBreaker::new(
                    config.failure_threshold,
                    config.failure_window(),
                    config.cooldown(),
                ),
                trust: TrustLadder::new(
                    initial,
                    max,
                    config.escalation_successes,
                    config.trust_window(),
                    config.auto_apply_confidence,
                ),
                stability: StabilityTracker::default(),
                blacklist: Blacklist::default(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, GuardrailState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admit a heal attempt, or refuse it while the circuit is open. Hold
    /// the permit until the attempt's outcome is recorded.
    pub fn begin_heal(&self) -> Result<HealPermit<'_>, CircuitRejection> {
        let admission = self.lock().breaker.try_acquire(Instant::now())?;
        let trial = match admission {
            Admission::Trial(id) => Some(id),
            Admission::Normal => None,
        };
        Ok(HealPermit {
            guardrails: self,
            trial,
        })
    }

    pub fn review_policy(&self, confidence: f64) -> ReviewPolicy {
        self.lock().trust.policy(confidence)
    }

    pub fn record_heal_success(&self, original_locator: &str) {
        let now = Instant::now();
        let mut state = self.lock();
        state.breaker.on_success(now);
        state.trust.on_success(now);
        state.stability.entry(original_locator).record_heal();
    }

    pub fn record_heal_failure(&self) {
        let now = Instant::now();
        let mut state = self.lock();
        state.breaker.on_failure(now);
        state.trust.on_failure(now);
    }

    /// Outcome that says nothing about healing quality (skip, timeout).
    pub fn record_heal_neutral(&self) {
        self.lock().breaker.on_neutral();
    }

    /// Shadow-mode verdicts move the trust ladder and breaker like applied
    /// heals but never touch locator stability, since nothing was healed.
    pub fn record_shadow_outcome(&self, agreed: bool) {
        let now = Instant::now();
        let mut state = self.lock();
        if agreed {
            state.breaker.on_success(now);
            state.trust.on_success(now);
        } else {
            state.breaker.on_failure(now);
            state.trust.on_failure(now);
        }
    }

    pub fn record_locator_success(&self, locator: &str) {
        self.lock().stability.entry(locator).record_success();
    }

    pub fn record_locator_failure(&self, locator: &str) {
        self.lock().stability.entry(locator).record_failure();
    }

    pub fn is_blacklisted(&self, original: &str, healed: &str) -> bool {
        self.lock().blacklist.contains(original, healed)
    }

    pub fn blacklist(&self, original: &str, healed: &str, reason: &str) {
        let added = self.lock().blacklist.insert(BlacklistEntry {
            original_locator: original.to_string(),
            healed_locator: healed.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        if added {
            info!(original, healed, reason, "Heal pair blacklisted");
        } else {
            debug!(original, healed, "Heal pair already blacklisted");
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.lock().breaker.state()
    }

    pub fn trust_level(&self) -> TrustLevel {
        self.lock().trust.level()
    }

    pub fn trust_snapshot(&self) -> TrustSnapshot {
        self.lock().trust.snapshot(Instant::now())
    }

    pub fn stability(&self, locator: &str) -> Option<LocatorStabilityEntry> {
        self.lock().stability.get(locator).cloned()
    }

    pub fn stability_entries(&self) -> Vec<LocatorStabilityEntry> {
        self.lock().stability.entries()
    }

    pub fn stability_summary(&self) -> StabilitySummary {
        self.lock().stability.summary()
    }

    pub fn blacklist_entries(&self) -> Vec<BlacklistEntry> {
        self.lock().blacklist.entries()
    }

    /// Merge persisted records: blacklist pairs are added, stability entries
    /// replace in-memory ones for the same locator.
    pub fn restore(&self, blacklist: Vec<BlacklistEntry>, stability: Vec<LocatorStabilityEntry>) {
        let mut state = self.lock();
        for entry in blacklist {
            state.blacklist.insert(entry);
        }
        for entry in stability {
            state.stability.replace(entry);
        }
    }
}
