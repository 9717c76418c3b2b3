use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::info;

/// How much authority healing has to change a test run on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrustLevel {
    #[serde(rename = "L0_SHADOW")]
    Shadow,
    #[serde(rename = "L1_SUGGEST")]
    Suggest,
    #[serde(rename = "L2_AUTO_SAFE")]
    AutoSafe,
    #[serde(rename = "L3_AUTO_ALL")]
    AutoAll,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Shadow => "L0_SHADOW",
            TrustLevel::Suggest => "L1_SUGGEST",
            TrustLevel::AutoSafe => "L2_AUTO_SAFE",
            TrustLevel::AutoAll => "L3_AUTO_ALL",
        }
    }

    pub fn raised(self) -> TrustLevel {
        match self {
            TrustLevel::Shadow => TrustLevel::Suggest,
            TrustLevel::Suggest => TrustLevel::AutoSafe,
            TrustLevel::AutoSafe | TrustLevel::AutoAll => TrustLevel::AutoAll,
        }
    }

    pub fn lowered(self) -> TrustLevel {
        match self {
            TrustLevel::Shadow | TrustLevel::Suggest => TrustLevel::Shadow,
            TrustLevel::AutoSafe => TrustLevel::Suggest,
            TrustLevel::AutoAll => TrustLevel::AutoSafe,
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "L0_SHADOW" | "L0" | "SHADOW" => Ok(TrustLevel::Shadow),
            "L1_SUGGEST" | "L1" | "SUGGEST" => Ok(TrustLevel::Suggest),
            "L2_AUTO_SAFE" | "L2" | "AUTO_SAFE" => Ok(TrustLevel::AutoSafe),
            "L3_AUTO_ALL" | "L3" | "AUTO_ALL" => Ok(TrustLevel::AutoAll),
            _ => Err(ConfigError::InvalidTrustLevel(s.to_string())),
        }
    }
}

/// What the current trust level allows for a proposal of a given confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewPolicy {
    AutoApply,
    RequireApproval,
    /// Ask for a decision for the audit trail, never apply.
    ShadowOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustSnapshot {
    pub level: TrustLevel,
    pub consecutive_successes: usize,
    pub failures_in_window: usize,
    pub success_rate: f64,
}

#[derive(Debug)]
pub struct TrustLadder {
    level: TrustLevel,
    max_level: TrustLevel,
    consecutive_successes: usize,
    failures: VecDeque<Instant>,
    total_successes: u64,
    total_failures: u64,
    escalation_successes: usize,
    window: Duration,
    auto_apply_confidence: f64,
}

impl TrustLadder {
    pub fn new(
        initial: TrustLevel,
        max_level: TrustLevel,
        escalation_successes: usize,
        window: Duration,
        auto_apply_confidence: f64,
    ) -> Self {
        Self {
            level: initial.min(max_level),
            max_level,
            consecutive_successes: 0,
            failures: VecDeque::new(),
            total_successes: 0,
            total_failures: 0,
            escalation_successes: escalation_successes.max(1),
            window,
            auto_apply_confidence,
        }
    }

    pub fn level(&self) -> TrustLevel {
        self.level
    }

    pub fn policy(&self, confidence: f64) -> ReviewPolicy {
        match self.level {
            TrustLevel::Shadow => ReviewPolicy::ShadowOnly,
            TrustLevel::Suggest => ReviewPolicy::RequireApproval,
            TrustLevel::AutoSafe if confidence >= self.auto_apply_confidence => {
                ReviewPolicy::AutoApply
            }
            TrustLevel::AutoSafe => ReviewPolicy::RequireApproval,
            TrustLevel::AutoAll => ReviewPolicy::AutoApply,
        }
    }

    pub fn on_success(&mut self, now: Instant) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.prune(now);

        if self.consecutive_successes >= self.escalation_successes
            && self.failures.is_empty()
            && self.level < self.max_level
        {
            let from = self.level;
            self.level = self.level.raised();
            self.consecutive_successes = 0;
            info!(from = %from, to = %self.level, "Trust level escalated");
        }
    }

    pub fn on_failure(&mut self, now: Instant) {
        self.total_failures += 1;
        self.failures.push_back(now);
        self.prune(now);
        self.consecutive_successes = 0;

        let from = self.level;
        self.level = self.level.lowered();
        if from != self.level {
            info!(from = %from, to = %self.level, "Trust level demoted");
        }
    }

    pub fn snapshot(&mut self, now: Instant) -> TrustSnapshot {
        self.prune(now);
        let total = self.total_successes + self.total_failures;
        TrustSnapshot {
            level: self.level,
            consecutive_successes: self.consecutive_successes,
            failures_in_window: self.failures.len(),
            success_rate: if total == 0 {
                1.0
            } else {
                self.total_successes as f64 / total as f64
            },
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder(initial: TrustLevel) -> TrustLadder {
        TrustLadder::new(
            initial,
            TrustLevel::AutoAll,
            3,
            Duration::from_secs(100),
            0.9,
        )
    }

    #[test]
    fn test_parse_levels() {
        assert_eq!("L2_AUTO_SAFE".parse::<TrustLevel>().unwrap(), TrustLevel::AutoSafe);
        assert_eq!("l0".parse::<TrustLevel>().unwrap(), TrustLevel::Shadow);
        assert!(matches!(
            "L4".parse::<TrustLevel>(),
            Err(ConfigError::InvalidTrustLevel(_))
        ));
    }

    #[test]
    fn test_policy_per_level() {
        assert_eq!(ladder(TrustLevel::Shadow).policy(1.0), ReviewPolicy::ShadowOnly);
        assert_eq!(
            ladder(TrustLevel::Suggest).policy(1.0),
            ReviewPolicy::RequireApproval
        );
        assert_eq!(ladder(TrustLevel::AutoSafe).policy(0.95), ReviewPolicy::AutoApply);
        assert_eq!(
            ladder(TrustLevel::AutoSafe).policy(0.5),
            ReviewPolicy::RequireApproval
        );
        assert_eq!(ladder(TrustLevel::AutoAll).policy(0.1), ReviewPolicy::AutoApply);
    }

    #[test]
    fn test_escalates_exactly_one_level() {
        let t0 = Instant::now();
        let mut l = ladder(TrustLevel::Suggest);
        l.on_success(t0);
        l.on_success(t0);
        assert_eq!(l.level(), TrustLevel::Suggest);
        l.on_success(t0);
        assert_eq!(l.level(), TrustLevel::AutoSafe);
        assert_eq!(l.snapshot(t0).consecutive_successes, 0);

        l.on_success(t0);
        assert_eq!(l.level(), TrustLevel::AutoSafe);
    }

    #[test]
    fn test_failure_demotes_one_level_and_resets_counter() {
        let t0 = Instant::now();
        let mut l = ladder(TrustLevel::AutoAll);
        l.on_success(t0);
        l.on_success(t0);
        l.on_failure(t0);
        assert_eq!(l.level(), TrustLevel::AutoSafe);
        assert_eq!(l.snapshot(t0).consecutive_successes, 0);
    }

    #[test]
    fn test_failure_in_window_blocks_escalation() {
        let t0 = Instant::now();
        let mut l = ladder(TrustLevel::AutoSafe);
        l.on_failure(t0);
        assert_eq!(l.level(), TrustLevel::Suggest);

        for _ in 0..5 {
            l.on_success(t0 + Duration::from_secs(10));
        }
        assert_eq!(l.level(), TrustLevel::Suggest);

        // Once the failure leaves the window the streak counts again.
        l.on_success(t0 + Duration::from_secs(200));
        assert_eq!(l.level(), TrustLevel::AutoSafe);
    }

    #[test]
    fn test_escalation_capped_by_max_level() {
        let t0 = Instant::now();
        let mut l = TrustLadder::new(
            TrustLevel::AutoSafe,
            TrustLevel::AutoSafe,
            1,
            Duration::from_secs(100),
            0.9,
        );
        l.on_success(t0);
        l.on_success(t0);
        assert_eq!(l.level(), TrustLevel::AutoSafe);
    }

    #[test]
    fn test_shadow_floor() {
        let t0 = Instant::now();
        let mut l = ladder(TrustLevel::Shadow);
        l.on_failure(t0);
        assert_eq!(l.level(), TrustLevel::Shadow);
        let snap = l.snapshot(t0);
        assert_eq!(snap.failures_in_window, 1);
        assert_eq!(snap.success_rate, 0.0);
    }
}
