use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealConfig {
    #[serde(default)]
    pub guardrails: GuardrailConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Failed heals inside the window that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_initial_trust_level")]
    pub initial_trust_level: String,
    #[serde(default = "default_max_trust_level")]
    pub max_trust_level: String,
    /// Consecutive successes needed to climb one trust level.
    #[serde(default = "default_escalation_successes")]
    pub escalation_successes: usize,
    #[serde(default = "default_trust_window_secs")]
    pub trust_window_secs: u64,
    /// Confidence at or above which L2_AUTO_SAFE applies without review.
    #[serde(default = "default_auto_apply_confidence")]
    pub auto_apply_confidence: f64,
}

impl GuardrailConfig {
    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn trust_window(&self) -> Duration {
        Duration::from_secs(self.trust_window_secs)
    }
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_window_secs: default_failure_window_secs(),
            cooldown_secs: default_cooldown_secs(),
            initial_trust_level: default_initial_trust_level(),
            max_trust_level: default_max_trust_level(),
            escalation_successes: default_escalation_successes(),
            trust_window_secs: default_trust_window_secs(),
            auto_apply_confidence: default_auto_apply_confidence(),
        }
    }
}

fn default_failure_threshold() -> usize {
    5
}

fn default_failure_window_secs() -> u64 {
    300
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_initial_trust_level() -> String {
    "L1_SUGGEST".to_string()
}

fn default_max_trust_level() -> String {
    "L2_AUTO_SAFE".to_string()
}

fn default_escalation_successes() -> usize {
    10
}

fn default_trust_window_secs() -> u64 {
    3600
}

fn default_auto_apply_confidence() -> f64 {
    0.9
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Runner-up within this distance of the top score makes the result ambiguous.
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f64,
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_use_reasoning")]
    pub use_reasoning: bool,
    #[serde(default = "default_reasoning_timeout_ms")]
    pub reasoning_timeout_ms: u64,
}

impl GeneratorConfig {
    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_millis(self.reasoning_timeout_ms)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            ambiguity_margin: default_ambiguity_margin(),
            fuzzy_threshold: default_fuzzy_threshold(),
            max_candidates: default_max_candidates(),
            use_reasoning: default_use_reasoning(),
            reasoning_timeout_ms: default_reasoning_timeout_ms(),
        }
    }
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_ambiguity_margin() -> f64 {
    0.05
}

fn default_fuzzy_threshold() -> f64 {
    mend_common::matcher::DEFAULT_FUZZY_THRESHOLD
}

fn default_max_candidates() -> usize {
    5
}

fn default_use_reasoning() -> bool {
    true
}

fn default_reasoning_timeout_ms() -> u64 {
    15000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default = "default_approval_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApprovalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_approval_timeout_secs(),
        }
    }
}

fn default_approval_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Permit script-driven fallbacks (programmatic click, value assignment).
    #[serde(default)]
    pub allow_scripted_fallback: bool,
    #[serde(default = "default_interactable_timeout_ms")]
    pub interactable_timeout_ms: u64,
}

impl ExecutorConfig {
    pub fn interactable_timeout(&self) -> Duration {
        Duration::from_millis(self.interactable_timeout_ms)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            allow_scripted_fallback: false,
            interactable_timeout_ms: default_interactable_timeout_ms(),
        }
    }
}

fn default_interactable_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_decisions_path")]
    pub decisions_path: PathBuf,
    /// Where evidence screenshots of applied heals go; disabled when unset.
    #[serde(default)]
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            decisions_path: default_decisions_path(),
            screenshot_dir: None,
        }
    }
}

fn default_decisions_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mend")
        .join("decisions.yaml")
}
