pub mod approval;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod generator;
pub mod guardrail;
pub mod history;
pub mod reasoning;
pub mod state;

pub use mend_common::*;

pub use approval::{
    ApprovalRequest, ApprovalWorkflow, ChannelDecisionMaker, DecisionMaker, StaticDecisionMaker,
};
pub use cache::{ApplyAuthority, CacheSource, Fingerprint, HealCache, HealVerdict, WithholdReason};
pub use config::{ConfigError, ConfigLoader, HealConfig};
pub use engine::{AppliedHeal, HealingEngine, SessionReport, StepOutcome};
pub use error::HealError;
pub use executor::{ActionExecutor, ExecutionReport, ExecutionStrategy, RefindStrategy};
pub use generator::{CandidateGenerator, ElementFamily};
pub use guardrail::{CircuitState, Guardrails, StabilityLevel, TrustLevel};
pub use history::{DecisionLog, HealHistory, HealRecord, HealStatus, StorageError};
pub use reasoning::{ReasoningError, ReasoningRequest, ReasoningService, ReasoningSuggestion};
pub use state::HealState;
