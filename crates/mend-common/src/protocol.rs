use crate::driver::ElementHandle;
use crate::locator::Locator;
use crate::matcher::MatchKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Click,
    DoubleClick,
    RightClick,
    Hover,
    Type,
    Clear,
    Select,
    Submit,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Click => "click",
            ActionType::DoubleClick => "double_click",
            ActionType::RightClick => "right_click",
            ActionType::Hover => "hover",
            ActionType::Type => "type",
            ActionType::Clear => "clear",
            ActionType::Select => "select",
            ActionType::Submit => "submit",
        }
    }

    /// Whether the action consumes the step's input value.
    pub fn needs_input(&self) -> bool {
        matches!(self, ActionType::Type | ActionType::Select)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unknown action type: {0}")]
pub struct UnknownActionType(pub String);

impl FromStr for ActionType {
    type Err = UnknownActionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "click" => Ok(ActionType::Click),
            "double_click" | "dblclick" => Ok(ActionType::DoubleClick),
            "right_click" | "context_click" => Ok(ActionType::RightClick),
            "hover" => Ok(ActionType::Hover),
            "type" | "fill" | "send_keys" => Ok(ActionType::Type),
            "clear" => Ok(ActionType::Clear),
            "select" => Ok(ActionType::Select),
            "submit" => Ok(ActionType::Submit),
            other => Err(UnknownActionType(other.to_string())),
        }
    }
}

/// Identifies the test a heal belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestContext {
    pub feature: String,
    pub scenario: String,
}

impl TestContext {
    pub fn new(feature: impl Into<String>, scenario: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            scenario: scenario.into(),
        }
    }
}

/// One test step as handed over by the framework adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRequest {
    /// Step text, e.g. `When I click the login button`.
    pub step: String,
    /// Locator recorded for the step.
    pub locator: String,
    pub action: ActionType,
    /// Text to type or option to select.
    #[serde(default)]
    pub data: Option<String>,
    /// What the step is trying to reach, in plain words.
    pub intent: String,
}

impl StepRequest {
    pub fn new(
        step: impl Into<String>,
        locator: impl Into<String>,
        action: ActionType,
        intent: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            locator: locator.into(),
            action,
            data: None,
            intent: intent.into(),
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// A discovered replacement element. The handle is only valid in the driver
/// session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementCandidate {
    pub locator: Locator,
    pub confidence: f64,
    pub rationale: String,
    pub match_kind: MatchKind,
    pub label: Option<String>,
    pub handle: ElementHandle,
}

/// A candidate promoted to a suggestion worth deciding on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealProposal {
    pub feature: String,
    pub scenario: String,
    pub step: String,
    pub original_locator: Locator,
    pub proposed_locator: Locator,
    pub confidence: f64,
    pub reasoning: String,
}

impl HealProposal {
    pub fn from_candidate(
        context: &TestContext,
        step: &str,
        original: &Locator,
        candidate: &ElementCandidate,
    ) -> Self {
        Self {
            feature: context.feature.clone(),
            scenario: context.scenario.clone(),
            step: step.to_string(),
            original_locator: original.clone(),
            proposed_locator: candidate.locator.clone(),
            confidence: candidate.confidence,
            reasoning: candidate.rationale.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalDecision {
    Approve,
    ApproveAndRemember,
    Reject(String),
    RejectAndBlacklist(String),
    Skip,
    Timeout,
}

impl ApprovalDecision {
    pub fn approves(&self) -> bool {
        matches!(
            self,
            ApprovalDecision::Approve | ApprovalDecision::ApproveAndRemember
        )
    }

    pub fn rejects(&self) -> bool {
        matches!(
            self,
            ApprovalDecision::Reject(_) | ApprovalDecision::RejectAndBlacklist(_)
        )
    }

    /// Skip and timeout carry no judgement about the proposal.
    pub fn is_neutral(&self) -> bool {
        matches!(self, ApprovalDecision::Skip | ApprovalDecision::Timeout)
    }
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalDecision::Approve => f.write_str("APPROVE"),
            ApprovalDecision::ApproveAndRemember => f.write_str("APPROVE_AND_REMEMBER"),
            ApprovalDecision::Reject(reason) => write!(f, "REJECT ({})", reason),
            ApprovalDecision::RejectAndBlacklist(reason) => {
                write!(f, "REJECT_AND_BLACKLIST ({})", reason)
            }
            ApprovalDecision::Skip => f.write_str("SKIP"),
            ApprovalDecision::Timeout => f.write_str("TIMEOUT"),
        }
    }
}
