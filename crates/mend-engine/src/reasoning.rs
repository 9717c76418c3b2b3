//! Interface to the external reasoning service consulted when heuristics
//! find nothing or cannot separate the top candidates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("Reasoning service unavailable: {0}")]
    Unavailable(String),
    #[error("Reasoning service returned an invalid answer: {0}")]
    InvalidResponse(String),
}

/// One candidate as the reasoning service sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub index: usize,
    pub locator: String,
    pub tag: String,
    pub label: Option<String>,
    pub heuristic_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub page_context: String,
    pub intent: String,
    pub failed_locator: String,
    pub candidates: Vec<CandidateSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSuggestion {
    /// Index into [`ReasoningRequest::candidates`].
    pub index: usize,
    pub confidence: f64,
    pub rationale: String,
}

#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn suggest(&self, request: &ReasoningRequest) -> Result<ReasoningSuggestion, ReasoningError>;
}
