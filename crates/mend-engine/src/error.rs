use crate::history::StorageError;
use mend_common::{ActionType, DriverError, LocatorError};
use std::time::Duration;

/// Error surfaced to the test framework for a step.
#[derive(Debug, thiserror::Error)]
pub enum HealError {
    /// The recorded locator matched nothing and no heal was applied. This is
    /// the error the step would have failed with without healing.
    #[error("Element not found: {locator}")]
    ElementNotFound { locator: String },

    #[error("Element could not be re-found from its snapshot: {description}")]
    ElementNotRefindable { description: String },

    #[error("Action '{action}' failed after every fallback: {source}")]
    ActionExecutionFailed {
        action: ActionType,
        #[source]
        source: DriverError,
    },

    #[error("Healing disabled by circuit breaker (retry after {}s)", .retry_after.as_secs())]
    HealingDisabled { retry_after: Duration },

    #[error("Action '{0}' requires input data")]
    MissingActionData(ActionType),

    #[error("Healing engine not started")]
    NotStarted,

    #[error("Invalid locator '{locator}': {source}")]
    InvalidLocator {
        locator: String,
        #[source]
        source: LocatorError,
    },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl HealError {
    pub fn code(&self) -> &'static str {
        match self {
            HealError::ElementNotFound { .. } => "ELEMENT_NOT_FOUND",
            HealError::ElementNotRefindable { .. } => "ELEMENT_NOT_REFINDABLE",
            HealError::ActionExecutionFailed { .. } => "ACTION_EXECUTION_FAILED",
            HealError::HealingDisabled { .. } => "HEALING_DISABLED",
            HealError::MissingActionData(_) => "MISSING_ACTION_DATA",
            HealError::NotStarted => "NOT_STARTED",
            HealError::InvalidLocator { .. } => "INVALID_LOCATOR",
            HealError::Driver(e) => e.code(),
            HealError::Storage(_) => "STORAGE_ERROR",
        }
    }
}
