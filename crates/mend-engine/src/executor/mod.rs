//! Action execution with re-find and fallback ladders.

pub mod ladder;
pub mod refind;

pub use ladder::{ExecutionStrategy, ladder_for};
pub use refind::RefindStrategy;

use crate::config::ExecutorConfig;
use crate::error::HealError;
use ladder::Rung;
use mend_common::matcher::DEFAULT_FUZZY_THRESHOLD;
use mend_common::{ActionType, Driver, DriverError, ElementHandle, ElementSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// How an action ended up being performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub action: ActionType,
    pub strategy: ExecutionStrategy,
    /// Set when the element had to be found again from its snapshot.
    pub refind: Option<RefindStrategy>,
    /// Rungs tried, including the successful one.
    pub attempts: usize,
}

pub struct ActionExecutor {
    config: ExecutorConfig,
    fuzzy_threshold: f64,
}

impl ActionExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }

    /// Threshold used when fuzzy-matching select options.
    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    /// Re-find the element described by `snapshot` and perform `action` on it.
    pub async fn execute<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        action: ActionType,
        snapshot: &ElementSnapshot,
        data: Option<&str>,
    ) -> Result<ExecutionReport, HealError> {
        check_data(action, data)?;
        let (element, strategy) = refind::refind(driver, snapshot)
            .await?
            .ok_or_else(|| HealError::ElementNotRefindable {
                description: snapshot.describe(),
            })?;

        let mut report = self.climb(driver, action, &element, data).await?;
        report.refind = Some(strategy);
        Ok(report)
    }

    /// Perform `action` on an element resolved moments ago. If the element
    /// detaches while the ladder runs, it is found again from `snapshot` and
    /// the ladder is climbed once more.
    pub async fn perform<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        action: ActionType,
        element: &ElementHandle,
        snapshot: &ElementSnapshot,
        data: Option<&str>,
    ) -> Result<ExecutionReport, HealError> {
        check_data(action, data)?;
        match self.climb(driver, action, element, data).await {
            Err(HealError::ActionExecutionFailed { source, .. }) if source.is_not_found() => {
                info!(
                    element = %snapshot.describe(),
                    "Element detached during action, re-finding from snapshot"
                );
                self.execute(driver, action, snapshot, data).await
            }
            other => other,
        }
    }

    async fn climb<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        action: ActionType,
        element: &ElementHandle,
        data: Option<&str>,
    ) -> Result<ExecutionReport, HealError> {
        let rung = Rung {
            action,
            element,
            data,
            interactable_timeout: self.config.interactable_timeout(),
            fuzzy_threshold: self.fuzzy_threshold,
        };

        let strategies = ladder_for(action, self.config.allow_scripted_fallback);
        let mut last_error = DriverError::Other(format!("no strategy available for {}", action));
        for (attempt, strategy) in strategies.into_iter().enumerate() {
            match rung.run(driver, strategy).await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(action = %action, strategy = ?strategy, "Action succeeded on fallback");
                    }
                    return Ok(ExecutionReport {
                        action,
                        strategy,
                        refind: None,
                        attempts: attempt + 1,
                    });
                }
                Err(e) => {
                    debug!(action = %action, strategy = ?strategy, error = %e, "Execution strategy failed");
                    if e.is_not_found() || matches!(e, DriverError::ConnectionLost) {
                        last_error = e;
                        break;
                    }
                    last_error = e;
                }
            }
        }

        warn!(action = %action, error = %last_error, "Execution ladder exhausted");
        Err(HealError::ActionExecutionFailed {
            action,
            source: last_error,
        })
    }
}

fn check_data(action: ActionType, data: Option<&str>) -> Result<(), HealError> {
    if action.needs_input() && data.is_none() {
        return Err(HealError::MissingActionData(action));
    }
    Ok(())
}
