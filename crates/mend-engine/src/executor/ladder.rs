//! Per-action execution ladders. Each rung is tried once, in order, and the
//! first one that succeeds ends the ladder.

use mend_common::matcher::{MatchTarget, best_match};
use mend_common::{ActionType, Driver, DriverError, ElementHandle};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Direct,
    ScrollIntoView,
    WaitUntilInteractable,
    PointerClick,
    ScriptedClick,
    ScriptedValue,
    ScriptedClear,
    SelectByText,
    SelectByValue,
    SelectByIndex,
    NativeSubmit,
    ClickToSubmit,
}

impl ExecutionStrategy {
    /// Whether the rung runs page script rather than driving input.
    pub fn is_scripted(&self) -> bool {
        matches!(
            self,
            ExecutionStrategy::ScriptedClick
                | ExecutionStrategy::ScriptedValue
                | ExecutionStrategy::ScriptedClear
        )
    }
}

/// Ordered rungs for `action`. Scripted rungs are left out unless allowed.
pub fn ladder_for(action: ActionType, allow_scripted: bool) -> Vec<ExecutionStrategy> {
    use ExecutionStrategy::*;

    let rungs: &[ExecutionStrategy] = match action {
        ActionType::Click => &[
            Direct,
            ScrollIntoView,
            WaitUntilInteractable,
            PointerClick,
            ScriptedClick,
        ],
        ActionType::DoubleClick | ActionType::RightClick => {
            &[Direct, ScrollIntoView, WaitUntilInteractable]
        }
        ActionType::Hover => &[Direct, ScrollIntoView],
        ActionType::Type => &[Direct, ScriptedValue],
        ActionType::Clear => &[Direct, ScriptedClear],
        ActionType::Select => &[SelectByText, SelectByValue, SelectByIndex],
        ActionType::Submit => &[NativeSubmit, ClickToSubmit],
    };

    rungs
        .iter()
        .copied()
        .filter(|s| allow_scripted || !s.is_scripted())
        .collect()
}

/// Everything a rung needs besides the driver.
pub struct Rung<'a> {
    pub action: ActionType,
    pub element: &'a ElementHandle,
    pub data: Option<&'a str>,
    pub interactable_timeout: Duration,
    pub fuzzy_threshold: f64,
}

impl Rung<'_> {
    pub async fn run<D: Driver + ?Sized>(
        &self,
        driver: &mut D,
        strategy: ExecutionStrategy,
    ) -> Result<(), DriverError> {
        let el = self.element;
        match strategy {
            ExecutionStrategy::Direct => self.direct(driver).await,
            ExecutionStrategy::ScrollIntoView => {
                driver.scroll_into_view(el).await?;
                self.direct(driver).await
            }
            ExecutionStrategy::WaitUntilInteractable => {
                driver
                    .wait_until_interactable(el, self.interactable_timeout)
                    .await?;
                self.direct(driver).await
            }
            ExecutionStrategy::PointerClick => driver.pointer_click(el).await,
            ExecutionStrategy::ScriptedClick => driver
                .execute_script("arguments[0].click();", std::slice::from_ref(el))
                .await
                .map(|_| ()),
            ExecutionStrategy::ScriptedValue => {
                let script = assign_value_script(self.data.unwrap_or_default());
                driver
                    .execute_script(&script, std::slice::from_ref(el))
                    .await
                    .map(|_| ())
            }
            ExecutionStrategy::ScriptedClear => driver
                .execute_script(&assign_value_script(""), std::slice::from_ref(el))
                .await
                .map(|_| ()),
            ExecutionStrategy::SelectByText => self.select_by_text(driver).await,
            ExecutionStrategy::SelectByValue => {
                driver
                    .select_by_value(el, self.data.unwrap_or_default())
                    .await
            }
            ExecutionStrategy::SelectByIndex => {
                let raw = self.data.unwrap_or_default().trim();
                let index = raw
                    .parse::<usize>()
                    .map_err(|_| DriverError::OptionNotFound {
                        value: raw.to_string(),
                    })?;
                driver.select_by_index(el, index).await
            }
            ExecutionStrategy::NativeSubmit => driver.submit(el).await,
            ExecutionStrategy::ClickToSubmit => driver.click(el).await,
        }
    }

    async fn direct<D: Driver + ?Sized>(&self, driver: &mut D) -> Result<(), DriverError> {
        let el = self.element;
        match self.action {
            ActionType::Click => driver.click(el).await,
            ActionType::DoubleClick => driver.double_click(el).await,
            ActionType::RightClick => driver.right_click(el).await,
            ActionType::Hover => driver.hover(el).await,
            ActionType::Type => {
                driver.clear(el).await?;
                driver.type_text(el, self.data.unwrap_or_default()).await
            }
            ActionType::Clear => driver.clear(el).await,
            ActionType::Select => self.select_by_text(driver).await,
            ActionType::Submit => driver.submit(el).await,
        }
    }

    /// Select by visible text. When the driver can list the options the
    /// requested text is fuzzy-matched against them first.
    async fn select_by_text<D: Driver + ?Sized>(&self, driver: &mut D) -> Result<(), DriverError> {
        let el = self.element;
        let wanted = self.data.unwrap_or_default();
        let options = match driver.select_options(el).await {
            Ok(options) => options,
            Err(DriverError::NotSupported(_)) => return driver.select_by_text(el, wanted).await,
            Err(e) => return Err(e),
        };

        let targets = options.iter().map(|o| MatchTarget {
            text: &o.text,
            value: Some(&o.value),
        });
        match best_match(targets, wanted, self.fuzzy_threshold) {
            Some((index, score)) => {
                let option = &options[index];
                debug!(
                    wanted,
                    chosen = %option.text,
                    kind = ?score.kind,
                    confidence = score.confidence,
                    "Matched select option"
                );
                driver.select_by_text(el, &option.text).await
            }
            None => Err(DriverError::OptionNotFound {
                value: wanted.to_string(),
            }),
        }
    }
}

/// Assign `value` to a form control and fire the events frameworks listen to.
fn assign_value_script(value: &str) -> String {
    let literal = serde_json::Value::String(value.to_string()).to_string();
    format!(
        "arguments[0].value = {}; \
         arguments[0].dispatchEvent(new Event('input', {{ bubbles: true }})); \
         arguments[0].dispatchEvent(new Event('change', {{ bubbles: true }}));",
        literal
    )
}
