use crate::locator::Locator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque reference to a live element. Only meaningful inside the driver
/// session that produced it and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of a selection control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub text: String,
    pub value: String,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum DriverError {
    // ============================================================
    // Element Errors
    // ============================================================
    #[error("No element matches {0}")]
    NoSuchElement(String),

    #[error("Element {0} is stale (removed from DOM)")]
    StaleElement(String),

    #[error("Element {0} is not visible")]
    NotVisible(String),

    #[error("Element {handle} is not interactable: {reason}")]
    NotInteractable { handle: String, reason: String },

    #[error("Option not found: {value}")]
    OptionNotFound { value: String },

    #[error("Invalid selector: {selector}")]
    InvalidSelector { selector: String },

    // ============================================================
    // Execution Errors
    // ============================================================
    #[error("Script execution error: {0}")]
    Script(String),

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    // ============================================================
    // Session Errors
    // ============================================================
    #[error("Connection lost")]
    ConnectionLost,

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Other: {0}")]
    Other(String),
}

impl DriverError {
    pub fn code(&self) -> &'static str {
        match self {
            DriverError::NoSuchElement(_) => "ELEMENT_NOT_FOUND",
            DriverError::StaleElement(_) => "ELEMENT_STALE",
            DriverError::NotVisible(_) => "ELEMENT_NOT_VISIBLE",
            DriverError::NotInteractable { .. } => "ELEMENT_NOT_INTERACTABLE",
            DriverError::OptionNotFound { .. } => "OPTION_NOT_FOUND",
            DriverError::InvalidSelector { .. } => "SELECTOR_INVALID",
            DriverError::Script(_) => "SCRIPT_ERROR",
            DriverError::Timeout { .. } => "TIMEOUT",
            DriverError::ConnectionLost => "CONNECTION_LOST",
            DriverError::NotSupported(_) => "NOT_SUPPORTED",
            DriverError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// True when the error means "nothing matched" rather than a broken session.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DriverError::NoSuchElement(_) | DriverError::StaleElement(_)
        )
    }
}

/// Browser automation surface the healing engine drives. One instance per
/// test session; implementations wrap WebDriver, CDP or an in-memory page.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Find all elements matching a locator, in document order.
    async fn find_elements(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError>;

    /// Read an attribute; `None` when the attribute is absent.
    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    /// Visible text of the element.
    async fn text(&mut self, element: &ElementHandle) -> Result<String, DriverError>;

    /// Lower-case tag name.
    async fn tag_name(&mut self, element: &ElementHandle) -> Result<String, DriverError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn double_click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn right_click(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn hover(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn type_text(&mut self, element: &ElementHandle, text: &str) -> Result<(), DriverError>;

    async fn clear(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn select_by_text(
        &mut self,
        element: &ElementHandle,
        text: &str,
    ) -> Result<(), DriverError>;

    async fn select_by_value(
        &mut self,
        element: &ElementHandle,
        value: &str,
    ) -> Result<(), DriverError>;

    async fn select_by_index(
        &mut self,
        element: &ElementHandle,
        index: usize,
    ) -> Result<(), DriverError>;

    async fn submit(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Block until the element is visible and enabled, or the timeout elapses.
    async fn wait_until_interactable(
        &mut self,
        element: &ElementHandle,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Simulated pointer: move to the element centre, press and release.
    async fn pointer_click(&mut self, element: &ElementHandle) -> Result<(), DriverError> {
        self.click(element).await
    }

    /// Options of a selection control, when the driver can enumerate them.
    async fn select_options(
        &mut self,
        _element: &ElementHandle,
    ) -> Result<Vec<SelectOption>, DriverError> {
        Err(DriverError::NotSupported("select_options".into()))
    }

    /// Execute a script in the page with elements bound to `arguments`.
    async fn execute_script(
        &mut self,
        _script: &str,
        _args: &[ElementHandle],
    ) -> Result<serde_json::Value, DriverError> {
        Err(DriverError::NotSupported("execute_script".into()))
    }

    /// Condensed description of the current page for the reasoning service.
    async fn page_context(&mut self) -> Result<String, DriverError> {
        Ok(String::new())
    }

    /// Capture a screenshot of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, DriverError> {
        Err(DriverError::NotSupported("screenshot".into()))
    }
}
