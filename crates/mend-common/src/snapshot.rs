use crate::driver::{Driver, DriverError, ElementHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of an element captured at the moment it was resolved.
///
/// Fields are private so a snapshot cannot drift from what was observed; the
/// only ways to obtain one are [`ElementSnapshot::capture`] and
/// [`SnapshotBuilder::build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    tag: String,
    id: Option<String>,
    name: Option<String>,
    aria_label: Option<String>,
    test_id: Option<String>,
    text: Option<String>,
    class: Option<String>,
    captured_at: DateTime<Utc>,
}

/// Attribute carrying the stable test identifier.
pub const TEST_ID_ATTRIBUTE: &str = "data-testid";

impl ElementSnapshot {
    /// Read the identifying attributes of a live element.
    pub async fn capture<D: Driver + ?Sized>(
        driver: &mut D,
        element: &ElementHandle,
    ) -> Result<Self, DriverError> {
        let tag = driver.tag_name(element).await?.to_lowercase();
        let id = non_empty(driver.attribute(element, "id").await?);
        let name = non_empty(driver.attribute(element, "name").await?);
        let aria_label = non_empty(driver.attribute(element, "aria-label").await?);
        let test_id = non_empty(driver.attribute(element, TEST_ID_ATTRIBUTE).await?);
        let class = non_empty(driver.attribute(element, "class").await?);
        let text = non_empty(Some(driver.text(element).await?));

        Ok(Self {
            tag,
            id,
            name,
            aria_label,
            test_id,
            text,
            class,
            captured_at: Utc::now(),
        })
    }

    pub fn builder(tag: impl Into<String>) -> SnapshotBuilder {
        SnapshotBuilder {
            snapshot: ElementSnapshot {
                tag: tag.into().to_lowercase(),
                id: None,
                name: None,
                aria_label: None,
                test_id: None,
                text: None,
                class: None,
                captured_at: Utc::now(),
            },
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn aria_label(&self) -> Option<&str> {
        self.aria_label.as_deref()
    }

    pub fn test_id(&self) -> Option<&str> {
        self.test_id.as_deref()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Short human-readable description for logs and errors.
    pub fn describe(&self) -> String {
        let mut out = format!("<{}", self.tag);
        if let Some(id) = &self.id {
            out.push_str(&format!(" id=\"{}\"", id));
        }
        if let Some(test_id) = &self.test_id {
            out.push_str(&format!(" {}=\"{}\"", TEST_ID_ATTRIBUTE, test_id));
        }
        if let Some(name) = &self.name {
            out.push_str(&format!(" name=\"{}\"", name));
        }
        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        out
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

pub struct SnapshotBuilder {
    snapshot: ElementSnapshot,
}

impl SnapshotBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.snapshot.id = non_empty(Some(id.into()));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.snapshot.name = non_empty(Some(name.into()));
        self
    }

    pub fn aria_label(mut self, label: impl Into<String>) -> Self {
        self.snapshot.aria_label = non_empty(Some(label.into()));
        self
    }

    pub fn test_id(mut self, test_id: impl Into<String>) -> Self {
        self.snapshot.test_id = non_empty(Some(test_id.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.snapshot.text = non_empty(Some(text.into()));
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.snapshot.class = non_empty(Some(class.into()));
        self
    }

    pub fn build(self) -> ElementSnapshot {
        self.snapshot
    }
}
