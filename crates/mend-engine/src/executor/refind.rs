use mend_common::locator::looks_auto_generated;
use mend_common::{Driver, DriverError, ElementHandle, ElementSnapshot, Locator};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ways to find an element again from its snapshot, most stable first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefindStrategy {
    TestId,
    Id,
    AriaLabel,
    TagText,
    Name,
}

impl RefindStrategy {
    pub const LADDER: [RefindStrategy; 5] = [
        RefindStrategy::TestId,
        RefindStrategy::Id,
        RefindStrategy::AriaLabel,
        RefindStrategy::TagText,
        RefindStrategy::Name,
    ];

    /// Locator this strategy would use, if the snapshot supports it.
    pub fn locator(&self, snapshot: &ElementSnapshot) -> Option<Locator> {
        match self {
            RefindStrategy::TestId => snapshot.test_id().map(|t| Locator::TestId(t.to_string())),
            RefindStrategy::Id => snapshot
                .id()
                .filter(|id| !looks_auto_generated(id))
                .map(|id| Locator::Id(id.to_string())),
            RefindStrategy::AriaLabel => snapshot
                .aria_label()
                .map(|label| Locator::AriaLabel(label.to_string())),
            RefindStrategy::TagText => snapshot.text().map(|text| {
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                Locator::tag_with_text(snapshot.tag(), &text)
            }),
            RefindStrategy::Name => snapshot.name().map(|n| Locator::Name(n.to_string())),
        }
    }

    /// Accessible labels are not unique identifiers; only accept a single hit.
    fn requires_unique(&self) -> bool {
        matches!(self, RefindStrategy::AriaLabel)
    }
}

/// Walk the re-find ladder. `Ok(None)` means every strategy came up empty.
pub async fn refind<D: Driver + ?Sized>(
    driver: &mut D,
    snapshot: &ElementSnapshot,
) -> Result<Option<(ElementHandle, RefindStrategy)>, DriverError> {
    for strategy in RefindStrategy::LADDER {
        let Some(locator) = strategy.locator(snapshot) else {
            continue;
        };
        let found = match driver.find_elements(&locator).await {
            Ok(found) => found,
            Err(DriverError::ConnectionLost) => return Err(DriverError::ConnectionLost),
            Err(e) => {
                debug!(strategy = ?strategy, locator = %locator, error = %e, "Re-find strategy errored");
                continue;
            }
        };

        match found.as_slice() {
            [] => debug!(strategy = ?strategy, locator = %locator, "Re-find strategy found nothing"),
            [_, _, ..] if strategy.requires_unique() => {
                debug!(strategy = ?strategy, matches = found.len(), "Re-find match not unique")
            }
            [first, ..] => {
                debug!(strategy = ?strategy, locator = %locator, "Element re-found");
                return Ok(Some((first.clone(), strategy)));
            }
        }
    }
    Ok(None)
}
