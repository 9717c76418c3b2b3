pub mod driver;
pub mod locator;
pub mod matcher;
pub mod protocol;
pub mod snapshot;

pub use driver::{Driver, DriverError, ElementHandle, SelectOption};
pub use locator::{Locator, LocatorError};
pub use protocol::{
    ActionType, ApprovalDecision, ElementCandidate, HealProposal, StepRequest, TestContext,
};
pub use snapshot::ElementSnapshot;
