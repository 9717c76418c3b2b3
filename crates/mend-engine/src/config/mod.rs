pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{
    ApprovalConfig, ExecutorConfig, GeneratorConfig, GuardrailConfig, HealConfig, StorageConfig,
};
