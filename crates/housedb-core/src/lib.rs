pub mod app_config;
pub mod config;
pub mod memory;
pub mod merge;
pub mod normalize;
pub mod property;
pub mod store;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use memory::MemoryStore;
pub use merge::{apply, MergeError};
pub use property::{PropertyCandidate, SaleCandidate};
pub use store::{
    ApplyOutcome, PersistedProperty, PersistedSale, PropertyRecord, PropertySink, PropertyStore,
    SaleInsert, StoreError,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
