pub mod config;
pub mod error;
pub mod flow_tree;
pub mod form;
pub mod submission;
pub mod traits;
pub mod types;
pub mod validation;

pub use config::{
    CacheConfig, ConfigManager, DatabaseConfig, IngestConfig, LoggingConfig, Settings,
};
pub use error::*;
pub use flow_tree::*;
pub use form::*;
pub use submission::*;
pub use traits::*;
pub use types::*;
pub use validation::*;
