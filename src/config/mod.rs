//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! $ZDD_SERVER_CONFIG (TOML) or built-in defaults
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - No command-line flags; the environment names the file
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, parse_config, ConfigError, CONFIG_ENV};
pub use schema::{
    LifecycleConfig, ListenerConfig, MarkerConfig, ObservabilityConfig, ServerConfig,
};
pub use validation::ValidationError;
