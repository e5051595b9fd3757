//! Configuration loading, validation, and env substitution.
//!
//! Config files: `cadence.toml`, `cadence.yaml`, `cadence.yml`, or
//! `cadence.json`, searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in all string
//! values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config, load_value},
    schema::{BrokerConfig, CadenceConfig, MetricsConfig, SchedulerConfig, StatusConfig},
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_config},
};
