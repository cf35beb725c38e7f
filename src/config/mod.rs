//! Run configuration
//!
//! A run is described by one YAML file plus command-line overrides. The
//! composed tree is deserialized into [`RunConfig`] and validated before any
//! data or model is touched.

mod cli;
mod error;
mod loader;
pub mod overrides;
mod schema;
mod validate;

pub use cli::{parse_args, Cli, Command, InitModelArgs, RunArgs};
pub use error::ConfigError;
pub use loader::{compose, config_file, from_value, load_config, to_yaml};
pub use overrides::{Override, OverrideOp};
pub use schema::{
    DatasetSection, LoraSection, ModelSection, PaddingSide, PrivacySection, RunConfig, RunSection,
    TokenizerKind, TokenizerSection, TrackingSection, TrainSection,
};
pub use validate::validate_config;

pub(crate) use schema::deserialize_bool_lenient;
