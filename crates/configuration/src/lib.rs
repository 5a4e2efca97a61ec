pub use crate::error::ConfigError;
pub use crate::settings::Config;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    DataSources, Execution, Logging, ObservationSettings, Persistence, RiskManagement,
    RlSettings,
};

/// Prefix of environment overrides, e.g. `MERIDIAN__EXECUTION__PAPER_TRADING=false`.
const ENV_PREFIX: &str = "MERIDIAN";

/// Loads and validates the application configuration from a TOML file.
///
/// Environment variables prefixed with `MERIDIAN__` override file values. The result
/// is validated before it is returned, so an invalid risk limit fails startup here.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    finish(builder)
}

/// Same as [`load_config`] but from an in-memory TOML document, without environment
/// overrides.
pub fn load_config_from_str(toml: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;

    finish(builder)
}

fn finish(builder: config::Config) -> Result<Config, ConfigError> {
    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}
