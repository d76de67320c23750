mod settings;

use std::path::Path;

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};

use settings::PartialSettings;

pub use settings::{BrokerSettings, LoggingSettings, ServerSettings, Settings};

/// Prefix of environment overrides, e.g. `POPCHAT_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "POPCHAT";

/// Loads the configuration from `config/default` (if present) and environment
/// variables, merged over the built-in defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    build(Config::builder().add_source(File::with_name("config/default").required(false)))
}

/// Like [`load_config`] but reads the given file, which must exist.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    build(Config::builder().add_source(File::from(path.as_ref())))
}

fn build(builder: ConfigBuilder<DefaultState>) -> Result<Settings, ConfigError> {
    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
