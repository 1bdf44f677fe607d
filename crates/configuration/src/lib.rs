// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use settings::{
    ApiConfig, ApiKeys, BacktestDefaults, Config, EngineSettings, ExitSettings, LlmConfig, Paths,
    RiskManagement, Simulation, TelegramConfig,
};

/// Loads the application configuration from the `config.toml` file.
///
/// This function is the primary entry point for this crate. It reads the
/// configuration file, deserializes it into our strongly-typed `Config`
/// struct, validates it, and returns it.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from("config.toml")
}

/// Loads and validates configuration from an explicit file path.
///
/// Split out from `load_config` so tests and the backtest CLI can point at
/// alternative files.
pub fn load_config_from(path: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        // Environment variables override file values, e.g. MERIDIAN__LLM__API_KEY.
        .add_source(
            config::Environment::with_prefix("MERIDIAN")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}
