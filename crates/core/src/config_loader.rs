use std::path::Path;

use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

/// Default location of the TOML configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from `config/Config.toml` and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed or fails validation.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration from a specific TOML file and the environment.
    ///
    /// Precedence, lowest first: built-in defaults, the TOML file,
    /// `IVSPREAD_`-prefixed variables (`__` separates nested keys, e.g.
    /// `IVSPREAD_STRATEGY__LONG_Z_WINDOW`), then `ALPACA_API_KEY` /
    /// `ALPACA_SECRET_KEY`. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed or fails validation.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Self::figment(path)
            .extract()
            .with_context(|| format!("failed to load configuration from {path}"))?;

        config.strategy.validate()?;
        Ok(config)
    }

    /// Loads `path` with a profile overlay (`Config.{profile}.toml` in the same directory).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be parsed or fails validation.
    pub fn load_with_profile(path: &str, profile: &str) -> Result<AppConfig> {
        let overlay = Path::new(path).with_file_name(format!("Config.{profile}.toml"));
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Toml::file(overlay))
            .merge(Env::prefixed("IVSPREAD_").split("__"))
            .merge(Self::alpaca_env())
            .extract()
            .with_context(|| format!("failed to load configuration profile {profile}"))?;

        config.strategy.validate()?;
        Ok(config)
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("IVSPREAD_").split("__"))
            .merge(Self::alpaca_env())
    }

    fn alpaca_env() -> Env {
        Env::raw()
            .only(&["ALPACA_API_KEY", "ALPACA_SECRET_KEY"])
            .map(|key| {
                let key = key.as_str().to_ascii_lowercase();
                let field = key.trim_start_matches("alpaca_");
                format!("alpaca.{field}").into()
            })
    }
}
