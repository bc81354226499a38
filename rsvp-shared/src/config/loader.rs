//! Configuration loader.
//!
//! Reads a single pre-merged TOML file from `RSVP_CONFIG_PATH`, substitutes
//! `${VAR}` references from the process environment, deserializes to
//! [`RsvpConfig`](super::RsvpConfig) and validates it. A `.env` file is
//! loaded first when present.

use std::path::Path;

use validator::Validate;

use super::error::{ConfigResult, ConfigurationError};
use super::RsvpConfig;

/// Zero-state loader; all methods are associated functions.
#[derive(Debug)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Detect the environment profile from `RSVP_ENV`.
    pub fn detect_environment() -> String {
        std::env::var("RSVP_ENV").unwrap_or_else(|_| "development".to_string())
    }

    /// Load configuration from the path in `RSVP_CONFIG_PATH`.
    pub fn load_from_env() -> ConfigResult<RsvpConfig> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("RSVP_CONFIG_PATH").map_err(|_| {
            ConfigurationError::validation_error(
                "RSVP_CONFIG_PATH environment variable not set. \
                 Set it to the path of your configuration file.",
            )
        })?;

        tracing::info!(
            path = %config_path,
            environment = %Self::detect_environment(),
            "Loading configuration"
        );

        Self::load_from_path(Path::new(&config_path))
    }

    /// Load configuration from a specific TOML file.
    pub fn load_from_path(path: &Path) -> ConfigResult<RsvpConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::file_error(path.display().to_string(), e.to_string())
        })?;

        Self::load_from_str(&contents)
    }

    /// Parse and validate configuration from TOML text.
    pub fn load_from_str(contents: &str) -> ConfigResult<RsvpConfig> {
        let substituted = Self::substitute_env_vars(contents)?;

        let config: RsvpConfig = toml::from_str(&substituted)
            .map_err(|e| ConfigurationError::parse_error(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigurationError::validation_error(e.to_string()))?;

        Ok(config)
    }

    /// Replace `${VAR}` references with environment values.
    ///
    /// An unset variable is an error: a silently-empty credential is worse
    /// than a refused startup.
    fn substitute_env_vars(contents: &str) -> ConfigResult<String> {
        let mut result = String::with_capacity(contents.len());
        let mut rest = contents;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                result.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let name = &after[..end];
            let value = std::env::var(name)
                .map_err(|_| ConfigurationError::MissingEnvVar { name: name.into() })?;
            result.push_str(&value);
            rest = &after[end + 1..];
        }

        result.push_str(rest);
        Ok(result)
    }
}
