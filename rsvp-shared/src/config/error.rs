use thiserror::Error;

/// Configuration loading and validation errors.
///
/// Any of these at startup is fatal: the process refuses to start rather
/// than run with a partial configuration.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration file error: {path}: {message}")]
    FileError { path: String, message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },

    #[error("Configuration validation error: {message}")]
    ValidationError { message: String },

    #[error("Missing environment variable: {name}")]
    MissingEnvVar { name: String },
}

impl ConfigurationError {
    pub fn file_error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
