//! CLI error handling

use std::fmt;

use pkgd_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    Config(pkgd_errors::ConfigError),
    /// Engine construction or configuration loading failed
    Ops(pkgd_errors::Error),
    Io(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {e}"),
            CliError::Ops(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                Ok(())
            }
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Ops(e) => Some(e),
            CliError::Io(e) => Some(e),
        }
    }
}

impl From<pkgd_errors::ConfigError> for CliError {
    fn from(e: pkgd_errors::ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<pkgd_errors::Error> for CliError {
    fn from(e: pkgd_errors::Error) -> Self {
        match e {
            pkgd_errors::Error::Config(config) => CliError::Config(config),
            other => CliError::Ops(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
