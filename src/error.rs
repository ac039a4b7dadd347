use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostdeckError {
    #[error("Command '{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Invalid configuration")]
    InvalidConfig,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("VM '{0}' not found")]
    VmNotFound(String),

    #[error("Network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Volume group '{0}' not found")]
    VolumeGroupNotFound(String),

    #[error("Physical volume '{0}' not found")]
    PhysicalVolumeNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Could not parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    SerdeError(String),
}

impl HostdeckError {
    pub fn command_failed(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        HostdeckError::CommandFailed {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    pub fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        HostdeckError::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<toml::de::Error> for HostdeckError {
    fn from(err: toml::de::Error) -> Self {
        HostdeckError::SerdeError(err.to_string())
    }
}

impl From<toml::ser::Error> for HostdeckError {
    fn from(err: toml::ser::Error) -> Self {
        HostdeckError::SerdeError(err.to_string())
    }
}

impl From<serde_json::Error> for HostdeckError {
    fn from(err: serde_json::Error) -> Self {
        HostdeckError::SerdeError(err.to_string())
    }
}
