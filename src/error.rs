// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Error types shared by the controller, its state file, and the sensor
//! gateway.

use std::io;
use std::path::PathBuf;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, FanctlError>;

#[derive(thiserror::Error, Debug)]
pub enum FanctlError {
    /// A sensor read or fan command could not be carried out.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport answered, but not in a shape we understand.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The persisted state file exists but could not be decoded.
    #[error(
        "State file {path} is unreadable ({source}); inspect or remove it before restarting"
    )]
    StateCorrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Invalid settings, including an unknown easing curve.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl FanctlError {
    /// Whether this error must stop the control loop instead of being retried
    /// on the next poll.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FanctlError::Configuration(_) | FanctlError::StateCorrupt { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FanctlError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_and_corruption_are_fatal() {
        assert!(FanctlError::Configuration("bad curve".into()).is_fatal());
        assert!(!FanctlError::Transport("timeout".into()).is_fatal());
        assert!(!FanctlError::Parse("garbage".into()).is_fatal());
        assert!(!FanctlError::io("/tmp/x", io::Error::other("disk full")).is_fatal());

        let source = serde_json::from_str::<u32>("nope").unwrap_err();
        let corrupt = FanctlError::StateCorrupt {
            path: PathBuf::from("/tmp/state.json"),
            source,
        };
        assert!(corrupt.is_fatal());
        assert!(corrupt.to_string().contains("/tmp/state.json"));
    }
}
