//! Error types for netstate

use std::fmt;
use std::io;
use std::time::Duration;

#[derive(Debug)]
pub enum NetstateError {
    /// IO error
    Io(io::Error),
    /// Command execution failed
    CommandFailed { cmd: String, code: Option<i32>, stderr: String },
    /// Invalid parameter
    InvalidParameter(String),
    /// Interface not found
    InterfaceNotFound(String),
    /// No active profile for an interface
    ProfileNotFound(String),
    /// Configuration error
    ConfigError(String),
    /// Parse error
    ParseError(String),
    /// Not supported
    NotSupported(String),
    /// Invalid state
    InvalidState(String),
    /// Desired state was not observed within the retry budget
    VerificationFailed { interface: String, waited: Duration },
}

impl fmt::Display for NetstateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetstateError::Io(e) => write!(f, "IO error: {}", e),
            NetstateError::CommandFailed { cmd, code, stderr } => {
                if let Some(code) = code {
                    write!(f, "Command '{}' failed with code {}: {}", cmd, code, stderr)
                } else {
                    write!(f, "Command '{}' failed: {}", cmd, stderr)
                }
            }
            NetstateError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            NetstateError::InterfaceNotFound(name) => write!(f, "Interface not found: {}", name),
            NetstateError::ProfileNotFound(name) => {
                write!(f, "No active connection profile on interface: {}", name)
            }
            NetstateError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            NetstateError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            NetstateError::NotSupported(msg) => write!(f, "Not supported: {}", msg),
            NetstateError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            NetstateError::VerificationFailed { interface, waited } => write!(
                f,
                "Applied state on {} did not reach desired state within {:.1}s",
                interface,
                waited.as_secs_f64()
            ),
        }
    }
}

impl std::error::Error for NetstateError {}

impl From<io::Error> for NetstateError {
    fn from(error: io::Error) -> Self {
        NetstateError::Io(error)
    }
}

impl From<serde_json::Error> for NetstateError {
    fn from(error: serde_json::Error) -> Self {
        NetstateError::ParseError(error.to_string())
    }
}

pub type NetstateResult<T> = Result<T, NetstateError>;
