//! CLI error type and exit-path handling.

use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, ProbeError>;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to launch browser: {0}")]
    BrowserLaunch(String),

    #[error("navigation to {url} failed: {source}")]
    Navigation {
        url: String,
        #[source]
        source: probe::Error,
    },

    #[error("invalid probe plan: {0}")]
    Plan(String),

    #[error(transparent)]
    Driver(#[from] probe::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The failure is already on stdout as a result envelope; the process
    /// should exit non-zero without reporting it again.
    #[error("output already printed")]
    OutputAlreadyPrinted,
}

impl ProbeError {
    pub fn is_output_already_printed(&self) -> bool {
        matches!(self, ProbeError::OutputAlreadyPrinted)
    }

    pub fn to_command_error(&self) -> CommandError {
        let code = match self {
            ProbeError::BrowserLaunch(_) => ErrorCode::BrowserLaunchFailed,
            ProbeError::Navigation { .. } => ErrorCode::NavigationFailed,
            ProbeError::Plan(_) => ErrorCode::InvalidPlan,
            ProbeError::Driver(probe::Error::Timeout(_)) => ErrorCode::Timeout,
            ProbeError::Driver(probe::Error::DriverNotFound) => ErrorCode::DriverNotFound,
            ProbeError::Driver(_) => ErrorCode::SessionError,
            ProbeError::Io(_) => ErrorCode::IoError,
            ProbeError::Json(_) | ProbeError::OutputAlreadyPrinted => ErrorCode::InternalError,
        };
        CommandError {
            code,
            message: self.to_string(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_timeouts_map_to_the_timeout_code() {
        let err = ProbeError::Driver(probe::Error::Timeout("goto".to_string()));
        assert_eq!(err.to_command_error().code, ErrorCode::Timeout);
    }

    #[test]
    fn navigation_errors_carry_the_url() {
        let err = ProbeError::Navigation {
            url: "http://localhost:3000/login".to_string(),
            source: probe::Error::TransportError("pipe closed".to_string()),
        };
        assert_eq!(err.to_command_error().code, ErrorCode::NavigationFailed);
        assert!(err.to_string().contains("http://localhost:3000/login"));
    }
}
