use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the driver runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// No Playwright driver installation could be located.
    #[error(
        "Playwright driver not found. Install it with `npm install playwright` \
         or point PLAYWRIGHT_CLI_JS at a cli.js"
    )]
    DriverNotFound,

    /// The driver process failed to start or exited immediately.
    #[error("failed to launch Playwright driver: {0}")]
    LaunchFailed(String),

    /// Stdio communication with the driver broke down.
    #[error("transport error: {0}")]
    TransportError(String),

    /// The driver sent something the protocol layer cannot make sense of.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// An operation did not complete within its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The browser, context, or page backing an operation is gone.
    #[error("{target_type} closed: {context}")]
    TargetClosed {
        target_type: String,
        context: String,
    },

    /// A response callback was dropped before the driver answered.
    #[error("connection closed before response arrived")]
    ChannelClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
