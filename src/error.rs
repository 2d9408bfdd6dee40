use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("NO_LAUNCH_TARGET: Specify at least one of -s/--spawn, -a/--attach or -F/--attach-frontmost.")]
    NoLaunchTarget,

    #[error("INVALID_PATTERN: Invalid trace pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("RUNTIME_ERROR: {0}")]
    Runtime(String),

    #[error("INSTALL_FAILED: Could not intercept {target}: {reason}")]
    Install { target: String, reason: String },

    #[error("CONTROLLER_ERROR: {0}")]
    Controller(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
