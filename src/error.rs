//! Top-level error types for quipbot.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Completion endpoint errors. Recovered locally by the escalation ladder;
/// only `Exhausted` ever reaches the user, as a fixed notice.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("provider request failed: {0}")]
    Provider(String),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("completion ladder exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: usize, last_error: String },
}

/// Chat platform delivery errors. Logged and swallowed at the adapter
/// boundary; the orchestrator never retries a send.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("failed to deliver message: {0}")]
    Send(String),

    #[error("Discord API error: {0}")]
    Discord(#[from] serenity::Error),
}
