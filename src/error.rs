use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
    #[display("environment variable {name} is not set")]
    MissingEnv { name: String },
}

/// Failure to obtain a quote from one source. The aggregator collapses every
/// variant into a missing snapshot entry.
#[derive(Debug, Display, Error)]
pub enum SourceError {
    #[display("request to {source_id} failed")]
    Request { source_id: String },
    #[display("{source_id} answered with HTTP status {status}")]
    Status { source_id: String, status: u16 },
    #[display("failed to parse quote from {source_id}")]
    ResponseParse { source_id: String },
    #[display("quote fetch from {source_id} timed out")]
    Timeout { source_id: String },
}

#[derive(Debug, Clone, Copy, Display, Error)]
pub enum NotifyError {
    #[display("failed to send notification")]
    Send,
    #[display("failed to delete notification")]
    Delete,
    /// The channel refused the delete for good, e.g. the message was already
    /// removed or is too old to delete. Retrying cannot succeed.
    #[display("notification can no longer be deleted")]
    Gone,
    #[display("notification handle is not valid for this channel")]
    InvalidHandle,
}

#[derive(Debug, Display, Error)]
pub enum HealthError {
    #[display("failed to bind health endpoint")]
    Bind,
    #[display("health endpoint stopped unexpectedly")]
    Serve,
}
