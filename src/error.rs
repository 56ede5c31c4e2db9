use thiserror::Error;

/// Result type for backpressure pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Fatal conditions that terminate a pipeline with a `Failure` signal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An arrival found no capacity to hold it under `UnboundedFail`
    #[error("Overloaded: arrival with no capacity to hold it")]
    Overloaded,

    /// The source cannot continue producing values
    #[error("Production failure: {0}")]
    ProductionFailure(String),

    /// A caller-imposed deadline expired before the pipeline terminated
    #[error("Pipeline deadline expired")]
    Timeout,
}

/// Errors surfaced by pipeline construction and the runtime wrapper
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline has already been started
    #[error("Pipeline has already been started")]
    AlreadyStarted,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A source could not produce its next value
    #[error("Source error: {0}")]
    SourceError(String),

    /// Thread spawn or join error
    #[error("Thread error: {0}")]
    ThreadError(String),

    /// The pipeline ended with a fatal `Failure` signal
    #[error("Pipeline terminated: {0}")]
    Terminated(ErrorKind),
}

impl From<ErrorKind> for PipelineError {
    fn from(kind: ErrorKind) -> Self {
        PipelineError::Terminated(kind)
    }
}
