use crate::error::ErrorKind;
use std::fmt;

/// Lifecycle of a single pipeline instance
///
/// Created `Active`; moves to exactly one terminal state and never leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Active,
    Completed,
    Cancelled,
    Errored,
}

impl PipelineState {
    /// Whether the state is one of the terminal states
    pub fn is_terminal(self) -> bool {
        !matches!(self, PipelineState::Active)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Active => "active",
            PipelineState::Completed => "completed",
            PipelineState::Cancelled => "cancelled",
            PipelineState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// A value, a fatal failure, or natural end-of-stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<T> {
    Value(T),
    Failure(ErrorKind),
    Complete,
}

impl<T> Signal<T> {
    /// `Failure` and `Complete` end the pipeline
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Value(_))
    }
}

/// Something the sink side pulls from the flow controller
///
/// Discards travel on the same path as signals so that every callback to a
/// sink happens on the sink's own thread, one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T> {
    Signal(Signal<T>),
    Discarded(T),
}
