//! A backpressure-controlled streaming pipeline.
//!
//! A source emits values on its own schedule, a sink consumes them at its own
//! pace, and a flow controller between them keeps memory bounded. The operator
//! picks the trade-off: fail fast, drop data, or bound a buffer with an
//! eviction policy.
//!
//! # Features
//!
//! - Overflow modes: fail on overload, drop new, keep latest, bounded buffer
//!   with drop-oldest or drop-latest eviction
//! - Push or demand-driven (credit based) emission
//! - Exactly one terminal signal per pipeline; cooperative cancellation
//! - Discard notifications for every dropped value
//! - Per-pipeline metrics: emitted, delivered, discarded, credit, handling latency
//! - TOML configuration and a builder API
//!
//! # Example
//!
//! ```no_run
//! use backpressure_pipeline::{EvictionPolicy, IntervalSource, LoggingSink, PipelineBuilder};
//! use std::time::Duration;
//!
//! let mut pipeline = PipelineBuilder::new()
//!     .buffered(2, EvictionPolicy::DropOldest)
//!     .production_interval(Duration::from_millis(300))
//!     .handling_delay(Duration::from_secs(1))
//!     .build::<u64>()?;
//!
//! let running = pipeline.start(IntervalSource::new(), LoggingSink::new("slow"))?;
//! let report = running.wait_timeout(Duration::from_millis(2500))?;
//! println!("{}", report.metrics.format());
//! # Ok::<(), backpressure_pipeline::PipelineError>(())
//! ```

pub mod backpressure;
pub mod buffer;
pub mod config;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod signal;
pub mod sink;
pub mod source;

// Re-exports for convenience
pub use backpressure::{admit, Admission, DemandCredit, Discipline, EvictionPolicy, OverflowMode};
pub use buffer::{BufferSlot, Offer};
pub use config::PipelineConfig;
pub use controller::FlowController;
pub use error::{ErrorKind, PipelineError, Result};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineReport, RunningPipeline};
pub use signal::{Event, PipelineState, Signal};
pub use sink::{CollectSink, LoggingSink, Sink, SinkRunner, Subscription};
pub use source::{IntervalSource, IterSource, RangeSource, Source, SourceRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
