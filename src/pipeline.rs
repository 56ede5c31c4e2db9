use crate::backpressure::{Discipline, EvictionPolicy, OverflowMode};
use crate::config::{PipelineConfig, MAX_BUFFER_CAPACITY};
use crate::controller::FlowController;
use crate::error::{ErrorKind, PipelineError, Result};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::signal::PipelineState;
use crate::sink::{Sink, SinkRunner};
use crate::source::{Source, SourceRunner};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Builder for constructing pipelines
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    mode: OverflowMode,
    discipline: Discipline,
    production_interval: Duration,
    handling_delay: Duration,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self::from_config(&PipelineConfig::default())
    }

    /// Start from a loaded configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            mode: config.mode,
            discipline: config.discipline,
            production_interval: config.production_interval(),
            handling_delay: config.handling_delay(),
        }
    }

    pub fn mode(mut self, mode: OverflowMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for `OverflowMode::Buffered`
    pub fn buffered(self, capacity: usize, eviction: EvictionPolicy) -> Self {
        self.mode(OverflowMode::Buffered { capacity, eviction })
    }

    pub fn discipline(mut self, discipline: Discipline) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn production_interval(mut self, interval: Duration) -> Self {
        self.production_interval = interval;
        self
    }

    pub fn handling_delay(mut self, delay: Duration) -> Self {
        self.handling_delay = delay;
        self
    }

    /// Build the pipeline
    pub fn build<T>(self) -> Result<Pipeline<T>> {
        if self.mode.capacity() > MAX_BUFFER_CAPACITY {
            return Err(PipelineError::ConfigError(format!(
                "buffer capacity {} exceeds the maximum of {MAX_BUFFER_CAPACITY}",
                self.mode.capacity()
            )));
        }

        let metrics = PipelineMetrics::new();
        Ok(Pipeline {
            controller: Arc::new(FlowController::with_metrics(
                self.mode,
                self.discipline,
                metrics,
            )),
            production_interval: self.production_interval,
            handling_delay: self.handling_delay,
            started: false,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One source, one flow controller, one sink
pub struct Pipeline<T> {
    controller: Arc<FlowController<T>>,
    production_interval: Duration,
    handling_delay: Duration,
    started: bool,
}

impl<T: Send + 'static> Pipeline<T> {
    /// The flow controller shared by both sides
    pub fn controller(&self) -> Arc<FlowController<T>> {
        Arc::clone(&self.controller)
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        self.controller.metrics()
    }

    /// Spawn the sink and source threads.
    ///
    /// The sink subscribes first so an initial credit request is in place
    /// before the first emission.
    pub fn start<S, K>(&mut self, source: S, sink: K) -> Result<RunningPipeline<T>>
    where
        S: Source<T>,
        K: Sink<T>,
    {
        if self.started {
            return Err(PipelineError::AlreadyStarted);
        }
        self.started = true;

        let (done_tx, done_rx) = channel::bounded(2);
        info!(
            mode = %self.controller.mode(),
            discipline = ?self.controller.discipline(),
            interval = ?self.production_interval,
            delay = ?self.handling_delay,
            "pipeline starting"
        );

        let sink_handle = {
            let guard = Finished::new(Role::Sink, Arc::clone(&self.controller), done_tx.clone());
            let runner = SinkRunner::new(Arc::clone(&self.controller), self.handling_delay);
            thread::Builder::new()
                .name("pipeline-sink".into())
                .spawn(move || {
                    let _guard = guard;
                    runner.run(Box::new(sink))
                })
                .map_err(|e| PipelineError::ThreadError(e.to_string()))?
        };

        let guard = Finished::new(Role::Source, Arc::clone(&self.controller), done_tx);
        let runner = SourceRunner::new(Arc::clone(&self.controller), self.production_interval);
        let source_handle = thread::Builder::new()
            .name("pipeline-source".into())
            .spawn(move || {
                let _guard = guard;
                runner.run(Box::new(source))
            });

        let source_handle = match source_handle {
            Ok(handle) => handle,
            Err(e) => {
                self.controller.cancel();
                let _ = sink_handle.join();
                return Err(PipelineError::ThreadError(e.to_string()));
            }
        };

        Ok(RunningPipeline {
            controller: Arc::clone(&self.controller),
            source: Some(source_handle),
            sink: Some(sink_handle),
            done: done_rx,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Source,
    Sink,
}

/// Reports a runner thread's exit, cancelling the pipeline if it panicked
/// so the other side does not wait forever
struct Finished<T> {
    role: Role,
    controller: Arc<FlowController<T>>,
    done: Sender<Role>,
}

impl<T> Finished<T> {
    fn new(role: Role, controller: Arc<FlowController<T>>, done: Sender<Role>) -> Self {
        Self {
            role,
            controller,
            done,
        }
    }
}

impl<T> Drop for Finished<T> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(role = ?self.role, "pipeline thread panicked, cancelling");
            self.controller.cancel();
        }
        let _ = self.done.send(self.role);
    }
}

/// Final state of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub failure: Option<ErrorKind>,
    pub metrics: MetricsSnapshot,
}

impl PipelineReport {
    /// Turn a failed run into `PipelineError::Terminated`
    pub fn into_result(self) -> Result<Self> {
        match self.failure.clone() {
            Some(kind) => Err(kind.into()),
            None => Ok(self),
        }
    }
}

/// A running pipeline that can be controlled and monitored
pub struct RunningPipeline<T> {
    controller: Arc<FlowController<T>>,
    source: Option<JoinHandle<PipelineState>>,
    sink: Option<JoinHandle<PipelineState>>,
    done: Receiver<Role>,
}

impl<T> RunningPipeline<T> {
    pub fn state(&self) -> PipelineState {
        self.controller.state()
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        self.controller.metrics()
    }

    /// Grant credit on the sink's behalf
    pub fn request_credit(&self, n: u64) -> PipelineState {
        self.controller.request_credit(n)
    }

    /// Stop the pipeline; returns immediately, the source stops at its next tick
    pub fn cancel(&self) {
        self.controller.cancel();
    }

    /// Fail the pipeline from outside, e.g. when a caller's deadline expires
    pub fn fail(&self, kind: ErrorKind) {
        self.controller.fail(kind);
    }

    /// Wait for both sides to finish
    pub fn wait(mut self) -> Result<PipelineReport> {
        self.join()
    }

    /// Wait for both sides, failing the pipeline with `Timeout` if it has
    /// not terminated within `timeout`
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<PipelineReport> {
        let deadline = Instant::now() + timeout;
        let mut finished = 0;
        while finished < 2 {
            match self.done.recv_deadline(deadline) {
                Ok(_) => finished += 1,
                Err(RecvTimeoutError::Timeout) => {
                    info!(?timeout, "pipeline deadline expired");
                    self.controller.fail(ErrorKind::Timeout);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.join()
    }

    /// Cancel and wait for both sides to stop
    pub fn shutdown(mut self) -> Result<PipelineReport> {
        self.controller.cancel();
        self.join()
    }

    fn join(&mut self) -> Result<PipelineReport> {
        let mut panicked = Vec::new();
        if let Some(handle) = self.sink.take() {
            if handle.join().is_err() {
                panicked.push("sink");
            }
        }
        if let Some(handle) = self.source.take() {
            if handle.join().is_err() {
                panicked.push("source");
            }
        }
        if !panicked.is_empty() {
            return Err(PipelineError::ThreadError(format!(
                "{} thread panicked",
                panicked.join(" and ")
            )));
        }

        let report = PipelineReport {
            state: self.controller.state(),
            failure: self.controller.failure(),
            metrics: self.controller.metrics().snapshot(),
        };
        info!(state = %report.state, "pipeline stopped: {}", report.metrics.format());
        Ok(report)
    }
}

impl<T> Drop for RunningPipeline<T> {
    fn drop(&mut self) {
        if self.source.is_some() || self.sink.is_some() {
            self.controller.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectSink;
    use crate::source::IntervalSource;

    #[test]
    fn test_pipeline_builder() {
        let pipeline = PipelineBuilder::new()
            .buffered(10, EvictionPolicy::DropOldest)
            .discipline(Discipline::DemandDriven)
            .build::<u64>()
            .unwrap();
        assert_eq!(
            pipeline.controller().mode(),
            OverflowMode::Buffered {
                capacity: 10,
                eviction: EvictionPolicy::DropOldest
            }
        );
        assert_eq!(pipeline.controller().discipline(), Discipline::DemandDriven);
    }

    #[test]
    fn test_oversized_capacity_error() {
        let result = PipelineBuilder::new()
            .buffered(MAX_BUFFER_CAPACITY + 1, EvictionPolicy::DropLatest)
            .build::<u64>();
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn test_start_twice() {
        let mut pipeline = PipelineBuilder::new()
            .mode(OverflowMode::DropNew)
            .production_interval(Duration::ZERO)
            .handling_delay(Duration::ZERO)
            .build::<u64>()
            .unwrap();

        let running = pipeline
            .start(IntervalSource::with_limit(3), CollectSink::new())
            .unwrap();
        assert!(matches!(
            pipeline.start(IntervalSource::new(), CollectSink::new()),
            Err(PipelineError::AlreadyStarted)
        ));
        running.shutdown().unwrap();
    }

    #[test]
    fn test_report_into_result() {
        let report = PipelineReport {
            state: PipelineState::Errored,
            failure: Some(ErrorKind::Overloaded),
            metrics: PipelineMetrics::new().snapshot(),
        };
        assert!(matches!(
            report.into_result(),
            Err(PipelineError::Terminated(ErrorKind::Overloaded))
        ));
    }
}
