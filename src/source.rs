use crate::backpressure::Discipline;
use crate::controller::FlowController;
use crate::error::{ErrorKind, Result};
use crate::signal::PipelineState;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, trace};

/// Trait for a producer of values
pub trait Source<T>: Send + 'static {
    /// Produce the next value.
    ///
    /// `Ok(None)` ends the stream normally; an error fails the pipeline with
    /// `ProductionFailure`.
    fn produce(&mut self) -> Result<Option<T>>;

    /// Get a human-readable name for this source
    fn name(&self) -> &str {
        "source"
    }
}

/// Unbounded counter `0, 1, 2, ...`, one value per production tick
#[derive(Debug, Default)]
pub struct IntervalSource {
    next: u64,
    limit: Option<u64>,
}

impl IntervalSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop after `limit` values
    pub fn with_limit(limit: u64) -> Self {
        Self {
            next: 0,
            limit: Some(limit),
        }
    }
}

impl Source<u64> for IntervalSource {
    fn produce(&mut self) -> Result<Option<u64>> {
        if self.limit.is_some_and(|limit| self.next >= limit) {
            return Ok(None);
        }
        let value = self.next;
        self.next += 1;
        Ok(Some(value))
    }

    fn name(&self) -> &str {
        "interval"
    }
}

/// `count` consecutive integers starting at `start`
#[derive(Debug, Clone)]
pub struct RangeSource {
    next: i64,
    remaining: u64,
}

impl RangeSource {
    pub fn new(start: i64, count: u64) -> Self {
        Self {
            next: start,
            remaining: count,
        }
    }
}

impl Source<i64> for RangeSource {
    fn produce(&mut self) -> Result<Option<i64>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let value = self.next;
        self.remaining -= 1;
        self.next = self.next.saturating_add(1);
        Ok(Some(value))
    }

    fn name(&self) -> &str {
        "range"
    }
}

/// Finite source over any iterator
#[derive(Debug)]
pub struct IterSource<I> {
    name: String,
    iter: I,
}

impl<I> IterSource<I>
where
    I: Iterator + Send + 'static,
{
    pub fn new(name: impl Into<String>, iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            name: name.into(),
            iter: iter.into_iter(),
        }
    }
}

impl<I> Source<I::Item> for IterSource<I>
where
    I: Iterator + Send + 'static,
{
    fn produce(&mut self) -> Result<Option<I::Item>> {
        Ok(self.iter.next())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Drives a source on its own schedule and forwards each value to the
/// flow controller
pub struct SourceRunner<T> {
    controller: Arc<FlowController<T>>,
    interval: Duration,
}

impl<T: Send + 'static> SourceRunner<T> {
    pub fn new(controller: Arc<FlowController<T>>, interval: Duration) -> Self {
        Self {
            controller,
            interval,
        }
    }

    /// Emit until the pipeline reaches a terminal state.
    ///
    /// Cancellation is observed at the next tick, so at most one emission
    /// can race with it; the controller ignores that late value.
    pub fn run(&self, mut source: Box<dyn Source<T>>) -> PipelineState {
        let metrics = self.controller.metrics().clone();
        let discipline = self.controller.discipline();
        info!(source = source.name(), ?discipline, interval = ?self.interval, "source started");

        let state = loop {
            if discipline == Discipline::DemandDriven {
                let state = self.controller.await_demand();
                if state.is_terminal() {
                    break state;
                }
            } else if self.controller.state().is_terminal() {
                break self.controller.state();
            }

            match source.produce() {
                Ok(Some(value)) => {
                    let at = metrics.record_emission();
                    trace!(
                        seq = metrics.total_emitted(),
                        at_ms = at.as_secs_f64() * 1000.0,
                        "emitted"
                    );
                    let state = self.controller.submit(value);
                    if state.is_terminal() {
                        break state;
                    }
                }
                Ok(None) => {
                    self.controller.complete();
                    break self.controller.state();
                }
                Err(e) => {
                    self.controller
                        .fail(ErrorKind::ProductionFailure(e.to_string()));
                    break self.controller.state();
                }
            }

            if !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
        };

        info!(source = source.name(), %state, emitted = metrics.total_emitted(), "source stopped");
        state
    }
}
