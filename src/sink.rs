use crate::controller::FlowController;
use crate::error::ErrorKind;
use crate::signal::{Event, PipelineState, Signal};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// The sink's handle back into the flow controller
pub struct Subscription<T> {
    controller: Arc<FlowController<T>>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
        }
    }
}

impl<T> Subscription<T> {
    pub fn new(controller: Arc<FlowController<T>>) -> Self {
        Self { controller }
    }

    /// Grant `n` more deliveries (demand-driven operation)
    pub fn request(&self, n: u64) -> PipelineState {
        self.controller.request_credit(n)
    }

    /// Stop the pipeline; no further values are delivered
    pub fn cancel(&self) {
        self.controller.cancel();
    }

    pub fn state(&self) -> PipelineState {
        self.controller.state()
    }
}

/// Trait for a consumer of pipeline signals.
///
/// All methods for one sink are called from a single thread, never
/// concurrently.
pub trait Sink<T>: Send + 'static {
    /// Called once before any other callback
    fn on_subscribe(&mut self, subscription: &Subscription<T>) {
        let _ = subscription;
    }

    /// Handle one delivered value.
    ///
    /// In demand-driven operation no further value arrives until the sink
    /// requests more credit through `subscription`.
    fn on_value(&mut self, value: T, subscription: &Subscription<T>);

    /// Called exactly once with `Complete` or `Failure`, unless the pipeline
    /// was cancelled
    fn on_terminal(&mut self, signal: Signal<T>);

    /// A value was dropped by the overflow policy
    fn on_discard(&mut self, value: T) {
        let _ = value;
    }

    /// Get a human-readable name for this sink
    fn name(&self) -> &str {
        "sink"
    }
}

/// Pulls events from the flow controller and dispatches them to a sink
pub struct SinkRunner<T> {
    controller: Arc<FlowController<T>>,
    handling_delay: Duration,
}

impl<T: Send + 'static> SinkRunner<T> {
    pub fn new(controller: Arc<FlowController<T>>, handling_delay: Duration) -> Self {
        Self {
            controller,
            handling_delay,
        }
    }

    /// Consume until the pipeline is closed.
    ///
    /// `handling_delay` is spent before each `on_value` to simulate a
    /// processing cost, outside the controller's lock.
    pub fn run(&self, mut sink: Box<dyn Sink<T>>) -> PipelineState {
        let subscription = Subscription::new(Arc::clone(&self.controller));
        let metrics = self.controller.metrics().clone();
        info!(sink = sink.name(), delay = ?self.handling_delay, "sink subscribed");
        sink.on_subscribe(&subscription);

        while let Some(event) = self.controller.take() {
            match event {
                Event::Discarded(value) => sink.on_discard(value),
                Event::Signal(Signal::Value(value)) => {
                    let start = Instant::now();
                    if !self.handling_delay.is_zero() {
                        thread::sleep(self.handling_delay);
                    }
                    sink.on_value(value, &subscription);
                    metrics.record_handling(start.elapsed());
                }
                Event::Signal(terminal) => {
                    if let Signal::Failure(kind) = &terminal {
                        error!(sink = sink.name(), error = %kind, "pipeline failed");
                    }
                    sink.on_terminal(terminal);
                }
            }
        }

        let state = self.controller.state();
        info!(sink = sink.name(), %state, delivered = metrics.total_delivered(), "sink finished");
        state
    }
}

/// Logs every callback, optionally requesting credit in batches
#[derive(Debug)]
pub struct LoggingSink {
    name: String,
    request_size: Option<u64>,
    handled: u64,
}

impl LoggingSink {
    /// A push-mode sink that never requests credit
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            request_size: None,
            handled: 0,
        }
    }

    /// A demand-driven sink requesting `request_size` values at a time
    pub fn with_request_size(name: impl Into<String>, request_size: u64) -> Self {
        Self {
            name: name.into(),
            request_size: Some(request_size.max(1)),
            handled: 0,
        }
    }
}

impl<T> Sink<T> for LoggingSink
where
    T: fmt::Debug + Send + 'static,
{
    fn on_subscribe(&mut self, subscription: &Subscription<T>) {
        if let Some(n) = self.request_size {
            info!(sink = %self.name, n, "request");
            subscription.request(n);
        }
    }

    fn on_value(&mut self, value: T, subscription: &Subscription<T>) {
        info!(sink = %self.name, ?value, "onNext");
        self.handled += 1;
        if let Some(n) = self.request_size {
            if self.handled % n == 0 {
                info!(sink = %self.name, n, "request");
                subscription.request(n);
            }
        }
    }

    fn on_terminal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Failure(kind) => error!(sink = %self.name, error = %kind, "onError"),
            _ => info!(sink = %self.name, handled = self.handled, "onComplete"),
        }
    }

    fn on_discard(&mut self, value: T) {
        info!(sink = %self.name, ?value, "overflow, dropped");
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
struct Collected<T> {
    values: Vec<T>,
    discards: Vec<T>,
    failure: Option<ErrorKind>,
    completed: bool,
    terminal_calls: usize,
}

/// Records everything it receives; clones share the same record
#[derive(Debug)]
pub struct CollectSink<T> {
    record: Arc<Mutex<Collected<T>>>,
    request_size: Option<u64>,
}

impl<T> Clone for CollectSink<T> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
            request_size: self.request_size,
        }
    }
}

impl<T> CollectSink<T> {
    pub fn new() -> Self {
        Self {
            record: Arc::new(Mutex::new(Collected {
                values: Vec::new(),
                discards: Vec::new(),
                failure: None,
                completed: false,
                terminal_calls: 0,
            })),
            request_size: None,
        }
    }

    /// Request `n` on subscribe and one more after every handled value
    pub fn demanding(n: u64) -> Self {
        Self {
            request_size: Some(n),
            ..Self::new()
        }
    }

    pub fn failure(&self) -> Option<ErrorKind> {
        self.record.lock().failure.clone()
    }

    pub fn completed(&self) -> bool {
        self.record.lock().completed
    }

    /// How many times `on_terminal` was called
    pub fn terminal_calls(&self) -> usize {
        self.record.lock().terminal_calls
    }
}

impl<T: Clone> CollectSink<T> {
    pub fn values(&self) -> Vec<T> {
        self.record.lock().values.clone()
    }

    pub fn discards(&self) -> Vec<T> {
        self.record.lock().discards.clone()
    }
}

impl<T> Default for CollectSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Sink<T> for CollectSink<T> {
    fn on_subscribe(&mut self, subscription: &Subscription<T>) {
        if let Some(n) = self.request_size {
            subscription.request(n);
        }
    }

    fn on_value(&mut self, value: T, subscription: &Subscription<T>) {
        self.record.lock().values.push(value);
        if self.request_size.is_some() {
            subscription.request(1);
        }
    }

    fn on_terminal(&mut self, signal: Signal<T>) {
        let mut record = self.record.lock();
        record.terminal_calls += 1;
        match signal {
            Signal::Failure(kind) => record.failure = Some(kind),
            Signal::Complete => record.completed = true,
            Signal::Value(_) => {}
        }
    }

    fn on_discard(&mut self, value: T) {
        self.record.lock().discards.push(value);
    }

    fn name(&self) -> &str {
        "collect"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backpressure::{Discipline, EvictionPolicy, OverflowMode};

    fn controller(capacity: usize, discipline: Discipline) -> Arc<FlowController<i32>> {
        Arc::new(FlowController::new(
            OverflowMode::Buffered {
                capacity,
                eviction: EvictionPolicy::DropOldest,
            },
            discipline,
        ))
    }

    #[test]
    fn test_runner_dispatches_in_order() {
        let controller = controller(2, Discipline::Push);
        for i in 1..=3 {
            controller.submit(i);
        }
        controller.complete();

        let sink = CollectSink::new();
        let runner = SinkRunner::new(Arc::clone(&controller), Duration::ZERO);
        assert_eq!(runner.run(Box::new(sink.clone())), PipelineState::Completed);

        assert_eq!(sink.values(), vec![2, 3]);
        assert_eq!(sink.discards(), vec![1]);
        assert!(sink.completed());
        assert_eq!(sink.terminal_calls(), 1);
    }

    #[test]
    fn test_demanding_sink_requests_credit() {
        let controller = controller(8, Discipline::DemandDriven);
        for i in 0..5 {
            controller.submit(i);
        }
        controller.complete();

        let sink = CollectSink::demanding(1);
        let runner = SinkRunner::new(Arc::clone(&controller), Duration::ZERO);
        runner.run(Box::new(sink.clone()));

        assert_eq!(sink.values(), vec![0, 1, 2, 3, 4]);
        assert!(sink.completed());
        // The request after the last value finds nothing left to drain
        assert_eq!(controller.metrics().total_credit_requested(), 5);
    }

    #[test]
    fn test_cancel_from_sink_stops_delivery() {
        struct CancelAfterFirst(CollectSink<i32>);

        impl Sink<i32> for CancelAfterFirst {
            fn on_value(&mut self, value: i32, subscription: &Subscription<i32>) {
                self.0.on_value(value, subscription);
                subscription.cancel();
            }

            fn on_terminal(&mut self, signal: Signal<i32>) {
                self.0.on_terminal(signal);
            }
        }

        let controller = controller(4, Discipline::Push);
        for i in 0..4 {
            controller.submit(i);
        }

        let sink = CollectSink::new();
        let runner = SinkRunner::new(Arc::clone(&controller), Duration::ZERO);
        let state = runner.run(Box::new(CancelAfterFirst(sink.clone())));

        assert_eq!(state, PipelineState::Cancelled);
        assert_eq!(sink.values(), vec![0]);
        assert_eq!(sink.terminal_calls(), 0);
    }

    #[test]
    fn test_logging_sink_requests_in_batches() {
        let controller = controller(8, Discipline::DemandDriven);
        for i in 0..4 {
            controller.submit(i);
        }
        controller.complete();

        let runner = SinkRunner::new(Arc::clone(&controller), Duration::ZERO);
        runner.run(Box::new(LoggingSink::with_request_size("batched", 2)));

        // 2 on subscribe and 2 after the second value; the stream is drained
        // by the time the fourth value asks again
        assert_eq!(controller.metrics().total_credit_requested(), 4);
        assert_eq!(controller.metrics().total_delivered(), 4);
    }
}
