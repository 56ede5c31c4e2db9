//! The flow controller: the single exclusion boundary between a source and a sink.
//!
//! Every operation (`submit`, `request_credit`, `cancel`, `complete`, `fail`
//! and the sink-side `take`) runs under one mutex, so they are linearized with
//! respect to each other and to the buffer. Sink code is never called from
//! here: the sink side pulls [`Event`]s and dispatches them on its own thread.

use crate::backpressure::{DemandCredit, Discipline, OverflowMode};
use crate::buffer::{BufferSlot, Offer};
use crate::error::{ErrorKind, PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::signal::{Event, PipelineState, Signal};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

struct Inner<T> {
    state: PipelineState,
    buffer: BufferSlot<T>,
    /// A value passed straight to a sink that was waiting for one
    handoff: Option<T>,
    /// Dropped values not yet reported to the sink
    discards: VecDeque<T>,
    credit: DemandCredit,
    discipline: Discipline,
    failure: Option<ErrorKind>,
    terminal_sent: bool,
    sink_waiting: bool,
    touched: bool,
}

impl<T> Inner<T> {
    fn pending(&self) -> usize {
        self.buffer.len() + usize::from(self.handoff.is_some())
    }

    fn sink_can_accept(&self) -> bool {
        match self.discipline {
            Discipline::Push => true,
            Discipline::DemandDriven => !self.credit.is_exhausted(),
        }
    }

    /// Nothing further will ever be yielded to the sink
    fn is_closed(&self) -> bool {
        self.discards.is_empty()
            && match self.state {
                PipelineState::Active => false,
                PipelineState::Cancelled => true,
                PipelineState::Completed | PipelineState::Errored => self.terminal_sent,
            }
    }
}

/// Bounded intermediary between one source and one sink
pub struct FlowController<T> {
    inner: Mutex<Inner<T>>,
    /// Wakes the sink side when something becomes deliverable
    delivery: Condvar,
    /// Wakes a demand-driven source when credit grows or the pipeline ends
    demand: Condvar,
    metrics: PipelineMetrics,
}

impl<T> FlowController<T> {
    /// Create an active controller
    pub fn new(mode: OverflowMode, discipline: Discipline) -> Self {
        Self::with_metrics(mode, discipline, PipelineMetrics::new())
    }

    /// Create an active controller that reports into shared metrics
    pub fn with_metrics(mode: OverflowMode, discipline: Discipline, metrics: PipelineMetrics) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: PipelineState::Active,
                buffer: BufferSlot::new(mode),
                handoff: None,
                discards: VecDeque::new(),
                credit: DemandCredit::new(),
                discipline,
                failure: None,
                terminal_sent: false,
                sink_waiting: false,
                touched: false,
            }),
            delivery: Condvar::new(),
            demand: Condvar::new(),
            metrics,
        }
    }

    /// Replace the overflow mode and discipline.
    ///
    /// Only allowed before the first `submit` or `request_credit`.
    pub fn configure(&self, mode: OverflowMode, discipline: Discipline) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.touched || inner.state.is_terminal() {
            return Err(PipelineError::ConfigError(
                "flow controller can only be configured before use".into(),
            ));
        }
        inner.buffer = BufferSlot::new(mode);
        inner.discipline = discipline;
        debug!(%mode, ?discipline, "flow controller configured");
        Ok(())
    }

    /// Offer a value from the source and report the resulting state.
    ///
    /// After a terminal transition this is a no-op returning that state.
    pub fn submit(&self, value: T) -> PipelineState {
        let mut inner = self.inner.lock();
        inner.touched = true;
        if inner.state.is_terminal() {
            return inner.state;
        }

        // Only a zero-capacity buffer needs the in-flight slot; every other
        // mode admits against the buffer so the waiting sink's value counts.
        if inner.sink_waiting && inner.pending() == 0 && inner.buffer.capacity() == 0 {
            inner.handoff = Some(value);
            inner.sink_waiting = false;
            self.metrics.record_accepted();
            trace!("value handed off to waiting sink");
            self.delivery.notify_one();
            return inner.state;
        }

        match inner.buffer.offer(value) {
            Offer::Accepted => {
                self.metrics.record_accepted();
                trace!(
                    pending = inner.buffer.len(),
                    utilization = inner.buffer.utilization(),
                    "value buffered"
                );
                self.delivery.notify_one();
            }
            Offer::Evicted(evicted) => {
                self.metrics.record_accepted();
                self.discard(&mut inner, evicted, "evicted pending value");
            }
            Offer::Rejected(rejected) => {
                self.discard(&mut inner, rejected, "dropped arriving value");
            }
            Offer::Overflow(_) => {
                warn!(mode = %inner.buffer.mode(), "arrival with no capacity, failing pipeline");
                self.fail_locked(&mut inner, ErrorKind::Overloaded);
            }
        }
        inner.state
    }

    /// Grant the sink `n` more deliveries.
    ///
    /// Zero is ignored. Once terminal this is a no-op, except that a completed
    /// pipeline still takes credit while buffered values remain to drain.
    pub fn request_credit(&self, n: u64) -> PipelineState {
        let mut inner = self.inner.lock();
        inner.touched = true;
        if n == 0 || (inner.state.is_terminal() && inner.pending() == 0) {
            return inner.state;
        }

        inner.credit.grant(n);
        self.metrics.record_credit(n);
        debug!(requested = n, credit = inner.credit.available(), "credit requested");
        self.delivery.notify_all();
        self.demand.notify_all();
        inner.state
    }

    /// Stop the pipeline and drop everything pending without delivering it.
    ///
    /// Idempotent, and a no-op once another terminal state was reached.
    pub fn cancel(&self) {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return;
        }

        inner.state = PipelineState::Cancelled;
        let dropped = inner.buffer.clear() + usize::from(inner.handoff.take().is_some());
        inner.discards.clear();
        info!(dropped, "pipeline cancelled");
        self.wake_all();
    }

    /// Natural end of stream; `Complete` follows the values already buffered
    pub fn complete(&self) {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return;
        }

        inner.state = PipelineState::Completed;
        info!(pending = inner.pending(), "pipeline completed");
        self.wake_all();
    }

    /// Unrecoverable error; pending values are dropped and `Failure` is next
    pub fn fail(&self, kind: ErrorKind) {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return;
        }
        self.fail_locked(&mut inner, kind);
    }

    /// Block until the sink side has something to receive.
    ///
    /// Returns `None` once the pipeline is closed and everything deliverable
    /// has been taken.
    pub fn take(&self) -> Option<Event<T>> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(event) = self.next_locked(&mut inner) {
                return Some(event);
            }
            if inner.is_closed() {
                return None;
            }
            inner.sink_waiting = inner.sink_can_accept() && inner.pending() == 0;
            self.delivery.wait(&mut inner);
            inner.sink_waiting = false;
        }
    }

    /// Like [`take`](Self::take) but gives up after `timeout`
    pub fn take_timeout(&self, timeout: Duration) -> Option<Event<T>> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(event) = self.next_locked(&mut inner) {
                return Some(event);
            }
            if inner.is_closed() {
                return None;
            }
            inner.sink_waiting = inner.sink_can_accept() && inner.pending() == 0;
            let timed_out = self.delivery.wait_for(&mut inner, timeout).timed_out();
            inner.sink_waiting = false;
            if timed_out {
                return self.next_locked(&mut inner);
            }
        }
    }

    /// Whatever is deliverable right now, without waiting
    pub fn try_take(&self) -> Option<Event<T>> {
        let mut inner = self.inner.lock();
        self.next_locked(&mut inner)
    }

    /// Block a demand-driven source until unused credit exceeds the values
    /// already pending, or the pipeline ends. Push discipline never waits.
    pub fn await_demand(&self) -> PipelineState {
        let mut inner = self.inner.lock();
        loop {
            if inner.state.is_terminal() || inner.discipline == Discipline::Push {
                return inner.state;
            }
            if inner.credit.available() > inner.pending() as u64 {
                return inner.state;
            }
            self.demand.wait(&mut inner);
        }
    }

    pub fn state(&self) -> PipelineState {
        self.inner.lock().state
    }

    /// The failure that ended the pipeline, if it errored
    pub fn failure(&self) -> Option<ErrorKind> {
        self.inner.lock().failure.clone()
    }

    /// Unused demand credit
    pub fn credit(&self) -> u64 {
        self.inner.lock().credit.available()
    }

    /// Values accepted but not yet taken by the sink
    pub fn pending(&self) -> usize {
        self.inner.lock().pending()
    }

    pub fn buffered_len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    pub fn mode(&self) -> OverflowMode {
        self.inner.lock().buffer.mode()
    }

    pub fn discipline(&self) -> Discipline {
        self.inner.lock().discipline
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    fn next_locked(&self, inner: &mut MutexGuard<'_, Inner<T>>) -> Option<Event<T>> {
        if let Some(dropped) = inner.discards.pop_front() {
            return Some(Event::Discarded(dropped));
        }

        match inner.state {
            PipelineState::Cancelled => return None,
            PipelineState::Errored => {
                if inner.terminal_sent {
                    return None;
                }
                inner.terminal_sent = true;
                let kind = inner.failure.clone().unwrap_or(ErrorKind::Overloaded);
                return Some(Event::Signal(Signal::Failure(kind)));
            }
            PipelineState::Active | PipelineState::Completed => {}
        }

        if inner.pending() > 0 {
            if inner.discipline == Discipline::DemandDriven && !inner.credit.consume() {
                return None;
            }
            let value = match inner.handoff.take() {
                Some(value) => Some(value),
                None => inner.buffer.pop(),
            };
            if let Some(value) = value {
                self.metrics.record_delivered();
                trace!(credit = inner.credit.available(), "value delivered");
                return Some(Event::Signal(Signal::Value(value)));
            }
        }

        if inner.state == PipelineState::Completed && !inner.terminal_sent {
            inner.terminal_sent = true;
            return Some(Event::Signal(Signal::Complete));
        }
        None
    }

    fn discard(&self, inner: &mut MutexGuard<'_, Inner<T>>, value: T, reason: &'static str) {
        inner.discards.push_back(value);
        self.metrics.record_discarded();
        debug!(reason, mode = %inner.buffer.mode(), "value discarded");
        self.delivery.notify_one();
    }

    fn fail_locked(&self, inner: &mut MutexGuard<'_, Inner<T>>, kind: ErrorKind) {
        inner.state = PipelineState::Errored;
        let dropped = inner.buffer.clear() + usize::from(inner.handoff.take().is_some());
        warn!(error = %kind, dropped, "pipeline failed");
        inner.failure = Some(kind);
        self.wake_all();
    }

    fn wake_all(&self) {
        self.delivery.notify_all();
        self.demand.notify_all();
    }
}
