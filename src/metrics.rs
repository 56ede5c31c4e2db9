use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window of sink handling times
#[derive(Debug, Clone)]
pub struct PercentileTracker {
    samples: Arc<Mutex<VecDeque<Duration>>>,
    window_size: usize,
}

impl PercentileTracker {
    pub fn new(window_size: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(window_size))),
            window_size: window_size.max(1),
        }
    }

    pub fn record(&self, sample: Duration) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.window_size {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Percentile of the window in microseconds, `p` in `0.0..=1.0`
    pub fn percentile_us(&self, p: f64) -> f64 {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<Duration> = samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = ((sorted.len() as f64 * p).ceil() as usize)
            .saturating_sub(1)
            .min(sorted.len() - 1);
        sorted[idx].as_secs_f64() * 1_000_000.0
    }

    pub fn count(&self) -> usize {
        self.samples.lock().len()
    }
}

/// Counters shared by the source side, the flow controller and the sink side
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    emitted: Arc<AtomicU64>,
    accepted: Arc<AtomicU64>,
    delivered: Arc<AtomicU64>,
    discarded: Arc<AtomicU64>,
    credit_requested: Arc<AtomicU64>,
    /// Nanoseconds since `start_time` of the last source emission
    last_emission_ns: Arc<AtomicU64>,
    handling: PercentileTracker,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            emitted: Arc::new(AtomicU64::new(0)),
            accepted: Arc::new(AtomicU64::new(0)),
            delivered: Arc::new(AtomicU64::new(0)),
            discarded: Arc::new(AtomicU64::new(0)),
            credit_requested: Arc::new(AtomicU64::new(0)),
            last_emission_ns: Arc::new(AtomicU64::new(0)),
            handling: PercentileTracker::new(1000),
            start_time: Instant::now(),
        }
    }

    /// Record a source emission and return its offset from pipeline start
    pub fn record_emission(&self) -> Duration {
        let offset = self.start_time.elapsed();
        self.emitted.fetch_add(1, Ordering::Relaxed);
        self.last_emission_ns
            .store(offset.as_nanos() as u64, Ordering::Relaxed);
        offset
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_credit(&self, n: u64) {
        self.credit_requested.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_handling(&self, elapsed: Duration) {
        self.handling.record(elapsed);
    }

    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn total_accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn total_delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn total_discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn total_credit_requested(&self) -> u64 {
        self.credit_requested.load(Ordering::Relaxed)
    }

    /// Offset of the most recent emission, if any
    pub fn last_emission(&self) -> Option<Duration> {
        match self.total_emitted() {
            0 => None,
            _ => Some(Duration::from_nanos(
                self.last_emission_ns.load(Ordering::Relaxed),
            )),
        }
    }

    /// Delivered values per second since creation
    pub fn throughput_vps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_delivered() as f64 / elapsed
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            emitted: self.total_emitted(),
            accepted: self.total_accepted(),
            delivered: self.total_delivered(),
            discarded: self.total_discarded(),
            credit_requested: self.total_credit_requested(),
            throughput_vps: self.throughput_vps(),
            handling_p50_us: self.handling.percentile_us(0.50),
            handling_p99_us: self.handling.percentile_us(0.99),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub emitted: u64,
    pub accepted: u64,
    pub delivered: u64,
    pub discarded: u64,
    pub credit_requested: u64,
    pub throughput_vps: f64,
    pub handling_p50_us: f64,
    pub handling_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Emitted: {}, Accepted: {}, Delivered: {}, Discarded: {}, Credit: {}, \
             Throughput: {:.2} values/s, Handling P50: {:.2}µs, P99: {:.2}µs, Elapsed: {:.2}s",
            self.emitted,
            self.accepted,
            self.delivered,
            self.discarded,
            self.credit_requested,
            self.throughput_vps,
            self.handling_p50_us,
            self.handling_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}
