use serde::{Deserialize, Serialize};
use std::fmt;

/// Which value to give up when a `Buffered` slot is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Evict the earliest-arrived, not-yet-delivered value
    DropOldest,
    /// Discard the arriving value and leave the buffer unchanged
    DropLatest,
}

/// Admission rule applied by the flow controller to each arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverflowMode {
    /// A second undelivered value is fatal (`Overloaded`)
    #[default]
    UnboundedFail,
    /// Arrivals beyond the single in-flight slot are discarded
    DropNew,
    /// A new arrival overwrites the pending slot
    DropOldestOutstanding,
    /// Same overwrite rule: only the most recent arrival is kept
    KeepLatest,
    /// Ordered buffer of `capacity` values with an eviction policy
    Buffered {
        capacity: usize,
        eviction: EvictionPolicy,
    },
}

impl OverflowMode {
    /// Maximum number of undelivered values the mode holds
    pub fn capacity(&self) -> usize {
        match self {
            OverflowMode::Buffered { capacity, .. } => *capacity,
            _ => 1,
        }
    }
}

impl fmt::Display for OverflowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowMode::UnboundedFail => f.write_str("unbounded-fail"),
            OverflowMode::DropNew => f.write_str("push-drop-new"),
            OverflowMode::DropOldestOutstanding => f.write_str("push-drop-oldest-outstanding"),
            OverflowMode::KeepLatest => f.write_str("push-keep-latest-outstanding"),
            OverflowMode::Buffered { capacity, eviction } => {
                write!(f, "buffered({capacity}, {eviction:?})")
            }
        }
    }
}

/// Outcome of the overflow decision for one arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Append the arrival to the back of the buffer
    Accept,
    /// Drop the front of the buffer, then append the arrival
    EvictOldest,
    /// Discard the arrival; the buffer is unchanged
    RejectNew,
    /// Fatal overflow: the pipeline fails with `Overloaded`
    Overflow,
}

/// Decide what happens to an arrival given how many values are pending.
///
/// Pure: the caller owns the buffer and applies the result.
pub fn admit(mode: OverflowMode, pending: usize) -> Admission {
    if pending < mode.capacity() {
        return Admission::Accept;
    }

    match mode {
        OverflowMode::UnboundedFail => Admission::Overflow,
        OverflowMode::DropNew => Admission::RejectNew,
        OverflowMode::DropOldestOutstanding | OverflowMode::KeepLatest => Admission::EvictOldest,
        OverflowMode::Buffered {
            eviction: EvictionPolicy::DropOldest,
            ..
        } if pending > 0 => Admission::EvictOldest,
        // Zero capacity: there is nothing older to evict
        OverflowMode::Buffered { .. } => Admission::RejectNew,
    }
}

/// How the source paces itself against the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    /// Emit on the source's own schedule; credit is ignored
    #[default]
    Push,
    /// Emit only while the sink has outstanding credit
    DemandDriven,
}

/// Number of values the sink is currently willing to accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DemandCredit(u64);

impl DemandCredit {
    pub fn new() -> Self {
        Self(0)
    }

    /// Add `n` to the outstanding credit, saturating
    pub fn grant(&mut self, n: u64) {
        self.0 = self.0.saturating_add(n);
    }

    /// Take one unit of credit for a delivery; false if none is left
    pub fn consume(&mut self) -> bool {
        if self.0 == 0 {
            return false;
        }
        self.0 -= 1;
        true
    }

    pub fn available(&self) -> u64 {
        self.0
    }

    pub fn is_exhausted(&self) -> bool {
        self.0 == 0
    }
}
