//! Transport delay as a fixed-length FIFO of commands.

use std::collections::VecDeque;

use crate::error::{SimError, SimResult};

/// Fixed-length queue of in-flight actuator commands.
///
/// Holds `len` commands. Each [`DeadTimeQueue::push_pop`] appends the newest
/// command and returns the oldest, so a command pushed on step `k` comes out
/// on step `k + len`. The queue starts filled with zeros (heater off).
#[derive(Debug, Clone, PartialEq)]
pub struct DeadTimeQueue {
    buf: VecDeque<f64>,
    len: usize,
}

impl DeadTimeQueue {
    /// Queue sized for `dead_time` seconds at step `dt`:
    /// `round(dead_time / dt)` entries, at least one.
    pub fn new(dead_time: f64, dt: f64) -> SimResult<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::InvalidArg {
                what: "dt must be positive",
            });
        }
        if !(dead_time.is_finite() && dead_time >= 0.0) {
            return Err(SimError::InvalidArg {
                what: "dead_time must be non-negative",
            });
        }
        let len = ((dead_time / dt).round() as usize).max(1);
        Ok(Self::with_len(len))
    }

    /// Queue of exactly `len` entries (at least one).
    pub fn with_len(len: usize) -> Self {
        let len = len.max(1);
        Self {
            buf: std::iter::repeat_n(0.0, len).collect(),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: a queue holds at least one command.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Push `command` at the tail and return the head.
    pub fn push_pop(&mut self, command: f64) -> f64 {
        self.buf.push_back(command);
        // Length is len + 1 here, so the pop always yields a value.
        self.buf.pop_front().unwrap_or(command)
    }

    /// Commands in flight, oldest first.
    pub fn in_flight(&self) -> impl Iterator<Item = f64> + '_ {
        self.buf.iter().copied()
    }
}
