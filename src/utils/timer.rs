//! Timer utilities
//!
//! Per-case durations and run phase timing.

use std::fmt;
use std::time::{Duration, Instant};

/// Wall-clock duration of one case body
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
        }
    }

    /// Stop, trace and return elapsed milliseconds
    pub fn stop(self) -> u64 {
        let elapsed = self.start.elapsed().as_millis() as u64;
        tracing::trace!("{}: {}ms", self.label, elapsed);
        elapsed
    }
}

/// Phase timing for a run; displays as `execute=12ms finalize=0ms`
#[derive(Debug)]
pub struct Stopwatch {
    start: Instant,
    last: Instant,
    phases: Vec<(&'static str, Duration)>,
}

impl Stopwatch {
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            phases: Vec::new(),
        }
    }

    /// Close the phase running since the previous lap
    pub fn lap(&mut self, phase: &'static str) {
        let now = Instant::now();
        self.phases.push((phase, now - self.last));
        self.last = now;
    }

    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }
}

impl fmt::Display for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (phase, took)) in self.phases.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}ms", phase, took.as_millis())?;
        }
        Ok(())
    }
}
