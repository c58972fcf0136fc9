//! Runtime configuration.

use std::time::Duration;

/// Configuration of a process context.
///
/// Built once and handed to [`ProcessContext`](crate::ProcessContext); every
/// evaluator on every thread reads the same values.
#[derive(Debug, Clone)]
pub struct Config {
    /// Disable `assert` statements (`__debug__` becomes `False`)
    pub optimize: bool,

    /// Maximum number of active frames (stack overflow protection)
    pub max_frames: usize,

    /// Emit a trace event for every scheduler step
    pub trace_steps: bool,

    /// Garbage collector settings
    pub gc: GcConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            optimize: false,
            max_frames: 1000,
            trace_steps: false,
            gc: GcConfig::default(),
        }
    }
}

impl Config {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the frame limit.
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Skip `assert` statements.
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Trace every scheduler step.
    pub fn with_trace_steps(mut self, trace_steps: bool) -> Self {
        self.trace_steps = trace_steps;
        self
    }

    /// Replace the collector settings.
    pub fn with_gc(mut self, gc: GcConfig) -> Self {
        self.gc = gc;
        self
    }
}

/// Garbage collector configuration.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Run scans on a background thread; otherwise only on
    /// [`GarbageCollector::collect`](crate::collector::GarbageCollector::collect)
    pub background: bool,

    /// Pause between background scan iterations
    pub scan_interval: Duration,

    /// Run the cycle trace every this many scans (0 disables periodic tracing)
    pub trace_every: u32,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            background: true,
            scan_interval: Duration::from_millis(10),
            trace_every: 64,
        }
    }
}

impl GcConfig {
    /// Collector that only runs when asked.
    pub fn manual() -> Self {
        Self {
            background: false,
            ..Self::default()
        }
    }
}
