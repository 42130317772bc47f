//! Operation timing via tracing
//!
//! Every invocation is a short-lived process, so timings are only useful in
//! debug logs. Both the macro and [`Timer`] log at `debug` level.
//!
//! ```rust,no_run
//! use plankit_state::measure_time;
//!
//! let lines = measure_time!("count_lines", {
//!     std::fs::read_to_string("STATE.md").map(|s| s.lines().count())
//! });
//! ```

use std::time::Instant;

/// Measure execution time of a synchronous block
///
/// Logs `operation` and `elapsed_ms` via `tracing::debug!` and returns the
/// value of the block.
#[macro_export]
macro_rules! measure_time {
    ($label:expr, $block:block) => {{
        let __start = std::time::Instant::now();
        let __result = $block;
        let __elapsed = __start.elapsed();
        ::tracing::debug!(
            operation = $label,
            elapsed_ms = __elapsed.as_millis() as u64,
            "Operation completed"
        );
        __result
    }};
}

/// Drop-guard timer for spans that cross several statements.
#[derive(Debug)]
pub struct Timer {
    operation: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        tracing::debug!(
            operation = self.operation,
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            "Operation completed"
        );
    }
}
