//! Progress display constants

/// Width of the progress bar display
pub const PROGRESS_BAR_WIDTH: usize = 30;

/// Bytes per kilobyte for display conversions
pub const BYTES_PER_KB: f64 = 1_000.0;

/// Throttle write progress updates to this many milliseconds
pub const UPDATE_THROTTLE_MS: u128 = 100;

// vim: ts=4
