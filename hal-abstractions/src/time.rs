#![deny(unsafe_code)]
#![deny(warnings)]
//! Uptime counter port

/// Free-running millisecond counter
///
/// Starts from zero on every reset, including a wake from deep sleep.
/// Continuity across sleeps is the core's job, not the board's.
pub trait Uptime {
    /// Milliseconds since this wake
    fn uptime_ms(&self) -> u64;
}
