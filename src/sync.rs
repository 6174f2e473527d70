// Lock helpers shared by the sequencer and the synthesizer

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Acquire a mutex, taking over the data if a previous holder panicked
///
/// Guarded state here is plain bookkeeping (note and voice maps), which
/// stays consistent across a panic in an unrelated caller.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Current wall-clock time in seconds since the Unix epoch
pub fn wall_clock_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
