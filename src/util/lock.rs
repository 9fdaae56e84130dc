use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Acquire a mutex, recovering the guard if a previous holder panicked.
///
/// Guarded sections in this crate never span an `.await`, so a poisoned lock
/// only means a panic happened mid-update; the data is still structurally valid.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                target_module = target,
                lock_kind = "mutex.lock",
                result = "poisoned_recovered",
                "Recovered from poisoned lock"
            );
            poisoned.into_inner()
        }
    }
}
