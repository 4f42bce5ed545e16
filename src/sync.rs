//! Small synchronisation helpers shared across the crate.

use std::sync::{Mutex, MutexGuard};

/// Acquire mutex guard, ignoring poisoning
///
/// Every critical section guarded this way leaves the data consistent
/// before it can panic, so a poisoned lock still holds usable state.
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
