// src/sync.rs

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a worker panicked while holding it.
///
/// The guarded state in this crate is always left consistent between
/// statements, so a poisoned lock carries no torn invariant.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
