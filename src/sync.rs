//! Internal mutex selection: `std::sync::Mutex` by default, `parking_lot`
//! behind the `parking_lot` feature.

#[cfg(feature = "parking_lot")]
mod imp {
    pub(crate) type Mutex<T> = parking_lot::Mutex<T>;
    pub(crate) type MutexGuard<'a, T> = parking_lot::MutexGuard<'a, T>;

    #[inline]
    pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock()
    }
}

#[cfg(not(feature = "parking_lot"))]
mod imp {
    pub(crate) type Mutex<T> = std::sync::Mutex<T>;
    pub(crate) type MutexGuard<'a, T> = std::sync::MutexGuard<'a, T>;

    #[inline]
    pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        // A poisoned pool mutex only means another thread panicked mid-update;
        // the protected structures stay structurally valid.
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub(crate) use imp::{lock, Mutex};
