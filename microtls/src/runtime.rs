//! Runtime services the client needs from its platform.
//!
//! The only service is a mutex, used by [`BufferPool`](crate::BufferPool) to
//! share record buffers between clients. Hosted targets use
//! [`StdRuntime`]; targets without an OS scheduler use [`SpinRuntime`].

use std::sync::PoisonError;

/// A mutex whose guard never escapes: the value is only reachable inside
/// [`RuntimeMutex::lock`].
pub trait RuntimeMutex<T> {
    /// Create the mutex around `value`.
    fn new(value: T) -> Self;

    /// Run `f` with exclusive access to the value.
    fn lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U;
}

/// Platform services.
pub trait Runtime: 'static {
    /// Mutex implementation for this platform.
    type Mutex<T>: RuntimeMutex<T>;
}

/// Runtime backed by `std::sync`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdRuntime;

/// Runtime backed by spin locks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinRuntime;

/// [`std::sync::Mutex`] adapter.
#[derive(Debug, Default)]
pub struct StdMutex<T>(std::sync::Mutex<T>);

impl<T> RuntimeMutex<T> for StdMutex<T> {
    fn new(value: T) -> Self {
        Self(std::sync::Mutex::new(value))
    }

    fn lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        // Callers only push and pop whole values; a poisoned lock is still consistent.
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// [`spin::Mutex`] adapter.
#[derive(Debug, Default)]
pub struct SpinMutex<T>(spin::Mutex<T>);

impl<T> RuntimeMutex<T> for SpinMutex<T> {
    fn new(value: T) -> Self {
        Self(spin::Mutex::new(value))
    }

    fn lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        f(&mut self.0.lock())
    }
}

impl Runtime for StdRuntime {
    type Mutex<T> = StdMutex<T>;
}

impl Runtime for SpinRuntime {
    type Mutex<T> = SpinMutex<T>;
}
