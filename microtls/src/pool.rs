//! Shared arena of record buffers.

use core::fmt;

use zeroize::Zeroize;

use crate::runtime::{Runtime, RuntimeMutex, StdRuntime};

/// A fixed set of reusable record buffers shared by several clients.
///
/// Each client borrows two buffers (read and write) for its lifetime and
/// returns them, wiped, when dropped. Buffers are created up front, so a
/// busy pool fails fast instead of allocating more.
///
/// # Example
///
/// ```rust
/// use microtls::{BufferPool, SpinRuntime};
///
/// let pool = BufferPool::<SpinRuntime>::new(4, 17 * 1024);
/// assert_eq!(pool.available(), 4);
/// ```
pub struct BufferPool<R: Runtime = StdRuntime> {
    buffers: R::Mutex<Vec<Vec<u8>>>,
    capacity: usize,
    buffer_size: usize,
}

impl<R: Runtime> fmt::Debug for BufferPool<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

impl<R: Runtime> BufferPool<R> {
    /// Pool of `count` buffers, each preallocated to `buffer_size` bytes.
    pub fn new(count: usize, buffer_size: usize) -> Self {
        let buffers: Vec<Vec<u8>> = (0..count).map(|_| Vec::with_capacity(buffer_size)).collect();
        Self {
            buffers: RuntimeMutex::new(buffers),
            capacity: count,
            buffer_size,
        }
    }

    /// Buffers not currently lent out.
    pub fn available(&self) -> usize {
        self.buffers.lock(|buffers| buffers.len())
    }

    /// Total buffers owned by the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Borrow two buffers, or none if fewer than two are free.
    pub(crate) fn acquire_pair(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        self.buffers.lock(|buffers| {
            if buffers.len() < 2 {
                return None;
            }
            let read = buffers.pop()?;
            let write = buffers.pop()?;
            Some((read, write))
        })
    }

    /// Return a buffer. Its contents are wiped first.
    pub(crate) fn release(&self, mut buffer: Vec<u8>) {
        buffer.zeroize();
        self.buffers.lock(|buffers| {
            if buffers.len() < self.capacity {
                buffers.push(buffer);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SpinRuntime;

    #[test]
    fn test_acquire_and_release() {
        let pool = BufferPool::<StdRuntime>::new(3, 64);
        let (read, write) = pool.acquire_pair().unwrap();
        assert_eq!(pool.available(), 1);
        assert!(read.capacity() >= 64);
        assert!(pool.acquire_pair().is_none());

        pool.release(read);
        pool.release(write);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_released_buffers_are_wiped() {
        let pool = BufferPool::<SpinRuntime>::new(2, 16);
        let (mut read, write) = pool.acquire_pair().unwrap();
        read.extend_from_slice(b"session secret");
        pool.release(read);
        pool.release(write);

        let (a, b) = pool.acquire_pair().unwrap();
        assert!(a.is_empty());
        assert!(b.is_empty());
    }

    #[test]
    fn test_pool_never_grows() {
        let pool = BufferPool::<StdRuntime>::new(2, 16);
        pool.release(Vec::new());
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.capacity(), 2);
    }
}
