//! A reader-preferring/writer-preferring shared lock exposing distinct
//! read and write handles, rather than a single RAII guard type.
//!
//! `std::sync::RwLock` (and `parking_lot::RwLock`) both hand back a guard
//! tied to a borrow of the lock; the call sites in `ThreadSafeIndex` want a
//! *handle* they can acquire and release independently of Rust's borrow
//! checker, mirroring `ReentrantReadWriteLock::readLock()`/`writeLock()`.
//! `MultiReaderLock` is built directly on `parking_lot::{Mutex, Condvar}`
//! rather than on `std::sync`'s equivalents, for the same reason the rest
//! of this crate's concurrent state reaches for `parking_lot`: uncontended
//! fast paths and no poisoning to thread through every call site.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

struct State {
    readers: u32,
    writer: bool,
    waiting_writers: u32,
}

struct Inner {
    state: Mutex<State>,
    readers_idle: Condvar,
    writer_idle: Condvar,
}

/// A shared lock with independent reader and writer handles.
#[derive(Clone)]
pub struct MultiReaderLock {
    inner: Arc<Inner>,
}

impl MultiReaderLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    readers: 0,
                    writer: false,
                    waiting_writers: 0,
                }),
                readers_idle: Condvar::new(),
                writer_idle: Condvar::new(),
            }),
        }
    }

    /// A handle that may be held by any number of concurrent readers,
    /// provided no writer holds or is waiting to hold the lock.
    pub fn reader(&self) -> ReadHandle {
        ReadHandle {
            inner: self.inner.clone(),
        }
    }

    /// A handle granting exclusive access; excludes all readers and other
    /// writers while held.
    pub fn writer(&self) -> WriteHandle {
        WriteHandle {
            inner: self.inner.clone(),
        }
    }
}

impl Default for MultiReaderLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader handle. `lock()` blocks while a writer holds or is waiting for
/// the lock; `unlock()` releases this reader's hold.
pub struct ReadHandle {
    inner: Arc<Inner>,
}

impl ReadHandle {
    pub fn lock(&self) {
        let mut state = self.inner.state.lock();
        while state.writer || state.waiting_writers > 0 {
            self.inner.writer_idle.wait(&mut state);
        }
        state.readers += 1;
    }

    pub fn unlock(&self) {
        let mut state = self.inner.state.lock();
        debug_assert!(state.readers > 0, "unlock() without matching lock()");
        state.readers -= 1;
        if state.readers == 0 {
            self.inner.readers_idle.notify_all();
        }
    }
}

/// Writer handle. `lock()` blocks until no readers and no other writer
/// hold the lock; `unlock()` releases exclusive access.
pub struct WriteHandle {
    inner: Arc<Inner>,
}

impl WriteHandle {
    pub fn lock(&self) {
        let mut state = self.inner.state.lock();
        state.waiting_writers += 1;
        while state.writer || state.readers > 0 {
            self.inner.readers_idle.wait(&mut state);
        }
        state.waiting_writers -= 1;
        state.writer = true;
    }

    pub fn unlock(&self) {
        let mut state = self.inner.state.lock();
        debug_assert!(state.writer, "unlock() without matching lock()");
        state.writer = false;
        // Wake writers first (they're holding `waiting_writers` above zero,
        // which already blocks new readers); wake readers too so that once
        // the last waiting writer clears, parked readers can proceed.
        self.inner.writer_idle.notify_all();
        self.inner.readers_idle.notify_one();
    }
}

/// Convenience RAII wrapper so call sites that just need the critical
/// section (the common case) don't have to pair `lock()`/`unlock()` calls
/// by hand and risk leaking the lock on an early return.
pub struct ReadGuard<'a>(&'a ReadHandle);

impl<'a> ReadGuard<'a> {
    pub fn acquire(handle: &'a ReadHandle) -> Self {
        handle.lock();
        ReadGuard(handle)
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.0.unlock();
    }
}

pub struct WriteGuard<'a>(&'a WriteHandle);

impl<'a> WriteGuard<'a> {
    pub fn acquire(handle: &'a WriteHandle) -> Self {
        handle.lock();
        WriteGuard(handle)
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.0.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn readers_run_concurrently() {
        let lock = MultiReaderLock::new();
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reader = lock.reader();
                let active = active.clone();
                let max_active = max_active.clone();
                thread::spawn(move || {
                    let _g = ReadGuard::acquire(&reader);
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert!(max_active.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn writer_excludes_readers_and_other_writers() {
        let lock = MultiReaderLock::new();
        let counter = Arc::new(Mutex::new(0i64));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let writer = lock.writer();
                let counter = counter.clone();
                thread::spawn(move || {
                    let _g = WriteGuard::acquire(&writer);
                    let mut c = counter.lock();
                    let seen = *c;
                    thread::sleep(Duration::from_millis(2));
                    *c = seen + 1;
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*counter.lock(), 8);
    }
}
