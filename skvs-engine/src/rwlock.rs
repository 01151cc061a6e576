//! # Fair Reader-Writer Lock
//!
//! A reader-writer lock that admits writers strictly in arrival order while
//! letting readers share access.
//!
//! ## Design Principles
//!
//! 1. **Ticket FIFO**: Every writer draws a ticket and joins a bounded ring;
//!    only the ticket at the head may take the lock, so writers never starve
//!    each other.
//! 2. **Read Announce**: A reader bumps `readers_present` *before* it waits.
//!    The counter both blocks writers and tells a releasing writer that
//!    readers are parked.
//! 3. **Reader Priority on Release**: A releasing writer wakes all announced
//!    readers before the next writer.
//! 4. **Loop Re-checks**: Every condvar wait sits in a loop, so spurious or
//!    misdirected wake-ups are harmless.
//!
//! ## Known Limitation
//!
//! Queued writers do not stop new readers from announcing. A steady stream of
//! readers keeps `readers_present` above zero and can starve a writer
//! indefinitely. Writer order among writers is still strict FIFO.
//!
//! ## Layers
//!
//! - [`RawFairLock`] exposes the four acquire/release operations and carries
//!   no data.
//! - [`FairRwLock`] owns the protected value and hands out RAII guards.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use skvs_common::{SkvsError, SkvsResult};

/// Construction parameters shared by every lock of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Number of writer tickets the ring can hold. Sized to the maximum
    /// number of threads that may write concurrently.
    pub ring_capacity: usize,
    /// Sleep injected at the start of every release, to widen race windows
    /// in tests. `Duration::ZERO` disables it.
    pub release_delay: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        LockOptions {
            ring_capacity: skvs_common::DEFAULT_WORKERS,
            release_delay: Duration::ZERO,
        }
    }
}

/// Point-in-time view of a lock's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockStats {
    /// Readers that announced interest and have not released yet.
    pub readers_present: usize,
    /// 1 while a writer holds the lock, else 0.
    pub writers_active: usize,
    /// Writer tickets in the ring, the active writer's included.
    pub queued_writers: usize,
}

struct LockState {
    readers_present: usize,
    writers_active: usize,
    ring: VecDeque<u64>,
    next_ticket: u64,
    // writers parked because the ring was full
    slot_waiters: usize,
}

/// Data-less fair reader-writer lock.
///
/// Callers must pair every `acquire_*` with the matching `release_*` on the
/// same thread of control. [`FairRwLock`] does this automatically.
pub struct RawFairLock {
    state: Mutex<LockState>,
    readers: Condvar,
    writers: Condvar,
    ring_capacity: usize,
    release_delay: Duration,
}

impl RawFairLock {
    /// Creates a lock whose writer ring holds `options.ring_capacity` tickets.
    ///
    /// Fails with `InvalidInput` for a zero-sized ring and `OutOfMemory` if
    /// the ring cannot be allocated.
    pub fn new(options: LockOptions) -> SkvsResult<Self> {
        if options.ring_capacity == 0 {
            return Err(SkvsError::InvalidInput);
        }
        let mut ring = VecDeque::new();
        ring.try_reserve_exact(options.ring_capacity)?;

        Ok(RawFairLock {
            state: Mutex::new(LockState {
                readers_present: 0,
                writers_active: 0,
                ring,
                next_ticket: 0,
                slot_waiters: 0,
            }),
            readers: Condvar::new(),
            writers: Condvar::new(),
            ring_capacity: options.ring_capacity,
            release_delay: options.release_delay,
        })
    }

    /// Announces a reader and blocks while a writer is active.
    pub fn acquire_read(&self) {
        let mut state = self.state.lock();
        state.readers_present += 1;
        while state.writers_active != 0 {
            self.readers.wait(&mut state);
        }
    }

    /// Withdraws a reader; the last one out hands the lock to queued writers.
    pub fn release_read(&self) {
        self.pause();
        let mut state = self.state.lock();
        debug_assert!(state.readers_present > 0, "release_read without acquire_read");
        state.readers_present -= 1;
        if state.readers_present == 0 && !state.ring.is_empty() {
            // Waiters share one condvar; only the head ticket may proceed.
            self.writers.notify_all();
        }
    }

    /// Queues a writer ticket and blocks until it is at the head of the ring
    /// and no reader is announced.
    pub fn acquire_write(&self) {
        let mut state = self.state.lock();
        while state.ring.len() >= self.ring_capacity {
            state.slot_waiters += 1;
            self.writers.wait(&mut state);
            state.slot_waiters -= 1;
        }

        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.ring.push_back(ticket);

        while state.ring.front() != Some(&ticket) || state.readers_present > 0 {
            self.writers.wait(&mut state);
        }
        debug_assert_eq!(state.writers_active, 0);
        state.writers_active = 1;
    }

    /// Releases the write lock, preferring announced readers over the next
    /// writer.
    pub fn release_write(&self) {
        self.pause();
        let mut state = self.state.lock();
        debug_assert_eq!(state.writers_active, 1, "release_write without acquire_write");
        state.writers_active = 0;
        state.ring.pop_front();

        if state.readers_present > 0 {
            self.readers.notify_all();
        } else if !state.ring.is_empty() {
            self.writers.notify_all();
        }
        if state.slot_waiters > 0 {
            self.writers.notify_all();
        }
    }

    /// Returns the current counters.
    pub fn stats(&self) -> LockStats {
        let state = self.state.lock();
        LockStats {
            readers_present: state.readers_present,
            writers_active: state.writers_active,
            queued_writers: state.ring.len(),
        }
    }

    fn pause(&self) {
        if !self.release_delay.is_zero() {
            std::thread::sleep(self.release_delay);
        }
    }
}

impl fmt::Debug for RawFairLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFairLock")
            .field("stats", &self.stats())
            .field("ring_capacity", &self.ring_capacity)
            .finish()
    }
}

/// Fair reader-writer lock that owns the value it protects.
pub struct FairRwLock<T> {
    raw: RawFairLock,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `raw`: shared references only
// exist under read access and the unique reference only under write access.
unsafe impl<T: Send> Send for FairRwLock<T> {}
unsafe impl<T: Send + Sync> Sync for FairRwLock<T> {}

impl<T> FairRwLock<T> {
    /// Wraps `value` in a new lock.
    pub fn new(value: T, options: LockOptions) -> SkvsResult<Self> {
        Ok(FairRwLock {
            raw: RawFairLock::new(options)?,
            data: UnsafeCell::new(value),
        })
    }

    /// Acquires shared access.
    pub fn read(&self) -> FairReadGuard<'_, T> {
        self.raw.acquire_read();
        FairReadGuard { lock: self }
    }

    /// Acquires exclusive access, queuing behind earlier writers.
    pub fn write(&self) -> FairWriteGuard<'_, T> {
        self.raw.acquire_write();
        FairWriteGuard { lock: self }
    }

    /// Borrows the value without locking; exclusivity is proven by `&mut self`.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Current lock counters.
    pub fn stats(&self) -> LockStats {
        self.raw.stats()
    }
}

/// Shared access to the value of a [`FairRwLock`]; releases on drop.
pub struct FairReadGuard<'a, T> {
    lock: &'a FairRwLock<T>,
}

impl<T> Deref for FairReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: read access is held, so no writer holds a `&mut T`.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for FairReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.release_read();
    }
}

/// Exclusive access to the value of a [`FairRwLock`]; releases on drop.
pub struct FairWriteGuard<'a, T> {
    lock: &'a FairRwLock<T>,
}

impl<T> Deref for FairWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: write access is held exclusively.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for FairWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: write access is held exclusively.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for FairWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.release_write();
    }
}
