// SPDX-FileCopyrightText: 2023 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

use std::hint;
use std::num::NonZeroU32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::thread;

/// [`SlotHandle`] is an opaque capability issued by a [`QueueLock`] on successful acquisition.
///
/// The handle has to be handed back to the same [`QueueLock`] in order to release the lock.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SlotHandle(NonZeroU32);

/// [`QueueLock`] is the reader-writer lock primitive attached to each lock object.
///
/// Lock lists only rely on this contract; queueing and fairness are up to the implementation.
pub trait QueueLock: Sync {
    /// Acquires the exclusive lock, waiting as long as it takes.
    fn acquire_writer(&self) -> SlotHandle;

    /// Tries to acquire the exclusive lock within `spins` attempts.
    fn try_acquire_writer(&self, spins: u32) -> Option<SlotHandle>;

    /// Tries to acquire a shared lock within `spins` attempts.
    fn try_acquire_reader(&self, spins: u32) -> Option<SlotHandle>;

    /// Tries to upgrade the shared lock identified by `slot` to the exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns the original `slot` if the upgrade did not succeed within `spins` attempts; the
    /// shared lock is still held in that case.
    fn try_upgrade(&self, slot: SlotHandle, spins: u32) -> Result<SlotHandle, SlotHandle>;

    /// Releases the lock identified by `slot`.
    fn release(&self, slot: SlotHandle);

    /// Returns `true` if any thread is holding the exclusive lock.
    fn is_write_locked(&self) -> bool;
}

/// [`RwSpinLock`] is a reader-writer spin lock implementing [`QueueLock`].
///
/// Waiters spin on the lock word and yield the processor from time to time.
#[derive(Debug, Default)]
pub struct RwSpinLock {
    state: AtomicUsize,
}

impl SlotHandle {
    /// Creates a [`SlotHandle`] out of a raw value chosen by a [`QueueLock`] implementation.
    #[inline]
    #[must_use]
    pub const fn new(raw: NonZeroU32) -> SlotHandle {
        SlotHandle(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> NonZeroU32 {
        self.0
    }
}

impl RwSpinLock {
    /// Indicates that the lock is exclusively owned.
    const EXCLUSIVE: usize = 1_usize << (usize::BITS - 1);

    /// Represents a single shared owner.
    const SHARED: usize = 1;

    /// Number of failed attempts after which a blocking waiter yields the processor.
    const SPINS_BEFORE_YIELD: u32 = 64;

    /// Handle issued to shared owners.
    const READER_SLOT: SlotHandle = SlotHandle(match NonZeroU32::new(1) {
        Some(v) => v,
        None => unreachable!(),
    });

    /// Handle issued to the exclusive owner.
    const WRITER_SLOT: SlotHandle = SlotHandle(match NonZeroU32::new(2) {
        Some(v) => v,
        None => unreachable!(),
    });

    /// Returns `true` if nobody holds the lock.
    ///
    /// # Examples
    ///
    /// ```
    /// use sap_tsf_locklist::{QueueLock, RwSpinLock};
    ///
    /// let lock = RwSpinLock::default();
    /// assert!(lock.is_free());
    ///
    /// let slot = lock.acquire_writer();
    /// assert!(!lock.is_free());
    ///
    /// lock.release(slot);
    /// assert!(lock.is_free());
    /// ```
    #[inline]
    pub fn is_free(&self) -> bool {
        self.state.load(Relaxed) == 0
    }

    /// Returns the number of shared owners.
    #[inline]
    pub fn num_readers(&self) -> usize {
        let state = self.state.load(Relaxed);
        if state & Self::EXCLUSIVE == 0 {
            state
        } else {
            0
        }
    }

    fn try_lock_exclusive_internal(&self) -> bool {
        self.state
            .compare_exchange(0, Self::EXCLUSIVE, Acquire, Relaxed)
            .is_ok()
    }

    fn try_lock_shared_internal(&self) -> bool {
        let state = self.state.load(Relaxed);
        if state & Self::EXCLUSIVE != 0 || state == Self::EXCLUSIVE - 1 {
            return false;
        }
        self.state
            .compare_exchange(state, state + Self::SHARED, Acquire, Relaxed)
            .is_ok()
    }

    fn try_upgrade_internal(&self) -> bool {
        self.state
            .compare_exchange(Self::SHARED, Self::EXCLUSIVE, Acquire, Relaxed)
            .is_ok()
    }

    /// Retries `f` up to `spins + 1` times.
    fn bounded_spin<F: Fn(&Self) -> bool>(&self, spins: u32, f: F) -> bool {
        for _ in 0..spins {
            if f(self) {
                return true;
            }
            hint::spin_loop();
        }
        f(self)
    }
}

impl QueueLock for RwSpinLock {
    #[inline]
    fn acquire_writer(&self) -> SlotHandle {
        let mut failures = 0_u32;
        while !self.try_lock_exclusive_internal() {
            failures += 1;
            if failures % Self::SPINS_BEFORE_YIELD == 0 {
                thread::yield_now();
            } else {
                hint::spin_loop();
            }
        }
        Self::WRITER_SLOT
    }

    #[inline]
    fn try_acquire_writer(&self, spins: u32) -> Option<SlotHandle> {
        self.bounded_spin(spins, Self::try_lock_exclusive_internal)
            .then_some(Self::WRITER_SLOT)
    }

    #[inline]
    fn try_acquire_reader(&self, spins: u32) -> Option<SlotHandle> {
        self.bounded_spin(spins, Self::try_lock_shared_internal)
            .then_some(Self::READER_SLOT)
    }

    #[inline]
    fn try_upgrade(&self, slot: SlotHandle, spins: u32) -> Result<SlotHandle, SlotHandle> {
        debug_assert_eq!(slot, Self::READER_SLOT);
        if self.bounded_spin(spins, Self::try_upgrade_internal) {
            Ok(Self::WRITER_SLOT)
        } else {
            Err(slot)
        }
    }

    #[inline]
    fn release(&self, slot: SlotHandle) {
        if slot == Self::WRITER_SLOT {
            debug_assert_eq!(self.state.load(Relaxed), Self::EXCLUSIVE);
            self.state.store(0, Release);
        } else {
            debug_assert_eq!(slot, Self::READER_SLOT);
            let prev = self.state.fetch_sub(Self::SHARED, Release);
            debug_assert!(prev != 0 && prev & Self::EXCLUSIVE == 0);
        }
    }

    #[inline]
    fn is_write_locked(&self) -> bool {
        self.state.load(Acquire) & Self::EXCLUSIVE != 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::{Arc, Barrier};
    use std::time::{Duration, Instant};

    #[test]
    fn shared_and_exclusive() {
        let lock = RwSpinLock::default();
        let r1 = lock.try_acquire_reader(0).unwrap();
        let r2 = lock.try_acquire_reader(0).unwrap();
        assert_eq!(lock.num_readers(), 2);
        assert!(lock.try_acquire_writer(16).is_none());
        assert!(!lock.is_write_locked());

        // Upgrading is impossible while another reader is present.
        let r1 = lock.try_upgrade(r1, 16).unwrap_err();
        lock.release(r2);
        let w = lock.try_upgrade(r1, 16).unwrap();
        assert!(lock.is_write_locked());
        assert!(lock.try_acquire_reader(16).is_none());
        lock.release(w);
        assert!(lock.is_free());
    }

    #[test]
    fn bounded_try_lock() {
        let lock = Arc::new(RwSpinLock::default());
        let slot = lock.acquire_writer();
        let lock_clone = lock.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let result = lock_clone.try_acquire_writer(5000);
            (result.is_none(), start.elapsed())
        });
        let (failed, elapsed) = handle.join().unwrap();
        assert!(failed);
        assert!(elapsed < Duration::from_secs(10));
        lock.release(slot);
    }

    #[test]
    fn mutual_exclusion() {
        let num_threads = 8;
        let lock = Arc::new(RwSpinLock::default());
        let counter = Arc::new(AtomicU64::new(0));
        let barrier = Arc::new(Barrier::new(num_threads));
        let mut thread_handles = Vec::with_capacity(num_threads);
        for _ in 0..num_threads {
            let lock_clone = lock.clone();
            let counter_clone = counter.clone();
            let barrier_clone = barrier.clone();
            thread_handles.push(thread::spawn(move || {
                barrier_clone.wait();
                for _ in 0..1024 {
                    let slot = lock_clone.acquire_writer();
                    // Non-atomic read-modify-write protected by the lock.
                    let value = counter_clone.load(Relaxed);
                    counter_clone.store(value + 1, Relaxed);
                    lock_clone.release(slot);
                }
            }));
        }
        for handle in thread_handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Relaxed), 8 * 1024);
        assert!(lock.is_free());
    }
}
