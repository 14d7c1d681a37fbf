// SPDX-FileCopyrightText: 2023 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

use super::{Lockable, UniversalLockId};
use std::fmt;

/// [`ReadAccess`] records a read of a record and the version observed at the time.
pub struct ReadAccess<'r, L: Lockable> {
    lock: &'r L,
    observed_version: u64,
}

/// [`WriteAccess`] records a pending write of a record.
///
/// Writes on the same record are ordered by their write ordinals.
pub struct WriteAccess<'r, L: Lockable> {
    id: UniversalLockId,
    lock: &'r L,
    ordinal: u32,
    value: u64,
}

/// [`AccessSets`] holds the read set and the write set of a transaction attempt.
///
/// Both sets are allocated once, and reused by subsequent attempts.
pub struct AccessSets<'r, L: Lockable> {
    read_set: Vec<ReadAccess<'r, L>>,
    write_set: Vec<WriteAccess<'r, L>>,
    capacity: usize,
}

impl<'r, L: Lockable> ReadAccess<'r, L> {
    /// Creates a new [`ReadAccess`].
    #[inline]
    pub fn new(lock: &'r L, observed_version: u64) -> ReadAccess<'r, L> {
        ReadAccess {
            lock,
            observed_version,
        }
    }

    /// Returns the record lock.
    #[inline]
    pub fn lock(&self) -> &'r L {
        self.lock
    }

    /// Returns the version observed by the read.
    #[inline]
    pub fn observed_version(&self) -> u64 {
        self.observed_version
    }

    /// Returns `true` if the record has not been modified since the read.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.lock.version() == self.observed_version
    }
}

impl<'r, L: Lockable> WriteAccess<'r, L> {
    /// Creates a new [`WriteAccess`].
    #[inline]
    pub fn new(lock: &'r L, ordinal: u32, value: u64) -> WriteAccess<'r, L> {
        WriteAccess {
            id: lock.universal_lock_id(),
            lock,
            ordinal,
            value,
        }
    }

    /// Returns the [`UniversalLockId`] of the record lock.
    #[inline]
    pub fn id(&self) -> UniversalLockId {
        self.id
    }

    /// Returns the record lock.
    #[inline]
    pub fn lock(&self) -> &'r L {
        self.lock
    }

    /// Returns the write ordinal.
    #[inline]
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    /// Returns the value to be written.
    #[inline]
    pub fn value(&self) -> u64 {
        self.value
    }
}

impl<'r, L: Lockable> AccessSets<'r, L> {
    /// Creates a new [`AccessSets`] that can hold up to `capacity` reads and `capacity` writes.
    #[inline]
    #[must_use]
    pub fn new(capacity: usize) -> AccessSets<'r, L> {
        AccessSets {
            read_set: Vec::with_capacity(capacity),
            write_set: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a read.
    ///
    /// # Panics
    ///
    /// Panics if the read set is full.
    #[inline]
    pub fn add_read(&mut self, lock: &'r L, observed_version: u64) {
        assert!(self.read_set.len() < self.capacity, "read set capacity exceeded");
        self.read_set.push(ReadAccess::new(lock, observed_version));
    }

    /// Adds a write, and returns its write ordinal.
    ///
    /// # Panics
    ///
    /// Panics if the write set is full.
    #[inline]
    pub fn add_write(&mut self, lock: &'r L, value: u64) -> u32 {
        assert!(self.write_set.len() < self.capacity, "write set capacity exceeded");
        let ordinal = u32::try_from(self.write_set.len()).unwrap_or(u32::MAX);
        self.write_set.push(WriteAccess::new(lock, ordinal, value));
        ordinal
    }

    /// Returns the latest pending write of the record.
    #[inline]
    pub fn pending_write(&self, lock: &L) -> Option<&WriteAccess<'r, L>> {
        let id = lock.universal_lock_id();
        self.write_set
            .iter()
            .filter(|w| w.id == id)
            .max_by_key(|w| w.ordinal)
    }

    /// Sorts the write set by [`UniversalLockId`], and then by write ordinal.
    #[inline]
    pub fn sort_write_set(&mut self) {
        self.write_set.sort_unstable_by_key(|w| (w.id, w.ordinal));
    }

    /// Returns the read set.
    #[inline]
    pub fn read_set(&self) -> &[ReadAccess<'r, L>] {
        &self.read_set
    }

    /// Returns the write set.
    #[inline]
    pub fn write_set(&self) -> &[WriteAccess<'r, L>] {
        &self.write_set
    }

    /// Returns the total number of accesses.
    #[inline]
    pub fn len(&self) -> usize {
        self.read_set.len() + self.write_set.len()
    }

    /// Returns `true` if nothing was accessed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read_set.is_empty() && self.write_set.is_empty()
    }

    /// Clears both sets without freeing memory.
    #[inline]
    pub fn clear(&mut self) {
        self.read_set.clear();
        self.write_set.clear();
    }
}

impl<'r, L: Lockable> Clone for ReadAccess<'r, L> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<'r, L: Lockable> Copy for ReadAccess<'r, L> {}

impl<'r, L: Lockable> fmt::Debug for ReadAccess<'r, L> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadAccess")
            .field("id", &self.lock.universal_lock_id())
            .field("observed_version", &self.observed_version)
            .finish()
    }
}

impl<'r, L: Lockable> Clone for WriteAccess<'r, L> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<'r, L: Lockable> Copy for WriteAccess<'r, L> {}

impl<'r, L: Lockable> fmt::Debug for WriteAccess<'r, L> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteAccess")
            .field("id", &self.id)
            .field("ordinal", &self.ordinal)
            .field("value", &self.value)
            .finish()
    }
}

impl<'r, L: Lockable> fmt::Debug for AccessSets<'r, L> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessSets")
            .field("read_set", &self.read_set)
            .field("write_set", &self.write_set)
            .finish()
    }
}
