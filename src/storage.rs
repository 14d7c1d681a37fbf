// SPDX-FileCopyrightText: 2023 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

use super::{Error, Lockable, QueueLock, RwSpinLock};
use scc::HashMap;
use std::fmt;
use std::hint;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::atomic::{fence, AtomicU64, AtomicU8};

/// The version word carries this bit while a new value is being installed.
const BEING_WRITTEN: u64 = 1_u64 << 63;

/// [`Record`] is a single-word record guarded by its own lock object.
///
/// The version is incremented each time a new value is installed, and installing a value
/// requires the exclusive lock. Optimistic readers never wait for the lock; they only wait for an
/// ongoing installation to finish.
#[derive(Debug, Default)]
pub struct Record {
    lock: RwSpinLock,
    version: AtomicU64,
    hotness: Hotness,
    value: AtomicU64,
}

/// [`Hotness`] is a probabilistic contention counter.
///
/// Increments from `0` to `1` always succeed, and each subsequent increment succeeds with half
/// the probability of the previous one, so the counter grows logarithmically.
#[derive(Debug, Default)]
pub struct Hotness(AtomicU8);

/// [`Table`] is a fixed set of [`Record`] instances identified by `u64` keys.
pub struct Table {
    records: Vec<Record>,
    index: HashMap<u64, usize>,
}

impl Record {
    /// Creates a new [`Record`] holding the value.
    #[inline]
    #[must_use]
    pub fn new(value: u64) -> Record {
        Record {
            value: AtomicU64::new(value),
            ..Record::default()
        }
    }

    /// Reads a consistent pair of the version and the value without locking the record.
    ///
    /// # Examples
    ///
    /// ```
    /// use sap_tsf_locklist::Record;
    ///
    /// let record = Record::new(11);
    /// assert_eq!(record.read_optimistic(), (0, 11));
    /// ```
    #[inline]
    pub fn read_optimistic(&self) -> (u64, u64) {
        loop {
            let version = self.version.load(Acquire);
            if version & BEING_WRITTEN == 0 {
                let value = self.value.load(Acquire);
                if self.version.load(Acquire) == version {
                    return (version, value);
                }
            }
            hint::spin_loop();
        }
    }

    /// Reads the version and the value of the record locked by the caller.
    #[inline]
    pub fn read_locked(&self) -> (u64, u64) {
        (self.version.load(Acquire), self.value.load(Acquire))
    }

    /// Installs a new value, and returns the new version.
    ///
    /// The caller must be holding the exclusive lock on the record.
    #[inline]
    pub fn install(&self, value: u64) -> u64 {
        debug_assert!(self.lock.is_write_locked());
        let version = self.version.load(Relaxed);
        self.version.store(version | BEING_WRITTEN, Relaxed);
        fence(Release);
        self.value.store(value, Relaxed);
        self.version.store(version + 1, Release);
        version + 1
    }

    /// Bumps the hotness of the record.
    #[inline]
    pub fn increment_hotness(&self) {
        self.hotness.increment();
    }
}

impl Lockable for Record {
    type Lock = RwSpinLock;

    #[inline]
    fn queue_lock(&self) -> &RwSpinLock {
        &self.lock
    }

    #[inline]
    fn version(&self) -> u64 {
        self.version.load(Acquire)
    }

    #[inline]
    fn hotness(&self) -> u32 {
        u32::from(self.hotness.value())
    }
}

impl Hotness {
    /// Returns the current value.
    #[inline]
    pub fn value(&self) -> u8 {
        self.0.load(Relaxed)
    }

    /// Increments the counter with the probability of `2^-value`.
    ///
    /// Concurrent increments may be lost.
    #[inline]
    pub fn increment(&self) {
        let value = self.0.load(Relaxed);
        if value == u8::MAX {
            return;
        }
        let mask = (1_u64 << u32::from(value).min(63)) - 1;
        if value == 0 || rand::random::<u64>() & mask == 0 {
            self.0.store(value + 1, Relaxed);
        }
    }
}

impl Table {
    /// Creates a new [`Table`] with a zero-valued [`Record`] for each key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UniquenessViolation`] if a key appears more than once.
    ///
    /// # Examples
    ///
    /// ```
    /// use sap_tsf_locklist::{Error, Table};
    ///
    /// let table = Table::new(0..4).unwrap();
    /// assert_eq!(table.len(), 4);
    /// assert!(table.get(3).is_ok());
    /// assert_eq!(table.get(4).err(), Some(Error::NotFound));
    /// assert_eq!(Table::new([1, 1]).err(), Some(Error::UniquenessViolation));
    /// ```
    #[inline]
    pub fn new<I: IntoIterator<Item = u64>>(keys: I) -> Result<Table, Error> {
        let keys: Vec<u64> = keys.into_iter().collect();
        let records = keys.iter().map(|_| Record::default()).collect();
        let index = HashMap::default();
        for (slot, key) in keys.into_iter().enumerate() {
            index
                .insert(key, slot)
                .map_err(|_| Error::UniquenessViolation)?;
        }
        Ok(Table { records, index })
    }

    /// Returns a reference to the [`Record`] associated with the key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key does not exist.
    #[inline]
    pub fn get(&self, key: u64) -> Result<&Record, Error> {
        self.index
            .read(&key, |_, slot| *slot)
            .map(|slot| &self.records[slot])
            .ok_or(Error::NotFound)
    }

    /// Returns the number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the table has no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns an iterator over records.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

impl fmt::Debug for Table {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("len", &self.records.len())
            .finish()
    }
}
