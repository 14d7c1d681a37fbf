// SPDX-FileCopyrightText: 2023 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

use super::{
    allocate, dump, LockListPosition, RetrospectiveLockList, SortedLockList,
    INVALID_LOCK_LIST_POSITION,
};
use crate::lock_id::NULL_UNIVERSAL_LOCK_ID;
use crate::{Error, LockEntry, LockMode, Lockable, QueueLock, UniversalLockId, WriteAccess};
use std::fmt;
use tracing::trace;

/// [`CurrentLockList`] holds the locks that the running transaction attempt has taken or will
/// take.
///
/// Locks are acquired in ascending [`UniversalLockId`] order whenever possible. Once a lock
/// positioned after the requested one is held, waiting for the requested lock could form a cycle
/// with another worker, therefore only a bounded number of attempts are made in that case.
pub struct CurrentLockList<'r, L: Lockable> {
    /// The buffer; the first entry is the sentinel.
    array: Box<[LockEntry<'r, L>]>,

    /// The position of the last valid entry.
    last_active_entry: LockListPosition,

    /// Bounded lock attempts outside the canonical order give up after this many spins.
    try_lock_spins: u32,
}

impl<'r, L: Lockable> CurrentLockList<'r, L> {
    /// Creates a new [`CurrentLockList`] that can hold up to `capacity` entries.
    ///
    /// # Examples
    ///
    /// ```
    /// use sap_tsf_locklist::{CurrentLockList, Record, SortedLockList};
    ///
    /// let cll: CurrentLockList<Record> = CurrentLockList::new(16, 5000);
    /// assert!(cll.is_empty());
    /// assert_eq!(cll.capacity(), 16);
    /// ```
    #[inline]
    #[must_use]
    pub fn new(capacity: u32, try_lock_spins: u32) -> CurrentLockList<'r, L> {
        CurrentLockList {
            array: allocate(capacity),
            last_active_entry: INVALID_LOCK_LIST_POSITION,
            try_lock_spins,
        }
    }

    /// Clears all the entries.
    ///
    /// Locks must have been released beforehand.
    #[inline]
    pub fn reset(&mut self) {
        debug_assert!(self.entries().iter().all(|e| !e.is_locked()));
        self.last_active_entry = INVALID_LOCK_LIST_POSITION;
        self.array[INVALID_LOCK_LIST_POSITION as usize] = LockEntry::sentinel();
    }

    /// Finds or inserts the entry for the lock object, and returns its position.
    ///
    /// If the entry exists, its preferred mode becomes the stronger of the two. Inserting a lock
    /// whose identifier is smaller than that of the last entry shifts subsequent entries.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is exceeded.
    ///
    /// # Examples
    ///
    /// ```
    /// use sap_tsf_locklist::{CurrentLockList, LockMode, Record, SortedLockList};
    ///
    /// let record = Record::default();
    /// let mut cll = CurrentLockList::new(4, 5000);
    /// let pos = cll.get_or_add_entry(&record, LockMode::ReadLock);
    /// assert_eq!(cll.get_or_add_entry(&record, LockMode::WriteLock), pos);
    /// assert_eq!(cll.entry(pos).preferred_mode(), LockMode::WriteLock);
    /// assert_eq!(cll.last_active_entry(), 1);
    /// ```
    #[inline]
    pub fn get_or_add_entry(&mut self, lock: &'r L, preferred_mode: LockMode) -> LockListPosition {
        let id = lock.universal_lock_id();
        let insert_pos = self.lower_bound(id);
        debug_assert_ne!(insert_pos, INVALID_LOCK_LIST_POSITION);

        if insert_pos > self.last_active_entry {
            debug_assert_eq!(insert_pos, self.last_active_entry + 1);
            let new_pos = self.issue_new_position();
            self.array[new_pos as usize] = LockEntry::new(lock, preferred_mode);
            return new_pos;
        }

        let existing = &mut self.array[insert_pos as usize];
        if existing.id() == id {
            existing.prefer(preferred_mode);
            return insert_pos;
        }

        trace!(id, insert_pos, "out-of-order insert into the current lock list");
        debug_assert!(existing.id() > id);
        let new_last_pos = self.issue_new_position();
        self.array
            .copy_within(insert_pos as usize..new_last_pos as usize, insert_pos as usize + 1);
        self.array[insert_pos as usize] = LockEntry::new(lock, preferred_mode);
        self.assert_sorted();
        insert_pos
    }

    /// Merges the write set into the list.
    ///
    /// The write set must be sorted by identifier, and then by write ordinal; multiple writes on
    /// the same record are allowed. Existing entries are raised to [`LockMode::WriteLock`], and
    /// missing entries are placed after the last entry; the list is sorted once at the end only if
    /// any of them had to precede an existing entry.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is exceeded.
    #[inline]
    pub fn batch_insert_write_placeholders(&mut self, write_set: &[WriteAccess<'r, L>]) {
        if write_set.is_empty() {
            return;
        }
        debug_assert!(write_set
            .windows(2)
            .all(|w| (w[0].id(), w[0].ordinal()) < (w[1].id(), w[1].ordinal())));
        self.assert_sorted();

        let last_active_entry = self.last_active_entry;
        let mut added: LockListPosition = 0;
        let mut interleaved = false;
        let mut write_pos = 0;
        let mut pos = 1;
        while pos <= last_active_entry && write_pos < write_set.len() {
            let write = &write_set[write_pos];
            let existing = &mut self.array[pos as usize];
            if existing.id() < write.id() {
                pos += 1;
            } else if existing.id() == write.id() {
                existing.prefer(LockMode::WriteLock);
                write_pos += 1;
            } else {
                added += 1;
                interleaved = true;
                self.put_placeholder(last_active_entry + added, write);
                write_pos = skip_same_record(write_set, write_pos);
            }
        }

        // Remaining writes are all greater than every existing entry.
        while write_pos < write_set.len() {
            let write = &write_set[write_pos];
            debug_assert!(self.array[(last_active_entry + added) as usize].id() < write.id());
            added += 1;
            self.put_placeholder(last_active_entry + added, write);
            write_pos = skip_same_record(write_set, write_pos);
        }

        if added > 0 {
            self.last_active_entry += added;
            if interleaved {
                trace!(added, "sorting the current lock list after merging the write set");
                self.array[1..=self.last_active_entry as usize].sort_unstable_by_key(LockEntry::id);
            }
        }
        self.assert_sorted();
        debug_assert!(write_set
            .iter()
            .all(|w| self.binary_search(w.id()).is_some()));
    }

    /// Copies every entry of the [`RetrospectiveLockList`] into the empty list.
    ///
    /// # Panics
    ///
    /// Panics if the list is not empty or the capacity is not sufficient.
    #[inline]
    pub fn prepopulate_for_retrospective_lock_list(&mut self, rll: &RetrospectiveLockList<'r, L>) {
        assert!(self.is_empty(), "the current lock list must be empty");
        debug_assert!(!rll.is_empty());
        rll.assert_sorted();

        let len = rll.last_active_entry();
        assert!(len <= self.capacity(), "current lock list capacity exceeded");
        self.array[1..=len as usize].copy_from_slice(rll.entries());
        self.last_active_entry = len;
        self.assert_sorted();
    }

    /// Returns the position of the last entry holding a lock.
    ///
    /// [`INVALID_LOCK_LIST_POSITION`] is returned if no locks are held.
    #[inline]
    pub fn last_locked_entry(&self) -> LockListPosition {
        (1..=self.last_active_entry)
            .rev()
            .find(|pos| self.array[*pos as usize].is_locked())
            .unwrap_or(INVALID_LOCK_LIST_POSITION)
    }

    /// Acquires or tries to acquire the lock at the position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RaceAbort`] if the lock could not be acquired outside the canonical
    /// order within the spin budget.
    ///
    /// # Panics
    ///
    /// Panics if the position is not valid.
    #[inline]
    pub fn try_or_acquire_single_lock(&mut self, pos: LockListPosition) -> Result<(), Error> {
        assert!(pos != INVALID_LOCK_LIST_POSITION && pos <= self.last_active_entry);
        let mut last_locked_pos = self.last_locked_entry();
        self.try_or_acquire_single_lock_impl(pos, &mut last_locked_pos)
    }

    /// Acquires or tries to acquire every lock up to the position, including the position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RaceAbort`] on the first lock that could not be acquired; locks taken
    /// before the failure are kept.
    ///
    /// # Panics
    ///
    /// Panics if the position is not valid.
    #[inline]
    pub fn try_or_acquire_multiple_locks(&mut self, upto_pos: LockListPosition) -> Result<(), Error> {
        assert!(upto_pos != INVALID_LOCK_LIST_POSITION && upto_pos <= self.last_active_entry);
        let mut last_locked_pos = self.last_locked_entry();
        for pos in 1..=upto_pos {
            self.try_or_acquire_single_lock_impl(pos, &mut last_locked_pos)?;
        }
        Ok(())
    }

    /// Releases locks on entries whose identifiers are greater than `address`.
    #[inline]
    pub fn release_all_after(&mut self, address: UniversalLockId) {
        let from = self.position_after(address);
        for entry in &mut self.array[from as usize..=self.last_active_entry as usize] {
            entry.release();
        }
    }

    /// Releases locks on entries whose identifiers are equal to or greater than `address`.
    #[inline]
    pub fn release_all_at_and_after(&mut self, address: UniversalLockId) {
        self.release_all_after(address.saturating_sub(1));
    }

    /// Gives up locks not yet taken on entries whose identifiers are greater than `address`.
    ///
    /// Entries not holding a lock lose their preference; entries holding a lock are unchanged.
    #[inline]
    pub fn giveup_all_after(&mut self, address: UniversalLockId) {
        let from = self.position_after(address);
        for entry in &mut self.array[from as usize..=self.last_active_entry as usize] {
            entry.give_up();
        }
    }

    /// Gives up locks not yet taken on entries whose identifiers are equal to or greater than
    /// `address`.
    #[inline]
    pub fn giveup_all_at_and_after(&mut self, address: UniversalLockId) {
        self.giveup_all_after(address.saturating_sub(1));
    }

    /// Releases every lock held.
    #[inline]
    pub fn release_all(&mut self) {
        self.release_all_after(NULL_UNIVERSAL_LOCK_ID);
    }

    /// Returns the first position whose identifier is greater than `address`.
    fn position_after(&self, address: UniversalLockId) -> LockListPosition {
        address
            .checked_add(1)
            .map_or(self.last_active_entry + 1, |id| self.lower_bound(id))
    }

    /// Issues a new position at the end of the list.
    fn issue_new_position(&mut self) -> LockListPosition {
        assert!(
            self.last_active_entry < self.capacity(),
            "current lock list capacity exceeded"
        );
        self.last_active_entry += 1;
        self.last_active_entry
    }

    /// Writes a placeholder for the write at the position beyond the last entry.
    fn put_placeholder(&mut self, pos: LockListPosition, write: &WriteAccess<'r, L>) {
        assert!(pos <= self.capacity(), "current lock list capacity exceeded");
        self.array[pos as usize] = LockEntry::new(write.lock(), LockMode::WriteLock);
    }

    fn try_or_acquire_single_lock_impl(
        &mut self,
        pos: LockListPosition,
        last_locked_pos: &mut LockListPosition,
    ) -> Result<(), Error> {
        let spins = self.try_lock_spins;
        let entry = &mut self.array[pos as usize];
        if entry.is_enough() {
            return Ok(());
        }
        let Some(lock) = entry.lock() else {
            return Ok(());
        };
        debug_assert_ne!(entry.taken_mode(), LockMode::WriteLock);
        let queue_lock = lock.queue_lock();
        let upgrade = entry.taken_mode() == LockMode::ReadLock;

        if *last_locked_pos == INVALID_LOCK_LIST_POSITION || *last_locked_pos < pos {
            // Every lock held precedes this one: waiting cannot form a cycle.
            debug_assert!(!upgrade);
            let slot = queue_lock.acquire_writer();
            entry.set_taken(LockMode::WriteLock, slot);
        } else if let (true, Some(slot)) = (upgrade, entry.slot()) {
            debug_assert_eq!(entry.preferred_mode(), LockMode::WriteLock);
            match queue_lock.try_upgrade(slot, spins) {
                Ok(slot) => entry.set_taken(LockMode::WriteLock, slot),
                Err(_) => {
                    trace!(id = entry.id(), "failed to upgrade the shared lock");
                    return Err(Error::RaceAbort);
                }
            }
        } else if entry.preferred_mode() == LockMode::WriteLock {
            let Some(slot) = queue_lock.try_acquire_writer(spins) else {
                trace!(id = entry.id(), "failed to acquire the exclusive lock");
                return Err(Error::RaceAbort);
            };
            entry.set_taken(LockMode::WriteLock, slot);
        } else {
            debug_assert_eq!(entry.preferred_mode(), LockMode::ReadLock);
            let Some(slot) = queue_lock.try_acquire_reader(spins) else {
                trace!(id = entry.id(), "failed to acquire a shared lock");
                return Err(Error::RaceAbort);
            };
            entry.set_taken(LockMode::ReadLock, slot);
        }

        *last_locked_pos = (*last_locked_pos).max(pos);
        Ok(())
    }
}

impl<'r, L: Lockable + 'r> SortedLockList<'r, L> for CurrentLockList<'r, L> {
    #[inline]
    fn array(&self) -> &[LockEntry<'r, L>] {
        &self.array
    }

    #[inline]
    fn last_active_entry(&self) -> LockListPosition {
        self.last_active_entry
    }
}

impl<'r, L: Lockable> fmt::Debug for CurrentLockList<'r, L> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentLockList")
            .field("entries", &self.entries())
            .field("try_lock_spins", &self.try_lock_spins)
            .finish()
    }
}

impl<'r, L: Lockable> fmt::Display for CurrentLockList<'r, L> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dump("CurrentLockList", self, f)
    }
}

impl<'r, L: Lockable> Drop for CurrentLockList<'r, L> {
    #[inline]
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Returns the index of the first write on a different record.
fn skip_same_record<L: Lockable>(write_set: &[WriteAccess<'_, L>], write_pos: usize) -> usize {
    let id = write_set[write_pos].id();
    write_set[write_pos + 1..]
        .iter()
        .position(|w| w.id() != id)
        .map_or(write_set.len(), |offset| write_pos + 1 + offset)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Record, RwSpinLock};
    use proptest::prelude::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering::Relaxed;
    use std::sync::{Arc, Barrier};
    use std::thread;

    /// Returns records sorted by their lock identifiers.
    fn records(len: usize) -> Vec<Record> {
        (0..len).map(|_| Record::default()).collect()
    }

    fn ids(cll: &CurrentLockList<Record>) -> Vec<UniversalLockId> {
        cll.entries().iter().map(LockEntry::id).collect()
    }

    fn write_set<'r>(records: &'r [Record], indexes: &[usize]) -> Vec<WriteAccess<'r, Record>> {
        let mut write_set: Vec<WriteAccess<Record>> = indexes
            .iter()
            .enumerate()
            .map(|(ordinal, i)| WriteAccess::new(&records[*i], ordinal as u32, 0))
            .collect();
        write_set.sort_unstable_by_key(|w| (w.id(), w.ordinal()));
        write_set
    }

    #[test]
    fn get_or_add_entry() {
        let records = records(8);
        let mut cll = CurrentLockList::new(8, 5000);
        assert_eq!(cll.get_or_add_entry(&records[3], LockMode::ReadLock), 1);
        assert_eq!(cll.get_or_add_entry(&records[5], LockMode::ReadLock), 2);
        assert_eq!(cll.get_or_add_entry(&records[7], LockMode::WriteLock), 3);

        // Out-of-order inserts shift the tail.
        assert_eq!(cll.get_or_add_entry(&records[1], LockMode::ReadLock), 1);
        assert_eq!(cll.get_or_add_entry(&records[4], LockMode::ReadLock), 3);
        assert_eq!(cll.last_active_entry(), 5);
        assert_eq!(
            ids(&cll),
            [1, 3, 4, 5, 7].map(|i| records[i].universal_lock_id())
        );

        // Merging never lowers the preferred mode.
        assert_eq!(cll.get_or_add_entry(&records[7], LockMode::ReadLock), 5);
        assert_eq!(cll.entry(5).preferred_mode(), LockMode::WriteLock);
        assert_eq!(cll.get_or_add_entry(&records[4], LockMode::WriteLock), 3);
        assert_eq!(cll.entry(3).preferred_mode(), LockMode::WriteLock);
        assert_eq!(cll.entry(3).taken_mode(), LockMode::NoLock);
        assert_eq!(cll.last_active_entry(), 5);

        assert_eq!(cll.binary_search(records[4].universal_lock_id()), Some(3));
        assert_eq!(cll.binary_search(records[2].universal_lock_id()), None);
        assert_eq!(cll.lower_bound(records[2].universal_lock_id()), 2);
        assert_eq!(cll.lower_bound(records[6].universal_lock_id()), 5);
        assert_eq!(cll.lower_bound(u64::MAX), 6);

        cll.reset();
        assert!(cll.is_empty());
        cll.assert_sorted();
    }

    #[test]
    #[should_panic(expected = "capacity exceeded")]
    fn capacity_violation() {
        let records = records(3);
        let mut cll = CurrentLockList::new(2, 5000);
        for record in &records {
            cll.get_or_add_entry(record, LockMode::ReadLock);
        }
    }

    #[test]
    fn batch_insert_write_placeholders() {
        let records = records(10);
        let mut cll = CurrentLockList::new(10, 5000);
        for i in [3, 5, 7] {
            cll.get_or_add_entry(&records[i], LockMode::ReadLock);
        }
        cll.batch_insert_write_placeholders(&write_set(&records, &[9, 5, 1, 5]));
        assert_eq!(
            ids(&cll),
            [1, 3, 5, 7, 9].map(|i| records[i].universal_lock_id())
        );
        let modes: Vec<LockMode> = cll.entries().iter().map(LockEntry::preferred_mode).collect();
        assert_eq!(
            modes,
            [
                LockMode::WriteLock,
                LockMode::ReadLock,
                LockMode::WriteLock,
                LockMode::ReadLock,
                LockMode::WriteLock
            ]
        );

        // Writes after every existing entry are appended.
        cll.batch_insert_write_placeholders(&write_set(&records, &[8, 9, 8]));
        assert_eq!(cll.last_active_entry(), 6);
        assert_eq!(cll.entry(6).id(), records[9].universal_lock_id());
        assert_eq!(cll.entry(5).id(), records[8].universal_lock_id());

        // Into an empty list.
        cll.reset();
        cll.batch_insert_write_placeholders(&write_set(&records, &[2, 0, 2]));
        assert_eq!(ids(&cll), [0, 2].map(|i| records[i].universal_lock_id()));
    }

    #[test]
    fn canonical_acquisition() {
        let records = records(6);
        let mut cll = CurrentLockList::new(6, 16);
        for (i, record) in records.iter().enumerate() {
            let mode = if i % 2 == 0 {
                LockMode::ReadLock
            } else {
                LockMode::WriteLock
            };
            cll.get_or_add_entry(record, mode);
        }
        assert_eq!(cll.last_locked_entry(), INVALID_LOCK_LIST_POSITION);
        assert!(cll.try_or_acquire_multiple_locks(4).is_ok());
        assert_eq!(cll.last_locked_entry(), 4);
        assert!(cll.entries()[..4].iter().all(LockEntry::is_enough));
        assert!(cll.entries()[4..].iter().all(|e| !e.is_locked()));
        assert!(cll.try_or_acquire_single_lock(6).is_ok());
        assert_eq!(cll.last_locked_entry(), 6);

        // Position 5 now precedes a held lock, but the lock is free.
        assert!(cll.try_or_acquire_single_lock(5).is_ok());
        assert!(records.iter().all(|r| !r.queue_lock().is_free()));
        assert_eq!(cll.entry(5).taken_mode(), LockMode::ReadLock);

        cll.release_all_after(records[2].universal_lock_id());
        assert_eq!(cll.last_locked_entry(), 3);
        assert!(!records[3].queue_lock().is_write_locked());
        cll.release_all_at_and_after(records[1].universal_lock_id());
        assert_eq!(cll.last_locked_entry(), 1);
        cll.release_all();
        assert!(records.iter().all(|r| r.queue_lock().is_free()));
        cll.reset();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 16)]
    async fn canonical_acquisition_never_aborts() {
        let records = Arc::new(records(16));
        let counter = Arc::new(AtomicU64::new(0));
        let num_tasks = 8;
        let num_iterations = 256;
        let mut task_handles = Vec::with_capacity(num_tasks);
        let barrier = Arc::new(tokio::sync::Barrier::new(num_tasks));
        for task_id in 0..num_tasks {
            let records_clone = records.clone();
            let counter_clone = counter.clone();
            let barrier_clone = barrier.clone();
            task_handles.push(tokio::spawn(async move {
                barrier_clone.wait().await;
                // A zero spin budget makes any lock attempt outside the canonical order fail.
                let mut cll = CurrentLockList::new(16, 0);
                for i in 0..num_iterations {
                    for (j, record) in records_clone.iter().enumerate().rev() {
                        let mode = if (task_id + i + j) % 3 == 0 {
                            LockMode::WriteLock
                        } else {
                            LockMode::ReadLock
                        };
                        cll.get_or_add_entry(record, mode);
                    }
                    let last = cll.last_active_entry();
                    let prefix = (task_id + i) as u32 % last + 1;
                    assert!(cll.try_or_acquire_multiple_locks(prefix).is_ok());
                    assert!(cll.try_or_acquire_multiple_locks(last).is_ok());
                    assert!(cll.entries().iter().all(|e| e.taken_mode() == LockMode::WriteLock));

                    // Every lock is exclusively held.
                    let value = counter_clone.load(Relaxed);
                    counter_clone.store(value + 1, Relaxed);

                    cll.release_all();
                    cll.reset();
                }
            }));
        }
        for r in futures::future::join_all(task_handles).await {
            assert!(r.is_ok());
        }
        assert_eq!(counter.load(Relaxed), (num_tasks * num_iterations) as u64);
        assert!(records.iter().all(|r| r.queue_lock().is_free()));
    }

    #[test]
    fn non_canonical_race_abort() {
        let records = Arc::new(records(3));
        let barrier = Arc::new(Barrier::new(2));
        let records_clone = records.clone();
        let barrier_clone = barrier.clone();
        let holder = thread::spawn(move || {
            let slot = records_clone[0].queue_lock().acquire_writer();
            barrier_clone.wait();
            barrier_clone.wait();
            records_clone[0].queue_lock().release(slot);
        });
        barrier.wait();

        let mut cll = CurrentLockList::new(3, 64);
        let pos = cll.get_or_add_entry(&records[2], LockMode::WriteLock);
        assert!(cll.try_or_acquire_single_lock(pos).is_ok());
        let pos = cll.get_or_add_entry(&records[0], LockMode::WriteLock);
        assert_eq!(pos, 1);
        assert_eq!(cll.try_or_acquire_single_lock(pos), Err(Error::RaceAbort));
        assert_eq!(cll.entry(1).taken_mode(), LockMode::NoLock);

        let pos = cll.get_or_add_entry(&records[1], LockMode::ReadLock);
        assert_eq!(cll.try_or_acquire_multiple_locks(pos), Err(Error::RaceAbort));
        assert!(records[1].queue_lock().is_free());

        barrier.wait();
        holder.join().unwrap();
        cll.release_all();
        assert!(records.iter().all(|r| r.queue_lock().is_free()));
    }

    #[test]
    fn non_canonical_upgrade() {
        let records = records(2);
        let mut cll = CurrentLockList::new(2, 64);
        cll.get_or_add_entry(&records[0], LockMode::ReadLock);
        cll.get_or_add_entry(&records[1], LockMode::WriteLock);
        assert!(cll.try_or_acquire_single_lock(2).is_ok());
        assert!(cll.try_or_acquire_single_lock(1).is_ok());
        assert_eq!(cll.entry(1).taken_mode(), LockMode::ReadLock);

        // Another reader prevents the upgrade.
        let other: &RwSpinLock = records[0].queue_lock();
        let slot = other.try_acquire_reader(0).unwrap();
        cll.get_or_add_entry(&records[0], LockMode::WriteLock);
        assert_eq!(cll.try_or_acquire_single_lock(1), Err(Error::RaceAbort));
        assert_eq!(cll.entry(1).taken_mode(), LockMode::ReadLock);
        other.release(slot);
        assert!(cll.try_or_acquire_single_lock(1).is_ok());
        assert_eq!(cll.entry(1).taken_mode(), LockMode::WriteLock);

        drop(cll);
        assert!(records.iter().all(|r| r.queue_lock().is_free()));
    }

    #[test]
    fn giveup_all_after() {
        let records = records(4);
        let mut cll = CurrentLockList::new(4, 16);
        for record in &records {
            cll.get_or_add_entry(record, LockMode::WriteLock);
        }
        assert!(cll.try_or_acquire_single_lock(1).is_ok());
        cll.giveup_all_at_and_after(NULL_UNIVERSAL_LOCK_ID);
        assert_eq!(cll.entry(1).preferred_mode(), LockMode::WriteLock);
        assert!(cll.entries()[1..]
            .iter()
            .all(|e| e.preferred_mode() == LockMode::NoLock));
        assert!(cll.try_or_acquire_multiple_locks(4).is_ok());
        assert!(records[1..].iter().all(|r| r.queue_lock().is_free()));
        cll.release_all();
    }

    #[test]
    fn giveup_keeps_held_entries() {
        let records = records(4);
        let mut cll = CurrentLockList::new(4, 16);
        for (i, record) in records.iter().enumerate() {
            let mode = if i % 2 == 0 {
                LockMode::ReadLock
            } else {
                LockMode::WriteLock
            };
            cll.get_or_add_entry(record, mode);
        }

        // Canonically taken: the exclusive lock is held for a read preference.
        assert!(cll.try_or_acquire_single_lock(3).is_ok());
        assert_eq!(cll.entry(3).taken_mode(), LockMode::WriteLock);

        // A shared lock taken outside the canonical order, then a pending upgrade.
        assert!(cll.try_or_acquire_single_lock(1).is_ok());
        assert_eq!(cll.entry(1).taken_mode(), LockMode::ReadLock);
        cll.get_or_add_entry(&records[0], LockMode::WriteLock);

        cll.giveup_all_at_and_after(records[0].universal_lock_id());
        assert_eq!(cll.entry(1).preferred_mode(), LockMode::WriteLock);
        assert_eq!(cll.entry(1).taken_mode(), LockMode::ReadLock);
        assert_eq!(cll.entry(2).preferred_mode(), LockMode::NoLock);
        assert_eq!(cll.entry(3).preferred_mode(), LockMode::ReadLock);
        assert_eq!(cll.entry(3).taken_mode(), LockMode::WriteLock);
        assert_eq!(cll.entry(4).preferred_mode(), LockMode::NoLock);
        cll.assert_sorted();

        assert!(cll.try_or_acquire_multiple_locks(4).is_ok());
        assert_eq!(cll.entry(1).taken_mode(), LockMode::WriteLock);
        assert!(records[1].queue_lock().is_free());
        assert!(records[3].queue_lock().is_free());
        cll.release_all();
        assert!(records.iter().all(|r| r.queue_lock().is_free()));
    }

    #[test]
    fn display() {
        let records = records(40);
        let mut cll = CurrentLockList::new(40, 16);
        for record in &records {
            cll.get_or_add_entry(record, LockMode::ReadLock);
        }
        let dumped = cll.to_string();
        assert!(dumped.starts_with("CurrentLockList(capacity: 40, last_active_entry: 40)["));
        assert!(dumped.ends_with(", ..]"));
        assert_eq!(dumped.matches("N/R").count(), 32);
    }

    proptest! {
        #[test]
        fn sorted_after_mutations(
            reads in proptest::collection::vec(0_usize..64, 0..48),
            writes in proptest::collection::vec(0_usize..64, 0..48),
        ) {
            let records = records(64);
            let mut cll = CurrentLockList::new(64, 16);
            for i in &reads {
                let before = cll.last_active_entry();
                let existed = cll.binary_search(records[*i].universal_lock_id()).is_some();
                let pos = cll.get_or_add_entry(&records[*i], LockMode::ReadLock);
                prop_assert_eq!(cll.entry(pos).id(), records[*i].universal_lock_id());
                prop_assert_eq!(cll.last_active_entry(), if existed { before } else { before + 1 });
            }
            cll.batch_insert_write_placeholders(&write_set(&records, &writes));
            cll.assert_sorted();

            let mut expected: Vec<usize> = reads.iter().chain(writes.iter()).copied().collect();
            expected.sort_unstable();
            expected.dedup();
            prop_assert_eq!(cll.last_active_entry() as usize, expected.len());
            for i in expected {
                let pos = cll.binary_search(records[i].universal_lock_id()).unwrap();
                let mode = if writes.contains(&i) { LockMode::WriteLock } else { LockMode::ReadLock };
                prop_assert_eq!(cll.entry(pos).preferred_mode(), mode);
            }
        }
    }
}
