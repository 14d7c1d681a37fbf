// SPDX-FileCopyrightText: 2023 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

use super::{allocate, dump, LockListPosition, SortedLockList, INVALID_LOCK_LIST_POSITION};
use crate::{AccessSets, LockEntry, LockMode, Lockable};
use std::fmt;
use tracing::trace;

/// [`RetrospectiveLockList`] remembers the locks an aborted transaction attempt needed.
///
/// The list is built right after an abort, and the next attempt copies it into its
/// [`CurrentLockList`](super::CurrentLockList) to acquire the locks in the canonical order from
/// the beginning.
pub struct RetrospectiveLockList<'r, L: Lockable> {
    /// The buffer; the first entry is the sentinel.
    array: Box<[LockEntry<'r, L>]>,

    /// The position of the last valid entry.
    last_active_entry: LockListPosition,
}

impl<'r, L: Lockable> RetrospectiveLockList<'r, L> {
    /// Creates a new [`RetrospectiveLockList`] that can hold up to `capacity` entries.
    #[inline]
    #[must_use]
    pub fn new(capacity: u32) -> RetrospectiveLockList<'r, L> {
        RetrospectiveLockList {
            array: allocate(capacity),
            last_active_entry: INVALID_LOCK_LIST_POSITION,
        }
    }

    /// Clears all the entries.
    #[inline]
    pub fn reset(&mut self) {
        self.last_active_entry = INVALID_LOCK_LIST_POSITION;
        self.array[INVALID_LOCK_LIST_POSITION as usize] = LockEntry::sentinel();
    }

    /// Builds the list from the access sets of an aborted transaction attempt.
    ///
    /// Every write yields a [`LockMode::WriteLock`] entry. A read yields a [`LockMode::ReadLock`]
    /// entry unless the record is colder than `read_lock_threshold` and has not been modified
    /// since the read. Entries for the same record are merged into the strongest mode.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is smaller than the number of accesses that have to be recorded.
    ///
    /// # Examples
    ///
    /// ```
    /// use sap_tsf_locklist::{AccessSets, LockMode, Lockable, Record, RetrospectiveLockList};
    /// use sap_tsf_locklist::SortedLockList;
    ///
    /// let records: Vec<Record> = (0..2).map(|_| Record::default()).collect();
    /// let mut access_sets = AccessSets::new(2);
    /// access_sets.add_read(&records[1], records[1].version() + 1);
    /// access_sets.add_write(&records[0], 1);
    ///
    /// let mut rll = RetrospectiveLockList::new(4);
    /// rll.construct(&access_sets, 10);
    /// assert_eq!(rll.last_active_entry(), 2);
    /// assert_eq!(rll.entry(1).preferred_mode(), LockMode::WriteLock);
    /// assert_eq!(rll.entry(2).preferred_mode(), LockMode::ReadLock);
    /// ```
    #[inline]
    pub fn construct(&mut self, access_sets: &AccessSets<'r, L>, read_lock_threshold: u32) {
        self.reset();

        for read in access_sets.read_set() {
            let lock = read.lock();
            if lock.hotness() < read_lock_threshold && read.is_current() {
                continue;
            }
            let pos = self.issue_new_position();
            self.array[pos as usize] = LockEntry::new(lock, LockMode::ReadLock);
        }
        trace!(
            read_locks = self.last_active_entry,
            "read locks added to the retrospective lock list"
        );

        for write in access_sets.write_set() {
            let pos = self.issue_new_position();
            self.array[pos as usize] = LockEntry::new(write.lock(), LockMode::WriteLock);
        }

        if self.last_active_entry <= 1 {
            return;
        }
        let last_active_entry = self.last_active_entry as usize;
        self.array[1..=last_active_entry].sort_unstable_by_key(LockEntry::id);

        let mut prev_pos = 1;
        for pos in 2..=last_active_entry {
            debug_assert!(self.array[prev_pos].id() <= self.array[pos].id());
            if self.array[prev_pos].id() == self.array[pos].id() {
                let mode = self.array[pos].preferred_mode();
                self.array[prev_pos].prefer(mode);
            } else {
                prev_pos += 1;
                if prev_pos < pos {
                    self.array[prev_pos] = self.array[pos];
                }
            }
        }
        self.last_active_entry = LockListPosition::try_from(prev_pos).unwrap_or(LockListPosition::MAX);
        self.assert_sorted();
    }

    /// Issues a new position at the end of the list.
    fn issue_new_position(&mut self) -> LockListPosition {
        assert!(
            self.last_active_entry < self.capacity(),
            "retrospective lock list capacity exceeded"
        );
        self.last_active_entry += 1;
        self.last_active_entry
    }
}

impl<'r, L: Lockable + 'r> SortedLockList<'r, L> for RetrospectiveLockList<'r, L> {
    #[inline]
    fn array(&self) -> &[LockEntry<'r, L>] {
        &self.array
    }

    #[inline]
    fn last_active_entry(&self) -> LockListPosition {
        self.last_active_entry
    }
}

impl<'r, L: Lockable> fmt::Debug for RetrospectiveLockList<'r, L> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrospectiveLockList")
            .field("entries", &self.entries())
            .finish()
    }
}

impl<'r, L: Lockable> fmt::Display for RetrospectiveLockList<'r, L> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dump("RetrospectiveLockList", self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{CurrentLockList, Record, UniversalLockId};
    use proptest::prelude::*;

    #[test]
    fn construct() {
        let records: Vec<Record> = (0..3).map(|_| Record::default()).collect();
        let (a, b, c) = (&records[0], &records[1], &records[2]);
        let mut access_sets = AccessSets::new(4);
        access_sets.add_write(c, 0);
        access_sets.add_read(a, a.version());
        access_sets.add_write(b, 0);
        access_sets.add_read(b, b.version());

        // Nothing is skipped with a zero threshold.
        let mut rll = RetrospectiveLockList::new(4);
        rll.construct(&access_sets, 0);
        let entries: Vec<(UniversalLockId, LockMode)> = rll
            .entries()
            .iter()
            .map(|e| (e.id(), e.preferred_mode()))
            .collect();
        assert_eq!(
            entries,
            [
                (a.universal_lock_id(), LockMode::ReadLock),
                (b.universal_lock_id(), LockMode::WriteLock),
                (c.universal_lock_id(), LockMode::WriteLock)
            ]
        );
        assert!(rll.entries().iter().all(|e| !e.is_locked()));

        // Cold and unmodified reads are skipped.
        rll.construct(&access_sets, 1);
        assert_eq!(rll.last_active_entry(), 2);
        assert_eq!(rll.binary_search(a.universal_lock_id()), None);

        // Hot reads are kept.
        while a.hotness() < 1 {
            a.increment_hotness();
        }
        rll.construct(&access_sets, 1);
        assert_eq!(rll.last_active_entry(), 3);

        rll.reset();
        assert!(rll.is_empty());
    }

    #[test]
    fn prepopulate() {
        let records: Vec<Record> = (0..5).map(|_| Record::default()).collect();
        let mut access_sets = AccessSets::new(5);
        for (i, record) in records.iter().enumerate().rev() {
            if i % 2 == 0 {
                access_sets.add_read(record, record.version() + 1);
            } else {
                access_sets.add_write(record, 0);
            }
        }
        let mut rll = RetrospectiveLockList::new(5);
        rll.construct(&access_sets, 0);
        assert_eq!(rll.last_active_entry(), 5);

        let mut cll = CurrentLockList::new(8, 5000);
        cll.prepopulate_for_retrospective_lock_list(&rll);
        assert_eq!(cll.last_active_entry(), 5);
        for (c, r) in cll.entries().iter().zip(rll.entries().iter()) {
            assert_eq!(c.id(), r.id());
            assert_eq!(c.preferred_mode(), r.preferred_mode());
            assert_eq!(c.taken_mode(), LockMode::NoLock);
        }
        assert!(rll.to_string().starts_with("RetrospectiveLockList(capacity: 5"));
    }

    proptest! {
        #[test]
        fn sorted_and_merged(
            reads in proptest::collection::vec(0_usize..32, 0..32),
            writes in proptest::collection::vec(0_usize..32, 0..32),
        ) {
            let records: Vec<Record> = (0..32).map(|_| Record::default()).collect();
            let mut access_sets = AccessSets::new(32);
            for i in &reads {
                access_sets.add_read(&records[*i], records[*i].version());
            }
            for i in &writes {
                access_sets.add_write(&records[*i], 0);
            }
            let mut rll = RetrospectiveLockList::new(64);
            rll.construct(&access_sets, 0);
            rll.assert_sorted();

            let mut expected: Vec<usize> = reads.iter().chain(writes.iter()).copied().collect();
            expected.sort_unstable();
            expected.dedup();
            prop_assert_eq!(rll.last_active_entry() as usize, expected.len());
            for (entry, i) in rll.entries().iter().zip(expected) {
                prop_assert_eq!(entry.id(), records[i].universal_lock_id());
                let mode = if writes.contains(&i) { LockMode::WriteLock } else { LockMode::ReadLock };
                prop_assert_eq!(entry.preferred_mode(), mode);
            }
        }
    }
}
