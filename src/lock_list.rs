// SPDX-FileCopyrightText: 2023 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Sorted lock lists.
//!
//! Both list kinds store [`LockEntry`] instances in a fixed-capacity buffer allocated once. The
//! first slot of the buffer is a sentinel, and slots `1..=last_active_entry` are sorted by
//! [`UniversalLockId`] without duplicates. Searching is skewed towards ascending access patterns:
//! the last entry is checked before resorting to binary search.

mod current_lock_list;
mod retrospective_lock_list;

pub use current_lock_list::CurrentLockList;
pub use retrospective_lock_list::RetrospectiveLockList;

use super::lock_id::NULL_UNIVERSAL_LOCK_ID;
use super::{LockEntry, LockMode, Lockable, UniversalLockId};
use std::fmt;

/// Position of an entry in a lock list.
pub type LockListPosition = u32;

/// The position of the sentinel; never a valid position of a real entry.
pub const INVALID_LOCK_LIST_POSITION: LockListPosition = 0;

/// Maximum number of entries shown by [`fmt::Display`] implementations.
const MAX_SHOWN: LockListPosition = 32;

/// [`SortedLockList`] implements the search algorithms shared by lock list kinds.
pub trait SortedLockList<'r, L: Lockable + 'r> {
    /// Returns the whole buffer including the sentinel and unused slots.
    fn array(&self) -> &[LockEntry<'r, L>];

    /// Returns the position of the last valid entry.
    fn last_active_entry(&self) -> LockListPosition;

    /// Returns the maximum number of entries the list can hold.
    #[inline]
    fn capacity(&self) -> u32 {
        u32::try_from(self.array().len().saturating_sub(1)).unwrap_or(u32::MAX)
    }

    /// Returns `true` if the list has no valid entries.
    #[inline]
    fn is_empty(&self) -> bool {
        self.last_active_entry() == INVALID_LOCK_LIST_POSITION
    }

    /// Returns valid entries, starting from position `1`.
    #[inline]
    fn entries(&self) -> &[LockEntry<'r, L>] {
        &self.array()[1..=self.last_active_entry() as usize]
    }

    /// Returns a reference to the entry at the position.
    ///
    /// # Panics
    ///
    /// Panics if the position is not valid.
    #[inline]
    fn entry(&self, pos: LockListPosition) -> &LockEntry<'r, L> {
        assert!(pos != INVALID_LOCK_LIST_POSITION && pos <= self.last_active_entry());
        &self.array()[pos as usize]
    }

    /// Returns the first position whose identifier is not less than `id`.
    ///
    /// `last_active_entry + 1` is returned if every entry is less than `id`.
    #[inline]
    fn lower_bound(&self, id: UniversalLockId) -> LockListPosition {
        let last_active_entry = self.last_active_entry();
        if last_active_entry == INVALID_LOCK_LIST_POSITION {
            return 1;
        }
        let array = self.array();
        let last_id = array[last_active_entry as usize].id();
        if last_id == id {
            return last_active_entry;
        } else if last_id < id {
            return last_active_entry + 1;
        }

        let offset = array[1..=last_active_entry as usize].partition_point(|e| e.id() < id);
        let pos = LockListPosition::try_from(offset + 1).unwrap_or(LockListPosition::MAX);
        debug_assert!(pos <= last_active_entry);
        debug_assert!(array[pos as usize].id() >= id);
        debug_assert!(pos == 1 || array[pos as usize - 1].id() < id);
        pos
    }

    /// Returns the position of the entry for `id`.
    #[inline]
    fn binary_search(&self, id: UniversalLockId) -> Option<LockListPosition> {
        let pos = self.lower_bound(id);
        if pos <= self.last_active_entry() && self.array()[pos as usize].id() == id {
            Some(pos)
        } else {
            None
        }
    }

    /// Checks the invariants of the list in debug builds.
    #[inline]
    fn assert_sorted(&self) {
        if cfg!(debug_assertions) {
            let array = self.array();
            let sentinel = &array[INVALID_LOCK_LIST_POSITION as usize];
            assert_eq!(sentinel.id(), NULL_UNIVERSAL_LOCK_ID);
            assert!(sentinel.lock().is_none());
            assert_eq!(sentinel.preferred_mode(), LockMode::NoLock);
            assert_eq!(sentinel.taken_mode(), LockMode::NoLock);
            for pos in 1..=self.last_active_entry() as usize {
                assert!(array[pos - 1].id() < array[pos].id());
                assert!(array[pos].lock().is_some());
                assert_eq!(array[pos].slot().is_some(), array[pos].is_locked());
            }
        }
    }
}

/// Allocates a buffer that can hold `capacity` entries.
fn allocate<'r, L: Lockable + 'r>(capacity: u32) -> Box<[LockEntry<'r, L>]> {
    vec![LockEntry::sentinel(); capacity as usize + 1].into_boxed_slice()
}

/// Writes the entries of a list in a human-readable form.
fn dump<'r, L: Lockable + 'r, T: SortedLockList<'r, L>>(
    name: &str,
    list: &T,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    write!(
        f,
        "{name}(capacity: {}, last_active_entry: {})[",
        list.capacity(),
        list.last_active_entry()
    )?;
    for (i, entry) in list
        .entries()
        .iter()
        .take(MAX_SHOWN as usize)
        .enumerate()
    {
        if i != 0 {
            f.write_str(", ")?;
        }
        write!(f, "{entry}")?;
    }
    if list.last_active_entry() > MAX_SHOWN {
        f.write_str(", ..")?;
    }
    f.write_str("]")
}
