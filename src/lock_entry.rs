// SPDX-FileCopyrightText: 2023 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

use super::lock_id::NULL_UNIVERSAL_LOCK_ID;
use super::{LockMode, Lockable, QueueLock, SlotHandle, UniversalLockId};
use std::fmt;

/// [`LockEntry`] is an element of lock lists.
///
/// `slot` is present if and only if `taken_mode` is not [`LockMode::NoLock`]. An entry acquired in
/// the canonical order always holds [`LockMode::WriteLock`], which may exceed `preferred_mode`.
pub struct LockEntry<'r, L: Lockable> {
    /// The identifier of the lock object.
    id: UniversalLockId,

    /// The lock object; `None` only for the sentinel.
    lock: Option<&'r L>,

    /// The lock mode the transaction wants to eventually hold.
    preferred_mode: LockMode,

    /// The lock mode the transaction currently holds.
    taken_mode: LockMode,

    /// The handle issued by the queue lock.
    slot: Option<SlotHandle>,
}

impl<'r, L: Lockable> LockEntry<'r, L> {
    /// Returns the sentinel entry.
    #[inline]
    pub(crate) const fn sentinel() -> LockEntry<'r, L> {
        LockEntry {
            id: NULL_UNIVERSAL_LOCK_ID,
            lock: None,
            preferred_mode: LockMode::NoLock,
            taken_mode: LockMode::NoLock,
            slot: None,
        }
    }

    /// Creates a new entry that does not hold the lock yet.
    #[inline]
    pub(crate) fn new(lock: &'r L, preferred_mode: LockMode) -> LockEntry<'r, L> {
        LockEntry {
            id: lock.universal_lock_id(),
            lock: Some(lock),
            preferred_mode,
            taken_mode: LockMode::NoLock,
            slot: None,
        }
    }

    /// Returns the identifier of the lock object.
    #[inline]
    pub fn id(&self) -> UniversalLockId {
        self.id
    }

    /// Returns a reference to the lock object.
    #[inline]
    pub fn lock(&self) -> Option<&'r L> {
        self.lock
    }

    /// Returns the preferred lock mode.
    #[inline]
    pub fn preferred_mode(&self) -> LockMode {
        self.preferred_mode
    }

    /// Returns the currently held lock mode.
    #[inline]
    pub fn taken_mode(&self) -> LockMode {
        self.taken_mode
    }

    /// Returns the queue slot handle.
    #[inline]
    pub fn slot(&self) -> Option<SlotHandle> {
        self.slot
    }

    /// Returns `true` if the taken lock already satisfies the preferred mode.
    #[inline]
    pub fn is_enough(&self) -> bool {
        self.taken_mode.covers(self.preferred_mode)
    }

    /// Returns `true` if the entry holds a lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.taken_mode != LockMode::NoLock
    }

    /// Raises the preferred mode to `mode` if `mode` is stronger.
    #[inline]
    pub(crate) fn prefer(&mut self, mode: LockMode) {
        self.preferred_mode = self.preferred_mode.max(mode);
    }

    /// Drops the preference of an entry not holding the lock; held entries are left intact.
    #[inline]
    pub(crate) fn give_up(&mut self) {
        if !self.is_locked() {
            self.preferred_mode = LockMode::NoLock;
        }
    }

    /// Records the lock taken through `slot`.
    #[inline]
    pub(crate) fn set_taken(&mut self, mode: LockMode, slot: SlotHandle) {
        debug_assert_ne!(mode, LockMode::NoLock);
        self.taken_mode = mode;
        self.slot.replace(slot);
    }

    /// Releases the lock if held.
    #[inline]
    pub(crate) fn release(&mut self) {
        if let Some(slot) = self.slot.take() {
            debug_assert!(self.is_locked());
            if let Some(lock) = self.lock {
                lock.queue_lock().release(slot);
            }
        }
        self.taken_mode = LockMode::NoLock;
    }
}

impl<'r, L: Lockable> Clone for LockEntry<'r, L> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<'r, L: Lockable> Copy for LockEntry<'r, L> {}

impl<'r, L: Lockable> fmt::Debug for LockEntry<'r, L> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockEntry")
            .field("id", &self.id)
            .field("preferred_mode", &self.preferred_mode)
            .field("taken_mode", &self.taken_mode)
            .field("slot", &self.slot)
            .finish()
    }
}

impl<'r, L: Lockable> fmt::Display for LockEntry<'r, L> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{}/{}", self.id, self.taken_mode, self.preferred_mode)
    }
}
