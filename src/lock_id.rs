// SPDX-FileCopyrightText: 2023 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

use super::QueueLock;
use std::fmt;

/// [`UniversalLockId`] totally orders every lock object in the process.
///
/// The value is derived from the memory address of the lock object, therefore two distinct lock
/// objects never share the same identifier, and every thread observes the same order. `0` is
/// reserved for the sentinel entry of lock lists.
pub type UniversalLockId = u64;

/// The identifier that no lock object can have.
pub const NULL_UNIVERSAL_LOCK_ID: UniversalLockId = 0;

/// Derives the [`UniversalLockId`] of the lock object located at the address.
///
/// # Examples
///
/// ```
/// use sap_tsf_locklist::to_universal_lock_id;
///
/// let locks = [0_u64; 2];
/// assert!(to_universal_lock_id(&locks[0]) < to_universal_lock_id(&locks[1]));
/// ```
#[inline]
#[must_use]
pub fn to_universal_lock_id<T: ?Sized>(lock: &T) -> UniversalLockId {
    (lock as *const T).cast::<u8>() as usize as UniversalLockId
}

/// Lock modes.
///
/// The modes form a lattice where a [`LockMode::WriteLock`] satisfies every request.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum LockMode {
    /// No lock is requested or held.
    #[default]
    NoLock,

    /// Shared lock.
    ReadLock,

    /// Exclusive lock.
    WriteLock,
}

impl LockMode {
    /// Returns `true` if holding `self` is enough for the `requested` mode.
    ///
    /// # Examples
    ///
    /// ```
    /// use sap_tsf_locklist::LockMode;
    ///
    /// assert!(LockMode::WriteLock.covers(LockMode::ReadLock));
    /// assert!(!LockMode::ReadLock.covers(LockMode::WriteLock));
    /// assert!(LockMode::NoLock.covers(LockMode::NoLock));
    /// ```
    #[inline]
    #[must_use]
    pub fn covers(self, requested: LockMode) -> bool {
        self >= requested
    }
}

impl fmt::Display for LockMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::NoLock => f.write_str("N"),
            LockMode::ReadLock => f.write_str("R"),
            LockMode::WriteLock => f.write_str("W"),
        }
    }
}

/// [`Lockable`] is implemented by lock objects embedded in records.
///
/// Lock lists never own lock objects; they only refer to them, and the record containing the lock
/// object must outlive every lock list referring to it.
pub trait Lockable: Sync {
    /// The queue lock type guarding the record.
    type Lock: QueueLock;

    /// Returns a reference to the queue lock.
    fn queue_lock(&self) -> &Self::Lock;

    /// Returns the latest committed version of the record.
    fn version(&self) -> u64;

    /// Returns the contention level of the record.
    fn hotness(&self) -> u32;

    /// Returns the [`UniversalLockId`] of the lock object.
    ///
    /// The value must stay the same during the lifetime of the instance.
    #[inline]
    fn universal_lock_id(&self) -> UniversalLockId {
        to_universal_lock_id(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lock_mode() {
        assert!(LockMode::NoLock < LockMode::ReadLock);
        assert!(LockMode::ReadLock < LockMode::WriteLock);
        assert_eq!(LockMode::ReadLock.max(LockMode::WriteLock), LockMode::WriteLock);
        assert_eq!(LockMode::NoLock.max(LockMode::ReadLock), LockMode::ReadLock);
        assert!(!LockMode::NoLock.covers(LockMode::ReadLock));
        assert!(LockMode::ReadLock.covers(LockMode::ReadLock));
        assert_eq!(LockMode::WriteLock.to_string(), "W");
    }

    #[test]
    fn universal_lock_id() {
        let boxed = Box::new([1_u32, 2, 3]);
        let ids: Vec<UniversalLockId> = boxed.iter().map(to_universal_lock_id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert!(ids.iter().all(|id| *id != NULL_UNIVERSAL_LOCK_ID));
        assert_eq!(to_universal_lock_id(&boxed[1]), ids[1]);
    }
}
