// SPDX-FileCopyrightText: 2023 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Deadlock-free record locking for optimistic transactions.
//!
//! Each transaction keeps its locks in a [`CurrentLockList`] sorted by [`UniversalLockId`], and
//! acquires them in that order whenever it can; a lock that would have to be acquired out of
//! order is only tried for a bounded time, and the attempt is aborted with [`Error::RaceAbort`]
//! on failure. An aborted attempt leaves a [`RetrospectiveLockList`] behind, which lets the next
//! attempt take the same locks in the canonical order from the start.

mod access_set;
mod config;
mod error;
mod lock_entry;
mod lock_id;
mod lock_list;
mod queue_lock;
mod storage;
mod worker;

pub use access_set::{AccessSets, ReadAccess, WriteAccess};
pub use config::Config;
pub use error::Error;
pub use lock_entry::LockEntry;
pub use lock_id::{to_universal_lock_id, LockMode, Lockable, UniversalLockId};
pub use lock_list::{
    CurrentLockList, LockListPosition, RetrospectiveLockList, SortedLockList,
    INVALID_LOCK_LIST_POSITION,
};
pub use queue_lock::{QueueLock, RwSpinLock, SlotHandle};
pub use storage::{Hotness, Record, Table};
pub use worker::{Attempt, Statistics, Worker};
