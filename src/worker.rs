// SPDX-FileCopyrightText: 2023 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

use super::{
    AccessSets, Config, CurrentLockList, Error, LockMode, Lockable, QueueLock, Record,
    RetrospectiveLockList, SortedLockList,
};
use tracing::debug;

/// [`Worker`] executes transactions on behalf of a single thread.
///
/// The lock lists and access sets are allocated once, and reused by every transaction the
/// [`Worker`] executes. Records are read optimistically unless they are hot or were locked by an
/// aborted attempt of the same transaction, in which case they are read-locked immediately.
pub struct Worker<'r> {
    config: Config,
    cll: CurrentLockList<'r, Record>,
    rll: RetrospectiveLockList<'r, Record>,
    access_sets: AccessSets<'r, Record>,
    statistics: Statistics,
}

/// [`Statistics`] counts the outcomes of transaction attempts.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    /// Committed transactions.
    pub commits: u64,

    /// Attempts aborted by a failed lock acquisition outside the canonical order.
    pub race_aborts: u64,

    /// Attempts aborted by read verification.
    pub conflicts: u64,
}

/// [`Attempt`] is handed to the transaction body; it records reads and writes of a single
/// transaction attempt.
pub struct Attempt<'w, 'r> {
    worker: &'w mut Worker<'r>,
}

impl<'r> Worker<'r> {
    /// Creates a new [`Worker`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongParameter`] if the configuration is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use sap_tsf_locklist::{Config, Table, Worker};
    ///
    /// let table = Table::new(0..2).unwrap();
    /// let mut worker = Worker::new(Config::default()).unwrap();
    /// let result = worker.run(|attempt| {
    ///     let from = table.get(0)?;
    ///     let to = table.get(1)?;
    ///     let value = attempt.read(from)?;
    ///     attempt.write(from, value.wrapping_sub(1));
    ///     let value = attempt.read(to)?;
    ///     attempt.write(to, value + 1);
    ///     Ok(value + 1)
    /// });
    /// assert_eq!(result, Ok(1));
    /// assert_eq!(worker.statistics().commits, 1);
    /// ```
    #[inline]
    pub fn new(config: Config) -> Result<Worker<'r>, Error> {
        config.validate()?;
        Ok(Worker {
            config,
            cll: CurrentLockList::new(config.lock_list_capacity(), config.try_lock_spins()),
            rll: RetrospectiveLockList::new(config.lock_list_capacity()),
            access_sets: AccessSets::new(config.max_accesses() as usize),
            statistics: Statistics::default(),
        })
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the statistics.
    #[inline]
    pub fn statistics(&self) -> Statistics {
        self.statistics
    }

    /// Runs the transaction until it commits.
    ///
    /// The transaction body may be invoked multiple times; an attempt ending with a retryable
    /// error is rolled back, and the transaction is retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetryLimitExceeded`] if the transaction keeps aborting, or the error
    /// returned by the transaction body if it is not retryable.
    ///
    /// # Panics
    ///
    /// Panics if the transaction body accesses more records than configured.
    #[inline]
    pub fn run<R, F>(&mut self, mut transaction: F) -> Result<R, Error>
    where
        F: FnMut(&mut Attempt<'_, 'r>) -> Result<R, Error>,
    {
        let mut retries = 0;
        loop {
            self.begin();
            let result = match transaction(&mut Attempt { worker: self }) {
                Ok(result) => self.precommit().map(|()| result),
                Err(error) => Err(error),
            };
            match result {
                Ok(result) => {
                    self.end();
                    self.statistics.commits += 1;
                    return Ok(result);
                }
                Err(error) if error.is_retryable() => {
                    self.abort(&error);
                    if retries >= self.config.max_retries() {
                        debug!(retries, "giving up the transaction");
                        self.rll.reset();
                        return Err(Error::RetryLimitExceeded);
                    }
                    retries += 1;
                }
                Err(error) => {
                    debug!(%error, "transaction failed");
                    self.end();
                    return Err(error);
                }
            }
        }
    }

    /// Starts a new attempt.
    fn begin(&mut self) {
        debug_assert!(self.cll.is_empty());
        self.access_sets.clear();
        if self.config.retrospective() && !self.rll.is_empty() {
            self.cll.prepopulate_for_retrospective_lock_list(&self.rll);
        }
    }

    /// Acquires every lock, verifies reads, and installs writes.
    fn precommit(&mut self) -> Result<(), Error> {
        self.access_sets.sort_write_set();
        self.cll
            .batch_insert_write_placeholders(self.access_sets.write_set());
        if !self.cll.is_empty() {
            self.cll
                .try_or_acquire_multiple_locks(self.cll.last_active_entry())?;
        }

        for read in self.access_sets.read_set() {
            let record = read.lock();
            let locked_by_self = self
                .cll
                .binary_search(record.universal_lock_id())
                .map_or(false, |pos| self.cll.entry(pos).is_locked());
            if !read.is_current() || (!locked_by_self && record.queue_lock().is_write_locked()) {
                record.increment_hotness();
                return Err(Error::Conflict);
            }
        }

        // Only the latest write of each record is installed.
        let write_set = self.access_sets.write_set();
        for (i, write) in write_set.iter().enumerate() {
            if write_set.get(i + 1).map_or(false, |next| next.id() == write.id()) {
                continue;
            }
            debug_assert!(self
                .cll
                .binary_search(write.id())
                .map_or(false, |pos| self.cll.entry(pos).taken_mode() == LockMode::WriteLock));
            write.lock().install(write.value());
        }
        Ok(())
    }

    /// Cleans up after a committed or failed transaction.
    fn end(&mut self) {
        self.cll.release_all();
        self.cll.reset();
        self.rll.reset();
        self.access_sets.clear();
    }

    /// Rolls back the attempt, and remembers the locks it needed.
    fn abort(&mut self, error: &Error) {
        if *error == Error::RaceAbort {
            self.statistics.race_aborts += 1;
        } else {
            self.statistics.conflicts += 1;
        }
        self.cll.release_all();
        if self.config.retrospective() {
            self.rll
                .construct(&self.access_sets, self.config.read_lock_threshold());
        }
        debug!(
            %error,
            retrospective_locks = self.rll.last_active_entry(),
            "transaction attempt aborted"
        );
        self.cll.reset();
        self.access_sets.clear();
    }
}

impl<'w, 'r> Attempt<'w, 'r> {
    /// Reads the value of the record.
    ///
    /// Pending writes of the same attempt are visible.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RaceAbort`] if the record had to be locked, and the lock could not be
    /// acquired.
    #[inline]
    pub fn read(&mut self, record: &'r Record) -> Result<u64, Error> {
        let worker = &mut *self.worker;
        if let Some(write) = worker.access_sets.pending_write(record) {
            return Ok(write.value());
        }

        let listed = worker
            .cll
            .binary_search(record.universal_lock_id())
            .is_some();
        let (version, value) =
            if listed || record.hotness() >= worker.config.read_lock_threshold() {
                let pos = worker.cll.get_or_add_entry(record, LockMode::ReadLock);
                worker.cll.try_or_acquire_multiple_locks(pos)?;
                record.read_locked()
            } else {
                record.read_optimistic()
            };
        worker.access_sets.add_read(record, version);
        Ok(value)
    }

    /// Writes a new value into the record.
    ///
    /// The value is installed when the transaction commits.
    #[inline]
    pub fn write(&mut self, record: &'r Record, value: u64) {
        self.worker.access_sets.add_write(record, value);
    }
}
