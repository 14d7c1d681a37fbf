// SPDX-FileCopyrightText: 2023 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

use super::Error;

/// [`Config`] configures a [`Worker`](super::Worker).
///
/// # Examples
///
/// ```
/// use sap_tsf_locklist::{Config, Error};
///
/// let config = Config::default().with_read_lock_threshold(2).with_max_retries(16);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.read_lock_threshold(), 2);
///
/// let config = Config::default().with_max_accesses(0);
/// assert_eq!(config.validate(), Err(Error::WrongParameter("max_accesses")));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    max_accesses: u32,
    read_lock_threshold: u32,
    try_lock_spins: u32,
    max_retries: u32,
    retrospective: bool,
}

impl Config {
    /// The default number of spins before a lock attempt outside the canonical order fails.
    pub const DEFAULT_TRY_LOCK_SPINS: u32 = 5000;

    /// Sets the maximum number of reads and the maximum number of writes of an attempt.
    ///
    /// Lock lists are sized to hold every access of two consecutive attempts.
    #[inline]
    #[must_use]
    pub fn with_max_accesses(mut self, max_accesses: u32) -> Self {
        self.max_accesses = max_accesses;
        self
    }

    /// Sets the hotness at and above which records are read-locked.
    #[inline]
    #[must_use]
    pub fn with_read_lock_threshold(mut self, read_lock_threshold: u32) -> Self {
        self.read_lock_threshold = read_lock_threshold;
        self
    }

    /// Sets the spin budget of lock attempts outside the canonical order.
    #[inline]
    #[must_use]
    pub fn with_try_lock_spins(mut self, try_lock_spins: u32) -> Self {
        self.try_lock_spins = try_lock_spins;
        self
    }

    /// Sets the maximum number of retries after the first attempt.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Enables or disables retrospective lock lists.
    #[inline]
    #[must_use]
    pub fn with_retrospective(mut self, retrospective: bool) -> Self {
        self.retrospective = retrospective;
        self
    }

    /// Returns the maximum number of reads and the maximum number of writes of an attempt.
    #[inline]
    pub fn max_accesses(&self) -> u32 {
        self.max_accesses
    }

    /// Returns the capacity of lock lists.
    #[inline]
    pub fn lock_list_capacity(&self) -> u32 {
        self.max_accesses.saturating_mul(4)
    }

    /// Returns the read-lock threshold.
    #[inline]
    pub fn read_lock_threshold(&self) -> u32 {
        self.read_lock_threshold
    }

    /// Returns the spin budget.
    #[inline]
    pub fn try_lock_spins(&self) -> u32 {
        self.try_lock_spins
    }

    /// Returns the retry limit.
    #[inline]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns `true` if retrospective lock lists are used.
    #[inline]
    pub fn retrospective(&self) -> bool {
        self.retrospective
    }

    /// Checks the values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongParameter`] naming the first invalid field.
    #[inline]
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_accesses == 0 || self.max_accesses > u32::MAX / 4 {
            return Err(Error::WrongParameter("max_accesses"));
        }
        Ok(())
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Config {
            max_accesses: 64,
            read_lock_threshold: 10,
            try_lock_spins: Self::DEFAULT_TRY_LOCK_SPINS,
            max_retries: 64,
            retrospective: true,
        }
    }
}
