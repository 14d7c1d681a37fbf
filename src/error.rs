// SPDX-FileCopyrightText: 2021 Changgyoo Park <wvwwvwwv@me.com>
//
// SPDX-License-Identifier: Apache-2.0

use std::error;
use std::fmt;

/// [`Error`] defines all the error codes used by the record locking layer.
///
/// Only [`Error::RaceAbort`] and [`Error::Conflict`] are expected during normal operation; both
/// require the whole transaction attempt to be aborted and retried.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Optimistic verification found a record that had been modified since it was read.
    Conflict,

    /// The desired record could not be found.
    NotFound,

    /// A bounded lock acquisition outside the canonical order did not succeed in time.
    RaceAbort,

    /// The transaction kept aborting until the retry limit was reached.
    RetryLimitExceeded,

    /// The same key was registered twice.
    UniquenessViolation,

    /// The supplied parameter value is wrong.
    WrongParameter(&'static str),
}

impl Error {
    /// Returns `true` if the error only invalidates the current attempt.
    ///
    /// # Examples
    ///
    /// ```
    /// use sap_tsf_locklist::Error;
    ///
    /// assert!(Error::RaceAbort.is_retryable());
    /// assert!(Error::Conflict.is_retryable());
    /// assert!(!Error::NotFound.is_retryable());
    /// ```
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict | Error::RaceAbort)
    }
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Conflict => f.write_str("verification conflict"),
            Error::NotFound => f.write_str("record not found"),
            Error::RaceAbort => f.write_str("non-canonical lock acquisition failed"),
            Error::RetryLimitExceeded => f.write_str("retry limit exceeded"),
            Error::UniquenessViolation => f.write_str("duplicate key"),
            Error::WrongParameter(msg) => write!(f, "wrong parameter: {msg}"),
        }
    }
}

impl error::Error for Error {}
