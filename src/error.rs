// Copyright (c) 2024-present, segmap
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::fmt;

/// Represents errors that can occur while operating the map.
#[derive(Debug)]
pub enum Error {
    /// A caller passed an absent key/value where one is required, or
    /// construction parameters were malformed.
    InvalidArgument(&'static str),

    /// The map was asked to do something that its current state forbids,
    /// e.g. calling `remove` on an iterator before `next` was ever called.
    IllegalState(&'static str),

    /// An on-disk invariant was violated: a leaf recid resolved to nothing,
    /// a queue pointed at an unknown leaf, or `verify()` found a mismatch.
    ///
    /// This is not recoverable; the backing store should be considered
    /// damaged.
    Corruption(String),

    /// A collaborator (`Store`, `IndexTree`, `QueueLong`) reported failure.
    Store(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::IllegalState(msg) => write!(f, "illegal state: {msg}"),
            Self::Corruption(msg) => write!(f, "data corruption: {msg}"),
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Error {
    fn from(value: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Store(value)
    }
}

/// Map result.
pub type Result<T> = std::result::Result<T, Error>;
