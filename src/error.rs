// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorfleet-rs

//! Error kinds shared across the crate

use thiserror::Error;

/// Errors produced or classified by the core.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed config or sensor definition.
    #[error("{0}")]
    Validation(String),

    /// Unknown sensor id on get/update/remove.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate sensor id on register.
    #[error("{0}")]
    AlreadyExists(String),

    /// The store backend is closed.
    #[error("store unavailable")]
    StoreUnavailable,

    /// A store read or write failed.
    #[error("store i/o: {0}")]
    StoreIo(String),

    /// Bus transport failure (disconnected, publish refused).
    #[error("transport: {0}")]
    Transport(String),

    /// A request did not receive a reply before its deadline.
    #[error("request timed out")]
    Timeout,

    /// JSON encode/decode failure.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The sampling task queue is at capacity; the tick was dropped.
    #[error("task queue full")]
    QueueFull,
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::StoreIo(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
