//! Error types for carrier operations.

use std::fmt;
use std::io;
use thiserror::Error;

/// A configuration value that would make the carrier unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `channel_size` was zero.
    #[error("channel count must be greater than zero")]
    ZeroChannels,
    /// `buffer_size` was zero.
    #[error("per-channel buffer size must be greater than zero")]
    ZeroBufferSize,
    /// `batch_size` was zero.
    #[error("batch size must be greater than zero")]
    ZeroBatchSize,
    /// A consumer pool was requested with no workers.
    #[error("consumer pool needs at least one worker")]
    ZeroConsumers,
}

/// Errors surfaced while building a carrier or installing consumers.
#[derive(Debug, Error)]
pub enum CarrierError {
    /// The supplied configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn consumer worker {index}: {source}")]
    Spawn {
        /// Index of the worker that failed to start.
        index: usize,
        #[source]
        source: io::Error,
    },
}

/// Why an item was not accepted into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RejectReason {
    /// The target channel had no free slot under `IfPossible`.
    #[error("channel is full")]
    Full,

    /// A consumer pool is installed but no longer running.
    #[error("no running consumer pool")]
    NoConsumer,

    /// The target channel has been closed.
    #[error("channel is closed")]
    Closed,
}

impl RejectReason {
    /// Returns `true` if retrying the same item later can succeed.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// An item handed back to the producer together with the reason it was refused.
///
/// Returning the item lets the producer apply its own fallback (retry, spill,
/// count-and-drop) without cloning up front.
pub struct Rejected<T> {
    reason: RejectReason,
    item: T,
}

impl<T> Rejected<T> {
    pub(crate) fn new(reason: RejectReason, item: T) -> Self {
        Self { reason, item }
    }

    /// Why the item was refused.
    #[inline]
    pub fn reason(&self) -> RejectReason {
        self.reason
    }

    /// Borrow the refused item.
    #[inline]
    pub fn item(&self) -> &T {
        &self.item
    }

    /// Take the refused item back.
    #[inline]
    pub fn into_item(self) -> T {
        self.item
    }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<T> fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item rejected: {}", self.reason)
    }
}

impl<T> std::error::Error for Rejected<T> {}
