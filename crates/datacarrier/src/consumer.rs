//! The consumer capability a pool delivers batches to.
//!
//! Only [`Consumer::consume`] is required. The other hooks default to no-ops.
//!
//! ```
//! use datacarrier::{ConsumeError, Consumer};
//!
//! struct Counter { seen: usize }
//!
//! impl Consumer<u64> for Counter {
//!     fn consume(&mut self, batch: &[u64]) -> Result<(), ConsumeError> {
//!         self.seen += batch.len();
//!         Ok(())
//!     }
//! }
//! ```

use parking_lot::Mutex;
use std::any::Any;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error type accepted from consumer callbacks.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Failure raised while a consumer handled a batch.
#[derive(Debug, Error)]
pub enum ConsumeError {
    /// The consumer returned an error.
    #[error("consumer failed: {0}")]
    Failed(BoxError),

    /// The consumer panicked; the payload message is kept when it was a string.
    #[error("consumer panicked: {0}")]
    Panicked(String),
}

impl ConsumeError {
    /// Wraps any error (or a message) as a consumer failure.
    pub fn new<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Failed(error.into())
    }

    /// Returns `true` if this error came from a caught panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::from("non-string panic payload")
        };
        Self::Panicked(message)
    }
}

/// Receives batches drained from the channels a worker owns.
///
/// Each worker calls `on_start` once before its first cycle, `consume` for
/// every non-empty batch, `on_error` when `consume` fails or panics, and
/// `on_exit` once after its final drain.
pub trait Consumer<T>: Send {
    /// Called once per worker before the first cycle.
    fn on_start(&mut self) {}

    /// Handles one non-empty batch, in per-channel write order.
    fn consume(&mut self, batch: &[T]) -> Result<(), ConsumeError>;

    /// Called with the failed batch when `consume` errs or panics.
    fn on_error(&mut self, batch: &[T], error: &ConsumeError) {
        let _ = (batch, error);
    }

    /// Called once per worker when it terminates.
    fn on_exit(&mut self) {}
}

type Factory<T> = Box<dyn Fn() -> Box<dyn Consumer<T>> + Send + Sync>;

/// Where a pool gets its consumers from.
pub enum ConsumerSource<T> {
    /// A fresh instance per worker.
    Factory(Factory<T>),
    /// One instance shared by every worker. Calls are serialized by the mutex,
    /// so workers only contend while one of them is inside a hook.
    Shared(Arc<Mutex<dyn Consumer<T>>>),
}

impl<T: 'static> ConsumerSource<T> {
    /// Builds one consumer per worker from `make`.
    pub fn factory<C, F>(make: F) -> Self
    where
        C: Consumer<T> + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self::Factory(Box::new(move || Box::new(make()) as Box<dyn Consumer<T>>))
    }

    /// Shares `consumer` between all workers.
    pub fn shared<C>(consumer: C) -> Self
    where
        C: Consumer<T> + 'static,
    {
        Self::Shared(Arc::new(Mutex::new(consumer)))
    }

    /// Shares an instance the caller keeps a handle to.
    pub fn from_arc<C>(consumer: Arc<Mutex<C>>) -> Self
    where
        C: Consumer<T> + 'static,
    {
        Self::Shared(consumer)
    }

    pub(crate) fn instantiate(&self) -> WorkerConsumer<T> {
        match self {
            Self::Factory(make) => WorkerConsumer::Owned(make()),
            Self::Shared(shared) => WorkerConsumer::Shared(Arc::clone(shared)),
        }
    }
}

/// The consumer as seen by a single worker.
pub(crate) enum WorkerConsumer<T> {
    Owned(Box<dyn Consumer<T>>),
    Shared(Arc<Mutex<dyn Consumer<T>>>),
}

impl<T> WorkerConsumer<T> {
    pub(crate) fn with<R>(&mut self, f: impl FnOnce(&mut dyn Consumer<T>) -> R) -> R {
        match self {
            Self::Owned(consumer) => f(consumer.as_mut()),
            Self::Shared(shared) => {
                let mut guard = shared.lock();
                f(&mut *guard)
            }
        }
    }
}
