//! DataCarrier - Multi-Channel Bounded Buffer with a Replaceable Consumer Pool
//!
//! A carrier sits between many producer threads and a small pool of consumer
//! threads. Items are routed by a pluggable [`Partitioner`] into one of a
//! fixed set of bounded channels; each channel is drained by exactly one
//! worker, which hands batches to a [`Consumer`] on a timed cycle.
//!
//! # Key Features
//!
//! - Per-channel FIFO, with no lock spanning channels
//! - Three overflow policies: block, reject, or evict the oldest item
//! - Round-robin, thread-affine and key-based routing, swappable at runtime
//! - Consumer pools that can be replaced while producers keep writing
//! - Producers fail fast once the installed pool stops
//!
//! # Example
//!
//! ```
//! use datacarrier::{ConsumeError, Consumer, ConsumerSource, DataCarrier};
//! use std::time::Duration;
//!
//! struct Print;
//!
//! impl Consumer<String> for Print {
//!     fn consume(&mut self, batch: &[String]) -> Result<(), ConsumeError> {
//!         for line in batch {
//!             println!("{line}");
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let carrier = DataCarrier::new(2, 128).unwrap();
//! carrier
//!     .consume_with_cycle(ConsumerSource::factory(|| Print), 1, Duration::from_millis(5))
//!     .unwrap();
//!
//! assert!(carrier.produce("segment finished".to_string()));
//!
//! // Delivers whatever is still buffered, then stops the worker.
//! carrier.shutdown_consumers_and_wait();
//! assert!(!carrier.produce("too late".to_string()));
//! ```

mod buffer;
mod carrier;
mod channels;
mod config;
mod consumer;
mod error;
mod invariants;
mod metrics;
mod partition;
mod pool;
mod registry;
mod strategy;

pub use buffer::{Buffer, WriteOutcome};
pub use carrier::{BlockingDataCarrier, DataCarrier, DEFAULT_NAME};
pub use channels::Channels;
pub use config::{CarrierConfig, DEFAULT_CONSUME_CYCLE};
pub use consumer::{BoxError, ConsumeError, Consumer, ConsumerSource};
pub use error::{CarrierError, ConfigError, RejectReason, Rejected};
pub use metrics::{CarrierMetrics, MetricsSnapshot};
pub use partition::{KeyPartitioner, Partitioner, RollingPartitioner, ThreadPartitioner};
pub use pool::{Admission, ConsumerPool, PoolSignal, PoolState};
pub use registry::PoolRegistry;
pub use strategy::BufferStrategy;
