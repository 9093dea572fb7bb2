//! An explicit table of running consumer pools, keyed by carrier name.
//!
//! The module that wires a pipeline together creates one registry, passes it
//! to every carrier it builds with [`DataCarrier::with_registry`], and calls
//! [`PoolRegistry::close_all`] on shutdown. Nothing here is global.
//!
//! [`DataCarrier::with_registry`]: crate::DataCarrier::with_registry

use crate::pool::PoolSignal;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Close handles for the pools of every registered carrier.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<String, PoolSignal>>,
}

impl PoolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `signal` under `name`, replacing and returning any previous
    /// entry. The previous pool is not closed here.
    pub fn register(&self, name: impl Into<String>, signal: PoolSignal) -> Option<PoolSignal> {
        self.pools.lock().insert(name.into(), signal)
    }

    /// Removes the entry for `name` if it still refers to the pool behind
    /// `signal`. A newer registration under the same name is left alone.
    pub fn unregister(&self, name: &str, signal: &PoolSignal) -> bool {
        let mut pools = self.pools.lock();
        match pools.get(name) {
            Some(current) if current.same_pool(signal) => {
                pools.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Returns the close handle registered under `name`.
    pub fn get(&self, name: &str) -> Option<PoolSignal> {
        self.pools.lock().get(name).cloned()
    }

    /// Names of all registered carriers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered pools.
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.pools.lock().is_empty()
    }

    /// Teardown: closes every registered pool and empties the registry.
    ///
    /// Returns how many pools were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(String, PoolSignal)> = self.pools.lock().drain().collect();
        for (name, signal) in &drained {
            tracing::debug!(carrier = %name, "closing registered consumer pool");
            signal.close();
        }
        drained.len()
    }
}
