//! Configuration for a carrier and its consumer pools.

use crate::error::ConfigError;
use crate::strategy::BufferStrategy;
use std::time::Duration;

/// Default pause between empty consume cycles.
pub const DEFAULT_CONSUME_CYCLE: Duration = Duration::from_millis(20);

/// Configuration for a [`DataCarrier`](crate::DataCarrier).
///
/// Channel count and capacity are fixed once the carrier is built. The
/// strategy here is only the initial one; it can be swapped at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CarrierConfig {
    /// Number of independent channels (default: 1)
    pub channel_size: usize,
    /// Capacity of each channel (default: 1024)
    pub buffer_size: usize,
    /// Maximum items drained from one channel per cycle (default: `buffer_size`)
    pub batch_size: Option<usize>,
    /// Initial overflow policy (default: `Blocking`)
    pub strategy: BufferStrategy,
    /// Pause between empty consume cycles (default: 20ms)
    pub consume_cycle: Duration,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl CarrierConfig {
    /// Creates a configuration with the given shape and defaults elsewhere.
    pub const fn new(channel_size: usize, buffer_size: usize) -> Self {
        Self {
            channel_size,
            buffer_size,
            batch_size: None,
            strategy: BufferStrategy::Blocking,
            consume_cycle: DEFAULT_CONSUME_CYCLE,
            enable_metrics: false,
        }
    }

    /// Many small channels drained often.
    pub const fn low_latency() -> Self {
        Self {
            channel_size: 8,
            buffer_size: 256,
            batch_size: Some(64),
            strategy: BufferStrategy::IfPossible,
            consume_cycle: Duration::from_millis(1),
            enable_metrics: false,
        }
    }

    /// Few deep channels drained in large batches.
    pub const fn high_throughput() -> Self {
        Self {
            channel_size: 4,
            buffer_size: 16_384,
            batch_size: None,
            strategy: BufferStrategy::Blocking,
            consume_cycle: Duration::from_millis(50),
            enable_metrics: false,
        }
    }

    /// Sets the channel count.
    pub const fn with_channel_size(mut self, channel_size: usize) -> Self {
        self.channel_size = channel_size;
        self
    }

    /// Sets the per-channel capacity.
    pub const fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Caps how many items a worker takes from one channel per cycle.
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Sets the initial overflow policy.
    pub const fn with_strategy(mut self, strategy: BufferStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the default consume cycle for pools installed without one.
    pub const fn with_consume_cycle(mut self, cycle: Duration) -> Self {
        self.consume_cycle = cycle;
        self
    }

    /// Turns metrics collection on or off.
    pub const fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Items a worker drains from one channel per cycle.
    #[inline]
    pub fn batch_limit(&self) -> usize {
        self.batch_size.unwrap_or(self.buffer_size)
    }

    /// Rejects shapes that could never carry an item.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_size == 0 {
            return Err(ConfigError::ZeroChannels);
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.batch_size == Some(0) {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self::new(1, 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CarrierConfig::default();
        assert_eq!(config.channel_size, 1);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.batch_limit(), 1024);
        assert_eq!(config.strategy, BufferStrategy::Blocking);
        assert_eq!(config.consume_cycle, Duration::from_millis(20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let config = CarrierConfig::new(4, 10)
            .with_batch_size(3)
            .with_strategy(BufferStrategy::SkipToLatest)
            .with_consume_cycle(Duration::from_millis(5))
            .with_metrics(true);

        assert_eq!(config.batch_limit(), 3);
        assert_eq!(config.strategy, BufferStrategy::SkipToLatest);
        assert!(config.enable_metrics);
    }

    #[test]
    fn test_validate_rejects_zero_shapes() {
        assert_eq!(CarrierConfig::new(0, 10).validate(), Err(ConfigError::ZeroChannels));
        assert_eq!(CarrierConfig::new(2, 0).validate(), Err(ConfigError::ZeroBufferSize));
        assert_eq!(
            CarrierConfig::new(2, 10).with_batch_size(0).validate(),
            Err(ConfigError::ZeroBatchSize)
        );
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(CarrierConfig::low_latency().validate().is_ok());
        assert!(CarrierConfig::high_throughput().validate().is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_partial_config() {
        let config: CarrierConfig =
            serde_json::from_str(r#"{"channel_size": 4, "strategy": "SKIP_TO_LATEST"}"#).unwrap();
        assert_eq!(config.channel_size, 4);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.strategy, BufferStrategy::SkipToLatest);
    }
}
