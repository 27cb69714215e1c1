//! Runtime configuration.
//!
//! A [`RuntimeConfig`] describes the cluster geometry (core count, per-core
//! arena sizes, block size) and the resource limits of the messaging layer
//! (pool capacity, inline payload threshold). Validation happens once, in
//! [`RuntimeConfig::validate`], before any worker starts; everything the
//! validator accepts is fixed for the lifetime of the runtime. Field widths
//! for the packed address encoding are derived here and never change.

use serde::{Deserialize, Serialize};

use crate::addr::AddressLayout;
use crate::error::ConfigError;

/// Hard ceiling on the inline payload threshold.
///
/// Payloads above the configured threshold take the heap path; the threshold
/// itself may not exceed this value.
pub const INLINE_PAYLOAD_CEILING: usize = 1 << 16;

/// Default block size for the linear address family, in bytes.
pub const DEFAULT_BLOCK_SIZE: u64 = 64;

/// Configuration for a [`crate::runtime::Runtime`].
///
/// Construct with [`RuntimeConfig::new`] and adjust with the builder-style
/// setters:
///
/// ```
/// use farspace::config::RuntimeConfig;
///
/// let config = RuntimeConfig::new(4)
///     .heap_per_core(1 << 20)
///     .pool_capacity(256);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Number of cores (workers) in the cluster.
    pub cores: u32,
    /// Bytes of block-cyclic data heap owned by each core.
    pub heap_per_core: u64,
    /// Bytes of symmetric heap mirrored on each core.
    pub symmetric_heap: u64,
    /// Block size for the linear address family.
    pub block_size: u64,
    /// Maximum messages in flight per core-local message pool.
    pub pool_capacity: usize,
    /// Largest payload carried inline in a message; larger payloads take
    /// the heap path.
    pub inline_payload_max: usize,
    /// Whether idle workers steal runnable tasks from siblings.
    pub work_stealing: bool,
    /// How long an idle worker parks before re-checking its inbox, in
    /// microseconds.
    pub park_timeout_us: u64,
}

impl RuntimeConfig {
    /// Creates a configuration for the given core count with defaults for
    /// everything else.
    #[must_use]
    pub fn new(cores: u32) -> Self {
        Self {
            cores,
            heap_per_core: 1 << 20,
            symmetric_heap: 1 << 16,
            block_size: DEFAULT_BLOCK_SIZE,
            pool_capacity: 1024,
            inline_payload_max: 1024,
            work_stealing: true,
            park_timeout_us: 200,
        }
    }

    /// Sets the per-core data heap size in bytes.
    #[must_use]
    pub fn heap_per_core(mut self, bytes: u64) -> Self {
        self.heap_per_core = bytes;
        self
    }

    /// Sets the mirrored symmetric heap size in bytes.
    #[must_use]
    pub fn symmetric_heap(mut self, bytes: u64) -> Self {
        self.symmetric_heap = bytes;
        self
    }

    /// Sets the linear-family block size in bytes.
    #[must_use]
    pub fn block_size(mut self, bytes: u64) -> Self {
        self.block_size = bytes;
        self
    }

    /// Sets the per-core message pool capacity.
    #[must_use]
    pub fn pool_capacity(mut self, messages: usize) -> Self {
        self.pool_capacity = messages;
        self
    }

    /// Sets the inline payload threshold in bytes.
    #[must_use]
    pub fn inline_payload_max(mut self, bytes: usize) -> Self {
        self.inline_payload_max = bytes;
        self
    }

    /// Enables or disables work stealing between idle workers.
    #[must_use]
    pub fn work_stealing(mut self, enabled: bool) -> Self {
        self.work_stealing = enabled;
        self
    }

    /// Validates the configuration and derives the address layout.
    ///
    /// This is the single point where the fatal configuration errors of the
    /// runtime are detected: field-width overflow, unaligned arenas, and
    /// zero-capacity resources.
    pub fn validate(&self) -> Result<AddressLayout, ConfigError> {
        if self.cores == 0 {
            return Err(ConfigError::ZeroCores);
        }
        if !self.block_size.is_power_of_two() || self.block_size < 8 {
            return Err(ConfigError::BadBlockSize(self.block_size));
        }
        if self.heap_per_core % self.block_size != 0 {
            return Err(ConfigError::UnalignedHeap {
                bytes: self.heap_per_core,
                block_size: self.block_size,
            });
        }
        if self.pool_capacity == 0 {
            return Err(ConfigError::ZeroPoolCapacity);
        }
        if self.inline_payload_max > INLINE_PAYLOAD_CEILING {
            return Err(ConfigError::InlineThresholdTooLarge(self.inline_payload_max));
        }

        let layout = AddressLayout::new(self.cores, self.block_size)?;

        // Direct offsets must span the whole arena (data + symmetric).
        let arena_len = self.heap_per_core + self.symmetric_heap;
        if arena_len >= 1u64 << layout.offset_bits() {
            return Err(ConfigError::OffsetFieldOverflow {
                bytes: arena_len,
                bits: layout.offset_bits(),
            });
        }
        Ok(layout)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(RuntimeConfig::new(4).validate().is_ok());
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_cores_rejected() {
        let err = RuntimeConfig::new(0).validate().unwrap_err();
        assert_eq!(err, ConfigError::ZeroCores);
    }

    #[test]
    fn bad_block_size_rejected() {
        let err = RuntimeConfig::new(2).block_size(48).validate().unwrap_err();
        assert_eq!(err, ConfigError::BadBlockSize(48));
    }

    #[test]
    fn unaligned_heap_rejected() {
        let err = RuntimeConfig::new(2)
            .heap_per_core(1000)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnalignedHeap { .. }));
    }

    #[test]
    fn zero_pool_capacity_rejected() {
        let err = RuntimeConfig::new(2)
            .pool_capacity(0)
            .validate()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroPoolCapacity);
    }

    #[test]
    fn inline_threshold_ceiling_enforced() {
        let err = RuntimeConfig::new(2)
            .inline_payload_max(INLINE_PAYLOAD_CEILING + 1)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InlineThresholdTooLarge(_)));
    }
}
