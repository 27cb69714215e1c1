//! Error types for the fallible surface of the runtime.
//!
//! Following the runtime's propagation policy, only two classes of failure
//! are reported through `Result`: configuration errors detected at startup
//! and heap-allocation exhaustion. The one-sided operations themselves carry
//! no error channel — resource pressure is handled by suspension, usage
//! errors are debug assertions, and a lost reply is a hang, not an error
//! value.

use thiserror::Error;

/// Errors detected while validating a [`crate::config::RuntimeConfig`].
///
/// All of these are fatal at startup: the address-field widths and arena
/// geometry are fixed before any worker runs, and a configuration that does
/// not fit them cannot be recovered from.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The cluster must have at least one core.
    #[error("cluster must have at least one core")]
    ZeroCores,

    /// Too many cores for the core-id bit field.
    #[error("{cores} cores do not fit in {bits} core-id bits")]
    CoreFieldOverflow {
        /// Configured core count.
        cores: u32,
        /// Available core-id bits.
        bits: u32,
    },

    /// The per-core heap does not fit in the offset bit field.
    #[error("per-core heap of {bytes} bytes does not fit in {bits} offset bits")]
    OffsetFieldOverflow {
        /// Requested per-core arena size.
        bytes: u64,
        /// Available offset bits.
        bits: u32,
    },

    /// The block size must be a power of two of at least 8 bytes.
    #[error("block size {0} must be a power of two >= 8")]
    BadBlockSize(u64),

    /// The per-core heap must be a whole number of blocks.
    #[error("per-core heap of {bytes} bytes is not a multiple of block size {block_size}")]
    UnalignedHeap {
        /// Requested per-core arena size.
        bytes: u64,
        /// Configured block size.
        block_size: u64,
    },

    /// The message pool must hold at least one message.
    #[error("message pool capacity must be at least 1")]
    ZeroPoolCapacity,

    /// The inline payload threshold is larger than the supported maximum.
    #[error("inline payload threshold {0} exceeds maximum")]
    InlineThresholdTooLarge(usize),
}

/// Errors returned by the global and symmetric heap allocators.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocError {
    /// No free region large enough for the request.
    #[error("{region} heap exhausted: no free run of {requested} bytes")]
    Exhausted {
        /// Which heap region the request targeted.
        region: &'static str,
        /// Requested allocation size in bytes.
        requested: u64,
    },

    /// The element type does not pack evenly into the block size.
    #[error("element size {element} does not divide block size {block_size}")]
    ElementStraddlesBlock {
        /// Size of the element type in bytes.
        element: u64,
        /// Configured block size.
        block_size: u64,
    },

    /// A free did not match a live allocation.
    #[error("freeing {offset:#x}+{len} does not match a live allocation")]
    BadFree {
        /// Offset passed to free.
        offset: u64,
        /// Length passed to free.
        len: u64,
    },
}
