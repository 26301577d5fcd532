//! Error types for the pool.
//!
//! Every fallible operation reports a strongly-typed error carrying the
//! context a caller needs to react: the requested size on exhaustion, the
//! offending address on a bad deallocation, and so on.

use crate::arena::BlockAddr;
use thiserror::Error;

/// The error type for pool operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// A pool cannot be created over an empty arena.
    #[error("cannot create a pool with zero capacity")]
    ZeroCapacity,

    /// Zero-byte allocations are rejected instead of handing out an
    /// unusable block.
    #[error("cannot allocate zero bytes")]
    ZeroSize,

    /// No free block can satisfy the request. The pool is left untouched,
    /// so the caller may deallocate or compact and retry.
    #[error("no free block fits {requested} bytes (largest free block holds {largest_free})")]
    Exhausted {
        /// Number of bytes requested.
        requested: usize,
        /// Size of the largest free block at the time of the request.
        largest_free: usize,
    },

    /// The address does not belong to a live allocation of this pool.
    #[error("{addr} is not a live allocation")]
    UnknownAddress {
        /// The address that was presented.
        addr: BlockAddr,
    },

    /// A read or write would run past the end of the block's payload.
    #[error("access of {len} bytes exceeds the {size} byte block at {addr}")]
    OutOfBounds {
        /// The block being accessed.
        addr: BlockAddr,
        /// Number of bytes the caller asked for.
        len: usize,
        /// Payload size of the block.
        size: usize,
    },

    /// A registry was asked to track an address it already tracks.
    #[error("{addr} is already registered")]
    DuplicateAddress {
        /// The address that was inserted twice.
        addr: BlockAddr,
    },
}

/// Result type alias using [`PoolError`].
pub type Result<T> = std::result::Result<T, PoolError>;
