//! Fixed-arena memory pool with pluggable placement strategies.
//!
//! A [`Pool`] reserves one contiguous arena up front and serves every
//! allocation out of it for the rest of its lifetime; it never grows and
//! never gives memory back to the system until it is dropped. Every block is
//! preceded by an 8 byte header holding its payload size, and the blocks
//! exactly tile the arena at all times:
//!
//! ```text
//! +--------+-----------------+--------+---------+--------+--------------+
//! | Header |     Payload     | Header | Payload | Header |   Payload    |
//! +--------+-----------------+--------+---------+--------+--------------+
//! ^        ^
//! |        first payload address (block addresses point here)
//! arena start
//! ```
//!
//! Free blocks are picked by the [`FitStrategy`] chosen at creation, which
//! decides how much slack an allocation leaves behind in the block it is
//! carved from. Returned blocks merge with free neighbours,
//! and when the free space still ends up scattered between live allocations
//! the pool can detect it ([`Pool::is_fragmented`]) and repair it in place
//! ([`Pool::compact`]), reporting where every moved block ended up.
//!
//! ```
//! use fixedpool::{FitStrategy, Pool};
//!
//! let pool = Pool::new(256, FitStrategy::BestFit)?;
//!
//! let addr = pool.allocate(24)?;
//! pool.write(addr, b"hello")?;
//! assert_eq!(pool.read(addr, 5)?, b"hello");
//!
//! pool.deallocate(addr)?;
//! # Ok::<(), fixedpool::PoolError>(())
//! ```
//!
//! The pool is a cheaply clonable handle; clones share the arena and every
//! operation takes the pool's lock for its full duration, so concurrent
//! callers always observe a consistent arena.

mod arena;
mod compact;
mod error;
mod pool;
mod registry;
mod strategy;
mod utils;

pub use arena::BlockAddr;
pub use compact::Relocation;
pub use error::{PoolError, Result};
pub use pool::{Pool, Statistics};
pub use strategy::FitStrategy;
