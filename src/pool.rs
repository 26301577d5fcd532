use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::arena::{Arena, BlockAddr, HEADER_SIZE};
use crate::compact::Relocation;
use crate::error::{PoolError, Result};
use crate::registry::Registry;
use crate::strategy::FitStrategy;

/// Point-in-time snapshot of the pool's occupancy, as computed by
/// [`Pool::statistics`]. Rendering is left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    /// Usable capacity of the arena after rounding.
    pub total_size: usize,
    /// Number of live allocations.
    pub live_chunks: usize,
    /// Sum of the free block sizes.
    pub free_bytes: usize,
    /// Number of free blocks.
    pub free_chunks: usize,
    /// Size of the smallest free block, 0 when there is none.
    pub smallest_free: usize,
    /// Size of the largest free block, 0 when there is none.
    pub largest_free: usize,
}

/// A fixed-arena memory pool.
///
/// The pool reserves its whole arena up front and serves every allocation
/// out of it; it never grows. Handles are cheap to clone and all of them
/// drive the same arena, one operation at a time. Dropping the last handle
/// releases the arena.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Mutex<PoolInner>>,
}

impl Pool {
    /// Creates a pool over a fresh arena of at least `capacity` bytes.
    ///
    /// The capacity is rounded up to the next multiple of 64, and the whole
    /// of it starts out as a single free block. `capacity` must not be zero.
    pub fn new(capacity: usize, strategy: FitStrategy) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(PoolInner::new(capacity, strategy)?)),
        })
    }

    /// Allocates a block of exactly `size` bytes and returns its address.
    ///
    /// The pool's [`FitStrategy`] decides which free block the allocation is
    /// carved out of. When the chosen block is larger than needed the tail
    /// is split off and stays free, except when that tail would be too small
    /// to even hold its own header, in which case the caller gets the whole
    /// block and the slack is accounted as used.
    ///
    /// Exhaustion is an ordinary error. The pool is left untouched, so the
    /// caller may free memory or [`Pool::compact`] and try again.
    pub fn allocate(&self, size: usize) -> Result<BlockAddr> {
        self.inner.lock().allocate(size)
    }

    /// Returns the block at `addr` to the pool.
    ///
    /// When a free block borders the returned one, the two are merged on the
    /// spot, at most one merge per call. Addresses that are not live
    /// allocations of this pool are rejected.
    pub fn deallocate(&self, addr: BlockAddr) -> Result<()> {
        self.inner.lock().deallocate(addr)
    }

    /// Copies `data` to the start of the live block at `addr`.
    pub fn write(&self, addr: BlockAddr, data: &[u8]) -> Result<()> {
        self.inner.lock().write(addr, data)
    }

    /// Reads the first `len` payload bytes of the live block at `addr`.
    pub fn read(&self, addr: BlockAddr, len: usize) -> Result<Vec<u8>> {
        self.inner.lock().read(addr, len)
    }

    /// Sum of the free block sizes.
    pub fn available_memory(&self) -> usize {
        self.inner.lock().available_memory()
    }

    /// Sum of the live block sizes, slack from unsplit tails included.
    pub fn used_memory(&self) -> usize {
        self.inner.lock().used_memory()
    }

    /// Capacity of the arena after rounding.
    pub fn usable_size(&self) -> usize {
        self.inner.lock().arena.usable_size()
    }

    /// Tells whether free space is currently fragmented.
    ///
    /// A pool with a single free block only counts as fragmented when a live
    /// allocation sits above that block. With two or more free blocks the
    /// answer is always true; on the way out the check also repairs one
    /// missed merge between adjacent free blocks when it finds one, so
    /// calling this repeatedly converges on a fully coalesced free registry.
    pub fn is_fragmented(&self) -> bool {
        self.inner.lock().is_fragmented()
    }

    /// Slides live allocations towards the bottom of the arena until all
    /// free space forms one block at the top, and returns one
    /// [`Relocation`] per block that moved.
    ///
    /// Payload bytes travel with their blocks. Previously handed out
    /// addresses of moved blocks are invalid afterwards; the relocation list
    /// is how callers rebind them.
    pub fn compact(&self) -> Vec<Relocation> {
        self.inner.lock().compact()
    }

    /// Computes a [`Statistics`] snapshot under the same lock as every other
    /// operation, so the fields are consistent with each other.
    pub fn statistics(&self) -> Statistics {
        self.inner.lock().statistics()
    }
}

/// The engine behind [`Pool`]. Everything in here assumes the caller holds
/// the pool's lock.
pub(crate) struct PoolInner {
    /// Backing buffer and header storage.
    pub(crate) arena: Arena,
    /// Blocks available for allocation.
    pub(crate) free: Registry,
    /// Blocks currently handed out to callers.
    pub(crate) live: Registry,
    /// Placement policy, fixed at creation.
    pub(crate) strategy: FitStrategy,
}

impl PoolInner {
    pub(crate) fn new(capacity: usize, strategy: FitStrategy) -> Result<Self> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }

        let arena = Arena::new(capacity);
        let mut free = Registry::new();
        free.insert_front(arena.base())?;

        Ok(Self {
            arena,
            free,
            live: Registry::new(),
            strategy,
        })
    }

    pub(crate) fn allocate(&mut self, size: usize) -> Result<BlockAddr> {
        if size == 0 {
            return Err(PoolError::ZeroSize);
        }

        let Some(candidate) = self.strategy.pick(&self.free, &self.arena, size) else {
            let largest_free = self.free.largest_block(&self.arena).map_or(0, |(_, s)| s);
            warn!(requested = size, largest_free, "no free block fits the allocation");
            return Err(PoolError::Exhausted {
                requested: size,
                largest_free,
            });
        };

        let available = self.arena.read_header(candidate);
        let leftover = available - size;

        if leftover > HEADER_SIZE {
            // Split. The candidate shrinks to the requested size and the
            // tail becomes a free block of its own, taking over the
            // candidate's slot in the registry.
            self.arena.write_header(candidate, size);
            let remainder = candidate.next(size);
            self.arena.write_header(remainder, leftover - HEADER_SIZE);
            self.free.replace(candidate, remainder)?;
        } else {
            // The tail could not even hold a header, so the caller gets the
            // whole block. Its header keeps the original size to leave the
            // slack accounted for.
            self.free.remove(candidate);
        }

        self.live.insert_front(candidate)?;
        Ok(candidate)
    }

    pub(crate) fn deallocate(&mut self, addr: BlockAddr) -> Result<()> {
        if !self.live.contains(addr) {
            warn!(%addr, "deallocation of an address that is not a live allocation");
            return Err(PoolError::UnknownAddress { addr });
        }

        let size = self.arena.read_header(addr);

        // A free block starting right behind this one is absorbed into it.
        let right = self.free.iter().find(|&block| block == addr.next(size));
        if let Some(right) = right {
            let right_size = self.arena.read_header(right);
            self.arena.write_header(addr, size + HEADER_SIZE + right_size);
            self.free.remove(right);
            self.live.remove(addr);
            return self.free.insert_front(addr);
        }

        // Otherwise this one may sit right behind a free block, in which
        // case that block absorbs it and moves to the front of the registry.
        let left = self
            .free
            .iter()
            .find(|&block| block.next(self.arena.read_header(block)) == addr);
        if let Some(left) = left {
            let left_size = self.arena.read_header(left);
            self.arena.write_header(left, left_size + HEADER_SIZE + size);
            self.free.remove(left);
            self.live.remove(addr);
            return self.free.insert_front(left);
        }

        // No free neighbour; the block goes back as it is.
        self.live.remove(addr);
        self.free.insert_front(addr)
    }

    pub(crate) fn write(&mut self, addr: BlockAddr, data: &[u8]) -> Result<()> {
        if !self.live.contains(addr) {
            return Err(PoolError::UnknownAddress { addr });
        }
        let size = self.arena.read_header(addr);
        if data.len() > size {
            return Err(PoolError::OutOfBounds {
                addr,
                len: data.len(),
                size,
            });
        }

        self.arena.payload_mut(addr, data.len()).copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn read(&self, addr: BlockAddr, len: usize) -> Result<Vec<u8>> {
        if !self.live.contains(addr) {
            return Err(PoolError::UnknownAddress { addr });
        }
        let size = self.arena.read_header(addr);
        if len > size {
            return Err(PoolError::OutOfBounds { addr, len, size });
        }

        Ok(self.arena.payload(addr, len).to_vec())
    }

    pub(crate) fn available_memory(&self) -> usize {
        self.free.iter().map(|block| self.arena.read_header(block)).sum()
    }

    pub(crate) fn used_memory(&self) -> usize {
        self.live.iter().map(|block| self.arena.read_header(block)).sum()
    }

    pub(crate) fn statistics(&self) -> Statistics {
        let (smallest_free, largest_free) = if self.free.is_empty() {
            debug!("free registry is empty, smallest and largest free fall back to 0");
            (0, 0)
        } else {
            (
                self.free.smallest_block(&self.arena).map_or(0, |(_, s)| s),
                self.free.largest_block(&self.arena).map_or(0, |(_, s)| s),
            )
        };

        Statistics {
            total_size: self.arena.usable_size(),
            live_chunks: self.live.len(),
            free_bytes: self.available_memory(),
            free_chunks: self.free.len(),
            smallest_free,
            largest_free,
        }
    }
}

/// Walks every block of `pool` and asserts that the free and live extents,
/// headers included, exactly tile the arena.
#[cfg(test)]
pub(crate) fn assert_tiling(pool: &PoolInner) {
    let mut blocks: Vec<BlockAddr> = pool.free.iter().chain(pool.live.iter()).collect();
    blocks.sort();

    let mut cursor = 0;
    for addr in blocks {
        assert_eq!(cursor + HEADER_SIZE, addr.offset(), "gap or overlap at {addr}");
        cursor = addr.offset() + pool.arena.read_header(addr);
    }
    assert_eq!(HEADER_SIZE + pool.arena.usable_size(), cursor);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pool with live allocations carved so that the free registry holds
    /// blocks of 64, 8 and 40 bytes, in that scan order.
    fn carved_pool(strategy: FitStrategy) -> (PoolInner, [BlockAddr; 3]) {
        let mut pool = PoolInner::new(256, strategy).unwrap();
        let a = pool.allocate(40).unwrap();
        let _ = pool.allocate(8).unwrap();
        let c = pool.allocate(8).unwrap();
        let _ = pool.allocate(8).unwrap();
        let e = pool.allocate(64).unwrap();
        let _ = pool.allocate(88).unwrap();

        // None of these border each other, so no merging happens.
        for addr in [a, c, e] {
            pool.deallocate(addr).unwrap();
        }

        assert_tiling(&pool);
        (pool, [a, c, e])
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            Pool::new(0, FitStrategy::FirstFit),
            Err(PoolError::ZeroCapacity)
        ));
    }

    #[test]
    fn zero_size_allocation_is_rejected() {
        let mut pool = PoolInner::new(128, FitStrategy::FirstFit).unwrap();
        assert_eq!(Err(PoolError::ZeroSize), pool.allocate(0));
    }

    #[test]
    fn fresh_pool_is_one_free_block() {
        let pool = PoolInner::new(120, FitStrategy::FirstFit).unwrap();

        assert_eq!(128, pool.arena.usable_size());
        assert_eq!(128, pool.available_memory());
        assert_eq!(0, pool.used_memory());
        assert_eq!(1, pool.free.len());
        assert_tiling(&pool);
    }

    #[test]
    fn allocate_then_deallocate_restores_the_counters() {
        let mut pool = PoolInner::new(128, FitStrategy::FirstFit).unwrap();

        let addr = pool.allocate(32).unwrap();
        assert_eq!(32, pool.used_memory());
        assert_eq!(88, pool.available_memory());
        assert_tiling(&pool);

        pool.deallocate(addr).unwrap();
        assert_eq!(0, pool.used_memory());
        assert_eq!(128, pool.available_memory());
        assert_eq!(1, pool.free.len());
        assert_tiling(&pool);
    }

    #[test]
    fn small_leftover_is_handed_over_whole() {
        let mut pool = PoolInner::new(128, FitStrategy::FirstFit).unwrap();
        let _ = pool.allocate(32).unwrap();

        // The remaining free block holds 88 bytes; a leftover of exactly
        // HEADER_SIZE is too small to split off.
        let addr = pool.allocate(80).unwrap();

        assert_eq!(88, pool.arena.read_header(addr));
        assert_eq!(120, pool.used_memory());
        assert_eq!(0, pool.available_memory());
        assert_eq!(0, pool.free.len());
        assert_tiling(&pool);
    }

    #[test]
    fn space_for_freed_block_is_reused() {
        let mut pool = PoolInner::new(128, FitStrategy::FirstFit).unwrap();
        let first = pool.allocate(32).unwrap();
        let _ = pool.allocate(32).unwrap();

        pool.deallocate(first).unwrap();
        let second = pool.allocate(32).unwrap();

        assert_eq!(first, second);
        assert_tiling(&pool);
    }

    #[test]
    fn exhaustion_reports_the_largest_free_block() {
        let mut pool = PoolInner::new(64, FitStrategy::FirstFit).unwrap();

        assert_eq!(
            Err(PoolError::Exhausted {
                requested: 100,
                largest_free: 64,
            }),
            pool.allocate(100)
        );

        let _ = pool.allocate(64).unwrap();
        assert_eq!(
            Err(PoolError::Exhausted {
                requested: 1,
                largest_free: 0,
            }),
            pool.allocate(1)
        );
    }

    #[test]
    fn foreign_and_double_deallocations_are_rejected() {
        let mut pool = PoolInner::new(128, FitStrategy::FirstFit).unwrap();
        let addr = pool.allocate(16).unwrap();

        assert_eq!(
            Err(PoolError::UnknownAddress {
                addr: BlockAddr(100),
            }),
            pool.deallocate(BlockAddr(100))
        );

        pool.deallocate(addr).unwrap();
        assert_eq!(
            Err(PoolError::UnknownAddress { addr }),
            pool.deallocate(addr)
        );
    }

    #[test]
    fn deallocation_absorbs_the_free_block_on_the_right() {
        let mut pool = PoolInner::new(256, FitStrategy::FirstFit).unwrap();
        let a = pool.allocate(64).unwrap();
        let b = pool.allocate(64).unwrap();
        let c = pool.allocate(64).unwrap();

        // c borders the 40 byte tail, b then borders the merged block, and
        // so on down to a single free block covering the whole arena.
        pool.deallocate(c).unwrap();
        assert_eq!(112, pool.available_memory());
        assert_eq!(1, pool.free.len());

        pool.deallocate(b).unwrap();
        assert_eq!(184, pool.available_memory());
        assert_eq!(1, pool.free.len());

        pool.deallocate(a).unwrap();
        assert_eq!(256, pool.available_memory());
        assert_eq!(1, pool.free.len());
        assert!(!pool.is_fragmented());
        assert_tiling(&pool);
    }

    #[test]
    fn deallocation_is_absorbed_into_the_free_block_on_the_left() {
        let mut pool = PoolInner::new(256, FitStrategy::FirstFit).unwrap();
        let a = pool.allocate(64).unwrap();
        let b = pool.allocate(64).unwrap();
        let _c = pool.allocate(64).unwrap();

        pool.deallocate(a).unwrap();
        pool.deallocate(b).unwrap();

        let stats = pool.statistics();
        assert_eq!(2, stats.free_chunks);
        assert_eq!(176, stats.free_bytes);
        assert_eq!(136, stats.largest_free);
        assert_eq!(40, stats.smallest_free);
        assert_tiling(&pool);
    }

    #[test]
    fn deallocation_absorbs_at_most_once() {
        let mut pool = PoolInner::new(256, FitStrategy::FirstFit).unwrap();
        let a = pool.allocate(64).unwrap();
        let b = pool.allocate(64).unwrap();
        let c = pool.allocate(64).unwrap();

        pool.deallocate(a).unwrap();
        pool.deallocate(b).unwrap();

        // c absorbs the tail on its right and ends up bordering the merged
        // block below it, which a single call does not also absorb.
        pool.deallocate(c).unwrap();
        assert_eq!(2, pool.free.len());
        assert_eq!(248, pool.available_memory());
        assert_tiling(&pool);

        // The missed merge is repaired by the fragmentation check.
        assert!(pool.is_fragmented());
        assert_eq!(1, pool.free.len());
        assert_eq!(256, pool.available_memory());
        assert_tiling(&pool);
    }

    #[test]
    fn first_fit_takes_the_frontmost_fitting_block() {
        let (mut pool, [_, _, e]) = carved_pool(FitStrategy::FirstFit);

        // Scan order is [64, 8, 40]; the front block already fits.
        let addr = pool.allocate(8).unwrap();
        assert_eq!(e, addr);
        assert_tiling(&pool);
    }

    #[test]
    fn best_fit_takes_the_exact_block() {
        let (mut pool, [_, c, _]) = carved_pool(FitStrategy::BestFit);

        let addr = pool.allocate(8).unwrap();
        assert_eq!(c, addr);
        assert_eq!(2, pool.free.len());
        assert_tiling(&pool);
    }

    #[test]
    fn worst_fit_takes_the_largest_block() {
        let (mut pool, [_, _, e]) = carved_pool(FitStrategy::WorstFit);

        let addr = pool.allocate(8).unwrap();
        assert_eq!(e, addr);
        // The 64 byte block was split, so the count is unchanged.
        assert_eq!(3, pool.free.len());
        assert_tiling(&pool);
    }

    #[test]
    fn statistics_snapshot_the_pool() {
        let (pool, _) = carved_pool(FitStrategy::FirstFit);

        assert_eq!(
            Statistics {
                total_size: 256,
                live_chunks: 3,
                free_bytes: 112,
                free_chunks: 3,
                smallest_free: 8,
                largest_free: 64,
            },
            pool.statistics()
        );
    }

    #[test]
    fn statistics_with_no_free_blocks_report_zero_extremes() {
        let mut pool = PoolInner::new(64, FitStrategy::FirstFit).unwrap();
        let _ = pool.allocate(64).unwrap();

        assert_eq!(
            Statistics {
                total_size: 64,
                live_chunks: 1,
                free_bytes: 0,
                free_chunks: 0,
                smallest_free: 0,
                largest_free: 0,
            },
            pool.statistics()
        );
    }

    #[test]
    fn payload_roundtrip() {
        let mut pool = PoolInner::new(128, FitStrategy::FirstFit).unwrap();
        let addr = pool.allocate(16).unwrap();

        pool.write(addr, b"fixed arena").unwrap();
        assert_eq!(b"fixed arena".to_vec(), pool.read(addr, 11).unwrap());
    }

    #[test]
    fn out_of_bounds_accesses_are_rejected() {
        let mut pool = PoolInner::new(128, FitStrategy::FirstFit).unwrap();
        let addr = pool.allocate(16).unwrap();

        assert_eq!(
            Err(PoolError::OutOfBounds {
                addr,
                len: 17,
                size: 16,
            }),
            pool.write(addr, &[0u8; 17])
        );
        assert_eq!(
            Err(PoolError::OutOfBounds {
                addr,
                len: 17,
                size: 16,
            }),
            pool.read(addr, 17)
        );
        assert_eq!(
            Err(PoolError::UnknownAddress {
                addr: BlockAddr(100),
            }),
            pool.read(BlockAddr(100), 1)
        );
    }

    #[test]
    fn handles_share_one_pool() {
        let pool = Pool::new(128, FitStrategy::FirstFit).unwrap();
        let other = pool.clone();
        assert_eq!(128, other.usable_size());

        let addr = pool.allocate(32).unwrap();
        assert_eq!(32, other.used_memory());
        other.deallocate(addr).unwrap();
        assert_eq!(0, pool.used_memory());
    }

    #[test]
    fn parallel_clients_keep_the_arena_tiled() {
        let pool = Pool::new(4096, FitStrategy::FirstFit).unwrap();

        let mut workers = Vec::new();
        for _ in 0..4 {
            let client = pool.clone();
            workers.push(std::thread::spawn(move || {
                let mut kept = Vec::new();
                for round in 0..8 {
                    let addr = client.allocate(64).unwrap();
                    client.write(addr, &[round as u8; 64]).unwrap();
                    if round % 2 == 0 {
                        kept.push(addr);
                    } else {
                        client.deallocate(addr).unwrap();
                    }
                }
                kept
            }));
        }

        let mut kept = Vec::new();
        for worker in workers {
            kept.extend(worker.join().unwrap());
        }

        assert_eq!(16 * 64, pool.used_memory());
        assert_tiling(&pool.inner.lock());

        for addr in kept {
            pool.deallocate(addr).unwrap();
        }
        while pool.is_fragmented() {}
        assert_eq!(0, pool.used_memory());
        assert_eq!(4096, pool.available_memory());
        assert_tiling(&pool.inner.lock());
    }
}
