//! Fragmentation analysis and in-place compaction.
//!
//! Free space counts as fragmented when it cannot all be reached at the top
//! of the arena, that is, when a hole sits below a live allocation.
//! Compaction repairs this by sliding live blocks towards the bottom, one at
//! a time, until the free space forms a single block at the top:
//!
//! ```text
//! +-----+--------+-----+------+-----+        +-----+-----+-----+----------+
//! |  A  |  hole  |  B  | hole |  C  |  ->    |  A  |  B  |  C  |   hole   |
//! +-----+--------+-----+------+-----+        +-----+-----+-----+----------+
//! ```
//!
//! The moves are plain byte copies inside the arena; payloads travel with
//! their headers and the live registry is renamed entry by entry, so callers
//! only need the returned [`Relocation`] list to rebind their addresses.

use tracing::debug;

use crate::arena::{BlockAddr, HEADER_SIZE};
use crate::pool::PoolInner;

/// One live block movement performed by [`crate::Pool::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Payload address before compaction.
    pub from: BlockAddr,
    /// Payload address after compaction.
    pub to: BlockAddr,
}

impl PoolInner {
    /// First pair of free blocks whose extents touch, lower address first.
    /// Pure query; the registries and headers are left untouched.
    pub(crate) fn adjacent_free_pair(&self) -> Option<(BlockAddr, BlockAddr)> {
        for left in self.free.iter() {
            let left_size = self.arena.read_header(left);
            for right in self.free.iter() {
                if left.next(left_size) == right {
                    return Some((left, right));
                }
            }
        }
        None
    }

    /// Merges `right` into `left`. The pair must be adjacent, as returned by
    /// [`PoolInner::adjacent_free_pair`].
    pub(crate) fn coalesce_pair(&mut self, left: BlockAddr, right: BlockAddr) {
        let left_size = self.arena.read_header(left);
        debug_assert_eq!(left.next(left_size), right);

        let right_size = self.arena.read_header(right);
        self.arena
            .write_header(left, left_size + HEADER_SIZE + right_size);
        self.free.remove(right);
    }

    pub(crate) fn is_fragmented(&mut self) -> bool {
        if self.free.is_empty() {
            return false;
        }

        if self.free.len() == 1 {
            // A sole free block fragments the arena only when a live
            // allocation sits above it.
            return match self.free.min_address() {
                Some(sole) => self.live.iter().any(|live| sole < live),
                None => false,
            };
        }

        // Two or more free blocks always count as fragmented. On the way
        // out, repair one missed merge when the registry holds an adjacent
        // pair, so that repeated calls converge on a coalesced registry.
        if let Some((left, right)) = self.adjacent_free_pair() {
            self.coalesce_pair(left, right);
        }
        true
    }

    pub(crate) fn compact(&mut self) -> Vec<Relocation> {
        if self.used_memory() == 0 || self.available_memory() == 0 {
            return Vec::new();
        }

        let snapshot: Vec<BlockAddr> = self.live.iter().collect();

        while self.is_fragmented() {
            let Some(gap) = self.free.min_address() else {
                break;
            };
            let gap_size = self.arena.read_header(gap);

            // Lowest live block above the gap. Once the free registry holds
            // no adjacent pairs it sits directly behind the gap; until then
            // the merge inside is_fragmented was this iteration's progress.
            let Some(candidate) = self.live.iter().filter(|&live| gap < live).min() else {
                continue;
            };
            if candidate != gap.next(gap_size) {
                continue;
            }

            let candidate_size = self.arena.read_header(candidate);
            self.arena.relocate(candidate, gap);
            self.free.remove(gap);
            // The candidate keeps its slot in the live registry under its
            // new address, so the snapshot still lines up position by
            // position. The gap's address cannot collide with a live one.
            let _ = self.live.replace(candidate, gap);

            // The hole reappears behind the moved block, same size as
            // before, unless an entry is already recorded at that address.
            let vacated = gap.next(candidate_size);
            self.arena.write_header(vacated, gap_size);
            if !self.free.contains(vacated) {
                let _ = self.free.insert_front(vacated);
            }
        }

        let moved: Vec<Relocation> = snapshot
            .into_iter()
            .zip(self.live.iter())
            .filter(|(before, after)| before != after)
            .map(|(before, after)| Relocation {
                from: before,
                to: after,
            })
            .collect();

        debug!(moved = moved.len(), "compaction finished");
        moved
    }
}
