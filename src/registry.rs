use crate::arena::{Arena, BlockAddr};
use crate::error::{PoolError, Result};
use std::collections::VecDeque;

/// Collection of block addresses, used to keep track of both the free and
/// the live blocks of a pool.
///
/// A registry only stores addresses. A block's size lives in its header
/// inside the arena, so whenever a size is needed the registry reads it back
/// through the [`Arena`] instead of keeping a copy of its own.
///
/// Insertion happens at the front and scans run front to back, so the most
/// recently freed block is always the first one a scan visits.
pub(crate) struct Registry {
    /// Tracked addresses, front to back.
    blocks: VecDeque<BlockAddr>,
}

impl Registry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            blocks: VecDeque::new(),
        }
    }

    /// Number of tracked blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// It tells whether the registry tracks any block or not.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Tells whether `addr` is currently tracked.
    pub fn contains(&self, addr: BlockAddr) -> bool {
        self.blocks.contains(&addr)
    }

    /// Inserts `addr` at the front of the registry. An address that is
    /// already tracked is rejected, a second descriptor for the same block
    /// would corrupt every later scan.
    pub fn insert_front(&mut self, addr: BlockAddr) -> Result<()> {
        if self.contains(addr) {
            return Err(PoolError::DuplicateAddress { addr });
        }
        self.blocks.push_front(addr);
        Ok(())
    }

    /// Removes `addr` from the registry. Returns whether it was tracked.
    /// Removing the only element leaves the registry empty.
    pub fn remove(&mut self, addr: BlockAddr) -> bool {
        match self.blocks.iter().position(|&block| block == addr) {
            Some(index) => {
                self.blocks.remove(index);
                true
            }
            None => false,
        }
    }

    /// Replaces `old` with `new` without disturbing its position in the
    /// registry. This is how a split hands a candidate's registry slot over
    /// to the remainder block, and how compaction renames a relocated block.
    pub fn replace(&mut self, old: BlockAddr, new: BlockAddr) -> Result<()> {
        if old != new && self.contains(new) {
            return Err(PoolError::DuplicateAddress { addr: new });
        }
        match self.blocks.iter().position(|&block| block == old) {
            Some(index) => {
                self.blocks[index] = new;
                Ok(())
            }
            None => Err(PoolError::UnknownAddress { addr: old }),
        }
    }

    /// Iterates the tracked addresses in registry order, front to back.
    pub fn iter(&self) -> impl Iterator<Item = BlockAddr> + '_ {
        self.blocks.iter().copied()
    }

    /// Lowest tracked address.
    pub fn min_address(&self) -> Option<BlockAddr> {
        self.blocks.iter().copied().min()
    }

    /// Tracked block with the smallest payload, with its size. On ties the
    /// first one in registry order wins.
    pub fn smallest_block(&self, arena: &Arena) -> Option<(BlockAddr, usize)> {
        let mut found: Option<(BlockAddr, usize)> = None;
        for addr in self.iter() {
            let size = arena.read_header(addr);
            match found {
                Some((_, best)) if size >= best => {}
                _ => found = Some((addr, size)),
            }
        }
        found
    }

    /// Tracked block with the largest payload, with its size. On ties the
    /// first one in registry order wins.
    pub fn largest_block(&self, arena: &Arena) -> Option<(BlockAddr, usize)> {
        let mut found: Option<(BlockAddr, usize)> = None;
        for addr in self.iter() {
            let size = arena.read_header(addr);
            match found {
                Some((_, best)) if size <= best => {}
                _ => found = Some((addr, size)),
            }
        }
        found
    }
}
