use crate::arena::{Arena, BlockAddr};
use crate::registry::Registry;

/// Placement strategy used to choose between the free blocks that could
/// serve an allocation. A pool picks one strategy at creation and keeps it
/// for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStrategy {
    /// The first block in registry order that is large enough.
    FirstFit,
    /// The smallest block that is large enough. Leaves the least slack in
    /// the chosen block.
    BestFit,
    /// The largest block that is large enough. Leaves the biggest usable
    /// remainder behind.
    WorstFit,
}

impl FitStrategy {
    /// Returns the free block an allocation of `size` bytes should be
    /// carved out of, or `None` when no block is large enough.
    ///
    /// All three strategies scan the registry front to back, so on equal
    /// sizes the first encounter wins and repeated runs stay deterministic.
    pub(crate) fn pick(self, free: &Registry, arena: &Arena, size: usize) -> Option<BlockAddr> {
        match self {
            Self::FirstFit => free.iter().find(|&addr| arena.read_header(addr) >= size),
            Self::BestFit => {
                let mut candidate: Option<(BlockAddr, usize)> = None;
                for addr in free.iter() {
                    let block = arena.read_header(addr);
                    if block < size {
                        continue;
                    }
                    match candidate {
                        Some((_, best)) if block >= best => {}
                        _ => candidate = Some((addr, block)),
                    }
                }
                candidate.map(|(addr, _)| addr)
            }
            Self::WorstFit => {
                let mut candidate: Option<(BlockAddr, usize)> = None;
                for addr in free.iter() {
                    let block = arena.read_header(addr);
                    if block < size {
                        continue;
                    }
                    match candidate {
                        Some((_, worst)) if block <= worst => {}
                        _ => candidate = Some((addr, block)),
                    }
                }
                candidate.map(|(addr, _)| addr)
            }
        }
    }
}
