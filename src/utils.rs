//! This file contains all the helper functions for the allocator.
//! This are functions that don't particularly belong to any concrete module of the program.


/// It aligns `to_be_aligned` using `aligment`.
///
/// This method is used to round requested pool capacities up to the next
/// multiple of [`crate::arena::ARENA_ALIGNMENT`], so the arena we hand out
/// always has a well known granularity. `aligment` must be a power of two.
pub(crate) fn align(to_be_aligned: usize, aligment: usize) -> usize {
    (to_be_aligned + aligment - 1) & !(aligment - 1)
}
