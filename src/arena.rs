use crate::utils::align;
use std::fmt;

/// Header size of a block. Every block has an associated header that precedes
/// its payload and holds the payload size as a native-endian `u64`.
pub(crate) const HEADER_SIZE: usize = 8;

/// Granularity of the arena. Requested capacities are rounded up to the next
/// multiple of this before the backing buffer is reserved.
pub(crate) const ARENA_ALIGNMENT: usize = 64;

/// Address of a block's payload inside the arena.
///
/// This is an opaque handle. [`crate::Pool::allocate`] hands one out and the
/// other pool operations consume it; there is nothing useful a caller can do
/// with the value itself. Internally it is the byte offset of the payload
/// into the backing buffer, which keeps addresses stable across handle clones
/// and lets compaction express moves as plain offset rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockAddr(pub(crate) usize);

impl BlockAddr {
    /// Byte offset of the payload into the backing buffer.
    pub(crate) fn offset(self) -> usize {
        self.0
    }

    /// Payload address of a block placed directly behind a block of `size`
    /// bytes living at `self`. Blocks are packed, so this is the only
    /// address arithmetic the pool ever needs.
    pub(crate) fn next(self, size: usize) -> BlockAddr {
        BlockAddr(self.0 + size + HEADER_SIZE)
    }
}

impl fmt::Display for BlockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// The arena is one contiguous, zero-initialized buffer that every block is
/// carved out of. The layout is a plain sequence of blocks, each one being a
/// header followed by its payload:
///
/// ```text
///          base()
///          |
/// +--------+-----------------+--------+---------+--------+-------------+
/// | Header |     Payload     | Header | Payload | Header |   Payload   |
/// +--------+-----------------+--------+---------+--------+-------------+
/// ^
/// offset 0
/// ```
///
/// Block extents are header-inclusive and exactly tile the buffer, so a block
/// can always find its right neighbour at `addr + size + HEADER_SIZE`. We
/// never store sizes anywhere else; the headers are the single source of
/// truth and the registries only remember addresses.
pub(crate) struct Arena {
    /// Backing buffer, `usable + HEADER_SIZE` bytes long.
    bytes: Box<[u8]>,
    /// Capacity left for payloads and interior headers once the first
    /// block's header is paid for.
    usable: usize,
}

impl Arena {
    /// Reserves the backing buffer for `requested` bytes of capacity, rounded
    /// up to [`ARENA_ALIGNMENT`], and stamps the header of the initial free
    /// block covering the whole arena.
    pub fn new(requested: usize) -> Self {
        let usable = align(requested, ARENA_ALIGNMENT);
        let mut arena = Self {
            bytes: vec![0u8; usable + HEADER_SIZE].into_boxed_slice(),
            usable,
        };
        arena.write_header(arena.base(), usable);
        arena
    }

    /// Payload address of the block at the very bottom of the arena.
    pub fn base(&self) -> BlockAddr {
        BlockAddr(HEADER_SIZE)
    }

    /// Capacity of the arena after rounding, not counting the first header.
    pub fn usable_size(&self) -> usize {
        self.usable
    }

    /// Reads the payload size stored in the header of the block at `addr`.
    pub fn read_header(&self, addr: BlockAddr) -> usize {
        let start = addr.offset() - HEADER_SIZE;
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&self.bytes[start..addr.offset()]);
        u64::from_ne_bytes(raw) as usize
    }

    /// Stamps `size` into the header of the block at `addr`.
    pub fn write_header(&mut self, addr: BlockAddr, size: usize) {
        let start = addr.offset() - HEADER_SIZE;
        self.bytes[start..addr.offset()].copy_from_slice(&(size as u64).to_ne_bytes());
    }

    /// First `len` payload bytes of the block at `addr`.
    pub fn payload(&self, addr: BlockAddr, len: usize) -> &[u8] {
        &self.bytes[addr.offset()..addr.offset() + len]
    }

    /// Mutable view of the first `len` payload bytes of the block at `addr`.
    pub fn payload_mut(&mut self, addr: BlockAddr, len: usize) -> &mut [u8] {
        &mut self.bytes[addr.offset()..addr.offset() + len]
    }

    /// Moves a whole block, header included, so that its payload lands at
    /// `dst`. Source and destination extents may overlap; the copy behaves
    /// like `memmove`.
    pub fn relocate(&mut self, src: BlockAddr, dst: BlockAddr) {
        let size = self.read_header(src);
        self.bytes.copy_within(
            src.offset() - HEADER_SIZE..src.offset() + size,
            dst.offset() - HEADER_SIZE,
        );
    }
}
