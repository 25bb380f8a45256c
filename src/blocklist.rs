use core::fmt;
use core::ptr::NonNull;

use static_assertions::{const_assert, const_assert_eq};

/// Every header offset and every payload size is a multiple of this.
pub const BLOCK_ALIGNMENT: usize = 8;

/// The smallest payload a split-off free block may have.
///
/// If splitting would leave less than this behind, the whole block is handed
/// out instead of creating a sliver nobody can use.
pub const SPLIT_MARGIN: usize = 16;

const FLAG_FREE: u32 = 1 << 0;
const FLAG_LAST: u32 = 1 << 1;
const ADDRESS_MASK: u32 = !(BLOCK_ALIGNMENT as u32 - 1);

// Stored in the prev field of the first block. It can never be a real offset,
// because arenas are capped at `MAX_ARENA_LEN`.
const NO_PREV: u32 = ADDRESS_MASK;

/// The largest arena a `BlockList` manages. Larger regions are truncated.
///
/// Header links are 32-bit offsets from the arena base, so the whole heap has
/// to fit below 4 GiB.
pub const MAX_ARENA_LEN: usize = NO_PREV as usize;

/// The header in front of every block, free or used.
///
/// Both fields are offsets from the arena base. Offsets are multiples of 8, so
/// the bottom 3 bits of `prev_and_flags` hold the free and last flags.
#[derive(Copy, Clone)]
#[repr(C, align(8))]
struct BlockHeader {
    prev_and_flags: u32,
    // For the last block this is the end of the arena, so the size of a block
    // is always `next - offset - HEADER_SIZE`.
    next: u32,
}

/// Bytes taken by a header. The payload starts right after it.
pub const HEADER_SIZE: usize = 8;
const_assert_eq!(HEADER_SIZE, core::mem::size_of::<BlockHeader>());
const_assert!(HEADER_SIZE % BLOCK_ALIGNMENT == 0);
const_assert!(SPLIT_MARGIN % BLOCK_ALIGNMENT == 0);
const_assert!(BLOCK_ALIGNMENT.is_power_of_two());

/// Round `value` up to a multiple of `alignment`, which must be a power of
/// two. Returns `None` on overflow.
pub fn align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    value
        .checked_add(alignment - 1)
        .map(|v| v & !(alignment - 1))
}

/// A block, identified by the offset of its header from the arena base.
///
/// A `Block` is only meaningful together with the `BlockList` it came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Block(u32);

impl Block {
    /// Offset of the header from the arena base.
    pub fn offset(self) -> usize {
        self.0 as usize
    }
}

/// A `BlockList` is the list of all blocks, free and used, partitioning one
/// contiguous arena.
///
/// Blocks are laid out back to back in address order: the header of the next
/// block starts where the payload of the current one ends. Each header links
/// to its neighbours by offset, so splitting and merging are O(1).
///
/// It maintains a few invariants:
///
/// - The first block sits at offset 0 and has no previous block.
/// - Exactly one block, the one with the highest offset, is flagged last, and
///   its payload ends at the end of the arena.
/// - Every block's `next` is the offset of the following header.
/// - Every size is a multiple of `BLOCK_ALIGNMENT`.
///
/// That no two free blocks are adjacent is the allocator's job: `merge` is the
/// tool for it, but splitting and flagging leave that to the caller.
pub struct BlockList {
    base: NonNull<u8>,
    end: u32,
}

// A BlockList is sendable - it exclusively owns its arena, wherever it goes.
//
// It is not Sync; the allocator wraps it in a lock when it needs to be shared.
unsafe impl Send for BlockList {}

pub struct BlockIter<'list> {
    list: &'list BlockList,
    next: Option<Block>,
}

impl<'list> Iterator for BlockIter<'list> {
    type Item = Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.next.take()?;
        self.next = self.list.next(block);
        Some(block)
    }
}

impl<'list> IntoIterator for &'list BlockList {
    type Item = Block;
    type IntoIter = BlockIter<'list>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for BlockList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockList(")?;
        let mut start = true;
        for block in self {
            if !start {
                write!(f, ", ")?;
            } else {
                start = false;
            }
            let state = if self.is_free(block) { "free" } else { "used" };
            write!(f, "Block({}, {}, {})", block.0, self.size(block), state)?;
        }

        write!(f, ")")
    }
}

/// Validity contains a representation of all invalid states found in a
/// BlockList.
#[derive(Default, Debug)]
pub struct Validity {
    /// Links that do not point strictly forward, or that point past the arena.
    ///
    /// This indicates corruption, and stops the walk.
    pub overlaps: usize,

    /// 1 if the last block does not end exactly at the end of the arena.
    pub gaps: usize,

    /// Blocks whose back-link does not name the block before them.
    pub broken_links: usize,

    /// Last flags on a block that is not at the end, or missing on the one
    /// that is.
    pub misplaced_last: usize,

    /// Number of free blocks directly followed by another free block. These
    /// should have been merged.
    pub adjacents: usize,

    /// Blocks whose offset or size is not a multiple of `BLOCK_ALIGNMENT`.
    pub misaligned: usize,
}

impl Validity {
    /// Returns a boolean - a simple check if all cases are 0
    pub fn is_valid(&self) -> bool {
        self.overlaps == 0
            && self.gaps == 0
            && self.broken_links == 0
            && self.misplaced_last == 0
            && self.adjacents == 0
            && self.misaligned == 0
    }
}

impl From<Validity> for bool {
    fn from(v: Validity) -> bool {
        v.is_valid()
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Number of blocks, free and used.
    pub length: usize,
    pub free_blocks: usize,
    /// Payload bytes in free blocks.
    pub free_size: usize,
    /// Payload bytes in used blocks.
    pub used_size: usize,
}

impl BlockList {
    pub const fn header_size() -> usize {
        HEADER_SIZE
    }

    /// Take over `len` bytes at `ptr` and lay out a single free block spanning
    /// all of it.
    ///
    /// The start is aligned up to `BLOCK_ALIGNMENT` and the length is trimmed
    /// to a multiple of it (and to `MAX_ARENA_LEN`). Returns `None` if what is
    /// left cannot hold a header and a minimal payload.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` bytes of writable memory that nothing else
    /// uses or accesses for as long as the `BlockList` and the payloads it
    /// hands out are alive.
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Option<BlockList> {
        let addr = ptr.as_ptr() as usize;
        let skip = align_up(addr, BLOCK_ALIGNMENT)? - addr;
        let len = len.checked_sub(skip)?.min(MAX_ARENA_LEN) & !(BLOCK_ALIGNMENT - 1);
        if len < HEADER_SIZE + BLOCK_ALIGNMENT {
            return None;
        }

        let base = NonNull::new_unchecked(ptr.as_ptr().add(skip));
        let mut list = BlockList {
            base,
            end: len as u32,
        };
        let end = list.end;
        list.write(
            Block(0),
            BlockHeader {
                prev_and_flags: NO_PREV | FLAG_FREE | FLAG_LAST,
                next: end,
            },
        );
        Some(list)
    }

    /// The span of memory covered by the list, headers included.
    pub fn arena_len(&self) -> usize {
        self.end as usize
    }

    /// Address of the first header.
    pub fn arena_start(&self) -> NonNull<u8> {
        self.base
    }

    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter {
            list: self,
            next: Some(self.first()),
        }
    }

    fn header_ptr(&self, block: Block) -> *mut BlockHeader {
        assert!(
            block.offset() + HEADER_SIZE <= self.arena_len(),
            "{:?} lies outside an arena of {} bytes",
            block,
            self.end,
        );
        debug_assert!(block.offset() % BLOCK_ALIGNMENT == 0);
        unsafe { self.base.as_ptr().add(block.offset()) as *mut BlockHeader }
    }

    fn read(&self, block: Block) -> BlockHeader {
        unsafe { self.header_ptr(block).read() }
    }

    fn write(&mut self, block: Block, header: BlockHeader) {
        unsafe { self.header_ptr(block).write(header) }
    }

    ////////////////////////////////////////////////////////////
    // Primitives

    /// The block at the start of the arena.
    pub fn first(&self) -> Block {
        Block(0)
    }

    pub fn is_free(&self, block: Block) -> bool {
        self.read(block).prev_and_flags & FLAG_FREE != 0
    }

    pub fn is_last(&self, block: Block) -> bool {
        self.read(block).prev_and_flags & FLAG_LAST != 0
    }

    pub fn prev(&self, block: Block) -> Option<Block> {
        match self.read(block).prev_and_flags & ADDRESS_MASK {
            NO_PREV => None,
            offset => Some(Block(offset)),
        }
    }

    pub fn next(&self, block: Block) -> Option<Block> {
        let header = self.read(block);
        if header.prev_and_flags & FLAG_LAST != 0 {
            None
        } else {
            Some(Block(header.next))
        }
    }

    /// Payload capacity of the block, in bytes.
    pub fn size(&self, block: Block) -> usize {
        (self.read(block).next - block.0) as usize - HEADER_SIZE
    }

    pub fn set_free(&mut self, block: Block, free: bool) {
        let mut header = self.read(block);
        if free {
            header.prev_and_flags |= FLAG_FREE;
        } else {
            header.prev_and_flags &= !FLAG_FREE;
        }
        self.write(block, header);
    }

    fn set_prev(&mut self, block: Block, prev: Option<Block>) {
        let mut header = self.read(block);
        header.prev_and_flags &= !ADDRESS_MASK;
        header.prev_and_flags |= prev.map_or(NO_PREV, |p| p.0);
        self.write(block, header);
    }

    /// The payload of the block.
    pub fn data(&self, block: Block) -> NonNull<u8> {
        let header = self.header_ptr(block) as *mut u8;
        unsafe { NonNull::new_unchecked(header.add(HEADER_SIZE)) }
    }

    /// Find the block whose payload starts at `data`.
    ///
    /// Panics if `data` cannot be a payload of this list: outside the arena or
    /// misaligned.
    pub fn block_from_data(&self, data: NonNull<u8>) -> Block {
        let base = self.base.as_ptr() as usize;
        let offset = (data.as_ptr() as usize)
            .checked_sub(base + HEADER_SIZE)
            .filter(|&offset| offset + HEADER_SIZE <= self.arena_len())
            .filter(|&offset| offset % BLOCK_ALIGNMENT == 0);

        match offset {
            Some(offset) => Block(offset as u32),
            None => panic!("{:?} was not handed out by this heap", data),
        }
    }

    /// Insert `new_block`, whose header must already carry its flags, between
    /// `before` and the block after it.
    fn insert_after(&mut self, before: Block, new_block: Block) {
        let mut before_header = self.read(before);
        let after = self.next(before);

        // Link `new_block` and `after`.
        let mut new_header = self.read(new_block);
        new_header.next = before_header.next;
        new_header.prev_and_flags &= !ADDRESS_MASK;
        new_header.prev_and_flags |= before.0;
        if let Some(after) = after {
            self.set_prev(after, Some(new_block));
        }

        // Link `before` and `new_block`, moving the last flag if necessary.
        before_header.next = new_block.0;
        if after.is_none() {
            before_header.prev_and_flags &= !FLAG_LAST;
            new_header.prev_and_flags |= FLAG_LAST;
        }

        self.write(new_block, new_header);
        self.write(before, before_header);
    }

    /// Unlink `block`. The block before it absorbs its header and payload.
    fn remove(&mut self, block: Block) {
        let header = self.read(block);
        let after = self.next(block);
        let before = self.prev(block);
        debug_assert!(before.is_some(), "the first block is never removed");

        if let Some(after) = after {
            self.set_prev(after, before);
        }

        if let Some(before) = before {
            let mut before_header = self.read(before);
            before_header.next = header.next;
            if after.is_none() {
                before_header.prev_and_flags |= FLAG_LAST;
            }
            self.write(before, before_header);
        }
    }

    ////////////////////////////////////////////////////////////
    // Split and merge

    /// Cut `block` after `size` payload bytes, and make the rest a new free
    /// block. Returns the new block.
    ///
    /// Panics if the remainder could not hold a header.
    pub fn split_at(&mut self, block: Block, size: usize) -> Block {
        let block_size = self.size(block);
        if size + HEADER_SIZE > block_size {
            panic!(
                "Can't split {} bytes off of a block of size {} - need {} for header",
                size, block_size, HEADER_SIZE,
            )
        }
        debug_assert!(size % BLOCK_ALIGNMENT == 0);

        let new_block = Block(block.0 + (HEADER_SIZE + size) as u32);
        self.write(
            new_block,
            BlockHeader {
                prev_and_flags: FLAG_FREE,
                next: 0,
            },
        );
        self.insert_after(block, new_block);
        log::trace!(
            "Split {:?}:{} into {} and {:?}:{}",
            block,
            block_size,
            size,
            new_block,
            self.size(new_block),
        );
        new_block
    }

    /// Split `block` down to `size` if the excess is worth a block of its own
    /// (a header plus `SPLIT_MARGIN`). Returns whether it was split.
    pub fn try_split(&mut self, block: Block, size: usize) -> bool {
        if self.size(block) >= size.saturating_add(HEADER_SIZE + SPLIT_MARGIN) {
            self.split_at(block, size);
            true
        } else {
            false
        }
    }

    /// Coalesce `block` with the free blocks around it, and return the block
    /// now holding the merged run.
    ///
    /// With `backward`, free predecessors absorb `block` first; the result is
    /// then the lowest block of the run. Free successors are always absorbed.
    ///
    /// `block` itself should be free, or about to be.
    pub fn merge(&mut self, mut block: Block, backward: bool) -> Block {
        if backward {
            // from: prev -> block -> next
            //   to: prev ----------> next
            while let Some(prev) = self.prev(block).filter(|&p| self.is_free(p)) {
                log::trace!("Merging {:?} into {:?}", block, prev);
                self.remove(block);
                block = prev;
            }
        }

        // from: block -> next -> next2
        //   to: block ---------> next2
        while let Some(next) = self.next(block).filter(|&n| self.is_free(n)) {
            log::trace!("Merging {:?} into {:?}", next, block);
            self.remove(next);
        }

        block
    }

    ////////////////////////////////////////////////////////////
    // Queries

    /// First-fit search: the lowest free block holding at least `size` bytes.
    pub fn find_free(&self, size: usize) -> Option<Block> {
        self.iter()
            .find(|&block| self.is_free(block) && self.size(block) >= size)
    }

    /// Walk the list, checking that it partitions the arena, and total up
    /// what it holds.
    pub fn stats(&self) -> (Validity, Stats) {
        let mut validity: Validity = Default::default();
        let mut stats: Stats = Default::default();

        let mut previous: Option<(Block, bool)> = None;
        let mut block = self.first();
        loop {
            let header = self.read(block);
            let free = header.prev_and_flags & FLAG_FREE != 0;
            let last = header.prev_and_flags & FLAG_LAST != 0;

            if self.prev(block) != previous.map(|(p, _)| p) {
                validity.broken_links += 1;
            }
            if let Some((_, true)) = previous {
                if free {
                    validity.adjacents += 1;
                }
            }

            if header.next < block.0 + HEADER_SIZE as u32 || header.next > self.end {
                // Going backwards or off the end; nothing after this can be
                // trusted.
                validity.overlaps += 1;
                break;
            }

            let size = self.size(block);
            if block.offset() % BLOCK_ALIGNMENT != 0 || size % BLOCK_ALIGNMENT != 0 {
                validity.misaligned += 1;
            }

            stats.length += 1;
            if free {
                stats.free_blocks += 1;
                stats.free_size += size;
            } else {
                stats.used_size += size;
            }

            let at_end = header.next == self.end;
            if last != at_end {
                validity.misplaced_last += 1;
            }
            if last || at_end {
                if !at_end {
                    validity.gaps += 1;
                }
                break;
            }

            previous = Some((block, free));
            block = Block(header.next);
        }

        (validity, stats)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// A list always holds at least one block.
    pub fn is_empty(&self) -> bool {
        false
    }
}
