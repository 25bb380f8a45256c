//! Allocator types, both generic and kernel-specific.
//!
//! ## Basic Types
//!
//! ### [`RawAlloc`](struct.RawAlloc.html)
//!
//! A `RawAlloc` is a single-threaded, non-thread-safe first-fit allocator over
//! one fixed arena: `alloc`, `dealloc`, `alloc_zeroed`, `resize` and
//! `usable_size`. It never grows the arena; running out of space returns
//! `None`.
//!
//! ### [`KernelAllocator`](struct.KernelAllocator.html)
//!
//! A `KernelAllocator` wraps `RawAlloc` in a spin lock so it can live in a
//! `static`, exposes the C-style `malloc`/`free`/`calloc`/`realloc` surface the
//! rest of the kernel calls, and implements
//! [`core::alloc::GlobalAlloc`](https://doc.rust-lang.org/core/alloc/trait.GlobalAlloc.html).
//!
//! The kernel is single-core and only allocates from its main context. The
//! lock is never waited on: finding it held means an interrupt handler (or
//! the allocator itself) re-entered, and that panics.
//!
//! ### [`MemorySource`](trait.MemorySource.html)
//!
//! `MemorySource` abstracts over the platform query for the heap's memory:
//! [`StaticRegion`](struct.StaticRegion.html) on the board,
//! [`ToyHeap`](struct.ToyHeap.html) for tests, and `MmapRegion` on a Unix
//! host with the `use_libc` feature.

use core::alloc::{GlobalAlloc, Layout};
use core::fmt;
use core::ptr::{self, null_mut, NonNull};

#[cfg(feature = "use_libc")]
use errno::Errno;
use spin::{Mutex, MutexGuard};

use crate::blocklist::{align_up, Block, BlockList, Stats, Validity, BLOCK_ALIGNMENT, MAX_ARENA_LEN};

pub trait MemorySource {
    type Err;
    /// Report the span of memory the heap may use, as a pointer and a length.
    ///
    /// # Safety
    ///
    /// This is pretty much entirely unsafe.
    ///
    /// The returned memory must be writable, and untracked by any other rust
    /// code, for as long as the allocator built on it (and any pointer it hands
    /// out) is in use.
    unsafe fn region(&mut self) -> Result<(NonNull<u8>, usize), Self::Err>;
}

/// A fixed span of physical memory, such as the one between the end of the
/// kernel image and the end of ARM memory reported by the firmware.
pub struct StaticRegion {
    base: *mut u8,
    size: usize,
}

/// The region handed to `StaticRegion` was null or empty.
#[derive(Debug, PartialEq, Eq)]
pub struct EmptyRegion;

impl fmt::Display for EmptyRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no usable memory region")
    }
}

impl StaticRegion {
    /// # Safety
    ///
    /// `base..base + size` must be RAM owned by nobody but the heap.
    pub const unsafe fn new(base: *mut u8, size: usize) -> Self {
        StaticRegion { base, size }
    }

    /// The region between two addresses, e.g. the end of the kernel image and
    /// the end of ARM memory.
    ///
    /// # Safety
    ///
    /// As for `new`.
    pub unsafe fn between(start: usize, end: usize) -> Self {
        StaticRegion {
            base: start as *mut u8,
            size: end.saturating_sub(start),
        }
    }
}

impl MemorySource for StaticRegion {
    type Err = EmptyRegion;

    unsafe fn region(&mut self) -> Result<(NonNull<u8>, usize), EmptyRegion> {
        match NonNull::new(self.base) {
            Some(base) if self.size > 0 => Ok((base, self.size)),
            _ => Err(EmptyRegion),
        }
    }
}

/// MmapRegion maps anonymous memory for the heap, for running on a Unix host.
#[cfg(feature = "use_libc")]
pub struct MmapRegion {
    /// Requested size; rounded up to whole pages.
    pub size: usize,
}

#[cfg(feature = "use_libc")]
impl MemorySource for MmapRegion {
    type Err = Errno;

    unsafe fn region(&mut self) -> Result<(NonNull<u8>, usize), Errno> {
        let pagesize = sysconf::page::pagesize();
        let to_allocate = match align_up(self.size.max(1), pagesize) {
            Some(size) => size,
            None => return Err(Errno(libc::ENOMEM)),
        };

        let ptr = libc::mmap(
            // Address we want the memory at. We don't care, so null it is.
            null_mut(),
            // Amount of memory to allocate
            to_allocate,
            // We want read/write access to this memory
            libc::PROT_WRITE | libc::PROT_READ,
            // MAP_ANON: We don't want a file descriptor, we're just going to
            //   use the memory.
            //
            // MAP_PRIVATE: We're not sharing this with any other process.
            libc::MAP_ANON | libc::MAP_PRIVATE,
            -1,
            0,
        );

        if ptr == libc::MAP_FAILED {
            return Err(errno::errno());
        }

        match NonNull::new(ptr as *mut u8) {
            Some(ptr) => Ok((ptr, to_allocate)),
            None => Err(Errno(libc::ENOMEM)),
        }
    }
}

/// Size of the array backing a `ToyHeap`.
pub const TOY_HEAP_SIZE: usize = 64 * 1024;

/// `ToyHeap` is a static array that can pretend to be a heap, and implements
/// `MemorySource` for such a purpose. It is mainly useful for testing.
///
/// The array must not move while an allocator uses it.
#[repr(C, align(16))]
pub struct ToyHeap {
    pub heap: [u8; TOY_HEAP_SIZE],
    /// How much of `heap` to report.
    pub size: usize,
}

impl Default for ToyHeap {
    fn default() -> Self {
        ToyHeap::with_size(TOY_HEAP_SIZE)
    }
}

impl ToyHeap {
    pub fn with_size(size: usize) -> Self {
        ToyHeap {
            heap: [0; TOY_HEAP_SIZE],
            size,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ToyHeapSizeError(pub usize);

impl fmt::Display for ToyHeapSizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "toy heap cannot provide {} bytes", self.0)
    }
}

impl MemorySource for ToyHeap {
    type Err = ToyHeapSizeError;

    unsafe fn region(&mut self) -> Result<(NonNull<u8>, usize), Self::Err> {
        if self.size == 0 || self.size > self.heap.len() {
            return Err(ToyHeapSizeError(self.size));
        }

        Ok((NonNull::from(&mut self.heap).cast(), self.size))
    }
}

/// Why a `RawAlloc` could not be set up.
#[derive(Debug, PartialEq, Eq)]
pub enum InitError<E> {
    /// The platform could not report a memory region.
    Source(E),
    /// The region cannot hold even one block.
    TooSmall(usize),
}

impl<E: fmt::Debug> fmt::Display for InitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Source(err) => write!(f, "getting heap memory region: {:?}", err),
            InitError::TooSmall(size) => write!(f, "heap region of {} bytes is too small", size),
        }
    }
}

/// A raw allocator, returning pointers to new allocations, and tracking and
/// reusing freed memory, within one arena fixed at initialization.
///
/// Allocation is first-fit: the lowest free block large enough wins, and the
/// excess is split off when it is worth a block of its own. Freed blocks are
/// merged with their free neighbours immediately, so no two free blocks are
/// ever adjacent once a call returns.
pub struct RawAlloc {
    pub blocks: BlockList,
}

impl RawAlloc {
    /// Build an allocator over the memory reported by `source`, as one large
    /// free block.
    ///
    /// # Safety
    ///
    /// See `MemorySource::region`.
    pub unsafe fn init<S: MemorySource>(source: &mut S) -> Result<RawAlloc, InitError<S::Err>> {
        let (ptr, size) = source.region().map_err(InitError::Source)?;
        let blocks = BlockList::from_raw(ptr, size).ok_or(InitError::TooSmall(size))?;
        log::debug!(
            "Heap of {} bytes at {:?} ({} usable)",
            blocks.arena_len(),
            blocks.arena_start(),
            blocks.size(blocks.first()),
        );
        Ok(RawAlloc { blocks })
    }

    /// Get statistics on this allocator, and verify validity of the BlockList
    pub fn stats(&self) -> (Validity, Stats) {
        self.blocks.stats()
    }

    /// The payload size of a block holding a request of `size` bytes, or `None`
    /// if no block could ever be that large.
    pub fn block_size(size: usize) -> Option<usize> {
        align_up(size, BLOCK_ALIGNMENT).filter(|&size| size <= MAX_ARENA_LEN)
    }

    /// Allocate `size` bytes.
    ///
    /// Returns `None` for a zero-sized request, which is not an error, and
    /// when no free block is large enough.
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let size = Self::block_size(size)?;

        let block = self.blocks.find_free(size)?;
        self.blocks.try_split(block, size);
        self.blocks.set_free(block, false);
        Some(self.blocks.data(block))
    }

    /// Deallocate (or "free") a memory block. `None` is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from this allocator and not have been freed since.
    pub unsafe fn dealloc(&mut self, ptr: Option<NonNull<u8>>) {
        let ptr = match ptr {
            None => return,
            Some(p) => p,
        };

        let block = self.blocks.block_from_data(ptr);
        debug_assert!(!self.blocks.is_free(block), "double free of {:?}", ptr);
        self.blocks.set_free(block, true);
        self.blocks.merge(block, true);
    }

    /// Allocate `count * elem_size` zeroed bytes. Returns `None` if the
    /// product overflows, or as `alloc` does.
    pub fn alloc_zeroed(&mut self, count: usize, elem_size: usize) -> Option<NonNull<u8>> {
        let size = count.checked_mul(elem_size)?;
        let ptr = self.alloc(size)?;
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Some(ptr)
    }

    /// Resize the allocation at `ptr` to `new_size` bytes, preserving its
    /// contents up to the smaller of the two sizes.
    ///
    /// - `None` behaves as `alloc(new_size)`.
    /// - A `new_size` of 0 frees `ptr` and returns `None`.
    /// - If the block, together with the free space right after it, is large
    ///   enough, it is resized in place and `ptr` is returned.
    /// - Otherwise, if the free space before it also helps, the contents move
    ///   down to the start of that merged run.
    /// - Otherwise a new block is allocated, the contents copied, and the old
    ///   block freed.
    ///
    /// When nothing fits, `None` is returned and the original allocation is
    /// left exactly as it was: still valid, same contents, same size.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from this allocator and not have been freed since.
    pub unsafe fn resize(&mut self, ptr: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
        // Handle edge/corner cases first.
        let old = match ptr {
            None => return self.alloc(new_size),
            Some(p) => p,
        };
        if new_size == 0 {
            self.dealloc(Some(old));
            return None;
        }
        let new_size = Self::block_size(new_size)?;

        let old_block = self.blocks.block_from_data(old);
        let old_size = self.blocks.size(old_block);

        // Growing into what follows keeps the payload where it is.
        self.blocks.set_free(old_block, true);
        self.blocks.merge(old_block, false);

        if self.blocks.size(old_block) >= new_size {
            self.blocks.try_split(old_block, new_size);
            self.blocks.set_free(old_block, false);
            return Some(old);
        }

        // Stays marked used from here on, so the fallback `alloc` cannot pick
        // it while the old contents are still in it.
        let merged = self.blocks.merge(old_block, true);
        self.blocks.set_free(merged, false);

        if self.blocks.size(merged) >= new_size {
            let data = self.blocks.data(merged);
            if merged != old_block {
                log::debug!("Moving {} bytes from {:?} down to {:?}", old_size, old, data);
                // The two may overlap.
                ptr::copy(old.as_ptr(), data.as_ptr(), old_size);
            }
            self.blocks.try_split(merged, new_size);
            return Some(data);
        }

        match self.alloc(new_size) {
            Some(new) => {
                ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), old_size);
                // Already as merged as it gets: both neighbours are in use.
                self.blocks.set_free(merged, true);
                Some(new)
            }
            None => {
                self.restore(merged, old_block, old_size);
                None
            }
        }
    }

    // Undo the merges of a failed `resize`, carving the original block back
    // out of `merged` with free blocks before and after it.
    fn restore(&mut self, merged: Block, old_block: Block, old_size: usize) {
        if merged != old_block {
            let prefix = old_block.offset() - merged.offset() - BlockList::header_size();
            let split = self.blocks.split_at(merged, prefix);
            debug_assert_eq!(split, old_block);
            self.blocks.set_free(merged, true);
        }
        if self.blocks.size(old_block) > old_size {
            self.blocks.split_at(old_block, old_size);
        }
        self.blocks.set_free(old_block, false);
    }

    /// The capacity of the block backing `ptr`, which may exceed what was
    /// asked for.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from this allocator and not have been freed since.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        self.blocks.size(self.blocks.block_from_data(ptr))
    }
}

/// The kernel's heap: a `RawAlloc` behind a spin lock, initialized once at
/// boot.
///
/// Before `init`, every allocation fails as if the heap were exhausted.
pub struct KernelAllocator {
    raw: Mutex<Option<RawAlloc>>,
}

impl Default for KernelAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelAllocator {
    pub const fn new() -> Self {
        KernelAllocator {
            raw: Mutex::new(None),
        }
    }

    /// Set up the heap over the memory reported by `source`.
    ///
    /// There is no way to go on without a heap, so this panics if the region
    /// cannot be had, or if the allocator was already initialized.
    ///
    /// # Safety
    ///
    /// See `MemorySource::region`.
    pub unsafe fn init<S: MemorySource>(&self, source: &mut S)
    where
        S::Err: fmt::Debug,
    {
        let mut raw = self.get_raw();
        if raw.is_some() {
            panic!("kernel allocator initialized twice");
        }
        match RawAlloc::init(source) {
            Ok(alloc) => *raw = Some(alloc),
            Err(err) => panic!("{}", err),
        }
    }

    /// Get a reference to the underlying RawAlloc, if initialized.
    ///
    /// Panics if the allocator is already in use further up the stack, which
    /// on this single-core kernel means it was re-entered from an interrupt.
    fn get_raw(&self) -> MutexGuard<Option<RawAlloc>> {
        match self.raw.try_lock() {
            Some(guard) => guard,
            None => panic!("allocator re-entered; allocate only from the main context"),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.get_raw().is_some()
    }

    /// Statistics and validity of the heap, or `None` before `init`.
    pub fn stats(&self) -> Option<(Validity, Stats)> {
        self.get_raw().as_ref().map(RawAlloc::stats)
    }

    /// Allocate `size` bytes. Null for 0 bytes, or when out of memory.
    pub fn malloc(&self, size: usize) -> *mut u8 {
        self.get_raw()
            .as_mut()
            .and_then(|raw| raw.alloc(size))
            .map_or(null_mut(), NonNull::as_ptr)
    }

    /// Free memory from `malloc`, `calloc` or `realloc`. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer from this allocator.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if let Some(raw) = self.get_raw().as_mut() {
            raw.dealloc(NonNull::new(ptr));
        }
    }

    /// Allocate `count * size` zeroed bytes. Null if that overflows.
    pub fn calloc(&self, count: usize, size: usize) -> *mut u8 {
        self.get_raw()
            .as_mut()
            .and_then(|raw| raw.alloc_zeroed(count, size))
            .map_or(null_mut(), NonNull::as_ptr)
    }

    /// See `RawAlloc::resize`. On failure the old pointer stays valid.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer from this allocator.
    pub unsafe fn realloc(&self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        self.get_raw()
            .as_mut()
            .and_then(|raw| raw.resize(NonNull::new(ptr), new_size))
            .map_or(null_mut(), NonNull::as_ptr)
    }

    /// Capacity of the block behind `ptr`; 0 for null.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer from this allocator.
    pub unsafe fn malloc_usable_size(&self, ptr: *mut u8) -> usize {
        match (self.get_raw().as_ref(), NonNull::new(ptr)) {
            (Some(raw), Some(ptr)) => raw.usable_size(ptr),
            _ => 0,
        }
    }
}

// Payloads are only ever aligned to `BLOCK_ALIGNMENT`; stricter layouts get
// null.
unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > BLOCK_ALIGNMENT {
            return null_mut();
        }
        self.malloc(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.free(ptr)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > BLOCK_ALIGNMENT {
            return null_mut();
        }
        self.calloc(1, layout.size())
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > BLOCK_ALIGNMENT {
            return null_mut();
        }
        KernelAllocator::realloc(self, ptr, new_size)
    }
}
