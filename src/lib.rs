#![no_std]

//! Core pieces of a bare-metal Raspberry Pi kernel that do not touch the
//! hardware.
//!
//! - [`allocators`](allocators/index.html): a first-fit heap over one fixed
//!   memory region, with `malloc`/`free`/`calloc`/`realloc` and
//!   `GlobalAlloc` on top.
//! - [`blocklist`](blocklist/index.html): the in-place list of blocks the
//!   heap is made of, and its split and merge operations.
//! - [`printf`](printf/index.html): a `printf` engine writing to any byte
//!   sink.
//! - [`time`](time/index.html): Unix time to calendar conversion.
//! - [`logger`](logger/index.html): a `log` backend on top of a sink.
//!
//! Setting up the heap at boot:
//!
//! ```no_run
//! use pi_core::allocators::{KernelAllocator, StaticRegion};
//!
//! static HEAP: KernelAllocator = KernelAllocator::new();
//!
//! # let (kernel_end, arm_memory_end) = (0x20_0000, 0x3b40_0000);
//! unsafe { HEAP.init(&mut StaticRegion::between(kernel_end, arm_memory_end)) };
//! let p = HEAP.malloc(64);
//! assert!(!p.is_null());
//! ```

pub mod allocators;
pub mod blocklist;
pub mod logger;
pub mod printf;
pub mod time;

pub use allocators::{KernelAllocator, MemorySource, RawAlloc, StaticRegion, ToyHeap};
#[cfg(feature = "use_libc")]
pub use allocators::MmapRegion;
pub use blocklist::{Stats, Validity};
pub use printf::{Arg, BufferSink, FormatError, Sink};
pub use time::{decompose, recompose, Components};
