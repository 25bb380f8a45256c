//! Brings up the kernel heap over a `ToyHeap` on the host and reports on it
//! through `kprintf!`, the way the kernel does over the UART at boot.

use std::io::Write;

use pi_core::{kprintf, KernelAllocator, ToyHeap};

static HEAP: KernelAllocator = KernelAllocator::new();

fn main() {
    let mut heap = ToyHeap::with_size(16 * 1024);
    unsafe { HEAP.init(&mut heap) };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut console = |byte: u8| {
        let _ = out.write_all(&[byte]);
    };

    let a = HEAP.malloc(100);
    let b = HEAP.calloc(8, 16);
    let a = unsafe { HEAP.realloc(a, 400) };
    let _ = kprintf!(&mut console, "a=%p (%zu bytes) b=%p\n", a, unsafe { HEAP.malloc_usable_size(a) }, b);

    if let Some((validity, stats)) = HEAP.stats() {
        let _ = kprintf!(
            &mut console,
            "blocks=%zu free=%zu used=%zu valid=%#@b\n",
            stats.length,
            stats.free_size,
            stats.used_size,
            validity.is_valid()
        );
    }

    unsafe {
        HEAP.free(a);
        HEAP.free(b);
    }
    let _ = kprintf!(&mut console, "heap released: %zu block(s)\n", HEAP.stats().map_or(0, |(_, s)| s.length));
}
