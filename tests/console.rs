use core::cell::Cell;

use pi_core::allocators::{KernelAllocator, ToyHeap};
use pi_core::kprintf;
use pi_core::printf::{self, Arg, ArgList, BufferSink, CountTarget, FormatError};
use pi_core::time;

use test_env_log::test;

#[test]
fn test_heap_report() {
    let mut heap = ToyHeap::with_size(8192);
    let allocator = KernelAllocator::new();
    unsafe { allocator.init(&mut heap) };

    let p = allocator.malloc(100);
    let q = allocator.calloc(10, 10);
    let (validity, stats) = allocator.stats().unwrap();
    assert!(validity.is_valid());

    let mut buf = [0u8; 128];
    let mut sink = BufferSink::new(&mut buf);
    let n = kprintf!(
        &mut sink,
        "blocks=%zu free=%zu used=%-6zu|%@b",
        stats.length,
        stats.free_size,
        stats.used_size,
        validity.is_valid()
    )
    .unwrap();
    assert_eq!(sink.as_bytes(), b"blocks=3 free=7960 used=208   |t");
    assert_eq!(n, sink.len());

    unsafe {
        allocator.free(p);
        allocator.free(q);
    }
}

#[test]
fn test_clock_line() {
    let now = time::decompose(1_700_000_000).unwrap();
    let mut buf = [0u8; 64];
    let mut sink = BufferSink::new(&mut buf);
    kprintf!(
        &mut sink,
        "%04d-%02u-%02u %02u:%02u:%02u wd=%u yd=%u",
        now.year,
        now.month + 1,
        now.day_of_month,
        now.hour,
        now.minute,
        now.second,
        now.weekday,
        now.day_of_year
    )
    .unwrap();
    assert_eq!(sink.as_bytes(), b"2023-11-14 22:13:20 wd=2 yd=317");
    assert_eq!(time::recompose(&now), 1_700_000_000);
}

#[test]
fn test_continued_argument_list() {
    // A wrapper that prints a prefix from the same argument list first,
    // the way a C function forwarding its va_list would.
    let written = Cell::new(0u32);
    let args = [
        Arg::Str(b"uart"),
        Arg::Int(-7),
        Arg::Bytes(&[0xca, 0xfe]),
        Arg::Count(CountTarget::Word(&written)),
    ];
    let mut list = ArgList::new(&args);

    let mut buf = [0u8; 64];
    let mut sink = BufferSink::new(&mut buf);
    assert_eq!(printf::vdprintf(&mut sink, b"[%s] ", &mut list), 7);
    assert_eq!(printf::vdprintf(&mut sink, b"%+d %@d%n", &mut list), 7);
    assert_eq!(sink.as_bytes(), b"[uart] -7 cafe");
    assert_eq!(written.get(), 7);
    assert_eq!(list.consumed(), 4);
}

#[test]
fn test_truncating_sink_still_counts() {
    let mut buf = [0u8; 4];
    let mut sink = BufferSink::new(&mut buf);
    assert_eq!(kprintf!(&mut sink, "%s", "overflowing"), Ok(11));
    assert_eq!(sink.as_bytes(), b"over");
}

#[test]
fn test_error_reporting() {
    let mut buf = [0u8; 64];
    let mut sink = BufferSink::new(&mut buf);
    let err = kprintf!(&mut sink, "ok %hs", "x").unwrap_err();
    assert_eq!(err, FormatError::InvalidLength { conversion: "s" });

    let mut msg = [0u8; 64];
    let mut msg_sink = BufferSink::new(&mut msg);
    use core::fmt::Write;
    write!(printf::SinkWriter::new(&mut msg_sink), "{}", err).unwrap();
    assert_eq!(msg_sink.as_bytes(), b"invalid length specifier for %s");
    assert_eq!(sink.as_bytes(), b"ok ");
}
