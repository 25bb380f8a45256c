use core::fmt;

/// Somewhere formatted output goes, one byte at a time.
///
/// The formatter never buffers; each byte is handed over as soon as it is
/// known, so a UART, a framebuffer console or a plain buffer all plug in the
/// same way.
pub trait Sink {
    fn put(&mut self, byte: u8);
}

impl<F: FnMut(u8)> Sink for F {
    fn put(&mut self, byte: u8) {
        self(byte)
    }
}

/// Writes into a byte buffer, silently dropping whatever does not fit.
pub struct BufferSink<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> BufferSink<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        BufferSink { buf, len: 0 }
    }

    /// What has been written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the buffer has no room left.
    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }
}

impl Sink for BufferSink<'_> {
    fn put(&mut self, byte: u8) {
        if let Some(slot) = self.buf.get_mut(self.len) {
            *slot = byte;
            self.len += 1;
        }
    }
}

/// Lets `write!` and friends target any sink.
pub struct SinkWriter<'s, S: ?Sized> {
    sink: &'s mut S,
}

impl<'s, S: Sink + ?Sized> SinkWriter<'s, S> {
    pub fn new(sink: &'s mut S) -> Self {
        SinkWriter { sink }
    }
}

impl<S: Sink + ?Sized> fmt::Write for SinkWriter<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.sink.put(byte);
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Case {
    Keep,
    Upper,
    Lower,
}

/// Forwards to a sink, counting bytes and optionally folding ASCII case.
pub(crate) struct Counter<'s, S: ?Sized> {
    sink: &'s mut S,
    pub(crate) written: usize,
    pub(crate) case: Case,
}

impl<'s, S: Sink + ?Sized> Counter<'s, S> {
    pub(crate) fn new(sink: &'s mut S) -> Self {
        Counter {
            sink,
            written: 0,
            case: Case::Keep,
        }
    }

    pub(crate) fn put(&mut self, byte: u8) {
        let byte = match self.case {
            Case::Keep => byte,
            Case::Upper => byte.to_ascii_uppercase(),
            Case::Lower => byte.to_ascii_lowercase(),
        };
        self.sink.put(byte);
        self.written += 1;
    }

    pub(crate) fn put_all(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.put(byte);
        }
    }

    pub(crate) fn repeat(&mut self, byte: u8, count: usize) {
        for _ in 0..count {
            self.put(byte);
        }
    }

    /// Write preformatted arguments. Sinks cannot fail, and only primitives
    /// are ever formatted, so there is no error to report.
    pub(crate) fn display(&mut self, args: fmt::Arguments<'_>) {
        let _ = fmt::write(self, args);
    }
}

impl<S: Sink + ?Sized> fmt::Write for Counter<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.put_all(s.as_bytes());
        Ok(())
    }
}

/// Counts what formatting would produce without writing it anywhere.
#[derive(Default)]
pub(crate) struct Measure(pub(crate) usize);

impl Measure {
    pub(crate) fn of(args: fmt::Arguments<'_>) -> usize {
        let mut measure = Measure(0);
        let _ = fmt::write(&mut measure, args);
        measure.0
    }
}

impl fmt::Write for Measure {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::fmt::Write;
    use test_env_log::test;

    #[test]
    fn test_buffer_truncates() {
        let mut buf = [0u8; 4];
        let mut sink = BufferSink::new(&mut buf);
        assert!(sink.is_empty());
        for &b in b"abcdef" {
            sink.put(b);
        }
        assert!(sink.is_full());
        assert_eq!(sink.len(), 4);
        assert_eq!(sink.as_bytes(), b"abcd");
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = [0u8; 8];
        let mut n = 0;
        {
            let mut sink = |b: u8| {
                seen[n] = b;
                n += 1;
            };
            write!(SinkWriter::new(&mut sink), "{}-{}", 4, 2).unwrap();
        }
        assert_eq!(&seen[..n], b"4-2");
    }

    #[test]
    fn test_counter_case() {
        let mut buf = [0u8; 16];
        let mut sink = BufferSink::new(&mut buf);
        let mut counter = Counter::new(&mut sink);
        counter.case = Case::Upper;
        counter.display(format_args!("{:x}", 0xbeef_u32));
        counter.case = Case::Lower;
        counter.put_all(b"-NaN");
        assert_eq!(counter.written, 8);
        assert_eq!(sink.as_bytes(), b"BEEF-nan");
    }

    #[test]
    fn test_measure() {
        assert_eq!(Measure::of(format_args!("{}", -1234)), 5);
        assert_eq!(Measure::of(format_args!("{:.3}", 1.5)), 5);
    }
}
