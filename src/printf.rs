//! A `printf` engine for the kernel's consoles.
//!
//! The usual directive grammar is supported, plus two extensions in the `@`
//! namespace:
//!
//! - `%@d` prints a byte slice as hex, two digits per byte.
//! - `%@b` prints a boolean as `t`/`f`, or `true`/`false` with `#`.
//!
//! Output goes byte by byte into a [`Sink`](trait.Sink.html). A bad
//! directive stops formatting right there with a `FormatError`; whatever was
//! written before it stays written.
//!
//! ```
//! use pi_core::kprintf;
//! use pi_core::printf::BufferSink;
//!
//! let mut buf = [0u8; 32];
//! let mut sink = BufferSink::new(&mut buf);
//! let n = kprintf!(&mut sink, "%-4s|%#06x|%@b", "ok", 0xbeef_u32, true).unwrap();
//! assert_eq!(sink.as_bytes(), b"ok  |0xbeef|t");
//! assert_eq!(n, 13);
//! ```

mod args;
mod render;
mod sink;
mod specifier;

use core::fmt;

pub use self::args::{Arg, ArgList, CountTarget};
pub use self::sink::{BufferSink, Sink, SinkWriter};
pub use self::specifier::{Conversion, Count, Length, Padding, Sign, Specifier, MAX_FIELD_WIDTH};

use self::render::{Field, FloatStyle, Radix};
use self::sink::{Case, Counter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// The format string ended in the middle of a directive.
    UnexpectedEnd,
    /// `%1$d` style directives.
    PositionalUnsupported,
    UnknownConversion(u8),
    /// A literal width or precision above `MAX_FIELD_WIDTH`.
    FieldTooWide,
    /// `c`, `s`, `@d` and `@b` take no length modifier.
    InvalidLength { conversion: &'static str },
    MissingArgument { index: usize },
    ArgumentMismatch { index: usize, expected: &'static str },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FormatError::UnexpectedEnd => write!(f, "unexpected end of input"),
            FormatError::PositionalUnsupported => write!(f, "$ specifiers not implemented"),
            FormatError::FieldTooWide => write!(f, "field width or precision too large"),
            FormatError::UnknownConversion(c) => {
                write!(f, "invalid format specifier {:?}", c as char)
            }
            FormatError::InvalidLength { conversion } => {
                write!(f, "invalid length specifier for %{}", conversion)
            }
            FormatError::MissingArgument { index } => write!(f, "missing argument {}", index),
            FormatError::ArgumentMismatch { index, expected } => {
                write!(f, "argument {} should be a {}", index, expected)
            }
        }
    }
}

/// Format `fmt` with `args` into `sink`, returning the number of bytes
/// written.
pub fn format<S: Sink + ?Sized>(sink: &mut S, fmt: &str, args: &[Arg]) -> Result<usize, FormatError> {
    vformat(sink, fmt.as_bytes(), &mut ArgList::new(args))
}

/// Like `format`, over an argument list that may already be partly consumed.
/// `fmt` ends at its first NUL, if it has one.
pub fn vformat<S: Sink + ?Sized>(sink: &mut S, fmt: &[u8], args: &mut ArgList) -> Result<usize, FormatError> {
    let mut out = Counter::new(sink);
    let mut pos = 0;

    while let Some(&c) = fmt.get(pos).filter(|&&c| c != 0) {
        pos += 1;
        if c != b'%' {
            out.put(c);
            continue;
        }

        let (specifier, used) = Specifier::parse(&fmt[pos..])?;
        pos += used;
        directive(&mut out, &specifier, args)?;
    }

    Ok(out.written)
}

fn directive<S: Sink + ?Sized>(out: &mut Counter<S>, specifier: &Specifier, args: &mut ArgList) -> Result<(), FormatError> {
    let mut field = Field {
        width: 0,
        precision: None,
        padding: specifier.padding,
        sign: specifier.sign,
        alternate: specifier.alternate,
    };

    match specifier.width {
        Count::Fixed(width) => field.width = width,
        Count::Next => {
            // A negative width is a `-` flag.
            let width = args.next_int()?;
            if width < 0 {
                field.padding = Padding::LeftJustified;
            }
            field.width = (width as i64).abs() as usize;
        }
    }

    field.precision = match specifier.precision {
        None => None,
        Some(Count::Fixed(precision)) => Some(precision),
        // A negative precision counts as none.
        Some(Count::Next) => {
            let precision = args.next_int()?;
            if precision < 0 {
                None
            } else {
                Some(precision as usize)
            }
        }
    };

    let no_length = |specifier: &Specifier| {
        if specifier.length == Length::Word {
            Ok(())
        } else {
            Err(FormatError::InvalidLength {
                conversion: specifier.letter(),
            })
        }
    };

    out.case = if specifier.capital { Case::Upper } else { Case::Lower };
    match specifier.conversion {
        Conversion::Signed => {
            let value = args.next_signed(specifier.length)?;
            out.case = Case::Keep;
            render::integer(out, &field, value.unsigned_abs(), value < 0, Radix::Decimal);
        }
        Conversion::Unsigned | Conversion::Octal | Conversion::Hex | Conversion::Binary => {
            let value = args.next_unsigned(specifier.length)?;
            let radix = match specifier.conversion {
                Conversion::Unsigned => Radix::Decimal,
                Conversion::Octal => Radix::Octal,
                Conversion::Hex => Radix::Hex,
                _ => Radix::Binary,
            };
            field.sign = Sign::Default;
            render::integer(out, &field, value, false, radix);
        }
        Conversion::Pointer => {
            let value = args.next_unsigned(Length::Wide)?;
            field.sign = Sign::Default;
            field.alternate = true;
            render::integer(out, &field, value, false, Radix::Hex);
        }
        Conversion::Exponent | Conversion::Fixed | Conversion::General => {
            let value = args.next_double()?;
            let style = match specifier.conversion {
                Conversion::Exponent => FloatStyle::Exponent,
                Conversion::Fixed => FloatStyle::Fixed,
                _ => FloatStyle::General,
            };
            render::float(out, &field, value, style);
        }
        Conversion::Char => {
            no_length(specifier)?;
            let c = args.next_char()?;
            out.case = Case::Keep;
            render::text(out, &field, &[c]);
        }
        Conversion::Str => {
            no_length(specifier)?;
            let s = args.next_str()?;
            let end = s.iter().position(|&b| b == 0).unwrap_or(s.len());
            let end = field.precision.map_or(end, |p| p.min(end));
            out.case = Case::Keep;
            render::text(out, &field, &s[..end]);
        }
        Conversion::Count => {
            let target = args.next_count(specifier.length)?;
            target.store(out.written);
        }
        Conversion::Percent => out.put(b'%'),
        Conversion::Data => {
            no_length(specifier)?;
            let bytes = args.next_bytes()?;
            out.case = Case::Keep;
            render::hex_dump(out, bytes);
        }
        Conversion::Boolean => {
            no_length(specifier)?;
            let value = args.next_bool()?;
            let text: &[u8] = match (specifier.alternate, value) {
                (false, false) => b"f",
                (false, true) => b"t",
                (true, false) => b"false",
                (true, true) => b"true",
            };
            out.case = Case::Keep;
            render::text(out, &field, text);
        }
    }
    out.case = Case::Keep;

    Ok(())
}

/// `format` with the C return convention: the byte count, or -1 on a bad
/// directive.
pub fn dprintf<S: Sink + ?Sized>(sink: &mut S, fmt: &str, args: &[Arg]) -> isize {
    vdprintf(sink, fmt.as_bytes(), &mut ArgList::new(args))
}

/// `vformat` with the C return convention.
pub fn vdprintf<S: Sink + ?Sized>(sink: &mut S, fmt: &[u8], args: &mut ArgList) -> isize {
    match vformat(sink, fmt, args) {
        // Counts past `isize::MAX` come out negative, which still reads as
        // failure.
        Ok(written) => written as isize,
        Err(_) => -1,
    }
}

/// Format into a [`Sink`](printf/trait.Sink.html), converting each argument
/// with `Arg::from`.
///
/// Evaluates to `Result<usize, FormatError>`.
#[macro_export]
macro_rules! kprintf {
    ($sink:expr, $fmt:expr) => {
        $crate::printf::format($sink, $fmt, &[])
    };
    ($sink:expr, $fmt:expr, $($arg:expr),+ $(,)?) => {
        $crate::printf::format($sink, $fmt, &[$($crate::printf::Arg::from($arg)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    use core::cell::Cell;
    use test_env_log::test;

    fn run(fmt: &str, args: &[Arg]) -> ([u8; 128], Result<usize, FormatError>) {
        let mut buf = [0u8; 128];
        let result = {
            let mut sink = BufferSink::new(&mut buf);
            format(&mut sink, fmt, args)
        };
        (buf, result)
    }

    macro_rules! assert_formats {
        ($expected:expr, $fmt:expr $(, $arg:expr)*) => {
            let (buf, result) = run($fmt, &[$(Arg::from($arg)),*]);
            let n = result.unwrap();
            assert_eq!(core::str::from_utf8(&buf[..n]).unwrap(), $expected, "format {:?}", $fmt);
        };
    }

    #[test]
    fn test_literals() {
        assert_formats!("hello, world", "hello, world");
        assert_formats!("100%", "100%%");
        assert_formats!("", "");
    }

    #[test]
    fn test_integers() {
        assert_formats!("42 -42 +42  42", "%d %i %+d % d", 42, -42, 42, 42);
        assert_formats!("4294967295", "%u", -1);
        assert_formats!("ff FF 0xff 0XFF", "%x %X %#x %#X", 255, 255, 255, 255);
        assert_formats!("17 0o17 101", "%o %#o %b", 15, 15, 5);
        assert_formats!("-9223372036854775808", "%lld", i64::MIN);
        assert_formats!("18446744073709551615", "%lu", u64::MAX);
        assert_formats!("[   -5|-5   |-0005]", "[%5d|%-5d|%05d]", -5, -5, -5);
        assert_formats!("00042", "%.5d", 42);
        assert_formats!("   42", "%5d", 42);
        assert_formats!("42   ", "%-5d", 42);
    }

    #[test]
    fn test_narrow_lengths() {
        assert_formats!("-1 255", "%hhd %hhu", 255, -1);
        assert_formats!("-1 65535", "%hd %hu", 0xffff, -1);
        assert_formats!("-128 128", "%hhd %hhu", 128, 128);
        assert_formats!("ff", "%hhx", -1);
    }

    #[test]
    fn test_dynamic_width_and_precision() {
        assert_formats!("   ab", "%*s", 5, "ab");
        assert_formats!("ab   |", "%*s|", -5, "ab");
        assert_formats!("abc", "%.*s", 3, "abcdef");
        assert_formats!("abcdef", "%.*s", -1, "abcdef");
        assert_formats!("  3.14", "%*.*f", 6, 2, 3.14159);
    }

    #[test]
    fn test_floats() {
        assert_formats!("1.500000", "%f", 1.5);
        assert_formats!("2.50", "%.2f", 2.5);
        assert_formats!("1.5e3 1.5E3", "%.1e %.1E", 1500.0, 1500.0);
        assert_formats!("+1.0", "%+.1f", 1.0);
        assert_formats!("INF nan", "%F %f", f64::INFINITY, f64::NAN);
        assert_formats!("0.000100 1.000000e-5", "%g %g", 1e-4, 1e-5);
        assert_formats!("1.00e3", "%.2g", 1000.0);
        assert_formats!("03.14", "%05.2f", 3.14159);
    }

    #[test]
    fn test_text() {
        assert_formats!("x|  x|x  ", "%c|%3c|%-3c", b'x', b'x', b'x');
        assert_formats!("kernel", "%s", "kernel\0junk" as &str);
        assert_formats!("kern", "%.4s", "kernel");
        assert_formats!("   hi", "%05s", "hi");
    }

    #[test]
    fn test_extensions() {
        let data: &[u8] = &[0xde, 0xad, 0x00, 0x0f];
        assert_formats!("dead000f", "%@d", data);
        assert_formats!("t f true false", "%@b %@b %#@b %#@b", true, false, true, false);
        assert_formats!("t", "%@b", 7);
        assert_formats!("    t", "%5@b", true);
    }

    #[test]
    fn test_pointer() {
        let p = 0x8_0000 as *const u8;
        assert_formats!("0x80000", "%p", p);
        assert_formats!("0x0", "%p", core::ptr::null::<u8>());
    }

    #[test]
    fn test_count() {
        let word = Cell::new(0u32);
        let byte = Cell::new(0u8);
        let args = [
            Arg::Int(12345),
            Arg::Count(CountTarget::Word(&word)),
            Arg::Count(CountTarget::Byte(&byte)),
        ];
        let (_, result) = run("%d%n!%hhn", &args);
        assert_eq!(result, Ok(6));
        assert_eq!(word.get(), 5);
        assert_eq!(byte.get(), 6);
    }

    #[test]
    fn test_errors_keep_partial_output() {
        let (buf, result) = run("abc%k", &[]);
        assert_eq!(result, Err(FormatError::UnknownConversion(b'k')));
        assert_eq!(&buf[..3], b"abc");

        let (buf, result) = run("x=%d y=%", &[Arg::Int(1)]);
        assert_eq!(result, Err(FormatError::UnexpectedEnd));
        assert_eq!(&buf[..6], b"x=1 y=");

        let (_, result) = run("%1$d", &[Arg::Int(1)]);
        assert_eq!(result, Err(FormatError::UnknownConversion(b'$')));
        let (_, result) = run("%$d", &[Arg::Int(1)]);
        assert_eq!(result, Err(FormatError::PositionalUnsupported));

        let (buf, result) = run("ab%99999999999999999999d", &[Arg::Int(1)]);
        assert_eq!(result, Err(FormatError::FieldTooWide));
        assert_eq!(&buf[..2], b"ab");

        let (_, result) = run("%ls", &[Arg::Str(b"x")]);
        assert_eq!(result, Err(FormatError::InvalidLength { conversion: "s" }));
        let (_, result) = run("%d %d", &[Arg::Int(1)]);
        assert_eq!(result, Err(FormatError::MissingArgument { index: 1 }));
        let (_, result) = run("%f", &[Arg::Int(1)]);
        assert_eq!(
            result,
            Err(FormatError::ArgumentMismatch {
                index: 0,
                expected: "float"
            })
        );
    }

    #[test]
    fn test_dprintf() {
        let mut buf = [0u8; 16];
        let mut sink = BufferSink::new(&mut buf);
        assert_eq!(dprintf(&mut sink, "%d-%d", &[Arg::Int(1), Arg::Int(2)]), 3);
        assert_eq!(dprintf(&mut sink, "%q", &[]), -1);
        assert_eq!(sink.as_bytes(), b"1-2");
    }

    #[test]
    fn test_vformat_stops_at_nul() {
        let mut buf = [0u8; 16];
        let mut sink = BufferSink::new(&mut buf);
        let args = [Arg::Int(1), Arg::Int(2)];
        let mut list = ArgList::new(&args);
        assert_eq!(vformat(&mut sink, b"%d\0%d", &mut list), Ok(1));
        assert_eq!(list.consumed(), 1);
        assert_eq!(vformat(&mut sink, b"+%d", &mut list), Ok(2));
        assert_eq!(sink.as_bytes(), b"1+2");
    }

    #[test]
    fn test_kprintf_macro() {
        let mut out = [0u8; 32];
        let mut n = 0;
        let mut sink = |b: u8| {
            out[n] = b;
            n += 1;
        };
        assert_eq!(crate::kprintf!(&mut sink, "%s=%lu\r\n", "heap", 4096usize), Ok(11));
        assert_eq!(crate::kprintf!(&mut sink, "."), Ok(1));
        drop(sink);
        assert_eq!(&out[..n], b"heap=4096\r\n.");
    }
}
