//! Rendering of converted values into padded fields.
//!
//! Digits come from `core::fmt`; the padding, sign and prefix rules are
//! printf's, so each field is measured first and then written.

use core::fmt::{self, Write};

use super::sink::{Counter, Measure, Sink};
use super::specifier::{Padding, Sign};

/// A directive's layout, with `*` arguments already taken.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Field {
    pub width: usize,
    pub precision: Option<usize>,
    pub padding: Padding,
    pub sign: Sign,
    pub alternate: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Radix {
    Decimal,
    Octal,
    Hex,
    Binary,
}

impl Radix {
    fn prefix(self) -> &'static [u8] {
        match self {
            Radix::Decimal => b"",
            Radix::Octal => b"0o",
            Radix::Hex => b"0x",
            Radix::Binary => b"0b",
        }
    }

    fn digits<W: Write>(self, w: &mut W, value: u64) -> fmt::Result {
        match self {
            Radix::Decimal => write!(w, "{}", value),
            Radix::Octal => write!(w, "{:o}", value),
            Radix::Hex => write!(w, "{:x}", value),
            Radix::Binary => write!(w, "{:b}", value),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FloatStyle {
    Exponent,
    Fixed,
    General,
}

/// Default number of fraction digits for `e`, `f` and `g`.
pub(crate) const DEFAULT_FLOAT_PRECISION: usize = 6;

fn sign_of(negative: bool, sign: Sign) -> &'static [u8] {
    match (negative, sign) {
        (true, _) => b"-",
        (false, Sign::Default) => b"",
        (false, Sign::Blank) => b" ",
        (false, Sign::Always) => b"+",
    }
}

// Zero padding goes between the sign (and prefix) and the digits.
fn number<S, F>(out: &mut Counter<S>, field: &Field, zero_ok: bool, head: &[u8], len: usize, body: F)
where
    S: Sink + ?Sized,
    F: FnOnce(&mut Counter<S>),
{
    let fill = field.width.saturating_sub(head.len() + len);
    match field.padding {
        Padding::ZeroPadded if zero_ok => {
            out.put_all(head);
            out.repeat(b'0', fill);
            body(out);
        }
        Padding::LeftJustified => {
            out.put_all(head);
            body(out);
            out.repeat(b' ', fill);
        }
        _ => {
            out.repeat(b' ', fill);
            out.put_all(head);
            body(out);
        }
    }
}

/// An integer field. `negative` is only ever set for signed conversions.
///
/// A precision is a minimum digit count, and turns off zero padding. A zero
/// value with a precision of zero prints no digits at all.
pub(crate) fn integer<S: Sink + ?Sized>(
    out: &mut Counter<S>,
    field: &Field,
    magnitude: u64,
    negative: bool,
    radix: Radix,
) {
    let sign = sign_of(negative, field.sign);
    let prefix = if field.alternate { radix.prefix() } else { b"" };

    let digits = if field.precision == Some(0) && magnitude == 0 {
        0
    } else {
        let mut measure = Measure::default();
        let _ = radix.digits(&mut measure, magnitude);
        measure.0
    };
    let zeros = field.precision.unwrap_or(0).saturating_sub(digits);

    let mut head = [0u8; 3];
    head[..sign.len()].copy_from_slice(sign);
    head[sign.len()..sign.len() + prefix.len()].copy_from_slice(prefix);
    let head = &head[..sign.len() + prefix.len()];

    number(out, field, field.precision.is_none(), head, zeros + digits, |out| {
        out.repeat(b'0', zeros);
        if digits > 0 {
            let _ = radix.digits(out, magnitude);
        }
    });
}

fn power_of_ten(exponent: usize) -> f64 {
    let mut value = 1.0;
    // Anything past this is infinite anyway.
    for _ in 0..exponent.min(310) {
        value *= 10.0;
    }
    value
}

/// A floating point field. Infinities and NaN are padded with spaces only.
pub(crate) fn float<S: Sink + ?Sized>(out: &mut Counter<S>, field: &Field, value: f64, style: FloatStyle) {
    let precision = field.precision.unwrap_or(DEFAULT_FLOAT_PRECISION);
    let sign = sign_of(value.is_sign_negative() && !value.is_nan(), field.sign);

    if !value.is_finite() {
        let body: &[u8] = if value.is_nan() { b"nan" } else { b"inf" };
        number(out, field, false, sign, body.len(), |out| out.put_all(body));
        return;
    }

    let magnitude = value.abs();
    let exponent = match style {
        FloatStyle::Exponent => true,
        FloatStyle::Fixed => false,
        FloatStyle::General => {
            magnitude != 0.0 && (magnitude < 1e-4 || magnitude > power_of_ten(precision))
        }
    };

    if exponent {
        let len = Measure::of(format_args!("{:.*e}", precision, magnitude));
        number(out, field, true, sign, len, |out| {
            out.display(format_args!("{:.*e}", precision, magnitude))
        });
    } else {
        let len = Measure::of(format_args!("{:.*}", precision, magnitude));
        number(out, field, true, sign, len, |out| {
            out.display(format_args!("{:.*}", precision, magnitude))
        });
    }
}

/// Text (`c`, `s`, `@b`), padded with spaces whatever the flags say.
pub(crate) fn text<S: Sink + ?Sized>(out: &mut Counter<S>, field: &Field, bytes: &[u8]) {
    number(out, field, false, b"", bytes.len(), |out| out.put_all(bytes));
}

/// Every byte as two lower case hex digits, without any padding.
pub(crate) fn hex_dump<S: Sink + ?Sized>(out: &mut Counter<S>, bytes: &[u8]) {
    for byte in bytes {
        out.display(format_args!("{:02x}", byte));
    }
}
