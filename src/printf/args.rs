use core::cell::Cell;

use super::specifier::Length;
use super::FormatError;

/// One formatting argument.
///
/// The variants follow what a C variadic call actually passes after default
/// promotion: everything narrower than `int` arrives as `Int`, floats as
/// `Double`. The `From` impls do that promotion, so `kprintf!` can take plain
/// Rust values.
#[derive(Copy, Clone, Debug)]
pub enum Arg<'a> {
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Double(f64),
    Bool(bool),
    /// For `%s`. Stops at the first NUL, if any.
    Str(&'a [u8]),
    /// For `%@d`.
    Bytes(&'a [u8]),
    Ptr(usize),
    Count(CountTarget<'a>),
}

/// Where `%n` stores the number of bytes written. The variant has to match
/// the length modifier.
#[derive(Copy, Clone, Debug)]
pub enum CountTarget<'a> {
    Byte(&'a Cell<u8>),
    Half(&'a Cell<u16>),
    Word(&'a Cell<u32>),
    Wide(&'a Cell<u64>),
}

impl CountTarget<'_> {
    fn length(&self) -> Length {
        match self {
            CountTarget::Byte(_) => Length::Byte,
            CountTarget::Half(_) => Length::Half,
            CountTarget::Word(_) => Length::Word,
            CountTarget::Wide(_) => Length::Wide,
        }
    }

    /// Store `count`, truncated to the target's width.
    pub fn store(&self, count: usize) {
        match self {
            CountTarget::Byte(c) => c.set(count as u8),
            CountTarget::Half(c) => c.set(count as u16),
            CountTarget::Word(c) => c.set(count as u32),
            CountTarget::Wide(c) => c.set(count as u64),
        }
    }
}

macro_rules! promote {
    ($variant:ident($target:ty): $($ty:ty),*) => {
        $(
            impl From<$ty> for Arg<'_> {
                fn from(value: $ty) -> Self {
                    Arg::$variant(value as $target)
                }
            }
        )*
    };
}

promote!(Int(i32): i8, u8, i16, u16, i32);
promote!(UInt(u32): u32);
promote!(Long(i64): i64, isize);
promote!(ULong(u64): u64, usize);
promote!(Double(f64): f32, f64);

impl From<bool> for Arg<'_> {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(value: &'a str) -> Self {
        Arg::Str(value.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for Arg<'a> {
    fn from(value: &'a [u8]) -> Self {
        Arg::Bytes(value)
    }
}

impl<T> From<*const T> for Arg<'_> {
    fn from(value: *const T) -> Self {
        Arg::Ptr(value as usize)
    }
}

impl<T> From<*mut T> for Arg<'_> {
    fn from(value: *mut T) -> Self {
        Arg::Ptr(value as usize)
    }
}

impl<'a> From<CountTarget<'a>> for Arg<'a> {
    fn from(value: CountTarget<'a>) -> Self {
        Arg::Count(value)
    }
}

impl<'a> From<&'a Cell<u32>> for Arg<'a> {
    fn from(value: &'a Cell<u32>) -> Self {
        Arg::Count(CountTarget::Word(value))
    }
}

/// Walks an argument slice the way `va_arg` walks a C argument list.
pub struct ArgList<'a, 'b> {
    args: &'b [Arg<'a>],
    next: usize,
}

impl<'a, 'b> ArgList<'a, 'b> {
    pub fn new(args: &'b [Arg<'a>]) -> Self {
        ArgList { args, next: 0 }
    }

    /// How many arguments have been taken.
    pub fn consumed(&self) -> usize {
        self.next
    }

    fn take(&mut self) -> Result<(usize, Arg<'a>), FormatError> {
        let index = self.next;
        let arg = *self
            .args
            .get(index)
            .ok_or(FormatError::MissingArgument { index })?;
        self.next += 1;
        Ok((index, arg))
    }

    // The argument's bits as they would sit in a 64-bit register: signed
    // sources sign-extended, unsigned ones zero-extended.
    fn raw_integer(&mut self) -> Result<u64, FormatError> {
        let (index, arg) = self.take()?;
        Ok(match arg {
            Arg::Int(v) => v as i64 as u64,
            Arg::UInt(v) => v as u64,
            Arg::Long(v) => v as u64,
            Arg::ULong(v) => v,
            Arg::Ptr(v) => v as u64,
            Arg::Bool(v) => v as u64,
            _ => {
                return Err(FormatError::ArgumentMismatch {
                    index,
                    expected: "integer",
                })
            }
        })
    }

    /// An `int`, as taken by `*` widths and precisions.
    pub fn next_int(&mut self) -> Result<i32, FormatError> {
        Ok(self.raw_integer()? as i32)
    }

    /// A signed integer of the given width.
    ///
    /// The value is cut down to `length` and sign-extended from there, so a
    /// `%hhd` of 255 is -1, never 255.
    pub fn next_signed(&mut self, length: Length) -> Result<i64, FormatError> {
        let raw = self.raw_integer()?;
        Ok(match length {
            Length::Byte => raw as u8 as i8 as i64,
            Length::Half => raw as u16 as i16 as i64,
            Length::Word => raw as u32 as i32 as i64,
            Length::Wide => raw as i64,
        })
    }

    /// An unsigned integer of the given width, zero-extended, so a `%hhu` of
    /// -1 is 255.
    pub fn next_unsigned(&mut self, length: Length) -> Result<u64, FormatError> {
        let raw = self.raw_integer()?;
        Ok(match length {
            Length::Byte => raw as u8 as u64,
            Length::Half => raw as u16 as u64,
            Length::Word => raw as u32 as u64,
            Length::Wide => raw,
        })
    }

    pub fn next_double(&mut self) -> Result<f64, FormatError> {
        match self.take()? {
            (_, Arg::Double(v)) => Ok(v),
            (index, _) => Err(FormatError::ArgumentMismatch {
                index,
                expected: "float",
            }),
        }
    }

    /// A character; any integer, truncated to a byte.
    pub fn next_char(&mut self) -> Result<u8, FormatError> {
        Ok(self.raw_integer()? as u8)
    }

    pub fn next_str(&mut self) -> Result<&'a [u8], FormatError> {
        match self.take()? {
            (_, Arg::Str(s)) | (_, Arg::Bytes(s)) => Ok(s),
            (index, _) => Err(FormatError::ArgumentMismatch {
                index,
                expected: "string",
            }),
        }
    }

    pub fn next_bytes(&mut self) -> Result<&'a [u8], FormatError> {
        match self.take()? {
            (_, Arg::Bytes(s)) | (_, Arg::Str(s)) => Ok(s),
            (index, _) => Err(FormatError::ArgumentMismatch {
                index,
                expected: "byte slice",
            }),
        }
    }

    /// A boolean; integers count as true when non-zero.
    pub fn next_bool(&mut self) -> Result<bool, FormatError> {
        Ok(self.raw_integer()? != 0)
    }

    pub fn next_count(&mut self, length: Length) -> Result<CountTarget<'a>, FormatError> {
        match self.take()? {
            (_, Arg::Count(target)) if target.length() == length => Ok(target),
            (index, _) => Err(FormatError::ArgumentMismatch {
                index,
                expected: "count target of matching width",
            }),
        }
    }
}
