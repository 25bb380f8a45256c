//! Parsing of a single `%` directive.
//!
//! `% [flags] [width|*] [.precision|.*] [length] conversion`

use super::FormatError;

/// The largest literal width or precision, the same as a C `int`.
pub const MAX_FIELD_WIDTH: usize = i32::MAX as usize;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Padding {
    LeftJustified,
    RightJustified,
    ZeroPadded,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Sign {
    /// Only negative values get a sign.
    Default,
    /// A space in front of non-negative values.
    Blank,
    /// `+` in front of non-negative values.
    Always,
}

/// How wide the argument is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Length {
    /// `hh`
    Byte,
    /// `h`
    Half,
    /// No modifier.
    Word,
    /// `l`, `ll`, `q`, `L`, `j`, `z`, `Z` or `t`.
    Wide,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Conversion {
    /// `d` or `i`
    Signed,
    Unsigned,
    Octal,
    Hex,
    Binary,
    Exponent,
    Fixed,
    General,
    Char,
    Str,
    Pointer,
    /// `n`: store the number of bytes written so far.
    Count,
    Percent,
    /// `@d`: hex dump of a byte slice.
    Data,
    /// `@b`
    Boolean,
}

/// A width or precision.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Count {
    Fixed(usize),
    /// `*`: taken from the next argument.
    Next,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Specifier {
    pub width: Count,
    /// `None` when no precision was given.
    pub precision: Option<Count>,
    pub padding: Padding,
    pub sign: Sign,
    pub length: Length,
    pub conversion: Conversion,
    /// The conversion letter was upper case.
    pub capital: bool,
    pub alternate: bool,
}

impl Default for Specifier {
    fn default() -> Self {
        Specifier {
            width: Count::Fixed(0),
            precision: None,
            padding: Padding::RightJustified,
            sign: Sign::Default,
            length: Length::Word,
            conversion: Conversion::Percent,
            capital: false,
            alternate: false,
        }
    }
}

struct Cursor<'f> {
    fmt: &'f [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Result<u8, FormatError> {
        self.fmt
            .get(self.pos)
            .copied()
            .filter(|&c| c != 0)
            .ok_or(FormatError::UnexpectedEnd)
    }

    fn eat(&mut self, c: u8) -> Result<bool, FormatError> {
        let found = self.peek()? == c;
        if found {
            self.pos += 1;
        }
        Ok(found)
    }

    // Literal widths and precisions share the range of `*` arguments.
    fn number(&mut self) -> Result<usize, FormatError> {
        let mut n: usize = 0;
        while let Some(&c) = self.fmt.get(self.pos).filter(|c| c.is_ascii_digit()) {
            n = n
                .checked_mul(10)
                .and_then(|n| n.checked_add((c - b'0') as usize))
                .filter(|&n| n <= MAX_FIELD_WIDTH)
                .ok_or(FormatError::FieldTooWide)?;
            self.pos += 1;
        }
        Ok(n)
    }
}

impl Specifier {
    /// Parse the directive at the start of `fmt`, which begins right after
    /// the `%`. Returns the specifier and the number of bytes it took up.
    pub fn parse(fmt: &[u8]) -> Result<(Specifier, usize), FormatError> {
        let mut cur = Cursor { fmt, pos: 0 };
        let mut parsed = Specifier::default();

        if cur.peek()? == b'$' {
            return Err(FormatError::PositionalUnsupported);
        }

        loop {
            match cur.peek()? {
                b'#' => parsed.alternate = true,
                // `-` overrides `0`.
                b'0' if parsed.padding != Padding::LeftJustified => parsed.padding = Padding::ZeroPadded,
                b'0' => {}
                b'-' => parsed.padding = Padding::LeftJustified,
                // `+` overrides ` `.
                b' ' if parsed.sign != Sign::Always => parsed.sign = Sign::Blank,
                b' ' => {}
                b'+' => parsed.sign = Sign::Always,
                _ => break,
            }
            cur.pos += 1;
        }

        if cur.eat(b'*')? {
            parsed.width = Count::Next;
        } else if let b'1'..=b'9' = cur.peek()? {
            parsed.width = Count::Fixed(cur.number()?);
        }

        if cur.eat(b'.')? {
            parsed.precision = Some(if cur.eat(b'*')? {
                Count::Next
            } else {
                Count::Fixed(cur.number()?)
            });
        }

        parsed.length = match cur.peek()? {
            b'h' => {
                cur.pos += 1;
                if cur.eat(b'h')? {
                    Length::Byte
                } else {
                    Length::Half
                }
            }
            b'l' => {
                cur.pos += 1;
                cur.eat(b'l')?;
                Length::Wide
            }
            b'q' | b'L' | b'j' | b'z' | b'Z' | b't' => {
                cur.pos += 1;
                Length::Wide
            }
            _ => Length::Word,
        };

        let extension = cur.eat(b'@')?;
        let letter = cur.peek()?;
        parsed.conversion = if extension {
            match letter {
                b'd' => Conversion::Data,
                b'b' => Conversion::Boolean,
                _ => return Err(FormatError::UnknownConversion(letter)),
            }
        } else {
            match letter {
                b'd' | b'i' => Conversion::Signed,
                b'u' => Conversion::Unsigned,
                b'o' => Conversion::Octal,
                b'x' | b'X' => Conversion::Hex,
                b'b' | b'B' => Conversion::Binary,
                b'e' | b'E' => Conversion::Exponent,
                b'f' | b'F' => Conversion::Fixed,
                b'g' | b'G' => Conversion::General,
                b'c' => Conversion::Char,
                b's' => Conversion::Str,
                b'p' => Conversion::Pointer,
                b'n' => Conversion::Count,
                b'%' => Conversion::Percent,
                _ => return Err(FormatError::UnknownConversion(letter)),
            }
        };
        parsed.capital = letter.is_ascii_uppercase();

        Ok((parsed, cur.pos + 1))
    }

    /// The conversion letter, for error messages.
    pub fn letter(&self) -> &'static str {
        match self.conversion {
            Conversion::Signed => "d",
            Conversion::Unsigned => "u",
            Conversion::Octal => "o",
            Conversion::Hex => "x",
            Conversion::Binary => "b",
            Conversion::Exponent => "e",
            Conversion::Fixed => "f",
            Conversion::General => "g",
            Conversion::Char => "c",
            Conversion::Str => "s",
            Conversion::Pointer => "p",
            Conversion::Count => "n",
            Conversion::Percent => "%",
            Conversion::Data => "@d",
            Conversion::Boolean => "@b",
        }
    }
}
