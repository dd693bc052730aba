//! Console target numbers and reply-path tokenisation.
//!
//! Consoles address targets by decimal numbers with up to three fractional
//! digits (`"101"`, `"5.47"`, `"-.5"`). [`DecimalNumber`] keeps the whole
//! and fractional portions as separate integers so ordering and equality
//! match the console's, with no float rounding in sight.
//!
//! Reply paths carry a structured tail after the type/list prefix:
//!
//! ```text
//! <id>
//! <id>/<part>
//! <id>/<group>
//! <id>/<part>/<group>
//! <id>[/<part>][/<group>]/list/<index>/<total>
//! ```
//!
//! [`PathData::parse`] tokenises that tail.

use std::fmt;
use std::str::FromStr;

use winnow::ascii::digit0;
use winnow::combinator::{opt, preceded};
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::error::Error;

/// Result type for winnow parsers.
type PResult<T> = core::result::Result<T, winnow::error::ErrMode<ContextError>>;

/// Fractional digits carried by a target number.
pub const TARGET_DECIMALS: u32 = 3;

const DECIMAL_SCALE: i32 = 1000;

/// A console target number: whole part plus a three-digit fixed-point
/// fractional part (`"5.4"` is `(5, 400)`).
///
/// A sign on a zero whole with a non-zero fraction is preserved by negating
/// the fraction: `"-0.5"` is `(0, -500)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecimalNumber {
    pub whole: i32,
    pub decimal: i32,
}

impl DecimalNumber {
    pub fn new(whole: i32, decimal: i32) -> Self {
        Self { whole, decimal }
    }
}

impl From<i32> for DecimalNumber {
    fn from(whole: i32) -> Self {
        Self { whole, decimal: 0 }
    }
}

fn invalid<T>() -> PResult<T> {
    Err(winnow::error::ErrMode::Cut(ContextError::new()))
}

/// Number grammar: `[-]?DIGITS(.DIGITS)?`, `-.DIGITS`, `.DIGITS`.
/// Fractional digits past the third carry no value but must still be digits.
fn decimal_number(input: &mut &str) -> PResult<DecimalNumber> {
    let negative = opt('-').parse_next(input)?.is_some();
    let whole_digits = digit0.parse_next(input)?;
    let fraction: Option<&str> = opt(preceded('.', digit0)).parse_next(input)?;

    if whole_digits.is_empty() && fraction.is_none() {
        return invalid();
    }

    let mut whole: i32 = if whole_digits.is_empty() {
        0
    } else {
        match whole_digits.parse() {
            Ok(w) => w,
            Err(_) => return invalid(),
        }
    };
    if negative {
        whole = -whole;
    }

    let mut decimal = 0i32;
    if let Some(digits) = fraction {
        for (i, b) in digits.bytes().take(TARGET_DECIMALS as usize).enumerate() {
            decimal += i32::from(b - b'0') * 10i32.pow(TARGET_DECIMALS - 1 - i as u32);
        }
        if negative && whole == 0 && decimal > 0 {
            decimal = -decimal;
        }
    }

    Ok(DecimalNumber { whole, decimal })
}

impl FromStr for DecimalNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        decimal_number
            .parse(s)
            .map_err(|_| Error::InvalidNumber(s.to_string()))
    }
}

impl fmt::Display for DecimalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.whole == 0 && self.decimal < 0 {
            write!(f, "-")?;
        }
        write!(f, "{}", self.whole)?;

        if self.decimal != 0 {
            let n = self.decimal.unsigned_abs();
            if n < DECIMAL_SCALE as u32 {
                let digits = format!("{n:03}");
                let digits = digits.trim_end_matches('0');
                if !digits.is_empty() {
                    write!(f, ".{digits}")?;
                }
            }
        }

        Ok(())
    }
}

/// Address of one target within a list: number plus part index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetKey {
    pub num: DecimalNumber,
    pub part: i32,
}

impl TargetKey {
    pub fn new(num: DecimalNumber, part: i32) -> Self {
        Self { num, part }
    }

    /// A key addresses a real target only when its number is positive.
    pub fn is_valid(&self) -> bool {
        self.num.whole >= 1 || (self.num.whole >= 0 && self.num.decimal > 0)
    }
}

/// Parsed tail of a reply path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathData {
    pub key: TargetKey,
    pub group: String,
    pub is_list: bool,
    pub list_index: u32,
    pub list_size: u32,
}

impl PathData {
    /// Tokenise the path tail starting at `offset`.
    ///
    /// Returns `None` when the tail does not open with a target id, a part
    /// or list number is fractional, a second `list` keyword appears, a
    /// number follows the part without an intervening `list`, or the tail
    /// ends inside an incomplete `list` tuple.
    pub fn parse(path: &str, offset: usize) -> Option<PathData> {
        let tail = path.get(offset..)?;

        let mut data = PathData::default();
        let mut got_id = false;
        let mut got_part = false;
        let mut got_list = false;
        let mut got_list_index = false;

        for token in tail.split('/').filter(|t| !t.is_empty()) {
            if let Ok(num) = token.parse::<DecimalNumber>() {
                if got_list {
                    if num.whole < 0 || num.decimal != 0 {
                        return None;
                    }
                    if got_list_index {
                        data.list_size = num.whole as u32;
                        data.is_list = true;
                        return Some(data);
                    }
                    data.list_index = num.whole as u32;
                    got_list_index = true;
                } else if got_id {
                    if got_part || num.decimal != 0 {
                        // stray number, or a fractional part index
                        return None;
                    }
                    data.key.part = num.whole;
                    got_part = true;
                } else {
                    data.key.num = num;
                    got_id = true;
                }
            } else if got_id {
                if token == "list" {
                    if got_list {
                        return None;
                    }
                    got_list = true;
                } else {
                    data.group = token.to_string();
                }
            } else {
                // must start with the target id
                return None;
            }
        }

        // a complete list tuple returned above; a dangling one is an error
        if got_id && !got_list { Some(data) } else { None }
    }
}
