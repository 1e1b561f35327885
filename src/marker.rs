// Repetition marker parsing.
//
// A marker body has the shape `<len>x<count>`, both sides unsigned base-10
// integers. Stray `(` / `)` delimiters on either end are tolerated so the
// raw text between (or around) the parentheses can be handed over as-is.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Marker body did not match `<len>x<count>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    #[error("marker `{body}` has no `x` separator")]
    MissingSeparator { body: String },

    #[error("marker `{body}` has more than one `x` separator")]
    ExtraSeparator { body: String },

    #[error("marker `{body}`: {field} `{text}` is not an unsigned integer")]
    InvalidNumber {
        body: String,
        field: &'static str,
        text: String,
    },
}

// ---------------------------------------------------------------------------
// Marker
// ---------------------------------------------------------------------------

/// A `(LxN)` directive: repeat the next `len` bytes `count` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker {
    /// Number of bytes following the marker that form the repeated block.
    pub len: usize,
    /// How many times the block is written.
    pub count: usize,
}

impl Marker {
    pub const fn new(len: usize, count: usize) -> Self {
        Self { len, count }
    }

    /// Parse a marker body such as `"3x3"` or `"(3x3)"`.
    pub fn parse(body: &str) -> Result<Self, MarkerError> {
        Self::parse_bytes(body.as_bytes())
    }

    /// Byte-oriented form of [`Marker::parse`]. Non-UTF-8 bodies are
    /// reported lossily in the error.
    pub fn parse_bytes(raw: &[u8]) -> Result<Self, MarkerError> {
        let body = strip_delimiters(raw);
        let lossy = || String::from_utf8_lossy(body).into_owned();

        let mut parts = body.split(|&b| b == b'x');
        let (len_text, count_text) = match (parts.next(), parts.next(), parts.next()) {
            (Some(len), Some(count), None) => (len, count),
            (None, _, _) | (_, None, _) => {
                return Err(MarkerError::MissingSeparator { body: lossy() });
            }
            (_, _, Some(_)) => return Err(MarkerError::ExtraSeparator { body: lossy() }),
        };

        let number = |field: &'static str, text: &[u8]| {
            parse_decimal(text).ok_or_else(|| MarkerError::InvalidNumber {
                body: lossy(),
                field,
                text: String::from_utf8_lossy(text).into_owned(),
            })
        };

        Ok(Self {
            len: number("length", len_text)?,
            count: number("count", count_text)?,
        })
    }

    /// Total bytes this marker expands to (`len * count`), or `None` on overflow.
    pub fn expanded_len(&self) -> Option<u64> {
        (self.len as u64).checked_mul(self.count as u64)
    }
}

impl FromStr for Marker {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}x{})", self.len, self.count)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn strip_delimiters(mut raw: &[u8]) -> &[u8] {
    while let [b'(' | b')', rest @ ..] = raw {
        raw = rest;
    }
    while let [rest @ .., b'(' | b')'] = raw {
        raw = rest;
    }
    raw
}

/// ASCII digits only: no sign, no whitespace, no empty string.
fn parse_decimal(text: &[u8]) -> Option<usize> {
    if text.is_empty() {
        return None;
    }
    text.iter().try_fold(0usize, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(usize::from(b - b'0'))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
