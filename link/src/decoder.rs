//! Numeric reply decoding
//!
//! Mount replies are free-form text: a number, possibly with a trailing
//! terminator, stray whitespace, or other framing around it. The decoder
//! first tries to read the whole trimmed reply as one framed number and,
//! failing that, scans for the first number-shaped run anywhere in it.

use winnow::ascii::{digit0, digit1};
use winnow::combinator::{alt, opt, terminated};
use winnow::token::{none_of, one_of};
use winnow::{ModalResult, Parser};

/// `sign? digits? . digits+ | sign? digits+`
fn decimal<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    (
        opt(one_of(['+', '-'])),
        alt(((digit0, '.', digit1).void(), digit1.void())),
    )
        .take()
        .parse_next(input)
}

/// A decimal optionally followed by a single non-digit marker such as `#`
fn framed_decimal<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    terminated(decimal, opt(none_of(|c: char| c.is_ascii_digit()))).parse_next(input)
}

/// Extract a number from a raw device reply.
///
/// Returns `None` for absent or empty input, whenever no number can be
/// found, and when the digits overflow to infinity. Never panics.
pub fn parse_number(raw: Option<&str>) -> Option<f64> {
    let raw = raw.filter(|s| !s.is_empty())?;

    if let Ok(token) = framed_decimal.parse(raw.trim()) {
        if let Some(value) = to_finite(token) {
            return Some(value);
        }
    }

    let token = raw.char_indices().find_map(|(start, _)| {
        let mut rest = &raw[start..];
        decimal(&mut rest).ok()
    })?;
    to_finite(token)
}

fn to_finite(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}
