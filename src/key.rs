//! Key validation
//!
//! Keys are dot-separated segments. Reads may end in a wildcard segment
//! (`.*`, optionally followed by a depth such as `.*2`) to fetch a whole
//! subtree; writes may not contain `*` at all. Nothing is sanitized: a key
//! either passes every rule or is rejected before it reaches the stream.

use crate::error::{KeyFormatError, KeyRule};
use nom::{
    bytes::complete::tag,
    character::complete::digit1,
    combinator::{all_consuming, map_res, opt},
    sequence::preceded,
    IResult,
};

/// Whether a key is about to be read or written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyContext {
    Read,
    Write,
}

/// What a valid key addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Single,
    /// A subtree, expanded at most `depth` levels when given
    Wildcard { depth: Option<u32> },
}

impl KeyKind {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, KeyKind::Wildcard { .. })
    }
}

/// Check a key against every lexical rule for the given context
pub fn validate(key: &str, context: KeyContext) -> Result<KeyKind, KeyFormatError> {
    if key.is_empty() {
        return Err(KeyFormatError::new(key, KeyRule::Empty));
    }

    if key.chars().any(is_whitespace) {
        return Err(KeyFormatError::new(key, KeyRule::Whitespace));
    }

    let kind = match context {
        KeyContext::Read => read_shape(key)?,
        KeyContext::Write => {
            if key.contains('*') {
                return Err(KeyFormatError::new(key, KeyRule::WildcardInWrite));
            }
            KeyKind::Single
        }
    };

    if key.starts_with('.') || key.ends_with('.') || key.contains("..") {
        return Err(KeyFormatError::new(key, KeyRule::Nesting));
    }

    Ok(kind)
}

// U+FEFF is not Unicode whitespace but the server treats it as such.
fn is_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

fn read_shape(key: &str) -> Result<KeyKind, KeyFormatError> {
    let (base, depth) = match key.rfind(".*") {
        Some(idx) => match wildcard_suffix(&key[idx..]) {
            Ok((_, depth)) => (&key[..idx], Some(depth)),
            Err(_) => (key, None),
        },
        None => (key, None),
    };

    if base.is_empty() || base.contains('*') {
        return Err(KeyFormatError::new(key, KeyRule::Wildcard));
    }

    Ok(match depth {
        Some(depth) => KeyKind::Wildcard { depth },
        None => KeyKind::Single,
    })
}

/// Parse a trailing `.*` with an optional depth: `.*`, `.*3`
fn wildcard_suffix(input: &str) -> IResult<&str, Option<u32>> {
    all_consuming(preceded(
        tag(".*"),
        opt(map_res(digit1, str::parse::<u32>)),
    ))(input)
}
