//! JSON Pointer (RFC 6901) and relative JSON Pointer addressing.
//!
//! Pointers are the in-document half of every [`Location`]; relative
//! pointers carry the integer "steps up" prefix that lets a type mapping
//! entry describe relations on an ancestor or sibling.
//!
//! [`Location`]: crate::registry::Location

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;

use crate::error::PointerError;

/// Characters that must be percent-encoded in a URI fragment.
///
/// RFC 3986 fragment = *( pchar / "/" / "?" ).
const FRAGMENT_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}')
    .add(b'\\');

/// RFC 6901 JSON Pointer over parsed document trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsonPointer {
    tokens: Vec<String>,
}

impl JsonPointer {
    /// The empty pointer addressing a document root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse the string form: empty, or `/`-prefixed escaped tokens.
    pub fn parse(input: &str) -> Result<Self, PointerError> {
        if input.is_empty() {
            return Ok(Self::root());
        }
        if !input.starts_with('/') {
            return Err(PointerError::InvalidPointer {
                input: input.to_string(),
            });
        }
        let tokens = input
            .split('/')
            .skip(1)
            .map(unescape_token)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| PointerError::InvalidPointer {
                input: input.to_string(),
            })?;
        Ok(Self { tokens })
    }

    /// Parse the percent-encoded URI fragment form (without the `#`).
    pub fn parse_uri_fragment(fragment: &str) -> Result<Self, PointerError> {
        let decoded = percent_decode_str(fragment)
            .decode_utf8()
            .map_err(|_| PointerError::InvalidPointer {
                input: fragment.to_string(),
            })?;
        Self::parse(&decoded)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.tokens.last().map(String::as_str)
    }

    pub fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    /// A new pointer one token deeper.
    pub fn child(&self, token: impl Into<String>) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(token.into());
        Self { tokens }
    }

    /// The pointer with the last token removed, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.tokens.is_empty() {
            return None;
        }
        Some(Self {
            tokens: self.tokens[..self.tokens.len() - 1].to_vec(),
        })
    }

    /// The first `n` tokens as a pointer.
    pub fn prefix(&self, n: usize) -> Self {
        Self {
            tokens: self.tokens[..n.min(self.tokens.len())].to_vec(),
        }
    }

    /// Walk the pointer into a value, `None` if any step is missing.
    pub fn evaluate<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for token in &self.tokens {
            current = match current {
                Value::Object(map) => map.get(token)?,
                Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Apply a relative pointer to this pointer, producing the target.
    pub fn join(&self, rel: &RelativePointer) -> Result<Self, PointerError> {
        let up = rel.up as usize;
        if up > self.tokens.len() {
            return Err(PointerError::TooManyStepsUp {
                up: rel.up,
                from: self.to_string(),
            });
        }
        let mut tokens = self.tokens[..self.tokens.len() - up].to_vec();
        if rel.over != 0 {
            let last = tokens.pop().ok_or_else(|| PointerError::NonIntegerIndex {
                pointer: self.to_string(),
            })?;
            let index: i64 = last.parse().map_err(|_| PointerError::NonIntegerIndex {
                pointer: self.to_string(),
            })?;
            tokens.push((index + rel.over).to_string());
        }
        tokens.extend(rel.path.tokens.iter().cloned());
        Ok(Self { tokens })
    }

    /// The percent-encoded URI fragment form (without the `#`).
    pub fn uri_fragment(&self) -> String {
        utf8_percent_encode(&self.to_string(), FRAGMENT_ESCAPE).to_string()
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", escape_token(token))?;
        }
        Ok(())
    }
}

/// Relative JSON Pointer: steps-up count, optional index adjustment,
/// optional path, optional trailing `#` selecting the key itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelativePointer {
    pub up: u32,
    pub over: i64,
    pub path: JsonPointer,
    pub key_of: bool,
}

impl RelativePointer {
    pub fn parse(input: &str) -> Result<Self, PointerError> {
        let invalid = || PointerError::InvalidRelativePointer {
            input: input.to_string(),
        };

        let digits_end = input.find(|c: char| !c.is_ascii_digit()).unwrap_or(input.len());
        if digits_end == 0 || (digits_end > 1 && input.starts_with('0')) {
            return Err(invalid());
        }
        let up: u32 = input[..digits_end].parse().map_err(|_| invalid())?;
        let mut rest = &input[digits_end..];

        let mut over: i64 = 0;
        if rest.starts_with('+') || rest.starts_with('-') {
            let sign = if rest.starts_with('-') { -1 } else { 1 };
            rest = &rest[1..];
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            if end == 0 || rest.starts_with('0') {
                return Err(invalid());
            }
            over = sign * rest[..end].parse::<i64>().map_err(|_| invalid())?;
            rest = &rest[end..];
        }

        if rest == "#" {
            return Ok(Self {
                up,
                over,
                path: JsonPointer::root(),
                key_of: true,
            });
        }
        let path = JsonPointer::parse(rest).map_err(|_| invalid())?;
        Ok(Self {
            up,
            over,
            path,
            key_of: false,
        })
    }
}

impl fmt::Display for RelativePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.up)?;
        if self.over != 0 {
            write!(f, "{:+}", self.over)?;
        }
        if self.key_of {
            write!(f, "#")
        } else {
            write!(f, "{}", self.path)
        }
    }
}

/// Escape a single reference token (`~` then `/`).
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Unescape a single reference token; rejects a trailing bare `~`.
pub fn unescape_token(token: &str) -> Result<String, PointerError> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(PointerError::InvalidPointer {
                    input: token.to_string(),
                })
            }
        }
    }
    Ok(out)
}
