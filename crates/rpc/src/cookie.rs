//! `Cookie` header codec
//!
//! Parses the aggregated `name=value; name=value` string browsers send and
//! formats single `name=value` pairs. Values are never escaped: only tokens
//! and base64url strings are stored in cookies, and those are already safe.

use cookie::{Cookie, ParseError};

/// Malformed cookie segment.
///
/// Only cookie names appear in the message; values may be tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CookieError {
    #[error("cookie segment has no '=' separator")]
    MissingSeparator,

    #[error("invalid cookie name {0:?}")]
    InvalidName(String),

    #[error("invalid characters in value of cookie {0:?}")]
    InvalidValue(String),
}

/// Parse a `Cookie` header into ordered `(name, value)` results, one per
/// segment.
///
/// Segments are separated by `;`, surrounding whitespace is trimmed and
/// empty segments are skipped. Each segment splits on its first `=`, so
/// values may themselves contain `=` (base64 padding). A bad segment yields
/// an error for that segment only; the rest of the header still parses.
pub fn parse(header: &str) -> impl Iterator<Item = Result<(String, String), CookieError>> + '_ {
    Cookie::split_parse(header).map(|parsed| {
        let cookie = parsed.map_err(|e| match e {
            ParseError::EmptyName => CookieError::InvalidName(String::new()),
            _ => CookieError::MissingSeparator,
        })?;

        let name = cookie.name();
        if !is_token(name) {
            return Err(CookieError::InvalidName(name.to_owned()));
        }

        let value = cookie.value_trimmed();
        if !value.bytes().all(is_value_byte) {
            return Err(CookieError::InvalidValue(name.to_owned()));
        }

        Ok((name.to_owned(), value.to_owned()))
    })
}

/// Format a single pair as `name=value`.
pub fn format(name: &str, value: &str) -> String {
    format!("{name}={value}")
}

/// RFC 6265 cookie-name: an RFC 2616 token.
fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')'
                        | b'<'
                        | b'>'
                        | b'@'
                        | b','
                        | b';'
                        | b':'
                        | b'\\'
                        | b'"'
                        | b'/'
                        | b'['
                        | b']'
                        | b'?'
                        | b'='
                        | b'{'
                        | b'}'
                )
        })
}

// Printable ASCII minus DQUOTE, ';' and '\'. Space and ',' are tolerated
// inside values, as browsers send them.
fn is_value_byte(b: u8) -> bool {
    (0x20..0x7f).contains(&b) && b != b'"' && b != b';' && b != b'\\'
}
