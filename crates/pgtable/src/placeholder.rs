//! `?` → `$n` placeholder numbering.
//!
//! Builder fragments use positional `?` placeholders; Postgres wants `$1, $2, ...`.
//! Question marks inside string literals, quoted identifiers, comments and
//! dollar-quoted bodies are left alone, `??` renders a literal `?` (for the jsonb
//! operators), and any `?` beyond the bound parameter count is kept verbatim.

use std::fmt::Write;

/// Replace up to `count` placeholders in `sql`, numbering them from `first`.
pub fn number_placeholders(sql: &str, first: usize, count: usize) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + count * 2);
    let mut used = 0;
    let mut pos = 0;
    let mut copied = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            quote @ (b'\'' | b'"') => pos = skip_quoted(bytes, pos, quote),
            b'-' if bytes.get(pos + 1) == Some(&b'-') => {
                pos = sql[pos..].find('\n').map_or(bytes.len(), |off| pos + off + 1);
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                pos = sql[pos + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |off| pos + 2 + off + 2);
            }
            b'$' => match dollar_tag_len(&sql[pos..]) {
                Some(tag_len) => {
                    let tag = &sql[pos..pos + tag_len];
                    let body = pos + tag_len;
                    pos = sql[body..]
                        .find(tag)
                        .map_or(bytes.len(), |off| body + off + tag_len);
                }
                None => pos += 1,
            },
            b'?' => {
                out.push_str(&sql[copied..pos]);
                if bytes.get(pos + 1) == Some(&b'?') {
                    out.push('?');
                    pos += 2;
                } else if used < count {
                    let _ = write!(out, "${}", first + used);
                    used += 1;
                    pos += 1;
                } else {
                    out.push('?');
                    pos += 1;
                }
                copied = pos;
            }
            _ => pos += 1,
        }
    }

    out.push_str(&sql[copied..]);
    out
}

/// Index just past the closing quote ('' and "" are escapes).
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == quote {
            if bytes.get(pos + 1) == Some(&quote) {
                pos += 2;
                continue;
            }
            return pos + 1;
        }
        pos += 1;
    }
    bytes.len()
}

/// Length of a `$tag$` opener at the start of `s`. `$1` is a parameter, not a tag.
fn dollar_tag_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    match bytes.get(1) {
        Some(b'$') => return Some(2),
        Some(c) if c.is_ascii_alphabetic() || *c == b'_' => {}
        _ => return None,
    }
    let mut pos = 2;
    while let Some(&c) = bytes.get(pos) {
        if c == b'$' {
            return Some(pos + 1);
        }
        if !(c.is_ascii_alphanumeric() || c == b'_') {
            return None;
        }
        pos += 1;
    }
    None
}
