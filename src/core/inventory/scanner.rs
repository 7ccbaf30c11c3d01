//! Splits template text into expression and statement tags.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Body of `{{ ... }}`; `offset` is the byte position of the body in the source.
    Expression { body: &'a str, offset: usize },
    /// Body of `{% ... %}`.
    Statement { body: &'a str, offset: usize },
}

/// A problem found at a byte offset of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanIssue {
    pub offset: usize,
    pub message: String,
}

fn endraw_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{%[-+]?\s*endraw\s*[-+]?%\}").expect("endraw pattern is valid")
    })
}

/// Position of `close` at or after `from`, skipping over quoted strings.
fn find_close(source: &str, from: usize, close: &str) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                } else if bytes[i..].starts_with(close.as_bytes()) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

/// Removes whitespace-control markers (`{{-`, `-%}` and the `+` forms).
fn strip_markers(body: &str, offset: usize) -> (&str, usize) {
    let (body, offset) = match body.as_bytes().first() {
        Some(b'-') | Some(b'+') => (&body[1..], offset + 1),
        _ => (body, offset),
    };
    let body = match body.as_bytes().last() {
        Some(b'-') | Some(b'+') => &body[..body.len() - 1],
        _ => body,
    };
    (body, offset)
}

pub fn scan(source: &str) -> Result<Vec<Segment<'_>>, ScanIssue> {
    let mut segments = Vec::new();
    let mut pos = 0;

    while let Some(found) = source[pos..].find('{') {
        let start = pos + found;
        let kind = source.as_bytes().get(start + 1).copied();

        match kind {
            Some(b'#') => {
                let end = source[start + 2..].find("#}").ok_or_else(|| ScanIssue {
                    offset: start,
                    message: "missing end of comment tag '#}'".to_string(),
                })?;
                pos = start + 2 + end + 2;
            }
            Some(b'{') => {
                let close = find_close(source, start + 2, "}}").ok_or_else(|| ScanIssue {
                    offset: start,
                    message: "unexpected end of template, expected '}}'".to_string(),
                })?;
                let (body, offset) = strip_markers(&source[start + 2..close], start + 2);
                if body.trim().is_empty() {
                    return Err(ScanIssue {
                        offset: start,
                        message: "expected an expression, got '}}'".to_string(),
                    });
                }
                segments.push(Segment::Expression { body, offset });
                pos = close + 2;
            }
            Some(b'%') => {
                let close = find_close(source, start + 2, "%}").ok_or_else(|| ScanIssue {
                    offset: start,
                    message: "unexpected end of template, expected '%}'".to_string(),
                })?;
                let (body, offset) = strip_markers(&source[start + 2..close], start + 2);
                pos = close + 2;

                if body.split_whitespace().next() == Some("raw") {
                    let end = endraw_pattern().find(&source[pos..]).ok_or_else(|| ScanIssue {
                        offset: start,
                        message: "missing end of raw directive".to_string(),
                    })?;
                    pos += end.end();
                    continue;
                }
                segments.push(Segment::Statement { body, offset });
            }
            _ => pos = start + 1,
        }
    }

    Ok(segments)
}
