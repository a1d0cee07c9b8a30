//! Wire encodings shared by every audit record

use base64::Engine;
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::fmt::Write;

/// Fixed timestamp pattern of the wire record, e.g. `2024-05-01T13:37:00.000+0200`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000%z";

/// Render `elements` as `open "e0"<sep> "e1"<sep> ... close`.
///
/// The separator after element `i` alternates: `sep2` when `i` is odd,
/// `sep1` otherwise, and is always followed by a space. Existing consumers
/// rely on this to render flattened key/value lists as `"k": "v", "k2": "v2"`.
/// Elements are quoted verbatim, without escaping.
pub fn container_string<S: AsRef<str>>(
    elements: Option<&[S]>,
    open: char,
    close: char,
    sep1: char,
    sep2: char,
) -> String {
    let mut out = String::new();
    out.push(open);
    if let Some(elements) = elements {
        let last = elements.len().saturating_sub(1);
        for (i, element) in elements.iter().enumerate() {
            let _ = write!(out, "\"{}\"", element.as_ref());
            if i != last {
                out.push(if i % 2 == 1 { sep2 } else { sep1 });
                out.push(' ');
            }
        }
    }
    out.push(close);
    out
}

/// ISO-8601 timestamp with millisecond field pinned to `000`
pub fn iso8601_timestamp<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Standard base64 without line breaks
pub fn transport_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
