//! Text cleanup shared by user input and streamed payloads.
//!
//! Two kinds of sanitization live here: control-character cleanup for text
//! typed at the prompt, and removal of lone UTF-16 surrogates. Surrogates can
//! reach us either as raw CESU-8 style byte triples or as `\uD8xx` JSON
//! escapes that `serde_json` would otherwise refuse to decode. Both helpers
//! are idempotent.

use std::borrow::Cow;

/// Sanitize a line typed at the prompt.
///
/// - Converts tabs to 4 spaces
/// - Converts carriage returns to newlines
/// - Filters out control characters except newlines
pub fn sanitize_text_input(text: &str) -> String {
    let mut sanitized = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '\t' => sanitized.push_str("    "),
            '\r' => sanitized.push('\n'),
            '\n' => sanitized.push(c),
            _ if !c.is_control() => sanitized.push(c),
            _ => {}
        }
    }

    sanitized
}

fn is_encoded_surrogate(lead: u8, second: u8, third: u8) -> bool {
    lead == 0xED && (0xA0..=0xBF).contains(&second) && (0x80..=0xBF).contains(&third)
}

/// Drop surrogate code points encoded directly as three bytes
/// (`ED A0..BF 80..BF`), which makes the remainder decodable as UTF-8.
pub fn strip_encoded_surrogates(bytes: &[u8]) -> Cow<'_, [u8]> {
    let has_candidate = bytes
        .windows(3)
        .any(|w| is_encoded_surrogate(w[0], w[1], w[2]));
    if !has_candidate {
        return Cow::Borrowed(bytes);
    }

    // Stack reduction: a triple exposed by an earlier removal is caught too.
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    for &byte in bytes {
        out.push(byte);
        let len = out.len();
        if len >= 3 && is_encoded_surrogate(out[len - 3], out[len - 2], out[len - 1]) {
            out.truncate(len - 3);
        }
    }
    Cow::Owned(out)
}

fn escaped_code_unit(bytes: &[u8], at: usize) -> Option<u16> {
    let escape = bytes.get(at..at + 6)?;
    if escape[0] != b'\\' || escape[1] != b'u' || !escape[2..].iter().all(u8::is_ascii_hexdigit)
    {
        return None;
    }
    let hex = std::str::from_utf8(&escape[2..]).ok()?;
    u16::from_str_radix(hex, 16).ok()
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

/// Remove `\uXXXX` escapes in the surrogate range that do not form a valid
/// high+low pair. Escaped backslashes (`\\uD800`) are left alone.
pub fn strip_lone_surrogate_escapes(payload: &str) -> Cow<'_, str> {
    if !payload.contains("\\u") {
        return Cow::Borrowed(payload);
    }

    let bytes = payload.as_bytes();
    let mut out = String::new();
    let mut flushed = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }

        match escaped_code_unit(bytes, i) {
            Some(unit) if is_high_surrogate(unit) => {
                if escaped_code_unit(bytes, i + 6).is_some_and(is_low_surrogate) {
                    i += 12;
                    continue;
                }
                out.push_str(&payload[flushed..i]);
                i += 6;
                flushed = i;
            }
            Some(unit) if is_low_surrogate(unit) => {
                out.push_str(&payload[flushed..i]);
                i += 6;
                flushed = i;
            }
            Some(_) => i += 6,
            None => i += 2,
        }
    }

    if flushed == 0 {
        return Cow::Borrowed(payload);
    }
    out.push_str(&payload[flushed..]);
    Cow::Owned(out)
}
