//! Character decoding for string literals
//!
//! Handles doubled quotes, `\\`, `\S\c`, `\X\HH`, `\X2\...\X0\` and
//! `\X4\...\X0\`; code page switches (`\P?\`) are accepted and ignored.

use crate::{Error, Result};

/// Position just past the closing quote of a string whose opening quote ends
/// before `pos`, or `None` if the input ends first.
pub fn skip(data: &[u8], mut pos: usize) -> Option<usize> {
    while let Some(&c) = data.get(pos) {
        pos += 1;
        if c == b'\'' {
            if data.get(pos) == Some(&b'\'') {
                pos += 1;
                continue;
            }
            return Some(pos);
        }
    }
    None
}

/// Decode the content between the quotes of a string literal.
pub fn decode(raw: &[u8]) -> Result<String> {
    let text = match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => raw.iter().map(|b| char::from(*b)).collect(),
    };
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            out.push('\'');
            i += if chars.get(i + 1) == Some(&'\'') { 2 } else { 1 };
            continue;
        }
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 4)].iter().collect();
        if rest.starts_with("\\\\") {
            out.push('\\');
            i += 2;
        } else if rest.starts_with("\\S\\") && i + 3 < chars.len() {
            let c = chars[i + 3];
            if !c.is_ascii() {
                return Err(Error::Parse(format!("Invalid \\S\\ escape '{}'", c)));
            }
            out.push(char::from(c as u8 + 128));
            i += 4;
        } else if rest == "\\X2\\" || rest == "\\X4\\" {
            let width = if rest == "\\X2\\" { 4 } else { 8 };
            i += 4;
            let end = find(&chars, i, "\\X0\\")
                .ok_or_else(|| Error::Parse(format!("Unterminated {} escape", rest)))?;
            let hex: String = chars[i..end].iter().collect();
            if hex.len() % width != 0 {
                return Err(Error::Parse(format!("Invalid {} escape '{}'", rest, hex)));
            }
            let units = (0..hex.len())
                .step_by(width)
                .map(|j| u32::from_str_radix(&hex[j..j + width], 16))
                .collect::<std::result::Result<Vec<u32>, _>>()
                .map_err(|_| Error::Parse(format!("Invalid {} escape '{}'", rest, hex)))?;
            if width == 4 {
                let units: Vec<u16> = units.into_iter().map(|u| u as u16).collect();
                for ch in char::decode_utf16(units) {
                    out.push(ch.unwrap_or(char::REPLACEMENT_CHARACTER));
                }
            } else {
                for u in units {
                    out.push(char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
            }
            i = end + 4;
        } else if rest.starts_with("\\X\\") && i + 5 <= chars.len() {
            let hex: String = chars[i + 3..i + 5].iter().collect();
            let byte = u8::from_str_radix(&hex, 16)
                .map_err(|_| Error::Parse(format!("Invalid \\X\\ escape '{}'", hex)))?;
            out.push(char::from(byte));
            i += 5;
        } else if rest.starts_with("\\P") && rest.ends_with('\\') && rest.len() == 4 {
            i += 4;
        } else {
            out.push('\\');
            i += 1;
        }
    }
    Ok(out)
}

fn find(chars: &[char], from: usize, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    chars[from..]
        .windows(needle.len())
        .position(|w| w == needle.as_slice())
        .map(|p| p + from)
}

/// Encode a string as a quoted literal.
pub fn encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    let mut pending: Vec<u16> = Vec::new();

    let flush = |out: &mut String, pending: &mut Vec<u16>| {
        if pending.is_empty() {
            return;
        }
        out.push_str("\\X2\\");
        for unit in pending.drain(..) {
            out.push_str(&format!("{:04X}", unit));
        }
        out.push_str("\\X0\\");
    };

    for c in value.chars() {
        if (' '..='~').contains(&c) {
            flush(&mut out, &mut pending);
            match c {
                '\'' => out.push_str("''"),
                '\\' => out.push_str("\\\\"),
                _ => out.push(c),
            }
        } else {
            let mut buf = [0u16; 2];
            pending.extend_from_slice(c.encode_utf16(&mut buf));
        }
    }
    flush(&mut out, &mut pending);
    out.push('\'');
    out
}
