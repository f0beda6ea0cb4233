use std::borrow::Cow;
use std::sync::LazyLock;

use regex::bytes::Regex;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
/// A UTF-8 BOM that was decoded as Latin-1 and re-encoded as UTF-8.
const MOJIBAKE_BOM_BYTES: &[u8] = &[0xC3, 0xAF, 0xC2, 0xBB, 0xC2, 0xBF];
const MOJIBAKE_BOM: &str = "\u{EF}\u{BB}\u{BF}";

static DECL_ENCODING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*<\?xml[^>]*encoding\s*=\s*["']([A-Za-z0-9_.:-]+)["']"#).unwrap()
});

/// Decode a document buffer of uncertain encoding into text.
///
/// Byte-order marks are removed whether they arrive as raw bytes, as a
/// decoded `U+FEFF`, or as the mis-decoded `ï»¿` sequence. Bytes that are not
/// valid in the chosen encoding become `U+FFFD`.
pub fn decode(bytes: &[u8]) -> String {
    let text = match bytes {
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        _ => {
            let body = strip_byte_bom(bytes);
            match std::str::from_utf8(body) {
                Ok(s) => s.to_string(),
                Err(_) => match declared_single_byte(body) {
                    Some(charset) => charset.decode(body),
                    None => String::from_utf8_lossy(body).into_owned(),
                },
            }
        }
    };
    strip_text_bom(&text).to_string()
}

fn strip_byte_bom(mut bytes: &[u8]) -> &[u8] {
    loop {
        if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
            bytes = rest;
        } else if let Some(rest) = bytes.strip_prefix(MOJIBAKE_BOM_BYTES) {
            bytes = rest;
        } else {
            return bytes;
        }
    }
}

fn strip_text_bom(mut text: &str) -> &str {
    loop {
        if let Some(rest) = text.strip_prefix('\u{FEFF}') {
            text = rest;
        } else if let Some(rest) = text.strip_prefix(MOJIBAKE_BOM) {
            text = rest;
        } else {
            return text;
        }
    }
}

fn decode_utf16(body: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = body
        .chunks(2)
        .map(|pair| match pair {
            [a, b] => to_unit([*a, *b]),
            _ => 0xFFFD,
        })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Single-byte charsets a document may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SingleByte {
    Latin1,
    Windows1252,
}

/// Windows-1252 code points for bytes 0x80..=0x9F. Unassigned slots become
/// `U+FFFD`.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{FFFD}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{FFFD}', '\u{017D}', '\u{FFFD}',
    '\u{FFFD}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{FFFD}', '\u{017E}', '\u{0178}',
];

impl SingleByte {
    fn decode(self, bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|&b| match (self, b) {
                (SingleByte::Windows1252, 0x80..=0x9F) => CP1252_HIGH[usize::from(b - 0x80)],
                _ => char::from(b),
            })
            .collect()
    }
}

fn declared_single_byte(bytes: &[u8]) -> Option<SingleByte> {
    let head = &bytes[..bytes.len().min(200)];
    let caps = DECL_ENCODING_RE.captures(head)?;
    let label: Cow<str> = String::from_utf8_lossy(&caps[1]);
    match label.to_ascii_lowercase().as_str() {
        "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Some(SingleByte::Latin1),
        "windows-1252" | "cp1252" => Some(SingleByte::Windows1252),
        _ => None,
    }
}
