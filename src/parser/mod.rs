pub mod blocks;
pub mod endpoints;
pub mod params;

use std::sync::LazyLock;

use regex::Regex;

pub use blocks::{decode, decode_document, DecodedBlock};
pub use endpoints::{extract, Extraction};

use crate::model::RawDocument;

static STRING_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([A-Za-z_][A-Za-z0-9_]*)"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap());

/// Two-pass pipeline: document → decoded blocks → endpoint candidates and metadata.
pub fn process_document(doc: &RawDocument) -> (Vec<DecodedBlock>, Extraction) {
    let blocks = blocks::decode_document(doc);
    let extraction = endpoints::extract(&blocks);
    (blocks, extraction)
}

/// Raw value of the first `"key":"..."` string field in `text`, escapes intact.
pub(crate) fn string_field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    STRING_FIELD_RE
        .captures_iter(text)
        .find(|c| &c[1] == key)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str())
}

/// Offsets of the `{` and `}` bytes in `text` that sit outside string literals.
///
/// `text` must start outside a string.
pub(crate) fn structural_braces(text: &str) -> Vec<(usize, u8)> {
    let mut braces = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'}' => braces.push((i, b)),
            _ => {}
        }
    }
    braces
}

/// Flatten escaped whitespace and quotes left in a decoded field value.
pub(crate) fn clean_text(raw: &str) -> String {
    let flat = raw
        .replace("\\n", " ")
        .replace("\\r", " ")
        .replace("\\t", " ")
        .replace("\\\"", "\"");
    flat.split_whitespace().collect::<Vec<_>>().join(" ")
}
