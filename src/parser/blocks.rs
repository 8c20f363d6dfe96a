use std::sync::LazyLock;

use regex::Regex;

use crate::model::RawDocument;

// self.__next_f.push([1,"...escaped payload..."])
static CHUNK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)self\.__next_f\.push\(\[\s*\d+\s*,\s*"((?:[^"\\]|\\.)*)"\s*\]\)"#).unwrap()
});

/// One un-escaped payload of a streamed state chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    /// Position among the recovered chunks, in document order.
    pub index: usize,
    pub text: String,
}

impl DecodedBlock {
    pub fn mentions_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.text.contains(n))
    }
}

pub fn decode_document(doc: &RawDocument) -> Vec<DecodedBlock> {
    decode(&doc.text)
}

/// Recover every chunk payload in `text`. Anything that does not match the
/// chunk envelope is skipped; no chunks at all yields an empty vec.
pub fn decode(text: &str) -> Vec<DecodedBlock> {
    CHUNK_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| unescape(m.as_str()))
        .filter(|s| !s.trim().is_empty())
        .enumerate()
        .map(|(index, text)| DecodedBlock { index, text })
        .collect()
}

/// Reverse the quote and backslash escaping of a chunk payload in one pass.
/// Other escape sequences are left as they are.
pub fn unescape(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());
    let mut chars = payload.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
