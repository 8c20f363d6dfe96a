use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::blocks::DecodedBlock;
use super::{clean_text, string_field, structural_braces};
use crate::model::{ApiMetadata, ExtractedEndpoint};

static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""id"\s*:\s*"([^"\\]+)""#).unwrap());
static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]{3,7}$").unwrap());
static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""address"\s*:\s*"([A-Za-z0-9.-]+\.p\.rapidapi\.com)""#).unwrap());
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""version"\s*:\s*\{[^{}]*?"name"\s*:\s*"([^"\\]+)""#).unwrap()
});

/// Endpoint candidates plus whatever document-level facts were found next to them.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub endpoints: Vec<ExtractedEndpoint>,
    pub metadata: ApiMetadata,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Scan every block for endpoint records, keyed on their `"id"` field.
///
/// Candidates keep first-appearance order and are unique by id; records
/// without a route or method are dropped. An empty result means "no data".
pub fn extract(blocks: &[DecodedBlock]) -> Extraction {
    let mut seen: HashSet<String> = HashSet::new();
    let mut endpoints = Vec::new();
    let mut metadata = ApiMetadata::default();
    let mut described = false;

    for block in blocks {
        let (found, first_record) = scan_block(&block.text);
        if !found.is_empty() && !described {
            if let Some(start) = first_record {
                describe_api(&block.text[..start], &mut metadata);
            }
            described = true;
        }
        for endpoint in found {
            if seen.insert(endpoint.id.clone()) {
                endpoints.push(endpoint);
            }
        }

        if metadata.base_url.is_none() {
            metadata.base_url = ADDRESS_RE
                .captures(&block.text)
                .map(|c| format!("https://{}", &c[1]));
        }
        if metadata.version.is_none() {
            metadata.version = VERSION_RE.captures(&block.text).map(|c| c[1].to_string());
        }
    }

    debug!(blocks = blocks.len(), candidates = endpoints.len(), "endpoint scan finished");
    Extraction { endpoints, metadata }
}

/// Endpoint records of one block, and where the first of them starts.
fn scan_block(text: &str) -> (Vec<ExtractedEndpoint>, Option<usize>) {
    let ids: Vec<_> = ID_RE.captures_iter(text).collect();
    let mut found = Vec::new();
    let mut first_record = None;
    let mut floor = 0;

    for (i, caps) in ids.iter().enumerate() {
        let Some(whole) = caps.get(0) else { continue };
        let ceiling = ids
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());

        let start = structural_braces(&text[floor..whole.start()])
            .into_iter()
            .filter(|&(_, b)| b == b'{')
            .last()
            .map_or(whole.start(), |(pos, _)| floor + pos);
        let end = structural_braces(&text[whole.end()..ceiling])
            .first()
            .map_or(ceiling, |&(pos, _)| whole.end() + pos);
        floor = whole.end();

        if let Some(endpoint) = parse_record(&caps[1], &text[start..end]) {
            first_record.get_or_insert(start);
            found.push(endpoint);
        }
    }

    (found, first_record)
}

fn parse_record(id: &str, window: &str) -> Option<ExtractedEndpoint> {
    let route = string_field(window, "route").map(str::trim).filter(|r| !r.is_empty())?;
    let method = string_field(window, "method")
        .map(str::trim)
        .filter(|m| METHOD_RE.is_match(m))?;

    let name = string_field(window, "name")
        .map(clean_text)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("{} {}", method.to_ascii_uppercase(), route));
    let description = string_field(window, "description")
        .map(clean_text)
        .unwrap_or_default();

    Some(ExtractedEndpoint::new(id, route, method, name, &description))
}

/// API name and description are the first such fields ahead of the endpoint list.
fn describe_api(prefix: &str, metadata: &mut ApiMetadata) {
    metadata.name = string_field(prefix, "name")
        .map(clean_text)
        .filter(|s| !s.is_empty());
    metadata.description = string_field(prefix, "description")
        .map(clean_text)
        .filter(|s| !s.is_empty());
}
