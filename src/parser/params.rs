use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::blocks::DecodedBlock;
use super::{clean_text, string_field};
use crate::model::{
    cap_chars, ParamLocation, ParamSource, ParamType, ParameterDescriptor, ParameterSet,
    ResponseHint, DESCRIPTION_LIMIT,
};

/// Blocks without any of these cannot hold parameter records.
const PARAM_MARKERS: &[&str] = &[
    "\"required\"",
    "\"schema\"",
    "endpointData",
    "queryParams",
    "headerParams",
    "pathParams",
];
const RESPONSE_MARKERS: &[&str] = &["\"responses\"", "\"schema\""];
const MAX_NAME_LEN: usize = 50;

/// Object body without nested objects; braces inside string literals are allowed.
const FLAT_BODY: &str = r#"(?:"(?:[^"\\]|\\.)*"|[^{}"])*"#;

static SCHEMA_RECORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"\{{({FLAT_BODY}?)"schema"\s*:\s*\{{({FLAT_BODY})\}}({FLAT_BODY})\}}"#
    ))
    .unwrap()
});
static FLAT_RECORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\{{({FLAT_BODY})\}}")).unwrap());
static REQUIRED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""required"\s*:\s*(true|false)"#).unwrap());
static SCALAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(default|example)"\s*:\s*("(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?|true|false)"#).unwrap()
});
static ENUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""enum"\s*:\s*\[([^\[\]]*)\]"#).unwrap());
static ARRAY_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(query|header|path)Params"\s*:"#).unwrap());
static CURL_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"--url\s+(?:'([^']+)'|"([^"]+)"|(https?://\S+))"#).unwrap()
});
static RESPONSE_SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\s*"type"\s*:\s*"(\w+)"[^{}]*?"properties"\s*:\s*\{"#).unwrap()
});

/// Parameter records declared in the provider's serialized state.
pub fn declared_parameters(blocks: &[DecodedBlock]) -> ParameterSet {
    let mut set = ParameterSet::default();
    for block in blocks.iter().filter(|b| b.mentions_any(PARAM_MARKERS)) {
        for param in block_records(&block.text) {
            set.push(param);
        }
    }
    set
}

fn block_records(text: &str) -> Vec<ParameterDescriptor> {
    let mut records: Vec<(usize, ParameterDescriptor)> = Vec::new();
    let mut schema_spans = Vec::new();

    for caps in SCHEMA_RECORD_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        schema_spans.push(whole.range());
        let outer = format!("{}{}", &caps[1], &caps[3]);
        if let Some(p) = build_record(text, whole.start(), &outer, Some(&caps[2])) {
            records.push((whole.start(), p));
        }
    }

    for caps in FLAT_RECORD_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if schema_spans.iter().any(|s| s.contains(&whole.start())) {
            continue;
        }
        if let Some(p) = build_record(text, whole.start(), &caps[1], None) {
            records.push((whole.start(), p));
        }
    }

    records.sort_by_key(|(pos, _)| *pos);
    records.into_iter().map(|(_, p)| p).collect()
}

/// A record needs a name and at least a type or a required flag.
fn build_record(
    text: &str,
    at: usize,
    body: &str,
    schema: Option<&str>,
) -> Option<ParameterDescriptor> {
    let name = string_field(body, "name").map(clean_text)?;
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return None;
    }

    let typed = schema.unwrap_or(body);
    let type_label = string_field(typed, "type");
    let required = REQUIRED_RE.captures(body).map(|c| &c[1] == "true");
    if type_label.is_none() && required.is_none() {
        return None;
    }

    let location = string_field(body, "in")
        .and_then(ParamLocation::parse)
        .or_else(|| enclosing_array(&text[..at]))
        .unwrap_or(ParamLocation::Query);

    let mut param = ParameterDescriptor::new(
        name,
        location,
        type_label.map_or(ParamType::String, ParamType::from_label),
        ParamSource::Declared,
    );
    param.required = required.unwrap_or(false);
    param.description = string_field(body, "description")
        .map(|d| cap_chars(&clean_text(d), DESCRIPTION_LIMIT))
        .unwrap_or_default();

    for source in [typed, body] {
        for caps in SCALAR_RE.captures_iter(source) {
            let value = scalar(&caps[2]);
            match &caps[1] {
                "default" if param.default.is_none() => param.default = Some(value),
                "example" if param.example.is_none() => param.example = Some(value),
                _ => {}
            }
        }
        if param.enum_values.is_none() {
            param.enum_values = ENUM_RE.captures(source).map(|c| enum_values(&c[1]));
        }
    }

    Some(param)
}

/// Location implied by the nearest `queryParams`/`headerParams`/`pathParams` key before `prefix` ends.
fn enclosing_array(prefix: &str) -> Option<ParamLocation> {
    ARRAY_KEY_RE
        .captures_iter(prefix)
        .last()
        .and_then(|c| ParamLocation::parse(&c[1]))
}

fn scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v) => v,
        Err(_) => Value::String(clean_text(raw.trim_matches('"'))),
    }
}

fn enum_values(inner: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<Value>>(&format!("[{}]", inner)) {
        Ok(values) => values
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Err(_) => inner
            .split(',')
            .map(|s| s.trim().trim_matches('"').to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

/// URL of the displayed `curl` sample, looked up in the blocks first and then in the raw page.
pub fn sample_invocation(blocks: &[DecodedBlock], raw: &str) -> Option<String> {
    blocks
        .iter()
        .find_map(|b| curl_url(&b.text))
        .or_else(|| curl_url(raw))
}

fn curl_url(text: &str) -> Option<String> {
    let caps = CURL_URL_RE.captures(text)?;
    let url = caps.get(1).or(caps.get(2)).or(caps.get(3))?.as_str();
    let url = url.split('\\').next().unwrap_or(url);
    Some(url.replace("&amp;", "&"))
}

/// One query parameter per pair of the sample's query string.
///
/// A sample cannot tell whether a parameter is required, so every one is
/// optional and carries an "Example value" placeholder description.
pub fn sample_parameters(url: &str) -> Vec<ParameterDescriptor> {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return Vec::new();
    };

    let mut params: Vec<ParameterDescriptor> = Vec::new();
    for (key, value) in parsed.query_pairs() {
        if key.is_empty() || params.iter().any(|p| p.name == key) {
            continue;
        }
        let mut p = ParameterDescriptor::new(
            key.as_ref(),
            ParamLocation::Query,
            ParamType::infer(&value),
            ParamSource::Sample,
        );
        p.description = format!("Example value: {}", value);
        p.example = Some(p.param_type.typed_value(&value));
        params.push(p);
    }
    params
}

/// A typed response schema with properties, if the detail view carries one.
pub fn response_hint(blocks: &[DecodedBlock]) -> Option<ResponseHint> {
    blocks
        .iter()
        .filter(|b| b.mentions_any(RESPONSE_MARKERS))
        .find_map(|b| RESPONSE_SHAPE_RE.captures(&b.text))
        .map(|c| ResponseHint::of_type(ParamType::from_label(&c[1])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::blocks::decode;

    fn block(text: &str) -> DecodedBlock {
        DecodedBlock { index: 0, text: text.to_string() }
    }

    #[test]
    fn schema_style_record() {
        let b = block(
            r#"{"parameters":[{"name":"country","in":"query","required":true,"description":"ISO code","schema":{"type":"string","enum":["us","de"],"default":"us"}}]}"#,
        );
        let set = declared_parameters(&[b]);
        let p = set.find("country", ParamLocation::Query).unwrap();
        assert!(p.required);
        assert_eq!(p.param_type, ParamType::String);
        assert_eq!(p.description, "ISO code");
        assert_eq!(p.enum_values.as_deref(), Some(&["us".to_string(), "de".to_string()][..]));
        assert_eq!(p.default, Some(Value::String("us".into())));
        assert_eq!(p.source, ParamSource::Declared);
    }

    #[test]
    fn flat_record_location_from_array_key() {
        let b = block(concat!(
            r#"{"endpointData":{"queryParams":[{"name":"page","type":"NUMBER","required":false,"default":1}],"#,
            r#""headerParams":[{"name":"X-Trace","type":"STRING","required":true}]}}"#,
        ));
        let set = declared_parameters(&[b]);
        let page = set.find("page", ParamLocation::Query).unwrap();
        assert_eq!(page.param_type, ParamType::Number);
        assert_eq!(page.default, Some(serde_json::json!(1)));
        assert!(set.find("X-Trace", ParamLocation::Header).unwrap().required);
    }

    #[test]
    fn braces_in_descriptions_keep_the_record() {
        let b = block(concat!(
            r#"{"parameters":[{"name":"city","in":"query","required":true,"description":"Use {city} slugs","schema":{"type":"string","example":"a{b}"}}],"#,
            r#""endpointData":{"queryParams":[{"name":"tpl","type":"STRING","required":false,"description":"Like {x}"}]}}"#,
        ));
        let set = declared_parameters(&[b]);
        let city = set.find("city", ParamLocation::Query).unwrap();
        assert!(city.required);
        assert_eq!(city.description, "Use {city} slugs");
        assert_eq!(city.example, Some(Value::String("a{b}".into())));
        let tpl = set.find("tpl", ParamLocation::Query).unwrap();
        assert_eq!(tpl.description, "Like {x}");
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn record_without_type_or_required_is_discarded() {
        let b = block(r#"{"required":[],"group":{"name":"Jobs"},"owner":{"name":"acme"}}"#);
        assert!(declared_parameters(&[b]).is_empty());
    }

    #[test]
    fn unmarked_blocks_are_ignored() {
        let b = block(r#"{"name":"page","type":"NUMBER"}"#);
        assert!(declared_parameters(&[b]).is_empty());
    }

    #[test]
    fn sample_query_pairs_infer_types() {
        let params = sample_parameters("https://jobs.p.rapidapi.com/search?page=2&active=true");
        assert_eq!(params.len(), 2);

        assert_eq!(params[0].name, "page");
        assert_eq!(params[0].param_type, ParamType::Integer);
        assert!(!params[0].required);
        assert_eq!(params[0].description, "Example value: 2");
        assert_eq!(params[0].example, Some(serde_json::json!(2)));
        assert_eq!(params[0].source, ParamSource::Sample);

        assert_eq!(params[1].name, "active");
        assert_eq!(params[1].param_type, ParamType::Boolean);
        assert!(!params[1].required);
        assert_eq!(params[1].example, Some(serde_json::json!(true)));
    }

    #[test]
    fn sample_examples_match_inferred_type() {
        let params = sample_parameters("https://a.p.rapidapi.com/s?ratio=0.5&q=rust+jobs&live=False");
        let examples: Vec<_> = params.iter().map(|p| p.example.clone().unwrap()).collect();
        assert_eq!(
            examples,
            [serde_json::json!(0.5), serde_json::json!("rust jobs"), serde_json::json!(false)]
        );
    }

    #[test]
    fn curl_url_forms() {
        let quoted = block(r"curl --request GET \n\t--url 'https://a.p.rapidapi.com/s?q=rust&amp;page=1' \n\t--header 'x'");
        assert_eq!(
            sample_invocation(&[quoted], "").as_deref(),
            Some("https://a.p.rapidapi.com/s?q=rust&page=1")
        );
        let bare = block(r"curl --url https://a.p.rapidapi.com/s?limit=5\n--header");
        assert_eq!(
            sample_invocation(&[bare], "").as_deref(),
            Some("https://a.p.rapidapi.com/s?limit=5")
        );
        let raw = r#"<pre>curl --url "https://a.p.rapidapi.com/t?x=1"</pre>"#;
        assert_eq!(sample_invocation(&[], raw).as_deref(), Some("https://a.p.rapidapi.com/t?x=1"));
        assert_eq!(sample_invocation(&[], "<p>no sample</p>"), None);
    }

    #[test]
    fn response_hint_needs_properties() {
        let with = block(r#"{"responses":{"200":{"schema":{"type":"object","properties":{"data":{"type":"array"}}}}}}"#);
        assert_eq!(response_hint(&[with]), Some(ResponseHint::of_type(ParamType::Object)));
        let without = block(r#"{"schema":{"type":"string"}}"#);
        assert_eq!(response_hint(&[without]), None);
    }

    #[test]
    fn detail_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/endpoint_detail.html").unwrap();
        let blocks = decode(&html);
        let set = declared_parameters(&blocks);

        let query = set.find("query", ParamLocation::Query).unwrap();
        assert!(query.required);
        assert_eq!(query.description, "Free-form search text");
        let remote = set.find("remote_only", ParamLocation::Query).unwrap();
        assert_eq!(remote.param_type, ParamType::Boolean);
        assert!(!remote.required);
        assert!(set.find("X-Request-Id", ParamLocation::Header).is_some());
        let page = set.find("page", ParamLocation::Query).unwrap();
        assert_eq!(page.param_type, ParamType::Integer);
        assert_eq!(page.default, Some(serde_json::json!(1)));
        assert_eq!(response_hint(&blocks), Some(ResponseHint::of_type(ParamType::Object)));

        let url = sample_invocation(&blocks, &html).unwrap();
        let sample = sample_parameters(&url);
        let names: Vec<_> = sample.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["query", "page", "num_pages"]);
    }
}
