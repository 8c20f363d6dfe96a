use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest description kept on ingestion, in characters.
pub const DESCRIPTION_LIMIT: usize = 500;

/// A fetched page: its text and the URL it came from.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub locator: String,
    pub text: String,
}

impl RawDocument {
    pub fn new(locator: impl Into<String>, text: impl Into<String>) -> Self {
        RawDocument {
            locator: locator.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Query,
    Header,
    Path,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
            ParamLocation::Path => "path",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "query" => Some(ParamLocation::Query),
            "header" | "headers" => Some(ParamLocation::Header),
            "path" => Some(ParamLocation::Path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Map a declared type label ("String", "NUMBER", "int", "ENUM", ...) onto a schema type.
    /// Unknown labels fall back to string.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "int32" | "int64" | "long" => ParamType::Integer,
            "number" | "float" | "double" | "decimal" => ParamType::Number,
            "boolean" | "bool" => ParamType::Boolean,
            "array" | "list" => ParamType::Array,
            "object" | "json" | "map" => ParamType::Object,
            _ => ParamType::String,
        }
    }

    /// Guess a type from one example value: integer, then number, then boolean, else string.
    ///
    /// A single value is ambiguous (`"5"` may be an identifier, `"true"` a literal), so this
    /// misclassifies some string parameters. Callers mark such parameters as sample-derived.
    pub fn infer(value: &str) -> Self {
        let v = value.trim();
        if v.parse::<i64>().is_ok() {
            ParamType::Integer
        } else if v.parse::<f64>().is_ok_and(|f| f.is_finite()) {
            ParamType::Number
        } else if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false") {
            ParamType::Boolean
        } else {
            ParamType::String
        }
    }

    /// `value` as a JSON value of this type; falls back to a string when it does not parse.
    pub fn typed_value(self, value: &str) -> Value {
        let v = value.trim();
        let typed = match self {
            ParamType::Integer => v.parse::<i64>().ok().map(Value::from),
            ParamType::Number => v
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            ParamType::Boolean => match v.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        };
        typed.unwrap_or_else(|| Value::String(value.to_string()))
    }
}

/// Where a parameter descriptor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    /// A parameter record in the provider's serialized state.
    #[default]
    Declared,
    /// A query pair of a displayed sample invocation; required-ness unknown.
    Sample,
    /// A row of the interactively rendered parameter list.
    Rendered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(default)]
    pub source: ParamSource,
}

impl ParameterDescriptor {
    pub fn new(
        name: impl Into<String>,
        location: ParamLocation,
        param_type: ParamType,
        source: ParamSource,
    ) -> Self {
        ParameterDescriptor {
            name: name.into(),
            location,
            required: false,
            param_type,
            description: String::new(),
            default: None,
            enum_values: None,
            example: None,
            source,
        }
    }
}

/// Parameters of one endpoint, partitioned by location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub query: Vec<ParameterDescriptor>,
    pub header: Vec<ParameterDescriptor>,
    pub path: Vec<ParameterDescriptor>,
    /// Example JSON body, when the endpoint takes one.
    pub body: Option<Value>,
    /// Global app configuration shown next to the parameters.
    pub app: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
            && self.header.is_empty()
            && self.path.is_empty()
            && self.body.is_none()
            && self.app.is_empty()
    }

    pub fn len(&self) -> usize {
        self.query.len() + self.header.len() + self.path.len()
    }

    /// Add a parameter under its location. A second parameter with the same
    /// name and location is ignored; returns whether it was added.
    pub fn push(&mut self, param: ParameterDescriptor) -> bool {
        let list = self.list_mut(param.location);
        if list.iter().any(|p| p.name == param.name) {
            return false;
        }
        list.push(param);
        true
    }

    pub fn find(&self, name: &str, location: ParamLocation) -> Option<&ParameterDescriptor> {
        self.list(location).iter().find(|p| p.name == name)
    }

    pub fn find_mut(
        &mut self,
        name: &str,
        location: ParamLocation,
    ) -> Option<&mut ParameterDescriptor> {
        self.list_mut(location).iter_mut().find(|p| p.name == name)
    }

    /// Query, header, then path parameters.
    pub fn iter(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.query.iter().chain(&self.header).chain(&self.path)
    }

    /// Fold `other` in without replacing anything already present.
    pub fn absorb(&mut self, other: ParameterSet) {
        for p in other.query.into_iter().chain(other.header).chain(other.path) {
            self.push(p);
        }
        if self.body.is_none() {
            self.body = other.body;
        }
        for (k, v) in other.app {
            self.app.entry(k).or_insert(v);
        }
    }

    fn list(&self, location: ParamLocation) -> &Vec<ParameterDescriptor> {
        match location {
            ParamLocation::Query => &self.query,
            ParamLocation::Header => &self.header,
            ParamLocation::Path => &self.path,
        }
    }

    fn list_mut(&mut self, location: ParamLocation) -> &mut Vec<ParameterDescriptor> {
        match location {
            ParamLocation::Query => &mut self.query,
            ParamLocation::Header => &mut self.header,
            ParamLocation::Path => &mut self.path,
        }
    }
}

/// Hint about the shape of a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHint {
    pub status: String,
    pub description: String,
    pub schema_type: ParamType,
}

impl ResponseHint {
    pub fn of_type(schema_type: ParamType) -> Self {
        ResponseHint {
            status: "200".to_string(),
            description: "Successful response".to_string(),
            schema_type,
        }
    }

    pub fn generic_object() -> Self {
        Self::of_type(ParamType::Object)
    }
}

/// An endpoint-shaped record recovered from a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEndpoint {
    /// Provider-assigned identifier; distinct ids are distinct operations
    /// even when route and method coincide.
    pub id: String,
    pub route: String,
    pub method: String,
    pub name: String,
    pub description: String,
    pub parameters: Option<ParameterSet>,
    pub responses: Option<ResponseHint>,
}

impl ExtractedEndpoint {
    pub fn new(
        id: impl Into<String>,
        route: impl Into<String>,
        method: &str,
        name: impl Into<String>,
        description: &str,
    ) -> Self {
        ExtractedEndpoint {
            id: id.into(),
            route: route.into(),
            method: method.trim().to_ascii_uppercase(),
            name: name.into(),
            description: cap_chars(description, DESCRIPTION_LIMIT),
            parameters: None,
            responses: None,
        }
    }

    pub fn needs_enrichment(&self) -> bool {
        self.parameters.as_ref().map_or(true, ParameterSet::is_empty) || self.responses.is_none()
    }

    /// Add enrichment results. Existing parameters and hints are kept.
    pub fn enrich_with(&mut self, parameters: Option<ParameterSet>, responses: Option<ResponseHint>) {
        if let Some(found) = parameters.filter(|p| !p.is_empty()) {
            match self.parameters.as_mut() {
                Some(existing) => existing.absorb(found),
                None => self.parameters = Some(found),
            }
        }
        if self.responses.is_none() {
            self.responses = responses;
        }
    }
}

/// Document-level facts recovered next to the endpoint records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMetadata {
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_url: Option<String>,
    pub version: Option<String>,
}

/// Cap `s` at `max` characters, ending with "..." when cut.
pub fn cap_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_precedence() {
        assert_eq!(ParamType::infer("2"), ParamType::Integer);
        assert_eq!(ParamType::infer("-14"), ParamType::Integer);
        assert_eq!(ParamType::infer("2.5"), ParamType::Number);
        assert_eq!(ParamType::infer("true"), ParamType::Boolean);
        assert_eq!(ParamType::infer("FALSE"), ParamType::Boolean);
        assert_eq!(ParamType::infer("nyc"), ParamType::String);
        assert_eq!(ParamType::infer(""), ParamType::String);
        assert_eq!(ParamType::infer("inf"), ParamType::String);
    }

    #[test]
    fn labels_map_to_schema_types() {
        assert_eq!(ParamType::from_label("String"), ParamType::String);
        assert_eq!(ParamType::from_label("NUMBER"), ParamType::Number);
        assert_eq!(ParamType::from_label("Boolean"), ParamType::Boolean);
        assert_eq!(ParamType::from_label("ENUM"), ParamType::String);
        assert_eq!(ParamType::from_label("int"), ParamType::Integer);
    }

    #[test]
    fn method_uppercased_and_description_capped() {
        let long = "x".repeat(800);
        let e = ExtractedEndpoint::new("endpoint_1", "/search", "get", "Search", &long);
        assert_eq!(e.method, "GET");
        assert_eq!(e.description.chars().count(), DESCRIPTION_LIMIT);
        assert!(e.description.ends_with("..."));
    }

    #[test]
    fn parameter_set_dedups_per_location() {
        let mut set = ParameterSet::default();
        let q = ParameterDescriptor::new("page", ParamLocation::Query, ParamType::Integer, ParamSource::Declared);
        let h = ParameterDescriptor::new("page", ParamLocation::Header, ParamType::String, ParamSource::Declared);
        assert!(set.push(q.clone()));
        assert!(!set.push(q));
        assert!(set.push(h));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn enrichment_adds_never_removes() {
        let mut e = ExtractedEndpoint::new("endpoint_1", "/search", "GET", "Search", "");
        let mut first = ParameterSet::default();
        let mut query = ParameterDescriptor::new("query", ParamLocation::Query, ParamType::String, ParamSource::Declared);
        query.required = true;
        first.push(query);
        e.enrich_with(Some(first), None);

        let mut second = ParameterSet::default();
        second.push(ParameterDescriptor::new("query", ParamLocation::Query, ParamType::String, ParamSource::Sample));
        second.push(ParameterDescriptor::new("page", ParamLocation::Query, ParamType::Integer, ParamSource::Sample));
        e.enrich_with(Some(second), Some(ResponseHint::generic_object()));

        let params = e.parameters.as_ref().unwrap();
        assert_eq!(params.len(), 2);
        assert!(params.find("query", ParamLocation::Query).unwrap().required);
        assert_eq!(e.responses, Some(ResponseHint::generic_object()));
        assert!(!e.needs_enrichment());
    }
}
