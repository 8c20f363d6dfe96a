pub mod assemble;
pub mod fallback;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::locator::ApiLocator;
use crate::model::{ParamLocation, ParamType, ResponseHint};

pub use assemble::assemble;
pub use fallback::fallback;

pub const OPENAPI_VERSION: &str = "3.0.0";
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Operations of one route, keyed by lower-cased verb or a collision key.
pub type PathItem = BTreeMap<String, Operation>;

/// The assembled, OpenAPI-3-shaped description of one API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalApiSpec {
    pub openapi: String,
    pub info: Info,
    pub servers: Vec<Server>,
    pub paths: BTreeMap<String, PathItem>,
    pub components: Components,
    pub security: Vec<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub description: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub summary: String,
    pub description: String,
    #[serde(rename = "operationId")]
    pub operation_id: String,
    pub parameters: Vec<Parameter>,
    pub responses: BTreeMap<String, Response>,
    #[serde(rename = "requestBody", default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    #[serde(rename = "x-rapidapi-app", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub app: BTreeMap<String, String>,
    #[serde(rename = "x-rapidapi-endpoint-id", default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParamLocation,
    pub required: bool,
    pub description: String,
    pub schema: Schema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

impl Schema {
    pub fn of_type(schema_type: ParamType) -> Self {
        Schema {
            schema_type,
            default: None,
            enum_values: None,
            example: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub description: String,
    pub content: BTreeMap<String, MediaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    pub required: bool,
    pub content: BTreeMap<String, MediaType>,
}

impl RequestBody {
    /// JSON object body carrying `example` as its example payload.
    pub fn json_example(example: Value) -> Self {
        let mut schema = Schema::of_type(ParamType::Object);
        schema.example = Some(example);
        RequestBody {
            required: true,
            content: BTreeMap::from([(JSON_MEDIA_TYPE.to_string(), MediaType { schema })]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Components {
    #[serde(rename = "securitySchemes")]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub scheme_type: String,
    #[serde(rename = "in")]
    pub location: String,
    pub name: String,
}

impl SecurityScheme {
    fn api_key_header(name: &str) -> Self {
        SecurityScheme {
            scheme_type: "apiKey".to_string(),
            location: "header".to_string(),
            name: name.to_string(),
        }
    }
}

/// `{"200": {...}}` built from a hint, or the generic object shape without one.
pub fn responses_for(hint: Option<&ResponseHint>) -> BTreeMap<String, Response> {
    let hint = hint.cloned().unwrap_or_else(ResponseHint::generic_object);
    let response = Response {
        description: hint.description,
        content: BTreeMap::from([(
            JSON_MEDIA_TYPE.to_string(),
            MediaType {
                schema: Schema::of_type(hint.schema_type),
            },
        )]),
    };
    BTreeMap::from([(hint.status, response)])
}

impl CanonicalApiSpec {
    /// A spec with no paths yet, carrying the two RapidAPI key headers.
    pub fn skeleton(info: Info, server_url: String) -> Self {
        let security_schemes = BTreeMap::from([
            ("RapidAPIKey".to_string(), SecurityScheme::api_key_header("X-RapidAPI-Key")),
            ("RapidAPIHost".to_string(), SecurityScheme::api_key_header("X-RapidAPI-Host")),
        ]);
        CanonicalApiSpec {
            openapi: OPENAPI_VERSION.to_string(),
            info,
            servers: vec![Server { url: server_url }],
            paths: BTreeMap::new(),
            components: Components { security_schemes },
            security: vec![
                BTreeMap::from([("RapidAPIKey".to_string(), Vec::new())]),
                BTreeMap::from([("RapidAPIHost".to_string(), Vec::new())]),
            ],
        }
    }

    pub fn operation(&self, route: &str, key: &str) -> Option<&Operation> {
        self.paths.get(route).and_then(|item| item.get(key))
    }

    /// Every (route, key, operation), routes in order.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &str, &Operation)> {
        self.paths.iter().flat_map(|(route, item)| {
            item.iter()
                .map(move |(key, op)| (route.as_str(), key.as_str(), op))
        })
    }

    pub fn operation_count(&self) -> usize {
        self.paths.values().map(|item| item.len()).sum()
    }

    pub fn operation_ids(&self) -> Vec<&str> {
        self.operations().map(|(_, _, op)| op.operation_id.as_str()).collect()
    }

    pub fn server_url(&self) -> Option<&str> {
        self.servers.first().map(|s| s.url.as_str())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Title, description and version derived from the listing URL alone.
pub fn default_info(locator: &ApiLocator) -> Info {
    Info {
        title: locator.display_title(),
        description: format!("RapidAPI: {}/{}", locator.provider, locator.api_name),
        version: "1.0.0".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn skeleton_shape() {
        let loc = ApiLocator::parse("https://rapidapi.com/acme/api/job-search").unwrap();
        let spec = CanonicalApiSpec::skeleton(default_info(&loc), loc.default_server());
        let v = serde_json::to_value(&spec).unwrap();

        assert_eq!(v["openapi"], "3.0.0");
        assert_eq!(v["info"]["title"], "Job Search");
        assert_eq!(v["info"]["description"], "RapidAPI: acme/job-search");
        assert_eq!(v["servers"][0]["url"], "https://job-search.p.rapidapi.com");
        assert_eq!(
            v["components"]["securitySchemes"]["RapidAPIKey"],
            json!({"type": "apiKey", "in": "header", "name": "X-RapidAPI-Key"})
        );
        assert_eq!(v["security"], json!([{"RapidAPIKey": []}, {"RapidAPIHost": []}]));
        assert_eq!(spec.operation_count(), 0);
    }

    #[test]
    fn generic_response() {
        let v = serde_json::to_value(responses_for(None)).unwrap();
        assert_eq!(
            v,
            json!({"200": {"description": "Successful response",
                           "content": {"application/json": {"schema": {"type": "object"}}}}})
        );
    }

    #[test]
    fn json_body() {
        let v = serde_json::to_value(RequestBody::json_example(json!({"a": 1}))).unwrap();
        assert_eq!(
            v,
            json!({"required": true,
                   "content": {"application/json": {"schema": {"type": "object", "example": {"a": 1}}}}})
        );
    }
}
