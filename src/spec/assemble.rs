use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use super::{default_info, responses_for, CanonicalApiSpec, Info, Operation, Parameter, PathItem, RequestBody, Schema};
use crate::locator::ApiLocator;
use crate::model::{ApiMetadata, ExtractedEndpoint, ParamLocation, ParamType, ParameterDescriptor};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^{}/]+)\}").unwrap());

const ALT_SUFFIX_LEN: usize = 8;

/// Merge every candidate into one spec.
///
/// Candidates are placed in input order. A candidate whose route and verb are
/// already taken is kept under an `x-<verb>-<id suffix>` key instead of
/// replacing the earlier one.
pub fn assemble(
    locator: &ApiLocator,
    metadata: &ApiMetadata,
    endpoints: &[ExtractedEndpoint],
) -> CanonicalApiSpec {
    let server = metadata
        .base_url
        .clone()
        .unwrap_or_else(|| locator.default_server());
    let mut spec = CanonicalApiSpec::skeleton(info_for(locator, metadata), server);
    let mut taken_ids: HashSet<String> = HashSet::new();

    for endpoint in endpoints {
        let operation_id = unique_operation_id(&endpoint.name, &mut taken_ids);
        let operation = build_operation(endpoint, operation_id);
        let item = spec.paths.entry(endpoint.route.clone()).or_default();
        let key = operation_key(item, endpoint);
        if key != endpoint.method.to_ascii_lowercase() {
            debug!(
                route = %endpoint.route,
                endpoint_id = %endpoint.id,
                key = %key,
                "route and method already taken, using alternate key"
            );
        }
        item.insert(key, operation);
    }

    info!(
        api = %locator.api_name,
        routes = spec.paths.len(),
        operations = spec.operation_count(),
        "spec assembled"
    );
    spec
}

fn info_for(locator: &ApiLocator, metadata: &ApiMetadata) -> Info {
    let defaults = default_info(locator);
    Info {
        title: metadata.name.clone().unwrap_or(defaults.title),
        description: metadata.description.clone().unwrap_or(defaults.description),
        version: metadata.version.clone().unwrap_or(defaults.version),
    }
}

/// `Job Search` -> `job_search`; taken ids get `_1`, `_2`, ...
pub fn unique_operation_id(name: &str, taken: &mut HashSet<String>) -> String {
    let base = operation_id_base(name);
    let mut candidate = base.clone();
    let mut n = 1;
    while taken.contains(&candidate) {
        candidate = format!("{}_{}", base, n);
        n += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

fn operation_id_base(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            id.push(c);
        } else if !id.is_empty() && !id.ends_with('_') {
            id.push('_');
        }
    }
    let id = id.trim_end_matches('_');
    if id.is_empty() {
        "operation".to_string()
    } else {
        id.to_string()
    }
}

/// The lower-cased verb, or an alternate key when a sibling already holds it.
fn operation_key(item: &PathItem, endpoint: &ExtractedEndpoint) -> String {
    let verb = endpoint.method.to_ascii_lowercase();
    if !item.contains_key(&verb) {
        return verb;
    }
    let alt = format!("x-{}-{}", verb, id_suffix(&endpoint.id));
    if !item.contains_key(&alt) {
        return alt;
    }
    let mut n = 2;
    loop {
        let key = format!("{}-{}", alt, n);
        if !item.contains_key(&key) {
            return key;
        }
        n += 1;
    }
}

/// Last `_`-separated segment of the id, at most eight characters.
fn id_suffix(id: &str) -> String {
    let tail = id.rsplit('_').next().unwrap_or(id);
    let suffix: String = tail.chars().take(ALT_SUFFIX_LEN).collect();
    if suffix.is_empty() {
        "alt".to_string()
    } else {
        suffix
    }
}

fn build_operation(endpoint: &ExtractedEndpoint, operation_id: String) -> Operation {
    let mut parameters: Vec<Parameter> = endpoint
        .parameters
        .iter()
        .flat_map(|set| set.iter())
        .map(normalize)
        .collect();
    bind_path_placeholders(&endpoint.route, &mut parameters);

    let description = if endpoint.description.is_empty() {
        endpoint.name.clone()
    } else {
        endpoint.description.clone()
    };

    Operation {
        summary: endpoint.name.clone(),
        description,
        operation_id,
        parameters,
        responses: responses_for(endpoint.responses.as_ref()),
        request_body: endpoint
            .parameters
            .as_ref()
            .and_then(|set| set.body.clone())
            .map(RequestBody::json_example),
        app: endpoint
            .parameters
            .as_ref()
            .map(|set| set.app.clone())
            .unwrap_or_default(),
        endpoint_id: Some(endpoint.id.clone()),
    }
}

/// One uniform parameter shape whichever strategy produced the descriptor.
fn normalize(p: &ParameterDescriptor) -> Parameter {
    Parameter {
        name: p.name.clone(),
        location: p.location,
        required: p.required || p.location == ParamLocation::Path,
        description: p.description.clone(),
        schema: Schema {
            schema_type: p.param_type,
            default: p.default.clone(),
            enum_values: p.enum_values.clone(),
            example: None,
        },
        example: p.example.clone(),
    }
}

/// Every `{name}` in the route becomes a required path parameter. A query
/// parameter of the same name is moved to the path unless one is already
/// declared there; headers are never moved.
fn bind_path_placeholders(route: &str, parameters: &mut Vec<Parameter>) {
    for caps in PLACEHOLDER_RE.captures_iter(route) {
        let name = caps[1].trim();
        if let Some(p) = parameters
            .iter_mut()
            .find(|p| p.name == name && p.location == ParamLocation::Path)
        {
            p.required = true;
            continue;
        }
        match parameters
            .iter_mut()
            .find(|p| p.name == name && p.location != ParamLocation::Header)
        {
            Some(p) => {
                p.location = ParamLocation::Path;
                p.required = true;
            }
            None => parameters.push(Parameter {
                name: name.to_string(),
                location: ParamLocation::Path,
                required: true,
                description: format!("Path parameter {}", name),
                schema: Schema::of_type(ParamType::String),
                example: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParamSource, ParameterSet, ResponseHint};
    use serde_json::json;

    fn locator() -> ApiLocator {
        ApiLocator::parse("https://rapidapi.com/letscrape/api/jobs-api").unwrap()
    }

    fn endpoint(id: &str, route: &str, method: &str, name: &str) -> ExtractedEndpoint {
        ExtractedEndpoint::new(id, route, method, name, "")
    }

    #[test]
    fn single_candidate() {
        let mut e = endpoint("endpoint_abc", "/search", "GET", "Job Search");
        e.description = "Search jobs".to_string();
        let spec = assemble(&locator(), &ApiMetadata::default(), &[e]);

        let op = spec.operation("/search", "get").unwrap();
        assert_eq!(op.operation_id, "job_search");
        assert_eq!(op.summary, "Job Search");
        assert_eq!(op.description, "Search jobs");
        assert_eq!(op.endpoint_id.as_deref(), Some("endpoint_abc"));
        assert_eq!(spec.info.title, "Jobs Api");
        assert_eq!(spec.server_url(), Some("https://jobs-api.p.rapidapi.com"));
    }

    #[test]
    fn collision_keeps_both() {
        let spec = assemble(
            &locator(),
            &ApiMetadata::default(),
            &[
                endpoint("endpoint_1", "/search", "GET", "Search"),
                endpoint("endpoint_2", "/search", "GET", "Search"),
            ],
        );
        assert_eq!(spec.operation_count(), 2);
        assert_eq!(spec.operation("/search", "get").unwrap().operation_id, "search");
        let alt = spec.operation("/search", "x-get-2").unwrap();
        assert_eq!(alt.operation_id, "search_1");
        assert_eq!(alt.endpoint_id.as_deref(), Some("endpoint_2"));
    }

    #[test]
    fn repeated_collision_suffixes() {
        let spec = assemble(
            &locator(),
            &ApiMetadata::default(),
            &[
                endpoint("endpoint_9f3e2a1b7c", "/jobs", "POST", "Create"),
                endpoint("a_9f3e2a1bzz", "/jobs", "POST", "Create"),
                endpoint("b_9f3e2a1bqq", "/jobs", "POST", "Create"),
                endpoint("c_9f3e2a1bxx", "/jobs", "post", "Create"),
            ],
        );
        let item = &spec.paths["/jobs"];
        let keys: Vec<_> = item.keys().map(String::as_str).collect();
        assert_eq!(keys, ["post", "x-post-9f3e2a1b", "x-post-9f3e2a1b-2", "x-post-9f3e2a1b-3"]);
        let mut ids = spec.operation_ids();
        ids.sort();
        assert_eq!(ids, ["create", "create_1", "create_2", "create_3"]);
    }

    #[test]
    fn operation_ids_are_unique_and_stable() {
        let endpoints = vec![
            endpoint("endpoint_1", "/a", "GET", "List Items"),
            endpoint("endpoint_2", "/b", "GET", "list-items"),
            endpoint("endpoint_3", "/c", "GET", "List  Items!"),
            endpoint("endpoint_4", "/d", "GET", "  "),
        ];
        let first = assemble(&locator(), &ApiMetadata::default(), &endpoints);
        let second = assemble(&locator(), &ApiMetadata::default(), &endpoints);

        let mut ids = first.operation_ids();
        ids.sort();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(ids, ["list_items", "list_items_1", "list_items_2", "operation"]);
        assert_eq!(first, second);
    }

    #[test]
    fn bare_candidate_gets_generic_response() {
        let spec = assemble(&locator(), &ApiMetadata::default(), &[endpoint("endpoint_1", "/x", "GET", "X")]);
        let op = spec.operation("/x", "get").unwrap();
        assert!(op.parameters.is_empty());
        let v = serde_json::to_value(&op.responses).unwrap();
        assert_eq!(v["200"]["content"]["application/json"]["schema"]["type"], "object");
        assert!(op.request_body.is_none());
    }

    #[test]
    fn parameters_body_and_placeholders() {
        let mut set = ParameterSet::default();
        let mut q = ParameterDescriptor::new("q", ParamLocation::Query, ParamType::String, ParamSource::Sample);
        q.example = Some(json!("rust"));
        q.description = "Example value: rust".to_string();
        set.push(q);
        set.push(ParameterDescriptor::new("user_id", ParamLocation::Query, ParamType::Integer, ParamSource::Rendered));
        set.body = Some(json!({"title": "x"}));
        set.app.insert("Request URL".to_string(), "rapidapi.com".to_string());

        let mut e = endpoint("endpoint_1", "/users/{user_id}/jobs/{job_id}", "POST", "Post Job");
        e.enrich_with(Some(set), Some(ResponseHint::of_type(ParamType::Array)));
        let spec = assemble(&locator(), &ApiMetadata::default(), &[e]);
        let op = spec.operation("/users/{user_id}/jobs/{job_id}", "post").unwrap();

        let v = serde_json::to_value(op).unwrap();
        assert_eq!(
            v["parameters"][0],
            json!({"name": "q", "in": "query", "required": false,
                   "description": "Example value: rust", "schema": {"type": "string"}, "example": "rust"})
        );
        assert_eq!(v["parameters"][1]["in"], "path");
        assert_eq!(v["parameters"][1]["required"], true);
        assert_eq!(v["parameters"][1]["schema"]["type"], "integer");
        assert_eq!(v["parameters"][2]["name"], "job_id");
        assert_eq!(v["parameters"][2]["schema"]["type"], "string");
        assert_eq!(v["requestBody"]["content"]["application/json"]["schema"]["example"], json!({"title": "x"}));
        assert_eq!(v["x-rapidapi-app"]["Request URL"], "rapidapi.com");
        assert_eq!(v["responses"]["200"]["content"]["application/json"]["schema"]["type"], "array");
    }

    #[test]
    fn placeholders_declare_one_path_parameter_each() {
        let mut set = ParameterSet::default();
        set.push(ParameterDescriptor::new("user_id", ParamLocation::Header, ParamType::String, ParamSource::Declared));
        set.push(ParameterDescriptor::new("id", ParamLocation::Query, ParamType::String, ParamSource::Sample));
        set.push(ParameterDescriptor::new("id", ParamLocation::Path, ParamType::Integer, ParamSource::Declared));

        let mut e = endpoint("endpoint_1", "/users/{user_id}/items/{id}", "GET", "Item");
        e.enrich_with(Some(set), None);
        let spec = assemble(&locator(), &ApiMetadata::default(), &[e]);
        let op = spec.operation("/users/{user_id}/items/{id}", "get").unwrap();

        let mut placed: Vec<_> = op
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p.location, p.required))
            .collect();
        placed.sort();
        assert_eq!(
            placed,
            [
                ("id", ParamLocation::Query, false),
                ("id", ParamLocation::Path, true),
                ("user_id", ParamLocation::Header, false),
                ("user_id", ParamLocation::Path, true),
            ]
        );
    }

    #[test]
    fn metadata_overrides_defaults() {
        let metadata = ApiMetadata {
            name: Some("Job Search".to_string()),
            description: Some("Fast job listings".to_string()),
            base_url: Some("https://jsearch.p.rapidapi.com".to_string()),
            version: Some("v2".to_string()),
        };
        let spec = assemble(&locator(), &metadata, &[endpoint("endpoint_1", "/x", "GET", "X")]);
        assert_eq!(spec.info.title, "Job Search");
        assert_eq!(spec.info.description, "Fast job listings");
        assert_eq!(spec.info.version, "v2");
        assert_eq!(spec.server_url(), Some("https://jsearch.p.rapidapi.com"));
    }
}
