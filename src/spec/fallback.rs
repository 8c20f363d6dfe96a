use std::collections::BTreeMap;

use tracing::warn;

use super::{default_info, responses_for, CanonicalApiSpec, Operation, Parameter, Schema};
use crate::locator::ApiLocator;
use crate::model::{ParamLocation, ParamType};

pub const FALLBACK_ROUTE: &str = "/endpoint";

/// A minimal but complete spec for a page nothing could be recovered from.
pub fn fallback(locator: &ApiLocator) -> CanonicalApiSpec {
    warn!(url = %locator.url, "no endpoints recovered, emitting placeholder spec");

    let operation = Operation {
        summary: "API Endpoint".to_string(),
        description: format!("Placeholder endpoint for {}", locator.display_title()),
        operation_id: "api_endpoint".to_string(),
        parameters: vec![Parameter {
            name: "param".to_string(),
            location: ParamLocation::Query,
            required: false,
            description: "Example parameter".to_string(),
            schema: Schema::of_type(ParamType::String),
            example: None,
        }],
        responses: responses_for(None),
        request_body: None,
        app: BTreeMap::new(),
        endpoint_id: None,
    };

    let mut spec = CanonicalApiSpec::skeleton(default_info(locator), locator.default_server());
    spec.paths.insert(
        FALLBACK_ROUTE.to_string(),
        BTreeMap::from([("get".to_string(), operation)]),
    );
    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_complete() {
        let loc = ApiLocator::parse("https://rapidapi.com/acme/api/weather_now").unwrap();
        let spec = fallback(&loc);
        let v = serde_json::to_value(&spec).unwrap();

        assert_eq!(v["openapi"], "3.0.0");
        assert_eq!(v["info"]["title"], "Weather Now");
        assert_eq!(v["info"]["version"], "1.0.0");
        assert_eq!(v["servers"][0]["url"], "https://weather_now.p.rapidapi.com");
        assert_eq!(spec.operation_count(), 1);

        let op = &v["paths"]["/endpoint"]["get"];
        assert_eq!(op["operationId"], "api_endpoint");
        assert_eq!(op["summary"], "API Endpoint");
        assert_eq!(op["parameters"][0]["in"], "query");
        assert_eq!(op["parameters"][0]["required"], false);
        assert_eq!(op["responses"]["200"]["content"]["application/json"]["schema"]["type"], "object");
        assert!(v["components"]["securitySchemes"]["RapidAPIHost"].is_object());
    }
}
