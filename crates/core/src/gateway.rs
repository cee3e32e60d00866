//! API-Gateway proxy event adapter.
//!
//! Converts a proxy integration event into an [`ApiRequest`]. Group claims come from the
//! authorizer context the identity layer attaches; the adapter never verifies tokens itself.

use crate::error::{PatientError, PatientResult};
use crate::request::{ApiRequest, CallerIdentity};
use http::Method;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

const GROUPS_CLAIM: &str = "cognito:groups";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEvent {
    pub http_method: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub path_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    #[serde(default)]
    pub request_context: Option<RequestContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub authorizer: Option<Authorizer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Authorizer {
    #[serde(default)]
    pub claims: HashMap<String, Value>,
}

impl GatewayEvent {
    /// Parses an event from its JSON text.
    ///
    /// # Errors
    /// Returns `PatientError::Deserialization` if `raw` is not a proxy event.
    pub fn from_json(raw: &str) -> PatientResult<Self> {
        serde_json::from_str(raw).map_err(PatientError::Deserialization)
    }

    fn claims(&self) -> Option<&HashMap<String, Value>> {
        self.request_context
            .as_ref()?
            .authorizer
            .as_ref()
            .map(|authorizer| &authorizer.claims)
    }

    /// The caller as described by the authorizer claims. No claims means an anonymous caller.
    pub fn caller(&self) -> CallerIdentity {
        let Some(claims) = self.claims() else {
            return CallerIdentity::anonymous();
        };

        let groups: Vec<String> = match claims.get(GROUPS_CLAIM) {
            Some(Value::String(groups)) => vec![groups.clone()],
            Some(Value::Array(groups)) => groups
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        };

        let caller = CallerIdentity::from_group_claims(groups);
        match claims.get("sub").and_then(Value::as_str) {
            Some(subject) => caller.with_subject(subject),
            None => caller,
        }
    }

    /// The request path. Falls back to rebuilding it from the path parameters when the event
    /// only carries a resource template.
    pub fn request_path(&self) -> String {
        if let Some(path) = self.path.as_deref().filter(|path| !path.is_empty()) {
            return path.to_owned();
        }

        let param = |name: &str| {
            self.path_parameters
                .as_ref()
                .and_then(|params| params.get(name))
                .map(String::as_str)
        };

        if let Some(proxy) = param("proxy") {
            return format!("/{}", proxy.trim_start_matches('/'));
        }
        match (param("id"), self.resource.as_deref()) {
            (Some(id), Some(resource)) => resource.replace("{id}", id),
            (Some(id), None) => format!("/patients/{id}"),
            (None, Some(resource)) => resource.to_owned(),
            (None, None) => "/".to_owned(),
        }
    }

    /// Converts the event into a transport-neutral request.
    ///
    /// # Errors
    /// Returns `PatientError::InvalidInput` if the method is not a valid HTTP token or the body
    /// is base64 encoded.
    pub fn into_request(self) -> PatientResult<ApiRequest> {
        if self.is_base64_encoded {
            return Err(PatientError::InvalidInput(
                "base64-encoded request bodies are not supported".into(),
            ));
        }

        let method = Method::from_bytes(self.http_method.to_ascii_uppercase().as_bytes())
            .map_err(|e| PatientError::InvalidInput(format!("invalid HTTP method: {e}")))?;
        let caller = self.caller();
        let path = self.request_path();

        let mut request = ApiRequest::new(method, path, caller);
        request.query = self.query_string_parameters.unwrap_or_default();
        request.body = self.body;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> GatewayEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn converts_full_proxy_event() {
        let request = event(json!({
            "httpMethod": "PUT",
            "path": "/patients/7",
            "resource": "/patients/{id}",
            "pathParameters": {"id": "7"},
            "queryStringParameters": null,
            "body": "{\"FirstName\":\"Z\"}",
            "isBase64Encoded": false,
            "requestContext": {
                "authorizer": {
                    "claims": {"sub": "abc-123", "cognito:groups": "Doctor,Staff"}
                }
            }
        }))
        .into_request()
        .unwrap();

        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.path, "/patients/7");
        assert_eq!(request.body.as_deref(), Some("{\"FirstName\":\"Z\"}"));
        assert!(request.query.is_empty());
        assert!(request.caller.has_group("Doctor"));
        assert!(request.caller.has_group("Staff"));
        assert_eq!(request.caller.subject(), Some("abc-123"));
    }

    #[test]
    fn missing_claims_yield_anonymous_caller() {
        let request = event(json!({"httpMethod": "GET", "path": "/patients"}))
            .into_request()
            .unwrap();
        assert_eq!(request.caller, CallerIdentity::anonymous());
    }

    #[test]
    fn group_claim_may_be_an_array() {
        let caller = event(json!({
            "httpMethod": "GET",
            "requestContext": {"authorizer": {"claims": {"cognito:groups": ["Doctor"]}}}
        }))
        .caller();
        assert!(caller.has_group("Doctor"));
    }

    #[test]
    fn path_is_rebuilt_from_parameters() {
        let by_id = event(json!({
            "httpMethod": "POST",
            "resource": "/patients/{id}/documents",
            "pathParameters": {"id": "7"}
        }));
        assert_eq!(by_id.request_path(), "/patients/7/documents");

        let by_proxy = event(json!({
            "httpMethod": "GET",
            "resource": "/{proxy+}",
            "pathParameters": {"proxy": "patients/9"}
        }));
        assert_eq!(by_proxy.request_path(), "/patients/9");
    }

    #[test]
    fn query_parameters_are_carried_over() {
        let request = event(json!({
            "httpMethod": "get",
            "path": "/patients",
            "queryStringParameters": {"q": "Hop"}
        }))
        .into_request()
        .unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.query_param("q"), Some("Hop"));
    }

    #[test]
    fn base64_bodies_are_rejected() {
        let err = event(json!({
            "httpMethod": "POST",
            "path": "/patients",
            "body": "e30=",
            "isBase64Encoded": true
        }))
        .into_request()
        .unwrap_err();
        assert!(matches!(err, PatientError::InvalidInput(_)));
    }
}
