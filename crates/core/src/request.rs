//! Transport-neutral request model.
//!
//! Adapters (the axum router, the gateway event adapter) translate their input into an
//! [`ApiRequest`] before handing it to [`crate::PatientsHandler`].

use crate::error::{ApiError, ApiResult};
use http::Method;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// Who is calling, as asserted by the external identity layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    subject: Option<String>,
    groups: BTreeSet<String>,
}

impl CallerIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builds an identity from raw group claim values.
    ///
    /// Identity providers do not agree on how a multi-valued claim is flattened into a string, so
    /// each value may itself be a list: `"Doctor,Staff"`, `"Doctor Staff"` and `"[Doctor Staff]"`
    /// all yield the two groups `Doctor` and `Staff`.
    pub fn from_group_claims<I, S>(claims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let groups = claims
            .into_iter()
            .flat_map(|claim| split_group_claim(claim.as_ref()))
            .collect();
        Self {
            subject: None,
            groups,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }
}

fn split_group_claim(claim: &str) -> Vec<String> {
    claim
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|group| group.trim_matches('"'))
        .filter(|group| !group.is_empty())
        .map(str::to_owned)
        .collect()
}

/// A single request to the patients API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<String>,
    pub caller: CallerIdentity,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, caller: CallerIdentity) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            body: None,
            caller,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Parses the body as a JSON object.
    ///
    /// # Errors
    /// Returns `ApiError::Validation` if the body is absent, not JSON, or not an object.
    pub fn json_object_body(&self) -> ApiResult<Map<String, Value>> {
        let raw = self
            .body
            .as_deref()
            .filter(|body| !body.trim().is_empty())
            .ok_or_else(|| ApiError::validation("Request body is required"))?;

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(object)) => Ok(object),
            Ok(_) => Err(ApiError::validation("Request body must be a JSON object")),
            Err(_) => Err(ApiError::validation("Invalid JSON body")),
        }
    }
}
