//! Uniform response envelope.
//!
//! Every outcome, success or error, leaves the handler as an [`ApiResponse`]: a status code,
//! JSON content type and CORS headers, and a body that is already a JSON string. The envelope
//! serializes as `{ "statusCode", "headers", "body" }`, the shape an API gateway proxy expects.

use crate::error::ApiError;
use http::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const CONTENT_TYPE_JSON: &str = "application/json";

const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Headers", "*"),
    ("Access-Control-Allow-Methods", "GET,POST,PUT,DELETE,OPTIONS"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    #[serde(serialize_with = "serialize_status")]
    pub status_code: StatusCode,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

fn serialize_status<S>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u16(status.as_u16())
}

impl ApiResponse {
    pub fn json(status_code: StatusCode, body: &Value) -> Self {
        let mut headers: BTreeMap<String, String> = CORS_HEADERS
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        headers.insert("Content-Type".to_owned(), CONTENT_TYPE_JSON.to_owned());

        Self {
            status_code,
            headers,
            body: body.to_string(),
        }
    }

    /// `{"error": <message>}` with the status code of the error kind.
    pub fn from_error(error: &ApiError) -> Self {
        Self::json(error.status_code(), &json!({ "error": error.to_string() }))
    }

    /// Parses the body back into JSON. Mainly useful to adapters and tests.
    pub fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}
