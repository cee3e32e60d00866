//! Upload links for clinical documents.
//!
//! The handler never receives document bytes. Instead it hands out a short-lived link that lets
//! the client write exactly one object, of one content type, at a key derived from the patient
//! and a freshly generated document id:
//!
//! ```text
//! <prefix>/<patient id>/<document id>-<sanitised file name>
//! ```
//!
//! Nothing about the document is persisted here; the object key is the only durable record.

use crate::constants::UPLOAD_LINK_TTL;
use crate::error::{ApiError, ApiResult, PatientError, PatientResult};
use async_trait::async_trait;
use phcare_types::{NonEmptyText, PatientId};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Produces a write-only, single-object, expiring URL.
#[async_trait]
pub trait UploadSigner: Send + Sync {
    /// Returns a URL that permits one `PUT` of `content_type` content to `key` until
    /// `expires_in` has elapsed. The URL must not grant read or list access.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> PatientResult<String>;
}

/// Body of `POST /patients/{id}/documents`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUploadRequest {
    pub file_name: NonEmptyText,
    pub file_type: NonEmptyText,
}

impl DocumentUploadRequest {
    /// # Errors
    /// Returns `ApiError::Validation` naming whichever of `fileName` / `fileType` is missing,
    /// blank or not a string.
    pub fn from_body(body: &Map<String, Value>) -> ApiResult<Self> {
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .and_then(|value| NonEmptyText::new(value).ok())
        };

        match (field("fileName"), field("fileType")) {
            (Some(file_name), Some(file_type)) => Ok(Self {
                file_name,
                file_type,
            }),
            (None, None) => Err(ApiError::validation("fileName and fileType are required")),
            (None, Some(_)) => Err(ApiError::validation("fileName is required")),
            (Some(_), None) => Err(ApiError::validation("fileType is required")),
        }
    }
}

/// Response body of a successful upload link request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadLink {
    pub upload_url: String,
    pub key: String,
    pub document_id: Uuid,
    pub expires_in: u64,
}

/// Replaces every character outside `[A-Za-z0-9._-]` with `_`.
///
/// The result never contains `/` or `\`, so a file name cannot move the object out of the
/// patient's key prefix.
pub fn sanitize_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct UploadLinkIssuer {
    signer: Arc<dyn UploadSigner>,
    prefix: String,
    ttl: Duration,
}

impl UploadLinkIssuer {
    pub fn new(signer: Arc<dyn UploadSigner>, prefix: impl Into<String>) -> Self {
        Self {
            signer,
            prefix: prefix.into(),
            ttl: UPLOAD_LINK_TTL,
        }
    }

    pub fn storage_key(&self, patient_id: &PatientId, document_id: Uuid, file_name: &str) -> String {
        format!(
            "{}/{}/{}-{}",
            self.prefix,
            patient_id,
            document_id,
            sanitize_file_name(file_name)
        )
    }

    /// Issues a link for one upload.
    ///
    /// A new document id is generated on every call, so two requests for the same file name
    /// never share a key.
    ///
    /// # Errors
    /// Propagates the signer's failure.
    pub async fn issue(
        &self,
        patient_id: &PatientId,
        request: &DocumentUploadRequest,
    ) -> PatientResult<UploadLink> {
        let document_id = Uuid::new_v4();
        let key = self.storage_key(patient_id, document_id, request.file_name.as_str());

        let upload_url = self
            .signer
            .presign_put(&key, request.file_type.as_str(), self.ttl)
            .await?;

        tracing::info!(patient_id = %patient_id, %document_id, key = %key, "issued upload link");

        Ok(UploadLink {
            upload_url,
            key,
            document_id,
            expires_in: self.ttl.as_secs(),
        })
    }
}

/// Development signer for the local backend.
///
/// Produces `<base>/<key>?contentType=..&expires=<unix seconds>`. The URL is not signed and is
/// only meant for running the service without object storage.
#[derive(Debug, Clone)]
pub struct LocalUploadSigner {
    base_url: url::Url,
}

impl LocalUploadSigner {
    /// # Errors
    /// Returns `PatientError::InvalidInput` if `base_url` is not an absolute URL that can carry
    /// path segments.
    pub fn new(base_url: &str) -> PatientResult<Self> {
        let base_url = url::Url::parse(base_url)
            .map_err(|e| PatientError::InvalidInput(format!("invalid local upload URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PatientError::InvalidInput(
                "local upload URL cannot carry a path".into(),
            ));
        }
        Ok(Self { base_url })
    }
}

#[async_trait]
impl UploadSigner for LocalUploadSigner {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> PatientResult<String> {
        let expires_at = chrono::Utc::now().timestamp()
            + i64::try_from(expires_in.as_secs()).unwrap_or(i64::MAX);

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PatientError::InvalidInput("local upload URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("contentType", content_type)
            .append_pair("expires", &expires_at.to_string());

        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSigner {
        calls: Mutex<Vec<(String, String, Duration)>>,
    }

    #[async_trait]
    impl UploadSigner for RecordingSigner {
        async fn presign_put(
            &self,
            key: &str,
            content_type: &str,
            expires_in: Duration,
        ) -> PatientResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push((key.to_owned(), content_type.to_owned(), expires_in));
            Ok(format!("https://uploads.test/{key}"))
        }
    }

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn sanitize_removes_path_traversal() {
        let sanitized = sanitize_file_name("../../etc/passwd.txt");
        assert!(!sanitized.contains('/'));
        assert_eq!(sanitized, ".._.._etc_passwd.txt");
    }

    #[test]
    fn sanitize_replaces_spaces_and_parentheses() {
        assert_eq!(sanitize_file_name("report (final).pdf"), "report__final_.pdf");
    }

    #[test]
    fn sanitize_replaces_each_non_ascii_char() {
        assert_eq!(sanitize_file_name("résumé.pdf"), "r_sum_.pdf");
        assert_eq!(sanitize_file_name("a\\b.png"), "a_b.png");
    }

    #[test]
    fn request_names_missing_fields() {
        let err = DocumentUploadRequest::from_body(&body(json!({"fileType": "image/png"})))
            .unwrap_err();
        assert_eq!(err.to_string(), "fileName is required");

        let err =
            DocumentUploadRequest::from_body(&body(json!({"fileName": "x.png", "fileType": " "})))
                .unwrap_err();
        assert_eq!(err.to_string(), "fileType is required");

        let err = DocumentUploadRequest::from_body(&body(json!({}))).unwrap_err();
        assert_eq!(err.to_string(), "fileName and fileType are required");
    }

    #[tokio::test]
    async fn issue_composes_key_and_scopes_signature() {
        let signer = Arc::new(RecordingSigner::default());
        let issuer = UploadLinkIssuer::new(signer.clone(), "public");
        let request = DocumentUploadRequest::from_body(&body(json!({
            "fileName": "x.png",
            "fileType": "image/png"
        })))
        .unwrap();

        let link = issuer
            .issue(&PatientId::parse("7").unwrap(), &request)
            .await
            .unwrap();

        assert_eq!(link.key, format!("public/7/{}-x.png", link.document_id));
        assert_eq!(link.upload_url, format!("https://uploads.test/{}", link.key));
        assert_eq!(link.expires_in, 300);

        let calls = signer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, link.key);
        assert_eq!(calls[0].1, "image/png");
        assert_eq!(calls[0].2, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn every_issue_gets_a_fresh_document_id() {
        let issuer = UploadLinkIssuer::new(Arc::new(RecordingSigner::default()), "public");
        let request = DocumentUploadRequest::from_body(&body(json!({
            "fileName": "x.png",
            "fileType": "image/png"
        })))
        .unwrap();
        let id = PatientId::parse("7").unwrap();

        let first = issuer.issue(&id, &request).await.unwrap();
        let second = issuer.issue(&id, &request).await.unwrap();
        assert_ne!(first.document_id, second.document_id);
        assert_ne!(first.key, second.key);
    }

    #[tokio::test]
    async fn local_signer_encodes_key_and_content_type() {
        let signer = LocalUploadSigner::new("http://localhost:3000/uploads").unwrap();
        let url = signer
            .presign_put("public/7/abc-report_.pdf", "application/pdf", UPLOAD_LINK_TTL)
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:3000/uploads/public/7/abc-report_.pdf?"));
        assert!(url.contains("contentType=application%2Fpdf"));
        assert!(url.contains("expires="));
    }

    #[test]
    fn local_signer_rejects_non_base_urls() {
        assert!(LocalUploadSigner::new("mailto:someone@example.com").is_err());
        assert!(LocalUploadSigner::new("not a url").is_err());
    }
}
