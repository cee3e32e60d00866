//! Request handling for the patients API.
//!
//! [`PatientsHandler`] is the single entry point used by every adapter. For each request it:
//!
//! 1. resolves method + path to an [`Operation`] (pure, see [`crate::routing`]),
//! 2. checks the caller's role claims with the [`AccessGuard`],
//! 3. validates the body for the operation,
//! 4. calls the [`PatientStore`] or the [`UploadLinkIssuer`],
//! 5. formats the outcome as an [`ApiResponse`].
//!
//! Steps 1 to 3 never touch a collaborator, so a rejected request has no side effects.

use crate::access::AccessGuard;
use crate::config::CoreConfig;
use crate::constants::SEARCH_QUERY_PARAM;
use crate::documents::{DocumentUploadRequest, UploadLinkIssuer, UploadSigner};
use crate::error::{ApiError, ApiResult, PatientError};
use crate::patient::{Patient, UpdatePatch};
use crate::repositories::PatientStore;
use crate::request::ApiRequest;
use crate::response::ApiResponse;
use crate::routing::{self, Operation};
use http::StatusCode;
use phcare_types::PatientId;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::Instrument;

/// A successful outcome before formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    fn created(body: Value) -> Self {
        Self {
            status: StatusCode::CREATED,
            body,
        }
    }
}

#[derive(Clone)]
pub struct PatientsHandler {
    store: Arc<dyn PatientStore>,
    uploads: UploadLinkIssuer,
    guard: AccessGuard,
}

impl PatientsHandler {
    /// Builds a handler around injected collaborators.
    pub fn new(
        cfg: &CoreConfig,
        store: Arc<dyn PatientStore>,
        signer: Arc<dyn UploadSigner>,
    ) -> Self {
        Self {
            store,
            uploads: UploadLinkIssuer::new(signer, cfg.upload_prefix()),
            guard: AccessGuard::new(cfg.write_role()),
        }
    }

    /// Handles one request. Never fails: every error is formatted into the response.
    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        let span = tracing::info_span!(
            "patients_request",
            method = %request.method,
            path = %request.path,
        );
        let outcome = self.dispatch(&request).instrument(span.clone()).await;
        let _entered = span.enter();

        match outcome {
            Ok(reply) => {
                tracing::info!(status = reply.status.as_u16(), "request handled");
                ApiResponse::json(reply.status, &reply.body)
            }
            Err(ApiError::Internal(e)) => {
                tracing::error!("patients request failed: {:?}", e);
                ApiResponse::from_error(&ApiError::Internal(e))
            }
            Err(e) => {
                tracing::info!(status = e.status_code().as_u16(), "request rejected: {e}");
                ApiResponse::from_error(&e)
            }
        }
    }

    /// Resolves, authorises and executes a request without formatting it.
    ///
    /// # Errors
    /// Returns the classified [`ApiError`]; collaborator failures arrive as
    /// `ApiError::Internal`.
    pub async fn dispatch(&self, request: &ApiRequest) -> ApiResult<Reply> {
        let operation = routing::resolve(
            &request.method,
            &request.path,
            request.query_param(SEARCH_QUERY_PARAM),
        )?;
        self.guard.authorize(&operation, &request.caller)?;
        tracing::debug!(operation = operation.name(), "dispatching");

        match operation {
            Operation::List => self.list().await,
            Operation::Search { query } => self.search(&query).await,
            Operation::Create => self.create(request).await,
            Operation::Get { id } => self.get(&id).await,
            Operation::Update { id } => self.update(&id, request).await,
            Operation::Delete { id } => self.delete(&id).await,
            Operation::IssueUploadLink { patient_id } => {
                self.issue_upload_link(&patient_id, request).await
            }
        }
    }

    async fn list(&self) -> ApiResult<Reply> {
        let patients = self.store.list().await?;
        Ok(Reply::ok(records_json(&patients)))
    }

    async fn search(&self, query: &str) -> ApiResult<Reply> {
        let patients = self.store.search(query).await?;
        Ok(Reply::ok(records_json(&patients)))
    }

    async fn get(&self, id: &PatientId) -> ApiResult<Reply> {
        let patient = self.store.get(id).await?.ok_or(ApiError::NotFound)?;
        Ok(Reply::ok(patient.to_json()))
    }

    async fn create(&self, request: &ApiRequest) -> ApiResult<Reply> {
        let patient = Patient::from_create_body(request.json_object_body()?)?;
        self.store.put(&patient).await?;
        Ok(Reply::created(json!({
            "message": "Patient created",
            "item": patient.to_json(),
        })))
    }

    async fn update(&self, id: &PatientId, request: &ApiRequest) -> ApiResult<Reply> {
        let patch = UpdatePatch::from_body(request.json_object_body()?)?;

        let updated = if patch.is_empty() {
            tracing::debug!("empty patch, returning current record");
            self.store.get(id).await?
        } else {
            self.store.update(id, &patch).await?
        };

        let patient = updated.ok_or(ApiError::NotFound)?;
        Ok(Reply::ok(json!({
            "message": "Patient updated",
            "item": patient.to_json(),
        })))
    }

    async fn delete(&self, id: &PatientId) -> ApiResult<Reply> {
        self.store.delete(id).await?;
        Ok(Reply::ok(json!({ "deleted": id.as_str() })))
    }

    async fn issue_upload_link(
        &self,
        patient_id: &PatientId,
        request: &ApiRequest,
    ) -> ApiResult<Reply> {
        let upload = DocumentUploadRequest::from_body(&request.json_object_body()?)?;
        let link = self.uploads.issue(patient_id, &upload).await?;
        let body = serde_json::to_value(&link)
            .map_err(PatientError::Serialization)?;
        Ok(Reply::ok(body))
    }
}

fn records_json(patients: &[Patient]) -> Value {
    Value::Array(patients.iter().map(Patient::to_json).collect())
}
