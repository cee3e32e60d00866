//! # API REST
//!
//! REST API for the PHCare patients service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (caller headers, CORS, body limits)
//!
//! Every patients route hands an [`ApiRequest`] to the core [`PatientsHandler`] and returns its
//! envelope unchanged, so this adapter and the gateway adapter answer identically.

#![warn(rust_2018_idioms)]

use axum::{
    body::to_bytes,
    extract::{FromRequest, Query, Request, State},
    http::{
        header::{HeaderMap, HeaderName, HeaderValue, InvalidHeaderName},
        StatusCode,
    },
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use phcare_core::{ApiError, ApiRequest, ApiResponse, CallerIdentity, PatientsHandler};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Header carrying the caller's group claims, set by the identity layer in front of the service.
pub const DEFAULT_GROUPS_HEADER: &str = "x-caller-groups";

/// Header carrying the caller's subject claim.
pub const SUBJECT_HEADER: &str = "x-caller-sub";

/// Largest request body accepted, matching the proxy payload limit of the gateway.
pub const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Application state shared across REST API handlers.
#[derive(Clone)]
pub struct AppState {
    handler: Arc<PatientsHandler>,
    groups_header: HeaderName,
}

impl AppState {
    pub fn new(handler: PatientsHandler) -> Self {
        Self {
            handler: Arc::new(handler),
            groups_header: HeaderName::from_static(DEFAULT_GROUPS_HEADER),
        }
    }

    /// Read group claims from `name` instead of [`DEFAULT_GROUPS_HEADER`].
    ///
    /// # Errors
    /// Returns `InvalidHeaderName` if `name` is not a valid header name.
    pub fn with_groups_header(mut self, name: &str) -> Result<Self, InvalidHeaderName> {
        self.groups_header = HeaderName::from_bytes(name.trim().as_bytes())?;
        Ok(self)
    }
}

/// Core response envelope as an axum response.
///
/// CORS headers are left to the `CorsLayer` so they are never sent twice.
pub struct Envelope(pub ApiResponse);

impl From<ApiError> for Envelope {
    fn from(error: ApiError) -> Self {
        Self(ApiResponse::from_error(&error))
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let ApiResponse {
            status_code,
            headers,
            body,
        } = self.0;

        let mut response = (status_code, body).into_response();
        let target = response.headers_mut();
        for (name, value) in headers {
            if name.to_ascii_lowercase().starts_with("access-control-") {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    target.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        response
    }
}

/// An HTTP request translated for the core handler.
pub struct PatientsRequest(pub ApiRequest);

fn caller_from_headers(headers: &HeaderMap, groups_header: &HeaderName) -> CallerIdentity {
    let caller = CallerIdentity::from_group_claims(
        headers
            .get_all(groups_header)
            .iter()
            .filter_map(|value| value.to_str().ok()),
    );
    match headers
        .get(SUBJECT_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(subject) => caller.with_subject(subject),
        None => caller,
    }
}

/// Percent-decodes each path segment on its own. An encoded `/` inside a segment is refused so
/// it can never split one segment into two.
fn decode_path(raw: &str) -> Option<String> {
    let segments = raw
        .split('/')
        .map(|segment| {
            urlencoding::decode(segment)
                .ok()
                .filter(|decoded| !decoded.contains('/'))
        })
        .collect::<Option<Vec<_>>>()?;
    Some(segments.join("/"))
}

#[axum::async_trait]
impl FromRequest<AppState> for PatientsRequest {
    type Rejection = Envelope;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();

        let path = decode_path(parts.uri.path())
            .ok_or_else(|| Envelope::from(ApiError::UnsupportedRoute))?;
        let Query(query) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|_| Envelope::from(ApiError::validation("Invalid query string")))?;

        let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
            tracing::warn!("rejecting request body: {e}");
            Envelope(ApiResponse::json(
                StatusCode::PAYLOAD_TOO_LARGE,
                &json!({ "error": "Request body is too large" }),
            ))
        })?;
        // Decoded lossily so that the role check still runs before body validation.
        let body = (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned());

        let mut request = ApiRequest::new(
            parts.method,
            path,
            caller_from_headers(&parts.headers, &state.groups_header),
        );
        request.query = query;
        request.body = body;
        Ok(Self(request))
    }
}

async fn respond(state: &AppState, PatientsRequest(request): PatientsRequest) -> Envelope {
    Envelope(state.handler.handle(request).await)
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// A patient record. Attributes beyond the ones listed are stored and returned as given.
#[derive(Debug, Serialize, ToSchema)]
pub struct PatientDoc {
    #[serde(rename = "PatientID")]
    #[schema(example = "7")]
    pub patient_id: String,
    #[serde(rename = "FirstName")]
    pub first_name: Option<String>,
    #[serde(rename = "LastName")]
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PatientMutationRes {
    #[schema(example = "Patient created")]
    pub message: String,
    pub item: PatientDoc,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedRes {
    pub deleted: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadLinkReq {
    #[schema(example = "scan.pdf")]
    pub file_name: String,
    #[schema(example = "application/pdf")]
    pub file_type: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadLinkRes {
    pub upload_url: String,
    pub key: String,
    pub document_id: String,
    #[schema(example = 300)]
    pub expires_in: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorRes {
    #[schema(example = "Patient not found")]
    pub error: String,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_patients,
        create_patient,
        get_patient,
        update_patient,
        delete_patient,
        issue_upload_link,
    ),
    components(schemas(
        HealthRes,
        PatientDoc,
        PatientMutationRes,
        DeletedRes,
        UploadLinkReq,
        UploadLinkRes,
        ErrorRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router: patients routes, health, and Swagger UI.
///
/// Methods and paths axum does not know are still passed to the core handler, which answers
/// them with its own 405 / 400 envelopes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/patients",
            get(list_patients).post(create_patient).fallback(unmatched),
        )
        .route(
            "/patients/:id",
            get(get_patient)
                .put(update_patient)
                .delete(delete_patient)
                .fallback(unmatched),
        )
        .route(
            "/patients/:id/documents",
            post(issue_upload_link).fallback(unmatched),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(unmatched)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `addr` and serves the router until the process stops.
///
/// # Errors
/// Returns an error if the address cannot be bound or the server fails while running.
pub async fn serve(addr: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("-- PHCare REST API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancer checks.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "PHCare REST API is alive".into(),
    })
}

async fn unmatched(State(state): State<AppState>, request: PatientsRequest) -> Envelope {
    respond(&state, request).await
}

#[utoipa::path(
    get,
    path = "/patients",
    params(
        ("q" = Option<String>, Query, description = "Case-sensitive substring of FirstName or LastName")
    ),
    responses(
        (status = 200, description = "Matching patients", body = [PatientDoc]),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// List all patients, or search them by name when `q` is given.
#[axum::debug_handler]
async fn list_patients(State(state): State<AppState>, request: PatientsRequest) -> Envelope {
    respond(&state, request).await
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = PatientDoc,
    responses(
        (status = 201, description = "Patient created", body = PatientMutationRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 403, description = "Caller lacks the write role", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Create or replace a patient record. Requires the write role.
#[axum::debug_handler]
async fn create_patient(State(state): State<AppState>, request: PatientsRequest) -> Envelope {
    respond(&state, request).await
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Patient record", body = PatientDoc),
        (status = 404, description = "Patient not found", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_patient(State(state): State<AppState>, request: PatientsRequest) -> Envelope {
    respond(&state, request).await
}

#[utoipa::path(
    put,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient identifier")),
    request_body = PatientDoc,
    responses(
        (status = 200, description = "Patient updated", body = PatientMutationRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 403, description = "Caller lacks the write role", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Set only the attributes named in the body. `PatientID` in the body is ignored.
#[axum::debug_handler]
async fn update_patient(State(state): State<AppState>, request: PatientsRequest) -> Envelope {
    respond(&state, request).await
}

#[utoipa::path(
    delete,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient identifier")),
    responses(
        (status = 200, description = "Patient deleted (or already absent)", body = DeletedRes),
        (status = 403, description = "Caller lacks the write role", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn delete_patient(State(state): State<AppState>, request: PatientsRequest) -> Envelope {
    respond(&state, request).await
}

#[utoipa::path(
    post,
    path = "/patients/{id}/documents",
    params(("id" = String, Path, description = "Patient identifier")),
    request_body = UploadLinkReq,
    responses(
        (status = 200, description = "Upload link issued", body = UploadLinkRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 403, description = "Caller lacks the write role", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Issue a five-minute link for uploading one document to object storage.
#[axum::debug_handler]
async fn issue_upload_link(State(state): State<AppState>, request: PatientsRequest) -> Envelope {
    respond(&state, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method};
    use http_body_util::BodyExt;
    use phcare_core::{CoreConfig, InMemoryPatientStore, LocalUploadSigner, StoreBackend};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        let cfg = CoreConfig::new(StoreBackend::Local, "Patients".into(), "ehrdocs".into());
        let handler = PatientsHandler::new(
            &cfg,
            Arc::new(InMemoryPatientStore::new()),
            Arc::new(LocalUploadSigner::new(cfg.local_upload_url()).unwrap()),
        );
        router(AppState::new(handler))
    }

    fn request(method: Method, uri: &str, groups: Option<&str>, body: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(groups) = groups {
            builder = builder.header(DEFAULT_GROUPS_HEADER, groups);
        }
        builder
            .body(body.map(|b| Body::from(b.to_owned())).unwrap_or_else(Body::empty))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_alive() {
        let response = app()
            .oneshot(request(Method::GET, "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["ok"], json!(true));
    }

    #[tokio::test]
    async fn doctor_creates_then_anyone_reads() {
        let app = app();

        let created = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/patients",
                Some("Doctor"),
                Some(r#"{"PatientID":"7","FirstName":"A","LastName":"B"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        assert_eq!(
            created.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(json_body(created).await["item"]["PatientID"], json!("7"));

        let fetched = app
            .oneshot(request(Method::GET, "/patients/7", None, None))
            .await
            .unwrap();
        assert_eq!(fetched.status(), StatusCode::OK);
        assert_eq!(
            json_body(fetched).await,
            json!({"PatientID": "7", "FirstName": "A", "LastName": "B"})
        );
    }

    #[tokio::test]
    async fn percent_encoded_ids_are_decoded() {
        let app = app();
        app.clone()
            .oneshot(request(
                Method::POST,
                "/patients",
                Some("Doctor"),
                Some(r#"{"PatientID":"John Doe"}"#),
            ))
            .await
            .unwrap();

        let fetched = app
            .oneshot(request(Method::GET, "/patients/John%20Doe", None, None))
            .await
            .unwrap();
        assert_eq!(fetched.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn staff_cannot_update() {
        let response = app()
            .oneshot(request(
                Method::PUT,
                "/patients/7",
                Some("Staff"),
                Some(r#"{"FirstName":"Z"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await, json!({"error": "Forbidden"}));
    }

    #[tokio::test]
    async fn search_uses_query_parameter() {
        let app = app();
        for body in [
            r#"{"PatientID":"1","FirstName":"Ada","LastName":"Lovelace"}"#,
            r#"{"PatientID":"2","FirstName":"Grace","LastName":"Hopper"}"#,
        ] {
            app.clone()
                .oneshot(request(Method::POST, "/patients", Some("Doctor"), Some(body)))
                .await
                .unwrap();
        }

        let response = app
            .oneshot(request(Method::GET, "/patients?q=Hop", None, None))
            .await
            .unwrap();
        let found = json_body(response).await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["FirstName"], json!("Grace"));
    }

    #[tokio::test]
    async fn upload_link_for_doctor() {
        let response = app()
            .oneshot(request(
                Method::POST,
                "/patients/7/documents",
                Some("Doctor"),
                Some(r#"{"fileName":"x.png","fileType":"image/png"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["key"].as_str().unwrap().ends_with("x.png"));
        assert!(body["uploadUrl"].as_str().unwrap().contains("/public/7/"));
    }

    #[test]
    fn paths_decode_segment_by_segment() {
        assert_eq!(
            decode_path("/patients/John%20Doe/documents").as_deref(),
            Some("/patients/John Doe/documents")
        );
        assert_eq!(decode_path("/patients/a%2Fdocuments"), None);
        assert_eq!(decode_path("/patients/a%2fb"), None);
    }

    #[tokio::test]
    async fn encoded_slash_does_not_reach_upload_route() {
        let response = app()
            .oneshot(request(
                Method::POST,
                "/patients/a%2Fdocuments",
                Some("Doctor"),
                Some(r#"{"fileName":"x.png","fileType":"image/png"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Unsupported route"})
        );
    }

    #[tokio::test]
    async fn unknown_method_and_route_use_core_envelopes() {
        let app = app();

        let patch = app
            .clone()
            .oneshot(request(Method::PATCH, "/patients/7", Some("Doctor"), None))
            .await
            .unwrap();
        assert_eq!(patch.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            json_body(patch).await,
            json!({"error": "Unsupported method \"PATCH\""})
        );

        let unknown = app
            .oneshot(request(Method::GET, "/appointments", None, None))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(unknown).await,
            json!({"error": "Unsupported route"})
        );
    }

    #[tokio::test]
    async fn cors_headers_are_not_duplicated() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/patients")
                    .header(header::ORIGIN, "https://ehr.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response
                .headers()
                .get_all(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .iter()
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn custom_groups_header() {
        let cfg = CoreConfig::new(StoreBackend::Local, "Patients".into(), "ehrdocs".into());
        let handler = PatientsHandler::new(
            &cfg,
            Arc::new(InMemoryPatientStore::new()),
            Arc::new(LocalUploadSigner::new(cfg.local_upload_url()).unwrap()),
        );
        let app = router(
            AppState::new(handler)
                .with_groups_header("X-Cognito-Groups")
                .unwrap(),
        );

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method(Method::DELETE)
                    .uri("/patients/7")
                    .header("x-cognito-groups", "Doctor")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"deleted": "7"}));
    }

    #[tokio::test]
    async fn openapi_lists_patient_routes() {
        let response = app()
            .oneshot(request(Method::GET, "/api-docs/openapi.json", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let doc = json_body(response).await;
        assert!(doc["paths"]["/patients/{id}/documents"].is_object());
        assert!(doc["paths"]["/patients"].is_object());
    }
}
