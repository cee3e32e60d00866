//! # PHCare Core
//!
//! Core request handling for the PHCare patients service.
//!
//! This crate contains the decision logic and the local adapters:
//! - Route resolution and role-based write restrictions
//! - Patient records, partial updates and name search
//! - Upload link issuance for clinical documents
//! - The uniform JSON response envelope
//! - In-memory and sharded-file patient stores
//!
//! **No transport concerns**: the axum router lives in `api-rest`, cloud backends in
//! `phcare-storage`.

pub mod access;
pub mod config;
pub mod constants;
pub mod documents;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod patient;
pub mod repositories;
pub mod request;
pub mod response;
pub mod routing;

pub use access::AccessGuard;
pub use config::{core_config_from_lookup, CoreConfig, StoreBackend};
pub use documents::{
    DocumentUploadRequest, LocalUploadSigner, UploadLink, UploadLinkIssuer, UploadSigner,
};
pub use error::{ApiError, ApiResult, PatientError, PatientResult};
pub use gateway::GatewayEvent;
pub use handler::PatientsHandler;
pub use patient::{Patient, UpdatePatch};
pub use phcare_types::{NonEmptyText, PatientId};
pub use repositories::files::FilePatientStore;
pub use repositories::memory::InMemoryPatientStore;
pub use repositories::PatientStore;
pub use request::{ApiRequest, CallerIdentity};
pub use response::ApiResponse;
pub use routing::Operation;
