//! # PHCare Storage
//!
//! Backends for the patients handler:
//! - [`dynamodb::DynamoPatientStore`]: records in a DynamoDB table
//! - [`s3::S3UploadSigner`]: presigned `PutObject` links into the documents bucket
//!
//! [`connect`] picks the AWS pair or the local file store and development signer from
//! [`CoreConfig`].

pub mod attributes;
pub mod dynamodb;
pub mod s3;

use aws_config::BehaviorVersion;
use phcare_core::{
    CoreConfig, FilePatientStore, LocalUploadSigner, PatientResult, PatientStore,
    PatientsHandler, StoreBackend, UploadSigner,
};
use std::sync::Arc;

pub use dynamodb::DynamoPatientStore;
pub use s3::S3UploadSigner;

/// The collaborators a handler needs.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn PatientStore>,
    pub signer: Arc<dyn UploadSigner>,
}

impl Backends {
    pub fn into_handler(self, cfg: &CoreConfig) -> PatientsHandler {
        PatientsHandler::new(cfg, self.store, self.signer)
    }
}

/// Builds the store and signer for the configured backend.
///
/// # Errors
/// Returns `PatientError::InvalidInput` if the local upload URL is unusable.
pub async fn connect(cfg: &CoreConfig) -> PatientResult<Backends> {
    match cfg.backend() {
        StoreBackend::Aws => {
            let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
            tracing::info!(
                table = cfg.table_name(),
                bucket = cfg.bucket_name(),
                region = ?sdk_config.region(),
                "using AWS backends"
            );
            Ok(Backends {
                store: Arc::new(DynamoPatientStore::new(
                    aws_sdk_dynamodb::Client::new(&sdk_config),
                    cfg.table_name(),
                )),
                signer: Arc::new(S3UploadSigner::new(
                    aws_sdk_s3::Client::new(&sdk_config),
                    cfg.bucket_name(),
                )),
            })
        }
        StoreBackend::Local => {
            tracing::info!(
                data_dir = %cfg.patient_data_dir().display(),
                upload_url = cfg.local_upload_url(),
                "using local backends"
            );
            Ok(Backends {
                store: Arc::new(FilePatientStore::new(cfg.patient_data_dir())),
                signer: Arc::new(LocalUploadSigner::new(cfg.local_upload_url())?),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use phcare_core::{ApiRequest, CallerIdentity};
    use tempfile::TempDir;

    #[tokio::test]
    async fn local_backend_serves_requests_from_disk() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = CoreConfig::new(StoreBackend::Local, "Patients".into(), "ehrdocs".into())
            .with_patient_data_dir(temp_dir.path().to_path_buf())
            .with_local_upload_url("http://localhost:3000/uploads");
        let handler = connect(&cfg).await.unwrap().into_handler(&cfg);
        let doctor = CallerIdentity::from_group_claims(["Doctor"]);

        let created = handler
            .handle(
                ApiRequest::new(Method::POST, "/patients", doctor.clone())
                    .with_body(r#"{"PatientID":"7","FirstName":"A"}"#),
            )
            .await;
        assert_eq!(created.status_code, StatusCode::CREATED);

        let fetched = handler
            .handle(ApiRequest::new(Method::GET, "/patients/7", doctor.clone()))
            .await;
        assert_eq!(fetched.status_code, StatusCode::OK);

        let link = handler
            .handle(
                ApiRequest::new(Method::POST, "/patients/7/documents", doctor)
                    .with_body(r#"{"fileName":"scan 1.pdf","fileType":"application/pdf"}"#),
            )
            .await;
        let body = link.body_json().unwrap();
        let url = body["uploadUrl"].as_str().unwrap();
        assert!(url.starts_with("http://localhost:3000/uploads/public/7/"));
        assert!(body["key"].as_str().unwrap().ends_with("scan_1.pdf"));
    }

    #[tokio::test]
    async fn local_backend_rejects_bad_upload_url() {
        let cfg = CoreConfig::new(StoreBackend::Local, "Patients".into(), "ehrdocs".into())
            .with_local_upload_url("not a url");
        assert!(connect(&cfg).await.is_err());
    }
}
