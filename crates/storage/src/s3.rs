//! S3 presigned upload links.

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use phcare_core::{PatientError, PatientResult, UploadSigner};
use std::time::Duration;

/// Signs `PutObject` requests against one bucket.
///
/// The presigned URL carries the key, content type and expiry in its signature, so it cannot be
/// reused for another object, a read, or a listing.
#[derive(Debug, Clone)]
pub struct S3UploadSigner {
    client: Client,
    bucket: String,
}

impl S3UploadSigner {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl UploadSigner for S3UploadSigner {
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> PatientResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| PatientError::backend("invalid presigning config", e))?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| PatientError::backend("presign put_object failed", DisplayErrorContext(e)))?;

        Ok(request.uri().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

    fn offline_client() -> Client {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("eu-west-2"))
            .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
            .build();
        Client::from_conf(config)
    }

    #[tokio::test]
    async fn presigned_url_is_scoped_to_key_and_expiry() {
        let signer = S3UploadSigner::new(offline_client(), "ehrdocs");
        let url = signer
            .presign_put("public/7/doc-x.png", "image/png", Duration::from_secs(300))
            .await
            .unwrap();

        assert!(url.starts_with("https://"));
        assert!(url.contains("ehrdocs"));
        assert!(url.contains("public/7/doc-x.png"));
        assert!(url.contains("X-Amz-Expires=300"));
        assert!(url.contains("X-Amz-Signature="));
    }

    #[tokio::test]
    async fn expiry_beyond_a_week_is_rejected() {
        let signer = S3UploadSigner::new(offline_client(), "ehrdocs");
        let err = signer
            .presign_put(
                "public/7/doc-x.png",
                "image/png",
                Duration::from_secs(8 * 24 * 60 * 60),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PatientError::Backend { .. }));
    }
}
