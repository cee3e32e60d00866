//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the handler and the
//! storage backends. Nothing in this crate reads environment variables while serving requests;
//! binaries read them and hand the raw values to the helpers below.

use crate::constants::{
    DEFAULT_LOCAL_UPLOAD_URL, DEFAULT_PATIENT_DATA_DIR, DEFAULT_UPLOAD_PREFIX, DEFAULT_WRITE_ROLE,
};
use crate::{PatientError, PatientResult};
use phcare_types::NonEmptyText;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which collaborators back the patient store and the upload signer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    /// DynamoDB table + S3 bucket.
    Aws,
    /// Sharded JSON files under `PATIENT_DATA_DIR` and development upload links.
    Local,
}

impl FromStr for StoreBackend {
    type Err = PatientError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(StoreBackend::Aws),
            "local" => Ok(StoreBackend::Local),
            other => Err(PatientError::InvalidInput(format!(
                "unknown store backend \"{other}\" (expected \"aws\" or \"local\")"
            ))),
        }
    }
}

/// Core configuration resolved at startup.
///
/// The table and bucket names are carried verbatim; the AWS SDK reports any problem with them on
/// first use.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    backend: StoreBackend,
    table_name: String,
    bucket_name: String,
    upload_prefix: String,
    write_role: String,
    patient_data_dir: PathBuf,
    local_upload_url: String,
}

impl CoreConfig {
    /// Create a new `CoreConfig` for the given backend, table and bucket, with defaults for
    /// everything else.
    pub fn new(backend: StoreBackend, table_name: String, bucket_name: String) -> Self {
        Self {
            backend,
            table_name,
            bucket_name,
            upload_prefix: DEFAULT_UPLOAD_PREFIX.to_owned(),
            write_role: DEFAULT_WRITE_ROLE.to_owned(),
            patient_data_dir: PathBuf::from(DEFAULT_PATIENT_DATA_DIR),
            local_upload_url: DEFAULT_LOCAL_UPLOAD_URL.to_owned(),
        }
    }

    /// Override the scope prefix of upload keys. Leading and trailing `/` are stripped.
    ///
    /// # Errors
    /// Returns `PatientError::InvalidInput` if the prefix is empty after stripping.
    pub fn with_upload_prefix(mut self, prefix: &str) -> PatientResult<Self> {
        let prefix = prefix.trim().trim_matches('/');
        if prefix.is_empty() {
            return Err(PatientError::InvalidInput(
                "upload prefix cannot be empty".into(),
            ));
        }
        self.upload_prefix = prefix.to_owned();
        Ok(self)
    }

    /// Override the role claim required for write operations.
    ///
    /// # Errors
    /// Returns `PatientError::InvalidInput` if the role is blank.
    pub fn with_write_role(mut self, role: &str) -> PatientResult<Self> {
        self.write_role = NonEmptyText::new(role)
            .map_err(|_| PatientError::InvalidInput("write role cannot be empty".into()))?
            .into_inner();
        Ok(self)
    }

    pub fn with_patient_data_dir(mut self, dir: PathBuf) -> Self {
        self.patient_data_dir = dir;
        self
    }

    pub fn with_local_upload_url(mut self, url: impl Into<String>) -> Self {
        self.local_upload_url = url.into();
        self
    }

    pub fn backend(&self) -> StoreBackend {
        self.backend
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn upload_prefix(&self) -> &str {
        &self.upload_prefix
    }

    pub fn write_role(&self) -> &str {
        &self.write_role
    }

    pub fn patient_data_dir(&self) -> &Path {
        &self.patient_data_dir
    }

    pub fn local_upload_url(&self) -> &str {
        &self.local_upload_url
    }
}

/// Parse the store backend from an optional environment value.
///
/// If `value` is `None` or empty/whitespace, returns [`StoreBackend::Aws`].
pub fn store_backend_from_env_value(value: Option<String>) -> PatientResult<StoreBackend> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<StoreBackend>())
        .transpose()
        .map(|parsed| parsed.unwrap_or(StoreBackend::Aws))
}

/// Require a table or bucket name for the AWS backend.
///
/// The value is not otherwise parsed; only absence is an error.
pub fn required_env_value(name: &str, value: Option<String>) -> PatientResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PatientError::InvalidInput(format!("{name} must be set")))
}

/// Environment variable names read by the binaries.
pub mod env {
    pub const BACKEND: &str = "PHCARE_BACKEND";
    pub const TABLE_NAME: &str = "STORAGE_PATIENTS_NAME";
    pub const BUCKET_NAME: &str = "STORAGE_EHRDOCS_BUCKETNAME";
    pub const UPLOAD_PREFIX: &str = "PHCARE_UPLOAD_PREFIX";
    pub const WRITE_ROLE: &str = "PHCARE_WRITE_ROLE";
    pub const PATIENT_DATA_DIR: &str = "PATIENT_DATA_DIR";
    pub const LOCAL_UPLOAD_URL: &str = "PHCARE_LOCAL_UPLOAD_URL";
}

/// Resolve a [`CoreConfig`] from named values, typically `|name| std::env::var(name).ok()`.
///
/// Table and bucket names are required for the AWS backend only; the local backend accepts them
/// when present so that log lines still name them.
///
/// # Errors
/// Returns `PatientError::InvalidInput` for an unknown backend, a missing AWS resource name, or
/// an empty prefix or role.
pub fn core_config_from_lookup<F>(lookup: F) -> PatientResult<CoreConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let backend = store_backend_from_env_value(lookup(env::BACKEND))?;
    let (table_name, bucket_name) = match backend {
        StoreBackend::Aws => (
            required_env_value(env::TABLE_NAME, lookup(env::TABLE_NAME))?,
            required_env_value(env::BUCKET_NAME, lookup(env::BUCKET_NAME))?,
        ),
        StoreBackend::Local => (
            lookup(env::TABLE_NAME).unwrap_or_default(),
            lookup(env::BUCKET_NAME).unwrap_or_default(),
        ),
    };

    let mut cfg = CoreConfig::new(backend, table_name, bucket_name);
    if let Some(prefix) = lookup(env::UPLOAD_PREFIX) {
        cfg = cfg.with_upload_prefix(&prefix)?;
    }
    if let Some(role) = lookup(env::WRITE_ROLE) {
        cfg = cfg.with_write_role(&role)?;
    }
    if let Some(dir) = lookup(env::PATIENT_DATA_DIR).filter(|dir| !dir.trim().is_empty()) {
        cfg = cfg.with_patient_data_dir(PathBuf::from(dir));
    }
    if let Some(url) = lookup(env::LOCAL_UPLOAD_URL).filter(|url| !url.trim().is_empty()) {
        cfg = cfg.with_local_upload_url(url);
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn aws_backend_requires_table_and_bucket() {
        let err = core_config_from_lookup(lookup(&[(env::TABLE_NAME, "Patients")])).unwrap_err();
        assert!(err.to_string().contains(env::BUCKET_NAME));

        let cfg = core_config_from_lookup(lookup(&[
            (env::TABLE_NAME, "Patients"),
            (env::BUCKET_NAME, "ehrdocs"),
            (env::WRITE_ROLE, "Clinician"),
            (env::UPLOAD_PREFIX, "protected"),
        ]))
        .unwrap();
        assert_eq!(cfg.backend(), StoreBackend::Aws);
        assert_eq!(cfg.table_name(), "Patients");
        assert_eq!(cfg.write_role(), "Clinician");
        assert_eq!(cfg.upload_prefix(), "protected");
    }

    #[test]
    fn local_backend_needs_no_aws_names() {
        let cfg = core_config_from_lookup(lookup(&[
            (env::BACKEND, "local"),
            (env::PATIENT_DATA_DIR, "/tmp/patients"),
        ]))
        .unwrap();
        assert_eq!(cfg.backend(), StoreBackend::Local);
        assert_eq!(cfg.patient_data_dir(), Path::new("/tmp/patients"));
        assert_eq!(cfg.local_upload_url(), DEFAULT_LOCAL_UPLOAD_URL);
    }

    #[test]
    fn backend_defaults_to_aws() {
        assert_eq!(store_backend_from_env_value(None).unwrap(), StoreBackend::Aws);
        assert_eq!(
            store_backend_from_env_value(Some("  ".into())).unwrap(),
            StoreBackend::Aws
        );
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!(
            store_backend_from_env_value(Some("Local".into())).unwrap(),
            StoreBackend::Local
        );
        assert!(store_backend_from_env_value(Some("postgres".into())).is_err());
    }

    #[test]
    fn names_are_passed_verbatim() {
        let cfg = CoreConfig::new(StoreBackend::Aws, "Patients-dev".into(), "ehr docs".into());
        assert_eq!(cfg.table_name(), "Patients-dev");
        assert_eq!(cfg.bucket_name(), "ehr docs");
        assert_eq!(cfg.write_role(), "Doctor");
        assert_eq!(cfg.upload_prefix(), "public");
    }

    #[test]
    fn upload_prefix_is_normalised() {
        let cfg = CoreConfig::new(StoreBackend::Local, String::new(), String::new())
            .with_upload_prefix("/protected/ehr/")
            .unwrap();
        assert_eq!(cfg.upload_prefix(), "protected/ehr");

        let err = CoreConfig::new(StoreBackend::Local, String::new(), String::new())
            .with_upload_prefix("//");
        assert!(err.is_err());
    }

    #[test]
    fn blank_write_role_is_rejected() {
        let cfg = CoreConfig::new(StoreBackend::Local, String::new(), String::new());
        assert!(cfg.with_write_role(" ").is_err());
    }

    #[test]
    fn required_env_value_rejects_missing() {
        assert!(required_env_value("STORAGE_PATIENTS_NAME", None).is_err());
        assert_eq!(
            required_env_value("STORAGE_PATIENTS_NAME", Some("Patients".into())).unwrap(),
            "Patients"
        );
    }
}
