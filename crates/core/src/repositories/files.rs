//! File-backed patient store for the local backend.
//!
//! ## Storage Layout
//!
//! Patient IDs are arbitrary strings, so each record is placed under a directory named after the
//! SHA-256 of its ID, sharded on the first four hex characters:
//!
//! ```text
//! patient_data/
//!   <h[0..2]>/
//!     <h[2..4]>/
//!       <h>/
//!         patient.json
//! ```
//!
//! `patient.json` holds the flat record, `PatientID` included, so listing never needs to reverse
//! the hash. Blocking filesystem work runs on the `tokio` blocking pool.

use super::PatientStore;
use crate::constants::PATIENT_JSON_FILENAME;
use crate::error::{PatientError, PatientResult};
use crate::patient::{Patient, UpdatePatch};
use async_trait::async_trait;
use phcare_types::PatientId;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct FilePatientStore {
    root: Arc<PathBuf>,
    // Serialises writes within this process so an update never reads a half-replaced record.
    write_lock: Arc<Mutex<()>>,
}

impl FilePatientStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Directory holding the record for `id`.
    pub fn sharded_dir(&self, id: &PatientId) -> PathBuf {
        sharded_dir(&self.root, id)
    }

    async fn blocking<T, F>(&self, f: F) -> PatientResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> PatientResult<T> + Send + 'static,
    {
        let root = Arc::clone(&self.root);
        tokio::task::spawn_blocking(move || f(&root)).await?
    }
}

fn sharded_dir(root: &Path, id: &PatientId) -> PathBuf {
    let digest = hex::encode(Sha256::digest(id.as_str().as_bytes()));
    root.join(&digest[0..2]).join(&digest[2..4]).join(&digest)
}

fn read_patient(path: &Path) -> PatientResult<Option<Patient>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PatientError::FileRead(e)),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(PatientError::Deserialization)
}

fn write_patient(root: &Path, patient: &Patient) -> PatientResult<()> {
    let dir = sharded_dir(root, &patient.id);
    fs::create_dir_all(&dir).map_err(PatientError::PatientDirCreation)?;

    let contents = serde_json::to_string_pretty(patient).map_err(PatientError::Serialization)?;
    let target = dir.join(PATIENT_JSON_FILENAME);
    // Each write stages into its own file in the record directory, then renames over the target.
    let mut staging = NamedTempFile::new_in(&dir).map_err(PatientError::FileWrite)?;
    staging
        .write_all(contents.as_bytes())
        .map_err(PatientError::FileWrite)?;
    staging
        .persist(&target)
        .map(|_| ())
        .map_err(|e| PatientError::FileWrite(e.error))
}

/// Walks `<root>/<s1>/<s2>/<hash>/patient.json`, skipping anything unreadable.
fn walk_patients(root: &Path) -> Vec<Patient> {
    let mut patients = Vec::new();

    let Ok(s1_iter) = fs::read_dir(root) else {
        return patients;
    };
    for s1 in s1_iter.flatten() {
        let Ok(s2_iter) = fs::read_dir(s1.path()) else {
            continue;
        };
        for s2 in s2_iter.flatten() {
            let Ok(id_iter) = fs::read_dir(s2.path()) else {
                continue;
            };
            for id_ent in id_iter.flatten() {
                let patient_path = id_ent.path().join(PATIENT_JSON_FILENAME);
                if !patient_path.is_file() {
                    continue;
                }
                match read_patient(&patient_path) {
                    Ok(Some(patient)) => patients.push(patient),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("skipping unreadable patient file {}: {e}", patient_path.display());
                    }
                }
            }
        }
    }

    patients
}

#[async_trait]
impl PatientStore for FilePatientStore {
    async fn get(&self, id: &PatientId) -> PatientResult<Option<Patient>> {
        let id = id.clone();
        self.blocking(move |root| read_patient(&sharded_dir(root, &id).join(PATIENT_JSON_FILENAME)))
            .await
    }

    async fn list(&self) -> PatientResult<Vec<Patient>> {
        self.blocking(|root| Ok(walk_patients(root))).await
    }

    async fn search(&self, query: &str) -> PatientResult<Vec<Patient>> {
        let query = query.to_owned();
        self.blocking(move |root| {
            Ok(walk_patients(root)
                .into_iter()
                .filter(|patient| patient.matches_search(&query))
                .collect())
        })
        .await
    }

    async fn put(&self, patient: &Patient) -> PatientResult<()> {
        let _guard = self.write_lock.lock().await;
        let patient = patient.clone();
        self.blocking(move |root| write_patient(root, &patient)).await
    }

    async fn update(&self, id: &PatientId, patch: &UpdatePatch) -> PatientResult<Option<Patient>> {
        let _guard = self.write_lock.lock().await;
        let id = id.clone();
        let patch = patch.clone();
        self.blocking(move |root| {
            let path = sharded_dir(root, &id).join(PATIENT_JSON_FILENAME);
            let Some(mut patient) = read_patient(&path)? else {
                return Ok(None);
            };
            patient.apply(&patch);
            write_patient(root, &patient)?;
            Ok(Some(patient))
        })
        .await
    }

    async fn delete(&self, id: &PatientId) -> PatientResult<()> {
        let _guard = self.write_lock.lock().await;
        let id = id.clone();
        self.blocking(move |root| match fs::remove_dir_all(sharded_dir(root, &id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PatientError::FileRemove(e)),
        })
        .await
    }
}
