//! Patient store adapters.
//!
//! [`PatientStore`] is the narrow contract the handler relies on. This crate ships two local
//! implementations; the DynamoDB one lives in `phcare-storage`.
//!
//! - [`memory::InMemoryPatientStore`]: process-local map, used by tests and the dev server.
//! - [`files::FilePatientStore`]: sharded JSON files under `PATIENT_DATA_DIR`.

use crate::error::PatientResult;
use crate::patient::{Patient, UpdatePatch};
use async_trait::async_trait;
use phcare_types::PatientId;

pub mod files;
pub mod memory;

/// Key-value access to patient records.
///
/// Implementations must be safe to share between concurrent requests. Every method returns only
/// once the backing store has acknowledged the operation.
#[async_trait]
pub trait PatientStore: Send + Sync {
    /// Fetches one record. Absence is `Ok(None)`, never an error.
    async fn get(&self, id: &PatientId) -> PatientResult<Option<Patient>>;

    /// Every record, in store-native order.
    async fn list(&self) -> PatientResult<Vec<Patient>>;

    /// Records whose `FirstName` or `LastName` contains `query` (case-sensitive substring).
    async fn search(&self, query: &str) -> PatientResult<Vec<Patient>>;

    /// Writes a whole record, replacing any record with the same id.
    async fn put(&self, patient: &Patient) -> PatientResult<()>;

    /// Sets only the attributes named in `patch` on an existing record.
    ///
    /// Returns the record as stored after the update, or `Ok(None)` if no record with `id`
    /// exists (an update never creates a record).
    async fn update(&self, id: &PatientId, patch: &UpdatePatch) -> PatientResult<Option<Patient>>;

    /// Removes a record. Deleting an absent id succeeds.
    async fn delete(&self, id: &PatientId) -> PatientResult<()>;
}
