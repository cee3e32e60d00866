use super::PatientStore;
use crate::error::PatientResult;
use crate::patient::{Patient, UpdatePatch};
use async_trait::async_trait;
use phcare_types::PatientId;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-process patient store.
///
/// Records live in a `BTreeMap` behind a `tokio` read/write lock, so listings come back ordered
/// by `PatientID`. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryPatientStore {
    records: RwLock<BTreeMap<PatientId, Patient>>,
}

impl InMemoryPatientStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `patients`.
    pub fn with_patients(patients: impl IntoIterator<Item = Patient>) -> Self {
        let records = patients
            .into_iter()
            .map(|patient| (patient.id.clone(), patient))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl PatientStore for InMemoryPatientStore {
    async fn get(&self, id: &PatientId) -> PatientResult<Option<Patient>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> PatientResult<Vec<Patient>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn search(&self, query: &str) -> PatientResult<Vec<Patient>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|patient| patient.matches_search(query))
            .cloned()
            .collect())
    }

    async fn put(&self, patient: &Patient) -> PatientResult<()> {
        self.records
            .write()
            .await
            .insert(patient.id.clone(), patient.clone());
        Ok(())
    }

    async fn update(&self, id: &PatientId, patch: &UpdatePatch) -> PatientResult<Option<Patient>> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(id).map(|patient| {
            patient.apply(patch);
            patient.clone()
        }))
    }

    async fn delete(&self, id: &PatientId) -> PatientResult<()> {
        self.records.write().await.remove(id);
        Ok(())
    }
}
