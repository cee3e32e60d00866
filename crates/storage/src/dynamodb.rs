//! DynamoDB patient store.
//!
//! One item per patient, partition key `PatientID`. Updates are expressed as a `SET` expression
//! whose attribute names and values are bound through `#aN` / `:vN` placeholders, guarded by
//! `attribute_exists` so an update can never create a record.

use crate::attributes::{item_from_patient, patient_from_item, to_attribute, Item};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use phcare_core::constants::{FIRST_NAME_ATTRIBUTE, LAST_NAME_ATTRIBUTE, PATIENT_ID_ATTRIBUTE};
use phcare_core::{Patient, PatientError, PatientId, PatientResult, PatientStore, UpdatePatch};
use std::collections::HashMap;

const KEY_PLACEHOLDER: &str = "#pk";

/// A `SET` update expression with its placeholder bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

impl UpdateExpression {
    /// Builds `SET #a0 = :v0, #a1 = :v1, ...` in patch order. Returns `None` for an empty patch.
    pub fn from_patch(patch: &UpdatePatch) -> Option<Self> {
        if patch.is_empty() {
            return None;
        }

        let mut assignments = Vec::with_capacity(patch.len());
        let mut names = HashMap::with_capacity(patch.len() + 1);
        let mut values = HashMap::with_capacity(patch.len());

        for (index, (name, value)) in patch.iter().enumerate() {
            let name_placeholder = format!("#a{index}");
            let value_placeholder = format!(":v{index}");
            assignments.push(format!("{name_placeholder} = {value_placeholder}"));
            names.insert(name_placeholder, name.to_owned());
            values.insert(value_placeholder, to_attribute(value));
        }
        names.insert(KEY_PLACEHOLDER.to_owned(), PATIENT_ID_ATTRIBUTE.to_owned());

        Some(Self {
            expression: format!("SET {}", assignments.join(", ")),
            names,
            values,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DynamoPatientStore {
    client: Client,
    table_name: String,
}

impl DynamoPatientStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    fn key(id: &PatientId) -> AttributeValue {
        AttributeValue::S(id.as_str().to_owned())
    }

    /// Runs a scan to completion, following `LastEvaluatedKey`.
    async fn scan(
        &self,
        filter: Option<(String, HashMap<String, String>, HashMap<String, AttributeValue>)>,
    ) -> PatientResult<Vec<Patient>> {
        let (filter_expression, names, values) = match filter {
            Some((expression, names, values)) => (Some(expression), Some(names), Some(values)),
            None => (None, None, None),
        };

        let mut patients = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_filter_expression(filter_expression.clone())
                .set_expression_attribute_names(names.clone())
                .set_expression_attribute_values(values.clone())
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| PatientError::backend("scan failed", DisplayErrorContext(e)))?;

            patients.extend(readable_patients(output.items()));

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(patients)
    }
}

/// Converts scanned items, skipping any that do not form a valid patient.
fn readable_patients(items: &[Item]) -> Vec<Patient> {
    items
        .iter()
        .filter_map(|item| match patient_from_item(item) {
            Ok(patient) => Some(patient),
            Err(e) => {
                let key = item.get(PATIENT_ID_ATTRIBUTE).and_then(|key| key.as_s().ok());
                tracing::warn!(patient_id = ?key, "skipping unreadable patient item: {e}");
                None
            }
        })
        .collect()
}

#[async_trait]
impl PatientStore for DynamoPatientStore {
    async fn get(&self, id: &PatientId) -> PatientResult<Option<Patient>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(PATIENT_ID_ATTRIBUTE, Self::key(id))
            .send()
            .await
            .map_err(|e| PatientError::backend("get_item failed", DisplayErrorContext(e)))?;

        output.item().map(patient_from_item).transpose()
    }

    async fn list(&self) -> PatientResult<Vec<Patient>> {
        self.scan(None).await
    }

    async fn search(&self, query: &str) -> PatientResult<Vec<Patient>> {
        if query.is_empty() {
            return self.list().await;
        }

        let names = HashMap::from([
            ("#first".to_owned(), FIRST_NAME_ATTRIBUTE.to_owned()),
            ("#last".to_owned(), LAST_NAME_ATTRIBUTE.to_owned()),
        ]);
        let values = HashMap::from([(":q".to_owned(), AttributeValue::S(query.to_owned()))]);
        let patients = self
            .scan(Some((
                "contains(#first, :q) OR contains(#last, :q)".to_owned(),
                names,
                values,
            )))
            .await?;

        // contains() also matches set members; keep string matches only.
        Ok(patients
            .into_iter()
            .filter(|patient| patient.matches_search(query))
            .collect())
    }

    async fn put(&self, patient: &Patient) -> PatientResult<()> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item_from_patient(patient)))
            .send()
            .await
            .map_err(|e| PatientError::backend("put_item failed", DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn update(&self, id: &PatientId, patch: &UpdatePatch) -> PatientResult<Option<Patient>> {
        let Some(update) = UpdateExpression::from_patch(patch) else {
            return self.get(id).await;
        };

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(PATIENT_ID_ATTRIBUTE, Self::key(id))
            .update_expression(update.expression)
            .condition_expression(format!("attribute_exists({KEY_PLACEHOLDER})"))
            .set_expression_attribute_names(Some(update.names))
            .set_expression_attribute_values(Some(update.values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await;

        match result {
            Ok(output) => output.attributes().map(patient_from_item).transpose(),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                tracing::debug!(patient_id = %id, "update skipped, no such patient");
                Ok(None)
            }
            Err(e) => Err(PatientError::backend(
                "update_item failed",
                DisplayErrorContext(e),
            )),
        }
    }

    async fn delete(&self, id: &PatientId) -> PatientResult<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(PATIENT_ID_ATTRIBUTE, Self::key(id))
            .send()
            .await
            .map_err(|e| PatientError::backend("delete_item failed", DisplayErrorContext(e)))?;
        Ok(())
    }
}
