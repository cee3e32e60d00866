//! Patient records and partial updates.
//!
//! A [`Patient`] is a `PatientID` plus an open-ended set of named attributes. Records serialize
//! flat, exactly as they are stored:
//!
//! ```json
//! { "PatientID": "7", "FirstName": "Ada", "LastName": "Lovelace" }
//! ```

use crate::constants::{FIRST_NAME_ATTRIBUTE, LAST_NAME_ATTRIBUTE, PATIENT_ID_ATTRIBUTE};
use crate::error::{ApiError, ApiResult, PatientError, PatientResult};
use phcare_types::{PatientId, TextError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(rename = "PatientID")]
    pub id: PatientId,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl Patient {
    pub fn new(id: PatientId) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builds a record from a create request body.
    ///
    /// # Errors
    /// Returns `ApiError::Validation` if `PatientID` is missing, not a string, blank, or contains
    /// `/`, or if any attribute name is empty.
    pub fn from_create_body(mut body: Map<String, Value>) -> ApiResult<Self> {
        let id = match body.remove(PATIENT_ID_ATTRIBUTE) {
            Some(Value::String(id)) => PatientId::parse(id).map_err(|e| match e {
                TextError::Empty => ApiError::validation("PatientID is required"),
                TextError::ContainsSeparator => {
                    ApiError::validation("PatientID must not contain '/'")
                }
            })?,
            _ => return Err(ApiError::validation("PatientID is required")),
        };

        reject_empty_attribute_names(body.keys())?;

        Ok(Self {
            id,
            attributes: body.into_iter().collect(),
        })
    }

    /// Parses a record read back from a store.
    ///
    /// # Errors
    /// Returns `PatientError::MalformedRecord` when the stored item has no usable `PatientID`.
    pub fn from_stored(item: Map<String, Value>) -> PatientResult<Self> {
        serde_json::from_value(Value::Object(item))
            .map_err(|e| PatientError::MalformedRecord(e.to_string()))
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Whether `query` is a substring of the first-name or last-name attribute.
    ///
    /// Matching is case-sensitive and only string attributes can match, mirroring the store's
    /// native `contains()` filter.
    pub fn matches_search(&self, query: &str) -> bool {
        [FIRST_NAME_ATTRIBUTE, LAST_NAME_ATTRIBUTE]
            .into_iter()
            .filter_map(|name| self.attribute(name).and_then(Value::as_str))
            .any(|value| value.contains(query))
    }

    /// Applies a patch in place. The key never changes.
    pub fn apply(&mut self, patch: &UpdatePatch) {
        for (name, value) in patch.iter() {
            self.attributes.insert(name.to_owned(), value.clone());
        }
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::with_capacity(self.attributes.len() + 1);
        object.insert(
            PATIENT_ID_ATTRIBUTE.to_owned(),
            Value::String(self.id.as_str().to_owned()),
        );
        for (name, value) in &self.attributes {
            object.insert(name.clone(), value.clone());
        }
        Value::Object(object)
    }
}

/// Attributes to change during an update, in a stable order.
///
/// The key attribute is never part of a patch: it is dropped while the patch is built, so no
/// caller-supplied value can reach the store's update primitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatePatch {
    changes: Vec<(String, Value)>,
}

impl UpdatePatch {
    /// Builds a patch from a partial record.
    ///
    /// # Errors
    /// Returns `ApiError::Validation` if any attribute name is empty.
    pub fn from_body(mut body: Map<String, Value>) -> ApiResult<Self> {
        if body.remove(PATIENT_ID_ATTRIBUTE).is_some() {
            tracing::debug!("ignoring PatientID supplied in update body");
        }
        reject_empty_attribute_names(body.keys())?;

        let mut changes: Vec<(String, Value)> = body.into_iter().collect();
        changes.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self { changes })
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.changes.iter().map(|(name, value)| (name.as_str(), value))
    }
}

fn reject_empty_attribute_names<'a>(mut names: impl Iterator<Item = &'a String>) -> ApiResult<()> {
    if names.any(|name| name.is_empty()) {
        return Err(ApiError::validation("attribute names cannot be empty"));
    }
    Ok(())
}
