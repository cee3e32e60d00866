//! Conversion between JSON values and DynamoDB attribute values.

use aws_sdk_dynamodb::types::AttributeValue;
use phcare_core::{Patient, PatientError, PatientResult};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

pub type Item = HashMap<String, AttributeValue>;

pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(values) => AttributeValue::L(values.iter().map(to_attribute).collect()),
        Value::Object(fields) => AttributeValue::M(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), to_attribute(value)))
                .collect(),
        ),
    }
}

// `arbitrary_precision` keeps the digits DynamoDB returned, so values up to 38 digits survive.
fn number(raw: &str) -> PatientResult<Value> {
    raw.parse::<Number>()
        .map(Value::Number)
        .map_err(|_| PatientError::MalformedRecord(format!("unreadable number {raw:?}")))
}

/// # Errors
/// Returns `PatientError::MalformedRecord` for binary attributes and unreadable numbers.
pub fn from_attribute(attribute: &AttributeValue) -> PatientResult<Value> {
    Ok(match attribute {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => number(n)?,
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::Ss(values) => values.iter().cloned().map(Value::String).collect(),
        AttributeValue::Ns(values) => Value::Array(
            values
                .iter()
                .map(|n| number(n))
                .collect::<PatientResult<_>>()?,
        ),
        AttributeValue::L(values) => Value::Array(
            values
                .iter()
                .map(from_attribute)
                .collect::<PatientResult<_>>()?,
        ),
        AttributeValue::M(fields) => Value::Object(object_from_item(fields)?),
        other => {
            return Err(PatientError::MalformedRecord(format!(
                "unsupported attribute type {other:?}"
            )))
        }
    })
}

fn object_from_item(item: &Item) -> PatientResult<Map<String, Value>> {
    item.iter()
        .map(|(name, attribute)| Ok((name.clone(), from_attribute(attribute)?)))
        .collect()
}

pub fn item_from_patient(patient: &Patient) -> Item {
    match patient.to_json() {
        Value::Object(fields) => fields
            .iter()
            .map(|(name, value)| (name.clone(), to_attribute(value)))
            .collect(),
        _ => Item::new(),
    }
}

/// # Errors
/// Returns `PatientError::MalformedRecord` if the item has no usable `PatientID`.
pub fn patient_from_item(item: &Item) -> PatientResult<Patient> {
    Patient::from_stored(object_from_item(item)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use phcare_core::PatientId;
    use serde_json::json;

    #[test]
    fn scalars_map_to_native_attribute_types() {
        assert_eq!(to_attribute(&json!("Ada")), AttributeValue::S("Ada".into()));
        assert_eq!(to_attribute(&json!(42)), AttributeValue::N("42".into()));
        assert_eq!(to_attribute(&json!(true)), AttributeValue::Bool(true));
        assert_eq!(to_attribute(&Value::Null), AttributeValue::Null(true));
    }

    #[test]
    fn numbers_keep_integer_and_float_forms() {
        assert_eq!(
            from_attribute(&AttributeValue::N("42".into())).unwrap(),
            json!(42)
        );
        assert_eq!(
            from_attribute(&AttributeValue::N("1.5".into())).unwrap(),
            json!(1.5)
        );
        assert!(from_attribute(&AttributeValue::N("forty".into())).is_err());
    }

    #[test]
    fn wide_numbers_keep_every_digit() {
        for raw in [
            "12345678901234567890123456789012345678",
            "0.1000000000000000000001",
            "-98765432109876543210",
        ] {
            let value = from_attribute(&AttributeValue::N(raw.into())).unwrap();
            assert_eq!(value.to_string(), raw);
            assert_eq!(to_attribute(&value), AttributeValue::N(raw.into()));
        }
    }

    #[test]
    fn nested_values_survive_conversion() {
        let value = json!({"allergies": ["penicillin", {"severity": 3}], "active": false});
        assert_eq!(from_attribute(&to_attribute(&value)).unwrap(), value);
    }

    #[test]
    fn string_sets_read_as_arrays() {
        let attribute = AttributeValue::Ss(vec!["Doctor".into(), "Staff".into()]);
        assert_eq!(
            from_attribute(&attribute).unwrap(),
            json!(["Doctor", "Staff"])
        );
    }

    #[test]
    fn patient_items_are_flat_and_keyed() {
        let patient = Patient::new(PatientId::parse("7").unwrap())
            .with_attribute("FirstName", "A")
            .with_attribute("Age", 42);

        let item = item_from_patient(&patient);
        assert_eq!(item["PatientID"], AttributeValue::S("7".into()));
        assert_eq!(item["FirstName"], AttributeValue::S("A".into()));
        assert_eq!(item["Age"], AttributeValue::N("42".into()));

        assert_eq!(patient_from_item(&item).unwrap(), patient);
    }

    #[test]
    fn item_without_key_is_malformed() {
        let item = Item::from([("FirstName".to_owned(), AttributeValue::S("A".into()))]);
        assert!(matches!(
            patient_from_item(&item),
            Err(PatientError::MalformedRecord(_))
        ));
    }
}
