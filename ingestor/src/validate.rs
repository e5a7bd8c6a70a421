use crate::errors::{Error, Result};
use crate::model::{RawReport, ValidReport};
use serde_json::Value;

/// Validates an inbound report before anything touches a store.
pub fn validate(report: RawReport) -> Result<ValidReport> {
    let uid = match report.uid {
        Some(Value::String(uid)) if !uid.trim().is_empty() => uid,
        Some(Value::String(_)) | None | Some(Value::Null) => {
            return Err(Error::Validation("missing uid or data field".to_string()));
        }
        Some(other) => {
            return Err(Error::Validation(format!(
                "uid must be a string, got {}",
                type_name(&other)
            )));
        }
    };

    let payload = match report.data {
        Some(Value::Object(map)) if !map.is_empty() => map,
        Some(Value::Object(_)) | None | Some(Value::Null) => {
            return Err(Error::Validation("missing uid or data field".to_string()));
        }
        Some(other) => {
            return Err(Error::Validation(format!(
                "data must be an object, got {}",
                type_name(&other)
            )));
        }
    };

    Ok(ValidReport { uid, payload })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(body: Value) -> RawReport {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_valid_report() {
        let valid = validate(report(json!({"uid": "SIM001", "data": {"temp": 60}}))).unwrap();

        assert_eq!(valid.uid, "SIM001");
        assert_eq!(valid.payload.get("temp"), Some(&json!(60)));
    }

    #[test]
    fn test_missing_uid() {
        assert!(matches!(
            validate(report(json!({"data": {"temp": 60}}))),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_empty_uid() {
        assert!(validate(report(json!({"uid": "", "data": {"temp": 60}}))).is_err());
        assert!(validate(report(json!({"uid": "   ", "data": {"temp": 60}}))).is_err());
    }

    #[test]
    fn test_non_string_uid() {
        assert!(validate(report(json!({"uid": 42, "data": {"temp": 60}}))).is_err());
    }

    #[test]
    fn test_missing_or_null_data() {
        assert!(validate(report(json!({"uid": "SIM001"}))).is_err());
        assert!(validate(report(json!({"uid": "SIM001", "data": null}))).is_err());
    }

    #[test]
    fn test_empty_data() {
        assert!(validate(report(json!({"uid": "SIM001", "data": {}}))).is_err());
    }

    #[test]
    fn test_unstructured_data() {
        assert!(validate(report(json!({"uid": "SIM001", "data": 60}))).is_err());
        assert!(validate(report(json!({"uid": "SIM001", "data": "hot"}))).is_err());
        assert!(validate(report(json!({"uid": "SIM001", "data": [1, 2]}))).is_err());
    }

    #[test]
    fn test_heterogeneous_payload_is_accepted() {
        let valid = validate(report(json!({
            "uid": "SIM001",
            "data": {"rpm": 1500, "alarm": "fire_detected"}
        })))
        .unwrap();

        assert_eq!(valid.payload.len(), 2);
    }
}
