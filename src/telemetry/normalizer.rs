// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/devicewatch

//! Input normalizer

use chrono::Utc;
use serde_json::Value;

use super::TelemetryEvent;
use crate::error::MalformedInputError;

/// Parse a raw payload into a telemetry event
pub fn normalize(raw: &[u8]) -> Result<TelemetryEvent, MalformedInputError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| MalformedInputError::InvalidJson(e.to_string()))?;
    normalize_value(&value)
}

/// Extract `deviceType`, `deviceID` and a numeric `deviceData` from a JSON object
pub fn normalize_value(value: &Value) -> Result<TelemetryEvent, MalformedInputError> {
    let obj = value.as_object().ok_or(MalformedInputError::NotAnObject)?;

    let device_type = match obj.get("deviceType") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            return Err(MalformedInputError::MissingField("deviceType"))
        }
        Some(_) => {
            return Err(MalformedInputError::WrongType {
                field: "deviceType",
                expected: "string",
            })
        }
    };

    // Device ids are sometimes sent as bare numbers.
    let device_id = match obj.get("deviceID") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            return Err(MalformedInputError::MissingField("deviceID"))
        }
        Some(_) => {
            return Err(MalformedInputError::WrongType {
                field: "deviceID",
                expected: "string",
            })
        }
    };

    let device_data = match obj.get("deviceData") {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| MalformedInputError::NonNumericReading(n.to_string()))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| MalformedInputError::NonNumericReading(s.clone()))?,
        None | Some(Value::Null) => return Err(MalformedInputError::MissingField("deviceData")),
        Some(other) => return Err(MalformedInputError::NonNumericReading(other.to_string())),
    };

    if !device_data.is_finite() {
        return Err(MalformedInputError::NonNumericReading(device_data.to_string()));
    }

    Ok(TelemetryEvent {
        device_type,
        device_id,
        device_data,
        received_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_event() {
        let event = normalize(br#"{"deviceType":"RM_Accelerator","deviceID":"AWS98765","deviceData":4100}"#)
            .unwrap();
        assert_eq!(event.device_type, "RM_Accelerator");
        assert_eq!(event.device_id, "AWS98765");
        assert_eq!(event.device_data, 4100.0);
    }

    #[test]
    fn test_numeric_string_and_numeric_id_accepted() {
        let event = normalize_value(&json!({
            "deviceType": "RM_Accelerator",
            "deviceID": 1234,
            "deviceData": " 17.5 "
        }))
        .unwrap();
        assert_eq!(event.device_id, "1234");
        assert_eq!(event.device_data, 17.5);
    }

    #[test]
    fn test_non_numeric_reading_rejected() {
        let err = normalize_value(&json!({
            "deviceType": "t", "deviceID": "d", "deviceData": "high"
        }))
        .unwrap_err();
        assert_eq!(err, MalformedInputError::NonNumericReading("high".to_string()));

        let err = normalize_value(&json!({
            "deviceType": "t", "deviceID": "d", "deviceData": [1, 2]
        }))
        .unwrap_err();
        assert!(matches!(err, MalformedInputError::NonNumericReading(_)));
    }

    #[test]
    fn test_non_finite_string_rejected() {
        let err = normalize_value(&json!({
            "deviceType": "t", "deviceID": "d", "deviceData": "NaN"
        }))
        .unwrap_err();
        assert!(matches!(err, MalformedInputError::NonNumericReading(_)));
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert_eq!(
            normalize_value(&json!({ "deviceID": "d", "deviceData": 1 })).unwrap_err(),
            MalformedInputError::MissingField("deviceType")
        );
        assert_eq!(
            normalize_value(&json!({ "deviceType": "t", "deviceID": "", "deviceData": 1 }))
                .unwrap_err(),
            MalformedInputError::MissingField("deviceID")
        );
        assert_eq!(
            normalize_value(&json!({ "deviceType": "t", "deviceID": "d" })).unwrap_err(),
            MalformedInputError::MissingField("deviceData")
        );
    }

    #[test]
    fn test_not_json_or_not_object() {
        assert!(matches!(normalize(b"not json"), Err(MalformedInputError::InvalidJson(_))));
        assert_eq!(normalize(b"[1,2,3]").unwrap_err(), MalformedInputError::NotAnObject);
    }

    #[test]
    fn test_wrong_type_device_type() {
        assert_eq!(
            normalize_value(&json!({ "deviceType": 7, "deviceID": "d", "deviceData": 1 }))
                .unwrap_err(),
            MalformedInputError::WrongType {
                field: "deviceType",
                expected: "string"
            }
        );
    }
}
