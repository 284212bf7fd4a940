use idverify::engine::RawRecognition;
use idverify::interpret::{self, DocumentType, InterpretError};

fn raw(payload: &str) -> RawRecognition {
    RawRecognition {
        stdout: payload.as_bytes().to_vec(),
        stderr: String::new(),
        duration_ms: 0,
    }
}

#[test]
fn student_id_with_all_fields_verifies() {
    let out = raw(r#"{"studentId": "S12345", "name": "Asha Rao"}"#);
    let result = interpret::interpret(&out, DocumentType::StudentId).unwrap();
    assert!(result.verified);
    assert_eq!(result.extracted_fields["studentId"], "S12345");
    assert_eq!(result.extracted_fields["name"], "Asha Rao");
}

#[test]
fn pan_failing_pattern_is_unverified_not_error() {
    let out = raw(r#"{"pan": "INVALID1", "name": "Asha Rao"}"#);
    let result = interpret::interpret(&out, DocumentType::PanCard).unwrap();
    assert!(!result.verified);
    assert_eq!(result.extracted_fields["pan"], "INVALID1");
}

#[test]
fn pan_matching_pattern_verifies() {
    let out = raw(r#"{"pan": "ABCDE1234F", "name": "Asha Rao"}"#);
    let result = interpret::interpret(&out, DocumentType::PanCard).unwrap();
    assert!(result.verified);
}

#[test]
fn aadhar_round_trip_matches_engine_fields() {
    let out = raw(r#"{"aadhar": "123412341234", "name": "J Doe"}"#);
    let result = interpret::interpret(&out, DocumentType::AadharCard).unwrap();
    assert!(result.verified);
    assert_eq!(result.extracted_fields.len(), 2);
    assert_eq!(result.extracted_fields["aadhar"], "123412341234");
    assert_eq!(result.extracted_fields["name"], "J Doe");

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["documentType"], "AadharCard");
    assert_eq!(json["verified"], true);
    assert_eq!(json["extractedFields"]["aadhar"], "123412341234");
}

#[test]
fn missing_mandatory_field_is_unverified() {
    let out = raw(r#"{"aadhar": "123412341234"}"#);
    let result = interpret::interpret(&out, DocumentType::AadharCard).unwrap();
    assert!(!result.verified);
}

#[test]
fn empty_fields_are_an_outcome_not_a_failure() {
    let result = interpret::interpret(&raw("{}"), DocumentType::StudentId).unwrap();
    assert!(!result.verified);
    assert!(result.extracted_fields.is_empty());
}

#[test]
fn non_json_output_is_malformed() {
    let err = interpret::interpret(&raw("tesseract exploded"), DocumentType::PanCard).unwrap_err();
    assert!(matches!(err, InterpretError::MalformedOutput { .. }));
    assert!(err.to_string().contains("tesseract exploded"));
}

#[test]
fn non_object_json_is_malformed() {
    let err = interpret::interpret(&raw("[1, 2, 3]"), DocumentType::PanCard).unwrap_err();
    assert!(matches!(err, InterpretError::MalformedOutput { .. }));
}

#[test]
fn engine_verdict_fields_are_advisory_only() {
    let out = raw(r#"{"pan": "BAD", "name": "X", "verified": true, "confidence": 0.99}"#);
    let result = interpret::interpret(&out, DocumentType::PanCard).unwrap();
    assert!(!result.verified, "engine's own verdict must not be trusted");
}

#[test]
fn wrapped_fields_object_is_unwrapped() {
    let out = raw(r#"{"fields": {"pan": "ABCDE1234F", "name": "N"}, "confidence": 1.0}"#);
    let result = interpret::interpret(&out, DocumentType::PanCard).unwrap();
    assert!(result.verified);
    assert_eq!(result.extracted_fields["pan"], "ABCDE1234F");
}

#[test]
fn key_matching_ignores_case_and_punctuation() {
    let out = raw(r#"{"Student ID": "S1", "Name": "N"}"#);
    let result = interpret::interpret(&out, DocumentType::StudentId).unwrap();
    assert!(result.verified);
}

#[test]
fn whitespace_only_values_do_not_verify() {
    let out = raw(r#"{"studentId": "   ", "name": "N"}"#);
    let result = interpret::interpret(&out, DocumentType::StudentId).unwrap();
    assert!(!result.verified);
}

#[test]
fn document_type_wire_names_are_closed() {
    assert_eq!(DocumentType::parse("StudentID"), Some(DocumentType::StudentId));
    assert_eq!(DocumentType::parse("PANCard"), Some(DocumentType::PanCard));
    assert_eq!(DocumentType::parse("AadharCard"), Some(DocumentType::AadharCard));
    assert_eq!(DocumentType::parse("aadharcard"), None);
    assert_eq!(DocumentType::parse("DrivingLicense"), None);
}
