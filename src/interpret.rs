//! Result interpreter: turns raw engine output into a typed verification
//! verdict. The verdict is always recomputed here from the extracted fields;
//! any confidence or verdict field the engine emits is advisory only.

use crate::engine::RawRecognition;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("malformed engine output: {reason} (payload starts: {excerpt:?})")]
    MalformedOutput { reason: String, excerpt: String },
}

/// Caller-declared document kind. Closed set; unknown wire strings are a
/// validation error upstream, never a pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "StudentID")]
    StudentId,
    #[serde(rename = "PANCard")]
    PanCard,
    #[serde(rename = "AadharCard")]
    AadharCard,
}

impl DocumentType {
    pub const WIRE_NAMES: [&'static str; 3] = ["StudentID", "PANCard", "AadharCard"];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "StudentID" => Some(Self::StudentId),
            "PANCard" => Some(Self::PanCard),
            "AadharCard" => Some(Self::AadharCard),
            _ => None,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::StudentId => "StudentID",
            Self::PanCard => "PANCard",
            Self::AadharCard => "AadharCard",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub document_type: DocumentType,
    pub verified: bool,
    pub extracted_fields: HashMap<String, String>,
    /// Parsed engine payload, retained verbatim for audit and debugging.
    pub raw_engine_output: Value,
}

struct MandatoryField {
    /// Canonical name reported in logs.
    name: &'static str,
    /// Accepted engine key spellings, compared after normalization.
    aliases: &'static [&'static str],
    pattern: Option<&'static LazyLock<Regex>>,
}

static PAN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Z]{5}[0-9]{4}[A-Z]$").expect("PAN pattern"));
static AADHAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9]{12}$").expect("Aadhaar pattern"));

fn mandatory_fields(doc: DocumentType) -> &'static [MandatoryField] {
    static STUDENT_ID_FIELDS: [MandatoryField; 2] = [
            MandatoryField {
                name: "student id",
                aliases: &["studentid", "student_id", "id", "idnumber", "rollno"],
                pattern: None,
            },
            MandatoryField {
                name: "name",
                aliases: &["name", "fullname", "studentname"],
                pattern: None,
            },
    ];
    static PAN_CARD_FIELDS: [MandatoryField; 2] = [
            MandatoryField {
                name: "pan",
                aliases: &["pan", "pannumber", "pan_no"],
                pattern: Some(&PAN_PATTERN),
            },
            MandatoryField {
                name: "name",
                aliases: &["name", "fullname", "holdername"],
                pattern: None,
            },
    ];
    static AADHAR_CARD_FIELDS: [MandatoryField; 2] = [
            MandatoryField {
                name: "aadhar",
                aliases: &["aadhar", "aadhaar", "aadharnumber", "aadhaarnumber", "uid"],
                pattern: Some(&AADHAR_PATTERN),
            },
            MandatoryField {
                name: "name",
                aliases: &["name", "fullname", "holdername"],
                pattern: None,
            },
    ];
    match doc {
        DocumentType::StudentId => &STUDENT_ID_FIELDS,
        DocumentType::PanCard => &PAN_CARD_FIELDS,
        DocumentType::AadharCard => &AADHAR_CARD_FIELDS,
    }
}

/// Parse raw engine stdout and compute the verdict for the declared type.
///
/// Unknown or missing fields are a verification outcome (`verified = false`),
/// not an error; only an unparseable payload is `MalformedOutput`.
pub fn interpret(
    raw: &RawRecognition,
    document_type: DocumentType,
) -> Result<VerificationResult, InterpretError> {
    let value: Value =
        serde_json::from_slice(&raw.stdout).map_err(|e| InterpretError::MalformedOutput {
            reason: e.to_string(),
            excerpt: excerpt(&raw.stdout),
        })?;

    let root = value
        .as_object()
        .ok_or_else(|| InterpretError::MalformedOutput {
            reason: "expected a JSON object".to_string(),
            excerpt: excerpt(&raw.stdout),
        })?;

    // Engines that wrap their result use a top-level "fields" object; flat
    // outputs are the object itself.
    let source = root
        .get("fields")
        .and_then(Value::as_object)
        .unwrap_or(root);

    let mut extracted: HashMap<String, String> = HashMap::new();
    for (key, val) in source {
        let text = match val {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        extracted.entry(key.clone()).or_insert(text);
    }

    let by_normalized: HashMap<String, &str> = extracted
        .iter()
        .map(|(k, v)| (normalize_key(k), v.as_str()))
        .collect();

    let mut verified = true;
    for field in mandatory_fields(document_type) {
        let found = field
            .aliases
            .iter()
            .find_map(|alias| by_normalized.get(*alias).copied())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let ok = match (found, field.pattern) {
            (Some(v), Some(pattern)) => pattern.is_match(v),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !ok {
            tracing::debug!(
                doc_type = document_type.wire_name(),
                field = field.name,
                present = found.is_some(),
                "mandatory field check failed"
            );
            verified = false;
        }
    }

    Ok(VerificationResult {
        document_type,
        verified,
        extracted_fields: extracted,
        raw_engine_output: value,
    })
}

/// Lowercase and strip everything but ASCII alphanumerics, so "Student ID",
/// "student_id" and "studentId" all compare equal.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn excerpt(bytes: &[u8]) -> String {
    const MAX: usize = 120;
    let text = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX)]);
    text.into_owned()
}
