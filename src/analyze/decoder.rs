//! Response decoder: turns a raw model reply into a typed record.
//!
//! Steps:
//! 1. trim,
//! 2. strip a leading markdown fence (```` ```json ````) and a trailing one,
//! 3. parse one JSON object (`NotJson` otherwise, raw text kept),
//! 4. substitute per-field defaults for absent keys (see `IMAGE_DEFAULTS` / `DESCRIPTION_DEFAULTS`),
//! 5. validate types and ranges (`SchemaInvalid` with every violation listed).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::analyze::types::{DescriptionAnalysis, ImageAnalysis, Severity, SIMILARITY_NOT_APPLICABLE};

/// Substituted for absent string fields.
pub const UNKNOWN: &str = "unknown";

/// Default table for the image-analysis schema: (key, value used when absent or null).
pub const IMAGE_DEFAULTS: &[(&str, FieldDefault)] = &[
    ("disaster_probability", FieldDefault::Number(0.0)),
    ("disaster_type", FieldDefault::Text(UNKNOWN)),
    ("disaster_severity", FieldDefault::Text(UNKNOWN)),
    ("reasoning", FieldDefault::Text(UNKNOWN)),
];

/// Default table for the description-analysis schema.
pub const DESCRIPTION_DEFAULTS: &[(&str, FieldDefault)] = &[
    ("similarity_score", FieldDefault::Number(0.0)),
    ("reformulated_description", FieldDefault::Text(UNKNOWN)),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Number(f64),
    Text(&'static str),
}

/// Which reply shape the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    ImageAnalysis,
    DescriptionAnalysis,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Image(ImageAnalysis),
    Description(DescriptionAnalysis),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("model reply is not a JSON object")]
    NotJson { raw: String },
    #[error("model reply failed validation: {}", describe(.violations))]
    SchemaInvalid { violations: Vec<FieldViolation> },
}

fn describe(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z]*[ \t]*\r?\n?").expect("fence open regex"));
static FENCE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r?\n?[ \t]*```$").expect("fence close regex"));

/// Trim and remove an optional markdown code fence around the reply.
pub fn strip_fence(raw: &str) -> &str {
    let text = raw.trim();
    if !text.starts_with("```") {
        return text;
    }
    let start = FENCE_OPEN.find(text).map(|m| m.end()).unwrap_or(0);
    let inner = &text[start..];
    let end = FENCE_CLOSE
        .find(inner)
        .map(|m| m.start())
        .unwrap_or(inner.len());
    inner[..end].trim()
}

/// Generic entry point: decode `raw` against `schema`.
pub fn decode(raw: &str, schema: Schema) -> Result<Record, DecodeError> {
    match schema {
        Schema::ImageAnalysis => decode_image_analysis(raw).map(Record::Image),
        Schema::DescriptionAnalysis => decode_description_analysis(raw).map(Record::Description),
    }
}

pub fn decode_image_analysis(raw: &str) -> Result<ImageAnalysis, DecodeError> {
    let obj = parse_object(raw)?;
    let mut violations = Vec::new();

    let probability = unit_number(&obj, "disaster_probability", IMAGE_DEFAULTS, &mut violations);
    let incident_type = text(&obj, "disaster_type", IMAGE_DEFAULTS, &mut violations);
    let severity_label = text(&obj, "disaster_severity", IMAGE_DEFAULTS, &mut violations);
    let reasoning = text(&obj, "reasoning", IMAGE_DEFAULTS, &mut violations);

    let severity = if severity_label.trim().eq_ignore_ascii_case(UNKNOWN) {
        Severity::Unknown
    } else {
        match Severity::parse_label(&severity_label) {
            Some(s) => s,
            None => {
                violations.push(FieldViolation::new(
                    "disaster_severity",
                    format!("expected one of Low, Medium, High, got '{severity_label}'"),
                ));
                Severity::Unknown
            }
        }
    };

    if !violations.is_empty() {
        return Err(DecodeError::SchemaInvalid { violations });
    }

    Ok(ImageAnalysis {
        probability,
        incident_type,
        severity,
        reasoning,
    })
}

/// Decodes the description reply. A `-1` similarity becomes `None`; whether that is
/// acceptable depends on the reconciler mode and is checked there.
pub fn decode_description_analysis(raw: &str) -> Result<DescriptionAnalysis, DecodeError> {
    decode_description(raw, true)
}

/// Decodes only the public description; the similarity field is not read at all
/// and comes back as "not applicable". Used when the user supplied no description.
pub fn decode_description_summary(raw: &str) -> Result<DescriptionAnalysis, DecodeError> {
    decode_description(raw, false)
}

fn decode_description(raw: &str, with_similarity: bool) -> Result<DescriptionAnalysis, DecodeError> {
    let obj = parse_object(raw)?;
    let mut violations = Vec::new();

    let similarity = if with_similarity {
        similarity(&obj, &mut violations)
    } else {
        None
    };
    let reformulated_description = text(
        &obj,
        "reformulated_description",
        DESCRIPTION_DEFAULTS,
        &mut violations,
    );

    if !violations.is_empty() {
        return Err(DecodeError::SchemaInvalid { violations });
    }

    Ok(DescriptionAnalysis {
        similarity,
        reformulated_description,
    })
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, DecodeError> {
    let body = strip_fence(raw);
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(DecodeError::NotJson {
            raw: raw.to_string(),
        }),
    }
}

fn default_for(table: &[(&str, FieldDefault)], key: &str) -> FieldDefault {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, d)| *d)
        .unwrap_or(FieldDefault::Text(UNKNOWN))
}

/// Absent and `null` both count as missing.
fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn text(
    obj: &Map<String, Value>,
    key: &str,
    table: &[(&str, FieldDefault)],
    violations: &mut Vec<FieldViolation>,
) -> String {
    match present(obj, key) {
        None => match default_for(table, key) {
            FieldDefault::Text(t) => t.to_string(),
            FieldDefault::Number(n) => n.to_string(),
        },
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            violations.push(FieldViolation::new(
                key,
                format!("expected a string, got {}", json_kind(other)),
            ));
            String::new()
        }
    }
}

fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|x| x.is_finite())
}

fn unit_number(
    obj: &Map<String, Value>,
    key: &str,
    table: &[(&str, FieldDefault)],
    violations: &mut Vec<FieldViolation>,
) -> f64 {
    let Some(v) = present(obj, key) else {
        return match default_for(table, key) {
            FieldDefault::Number(n) => n,
            FieldDefault::Text(_) => 0.0,
        };
    };
    match coerce_number(v) {
        Some(x) if (0.0..=1.0).contains(&x) => x,
        Some(x) => {
            violations.push(FieldViolation::new(
                key,
                format!("expected a value in [0, 1], got {x}"),
            ));
            0.0
        }
        None => {
            violations.push(FieldViolation::new(
                key,
                format!("expected a number, got {}", json_kind(v)),
            ));
            0.0
        }
    }
}

fn similarity(obj: &Map<String, Value>, violations: &mut Vec<FieldViolation>) -> Option<f64> {
    const KEY: &str = "similarity_score";
    let Some(v) = present(obj, KEY) else {
        return match default_for(DESCRIPTION_DEFAULTS, KEY) {
            FieldDefault::Number(n) => Some(n),
            FieldDefault::Text(_) => Some(0.0),
        };
    };
    match coerce_number(v) {
        Some(x) if x == SIMILARITY_NOT_APPLICABLE => None,
        Some(x) if (0.0..=1.0).contains(&x) => Some(x),
        Some(x) => {
            violations.push(FieldViolation::new(
                KEY,
                format!("expected -1 or a value in [0, 1], got {x}"),
            ));
            None
        }
        None => {
            violations.push(FieldViolation::new(
                KEY,
                format!("expected a number, got {}", json_kind(v)),
            ));
            None
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
