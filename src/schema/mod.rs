//! Per-column validation rules for survey imports.
//!
//! A schema description arrives as a JSON object mapping column names to
//! rule descriptions:
//!
//! ```json
//! {
//!     "Edad": { "type": "number" },
//!     "Satisfaccion": { "type": "scale", "min": 0, "max": 10 },
//!     "Departamento": { "type": "single", "options": ["Ventas", "IT", "RRHH"] },
//!     "Comentarios": { "type": "text" }
//! }
//! ```
//!
//! [`ImportSchema::from_json`] checks the description against an embedded
//! JSON Schema (Draft 7) and then parses each entry into a closed [`Rule`]
//! variant, so malformed shapes are rejected up front rather than
//! discovered mid-file. A column with no rule is treated as plain text by
//! the validator.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::error::{SchemaError, SchemaResult};

/// Inclusive scale bounds used when the description omits them.
pub const DEFAULT_SCALE_MIN: f64 = 0.0;
pub const DEFAULT_SCALE_MAX: f64 = 10.0;

/// One column's validation rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Free text: trimmed and passed through, never errors.
    Text,
    /// A floating-point number; the whole trimmed cell must parse.
    Number,
    /// A number constrained to the inclusive `[min, max]` range.
    Scale { min: f64, max: f64 },
    /// One value out of a closed set. An empty set accepts anything.
    Single { options: HashSet<String> },
}

impl Rule {
    fn from_json(column: &str, desc: &Value) -> SchemaResult<Self> {
        let desc = desc.as_object().ok_or_else(|| SchemaError::BadRule {
            column: column.to_string(),
            message: "rule must be a JSON object".to_string(),
        })?;

        let kind = desc
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("text")
            .to_lowercase();

        // unrecognized kinds deliberately fall back to text
        match kind.as_str() {
            "number" => Ok(Rule::Number),
            "scale" => Ok(Rule::Scale {
                min: bound(column, desc.get("min"), DEFAULT_SCALE_MIN, "min")?,
                max: bound(column, desc.get("max"), DEFAULT_SCALE_MAX, "max")?,
            }),
            "single" => Ok(Rule::Single {
                options: options(column, desc.get("options"))?,
            }),
            _ => Ok(Rule::Text),
        }
    }
}

fn bound(column: &str, value: Option<&Value>, default: f64, key: &str) -> SchemaResult<f64> {
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v.as_f64().ok_or_else(|| SchemaError::BadRule {
            column: column.to_string(),
            message: format!("'{key}' must be a number"),
        }),
    }
}

fn options(column: &str, value: Option<&Value>) -> SchemaResult<HashSet<String>> {
    let Some(value) = value else {
        return Ok(HashSet::new());
    };

    let list = value.as_array().ok_or_else(|| SchemaError::BadRule {
        column: column.to_string(),
        message: "'options' must be an array of strings".to_string(),
    })?;

    let mut set = HashSet::with_capacity(list.len());
    for entry in list {
        let text = entry.as_str().ok_or_else(|| SchemaError::BadRule {
            column: column.to_string(),
            message: "'options' must be an array of strings".to_string(),
        })?;
        set.insert(text.trim().to_string());
    }
    Ok(set)
}

/// The full rule set for one import job. Built once per job, read-only
/// through validation of the whole file.
#[derive(Debug, Clone, Default)]
pub struct ImportSchema {
    rules: HashMap<String, Rule>,
}

impl ImportSchema {
    /// Build a schema from a JSON description.
    ///
    /// Runs the embedded meta-schema check first, so shape problems come
    /// back as one [`SchemaError::Invalid`] listing every violation.
    pub fn from_json(description: &Value) -> SchemaResult<Self> {
        meta_check(description)?;

        let obj = description.as_object().ok_or(SchemaError::NotAnObject)?;
        let mut rules = HashMap::with_capacity(obj.len());
        for (column, desc) in obj {
            rules.insert(column.clone(), Rule::from_json(column, desc)?);
        }
        Ok(Self { rules })
    }

    /// Look up the rule for a column, if one was declared.
    pub fn rule(&self, column: &str) -> Option<&Rule> {
        self.rules.get(column)
    }

    /// Number of declared column rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Validate a description against the embedded rules meta-schema.
fn meta_check(description: &Value) -> SchemaResult<()> {
    let meta: Value = serde_json::from_str(include_str!("../../schemas/import-rules.json"))
        .expect("invalid embedded schema");

    let validator = jsonschema::draft7::new(&meta)
        .expect("invalid embedded schema");

    let errors: Vec<String> = validator
        .iter_errors(description)
        .map(|e| format!("{}: {}", e.instance_path(), e))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::Invalid { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_all_kinds() {
        let schema = ImportSchema::from_json(&json!({
            "Edad": { "type": "number" },
            "Satisfaccion": { "type": "scale", "min": 1, "max": 5 },
            "Departamento": { "type": "single", "options": ["Ventas", "IT"] },
            "Comentarios": { "type": "text" }
        }))
        .unwrap();

        assert_eq!(schema.len(), 4);
        assert_eq!(schema.rule("Edad"), Some(&Rule::Number));
        assert_eq!(
            schema.rule("Satisfaccion"),
            Some(&Rule::Scale { min: 1.0, max: 5.0 })
        );
        assert_eq!(schema.rule("Comentarios"), Some(&Rule::Text));
    }

    #[test]
    fn test_scale_defaults() {
        let schema = ImportSchema::from_json(&json!({ "Nota": { "type": "scale" } })).unwrap();
        assert_eq!(
            schema.rule("Nota"),
            Some(&Rule::Scale { min: 0.0, max: 10.0 })
        );
    }

    #[test]
    fn test_unrecognized_type_falls_back_to_text() {
        let schema =
            ImportSchema::from_json(&json!({ "X": { "type": "multiselect" } })).unwrap();
        assert_eq!(schema.rule("X"), Some(&Rule::Text));
    }

    #[test]
    fn test_missing_type_defaults_to_text() {
        let schema = ImportSchema::from_json(&json!({ "X": {} })).unwrap();
        assert_eq!(schema.rule("X"), Some(&Rule::Text));
    }

    #[test]
    fn test_options_are_trimmed() {
        let schema = ImportSchema::from_json(&json!({
            "Depto": { "type": "single", "options": [" Ventas ", "IT"] }
        }))
        .unwrap();

        match schema.rule("Depto") {
            Some(Rule::Single { options }) => {
                assert!(options.contains("Ventas"));
                assert!(options.contains("IT"));
            }
            other => panic!("unexpected rule: {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_min_is_rejected() {
        let err = ImportSchema::from_json(&json!({
            "Nota": { "type": "scale", "min": "cero" }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("min"));
    }

    #[test]
    fn test_non_string_option_is_rejected() {
        let err = ImportSchema::from_json(&json!({
            "Depto": { "type": "single", "options": [1, 2] }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("options"));
    }

    #[test]
    fn test_non_object_description_is_rejected() {
        assert!(ImportSchema::from_json(&json!(["not", "a", "schema"])).is_err());
        assert!(ImportSchema::from_json(&json!({ "X": "not-an-object" })).is_err());
    }

    #[test]
    fn test_empty_description_is_fine() {
        let schema = ImportSchema::from_json(&json!({})).unwrap();
        assert!(schema.is_empty());
    }
}
