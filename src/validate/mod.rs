//! Rule-driven conversion of raw records into typed survey responses.
//!
//! [`validate`] walks every cell of every record, coerces it according to
//! its column's [`Rule`], and collects one [`CellError`] per violating
//! cell. Content problems never abort the run: a violating cell converts
//! to JSON null AND produces an error, the rest of the row and file keep
//! processing, and the output always has one converted record per input
//! record.
//!
//! Conversion table (raw value is trimmed first, always):
//!
//! | rule     | empty cell | valid cell            | invalid cell        |
//! |----------|------------|-----------------------|---------------------|
//! | text     | null       | trimmed string        | -                   |
//! | number   | null       | f64                   | null + error        |
//! | scale    | null       | f64 within `[min,max]`| null + error        |
//! | single   | null       | trimmed string        | null + error        |
//!
//! An empty or whitespace-only cell is null for every rule kind and is
//! never an error: absence is always valid.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::path::Path;

use crate::error::CsvResult;
use crate::parser;
use crate::schema::{ImportSchema, Rule};

/// One cell that failed its column's rule.
///
/// `row` is 1-based counting from the first data row (the row right after
/// the header). `value` is the raw cell content before trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellError {
    pub row: usize,
    pub column: String,
    pub value: String,
    pub message: String,
}

/// Output of one validation pass: converted records plus every cell error,
/// in (row, column-within-row) append order.
#[derive(Debug, Default, Serialize)]
pub struct Validated {
    /// Converted records, one per input record, in input order.
    pub data: Vec<Value>,
    /// Accumulated cell errors. Never deduplicated or reordered.
    pub errors: Vec<CellError>,
}

impl Validated {
    /// True when no cell failed its rule.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        format!("{} records, {} cell errors", self.data.len(), self.errors.len())
    }
}

/// Convert and validate records against a schema.
///
/// Records are processed in input order; within a record, columns are
/// processed in the record's own key order (header order). Columns with no
/// declared rule pass through as trimmed text. Pure over its inputs:
/// running it twice yields identical output.
pub fn validate(records: &[Value], schema: &ImportSchema) -> Validated {
    let mut out = Validated::default();

    for (idx, record) in records.iter().enumerate() {
        let row = idx + 1;
        let mut converted = Map::new();

        if let Some(obj) = record.as_object() {
            for (column, raw) in obj {
                let raw = raw_as_str(raw);
                let value = convert_cell(&raw, row, column, schema.rule(column), &mut out.errors);
                converted.insert(column.clone(), value);
            }
        }

        out.data.push(Value::Object(converted));
    }

    out
}

/// Read a CSV file and validate it in one step.
///
/// The original entry point for import jobs: reader and converter
/// composed, returning `{data, errors}` for the coordinator to act on.
pub fn read_and_validate(
    path: impl AsRef<Path>,
    schema: &ImportSchema,
    delimiter: char,
) -> CsvResult<Validated> {
    let records = parser::read_records(path, delimiter)?;
    Ok(validate(&records, schema))
}

fn raw_as_str(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    }
}

fn convert_cell(
    raw: &str,
    row: usize,
    column: &str,
    rule: Option<&Rule>,
    errors: &mut Vec<CellError>,
) -> Value {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Value::Null;
    }

    let Some(rule) = rule else {
        return Value::String(trimmed.to_string());
    };

    match rule {
        Rule::Text => Value::String(trimmed.to_string()),

        Rule::Number => match parse_number(trimmed) {
            Some(n) => Value::from(n),
            None => {
                push_error(errors, row, column, raw, "not a valid number");
                Value::Null
            }
        },

        Rule::Scale { min, max } => match parse_number(trimmed) {
            None => {
                push_error(errors, row, column, raw, "not a valid number for scale");
                Value::Null
            }
            Some(n) if n < *min || n > *max => {
                let message = format!("value out of range [{min}, {max}]");
                push_error(errors, row, column, raw, &message);
                Value::Null
            }
            Some(n) => Value::from(n),
        },

        Rule::Single { options } => {
            if !options.is_empty() && !options.contains(trimmed) {
                push_error(errors, row, column, raw, "invalid option");
                Value::Null
            } else {
                Value::String(trimmed.to_string())
            }
        }
    }
}

/// Full-string numeric parse: trailing garbage makes the cell invalid,
/// and non-finite values are not usable survey answers.
fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn push_error(errors: &mut Vec<CellError>, row: usize, column: &str, value: &str, message: &str) {
    errors.push(CellError {
        row,
        column: column.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn schema(description: Value) -> ImportSchema {
        ImportSchema::from_json(&description).unwrap()
    }

    #[test]
    fn test_blank_cells_are_null_for_every_kind() {
        let schema = schema(json!({
            "t": { "type": "text" },
            "n": { "type": "number" },
            "s": { "type": "scale" },
            "o": { "type": "single", "options": ["a"] }
        }));
        let records = vec![json!({ "t": "  ", "n": "", "s": " ", "o": "" })];

        let out = validate(&records, &schema);

        assert!(out.is_clean());
        for key in ["t", "n", "s", "o"] {
            assert_eq!(out.data[0][key], Value::Null);
        }
    }

    #[test]
    fn test_number_full_string_parse() {
        let schema = schema(json!({ "n": { "type": "number" } }));

        let out = validate(&[json!({ "n": " 42.5 " })], &schema);
        assert_eq!(out.data[0]["n"], json!(42.5));
        assert!(out.is_clean());

        let out = validate(&[json!({ "n": "12abc" })], &schema);
        assert_eq!(out.data[0]["n"], Value::Null);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].message, "not a valid number");
        assert_eq!(out.errors[0].row, 1);
    }

    #[test]
    fn test_non_finite_numbers_are_invalid() {
        let schema = schema(json!({ "n": { "type": "number" } }));
        let out = validate(&[json!({ "n": "inf" })], &schema);
        assert_eq!(out.data[0]["n"], Value::Null);
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn test_scale_bounds_are_inclusive() {
        let schema = schema(json!({ "s": { "type": "scale", "min": 0, "max": 10 } }));

        let out = validate(&[json!({ "s": "10" })], &schema);
        assert_eq!(out.data[0]["s"], json!(10.0));
        assert!(out.is_clean());

        let out = validate(&[json!({ "s": "10.0001" })], &schema);
        assert_eq!(out.data[0]["s"], Value::Null);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].column, "s");
        assert!(out.errors[0].message.contains("[0, 10]"));
    }

    #[test]
    fn test_scale_parse_failure_has_distinct_message() {
        let schema = schema(json!({ "s": { "type": "scale" } }));
        let out = validate(&[json!({ "s": "alto" })], &schema);
        assert_eq!(out.errors[0].message, "not a valid number for scale");
    }

    #[test]
    fn test_single_is_case_sensitive_exact_match() {
        let schema = schema(json!({ "d": { "type": "single", "options": ["Ventas", "IT"] } }));

        let out = validate(&[json!({ "d": " IT " })], &schema);
        assert_eq!(out.data[0]["d"], "IT");
        assert!(out.is_clean());

        let out = validate(&[json!({ "d": "it" })], &schema);
        assert_eq!(out.data[0]["d"], Value::Null);
        assert_eq!(out.errors[0].message, "invalid option");
    }

    #[test]
    fn test_single_with_no_options_accepts_anything() {
        let schema = schema(json!({ "d": { "type": "single" } }));
        let out = validate(&[json!({ "d": "whatever" })], &schema);
        assert_eq!(out.data[0]["d"], "whatever");
        assert!(out.is_clean());
    }

    #[test]
    fn test_undeclared_column_passes_through_trimmed() {
        let schema = schema(json!({}));
        let out = validate(&[json!({ "libre": "  hola  " })], &schema);
        assert_eq!(out.data[0]["libre"], "hola");
        assert!(out.is_clean());
    }

    #[test]
    fn test_bad_row_does_not_drop_or_corrupt_neighbors() {
        let schema = schema(json!({ "n": { "type": "number" } }));
        let records = vec![
            json!({ "n": "1" }),
            json!({ "n": "2" }),
            json!({ "n": "tres" }),
            json!({ "n": "4" }),
            json!({ "n": "5" }),
        ];

        let out = validate(&records, &schema);

        assert_eq!(out.data.len(), records.len());
        assert_eq!(out.data[1]["n"], json!(2.0));
        assert_eq!(out.data[2]["n"], Value::Null);
        assert_eq!(out.data[3]["n"], json!(4.0));
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].row, 3);
    }

    #[test]
    fn test_errors_keep_row_then_column_order() {
        let schema = schema(json!({
            "a": { "type": "number" },
            "b": { "type": "number" }
        }));
        let records = vec![
            json!({ "a": "x", "b": "y" }),
            json!({ "a": "z", "b": "1" }),
        ];

        let out = validate(&records, &schema);

        let seen: Vec<(usize, &str)> = out
            .errors
            .iter()
            .map(|e| (e.row, e.column.as_str()))
            .collect();
        assert_eq!(seen, vec![(1, "a"), (1, "b"), (2, "a")]);
    }

    #[test]
    fn test_validate_is_idempotent() {
        let schema = schema(json!({
            "n": { "type": "number" },
            "s": { "type": "scale", "min": 0, "max": 5 }
        }));
        let records = vec![
            json!({ "n": "9", "s": "7" }),
            json!({ "n": "nope", "s": "3" }),
        ];

        let first = validate(&records, &schema);
        let second = validate(&records, &schema);

        assert_eq!(first.data, second.data);
        assert_eq!(first.errors, second.errors);
    }

    #[test]
    fn test_error_keeps_raw_untrimmed_value() {
        let schema = schema(json!({ "n": { "type": "number" } }));
        let out = validate(&[json!({ "n": " doce " })], &schema);
        assert_eq!(out.errors[0].value, " doce ");
    }

    #[test]
    fn test_end_to_end_spanish_survey() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "Edad,Satisfaccion,Departamento\n34,8,Ventas\nnoventa,12,Marketing\n28,,IT\n"
        )
        .unwrap();

        let schema = schema(json!({
            "Edad": { "type": "number" },
            "Satisfaccion": { "type": "scale", "min": 0, "max": 10 },
            "Departamento": { "type": "single", "options": ["Ventas", "IT", "RRHH"] }
        }));

        let out = read_and_validate(file.path(), &schema, ',').unwrap();

        assert_eq!(out.data.len(), 3);

        // row 1: fully valid
        assert_eq!(out.data[0]["Edad"], json!(34.0));
        assert_eq!(out.data[0]["Satisfaccion"], json!(8.0));
        assert_eq!(out.data[0]["Departamento"], "Ventas");

        // row 2: every cell fails, every cell is null
        assert_eq!(out.data[1]["Edad"], Value::Null);
        assert_eq!(out.data[1]["Satisfaccion"], Value::Null);
        assert_eq!(out.data[1]["Departamento"], Value::Null);

        // row 3: blank Satisfaccion is null but NOT an error
        assert_eq!(out.data[2]["Edad"], json!(28.0));
        assert_eq!(out.data[2]["Satisfaccion"], Value::Null);
        assert_eq!(out.data[2]["Departamento"], "IT");

        let row2: Vec<&CellError> = out.errors.iter().filter(|e| e.row == 2).collect();
        assert_eq!(out.errors.len(), 3);
        assert_eq!(row2.len(), 3);
        assert_eq!(row2[0].column, "Edad");
        assert_eq!(row2[0].message, "not a valid number");
        assert!(row2[1].message.contains("out of range"));
        assert_eq!(row2[2].message, "invalid option");
    }
}
