//! Quote-aware CSV parsing for survey response files.
//!
//! Splits delimited text into header-mapped records, with encoding and
//! delimiter auto-detection for uploaded bytes. The dialect is the one
//! survey exports actually use: double-quote enclosure, doubled quotes as
//! escapes (`""` -> `"`), CRLF or LF line endings, blank lines ignored.
//!
//! This is deliberately not a general RFC-4180 reader: reading is
//! line-oriented, so a quoted field cannot span lines, and an unterminated
//! quote runs to the end of the line without raising an error.

use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::{CsvError, CsvResult};

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed records as JSON objects, one per data row
    pub records: Vec<Value>,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
    /// Column headers
    pub headers: Vec<String>,
}

/// Split one line into raw cells.
///
/// Scans character by character keeping an in-quotes flag: a doubled quote
/// inside a quoted region emits a literal `"`, any other quote toggles the
/// flag, and the delimiter only ends a cell outside quotes. The final
/// buffer is always pushed, so even an empty line yields one empty cell.
///
/// Total over any input: an unterminated quote is accepted and the rest of
/// the line is treated as quoted content.
pub fn tokenize(line: &str, delimiter: char) -> Vec<String> {
    let mut row = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;

    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                cell.push('"');
                chars.next();
            } else {
                in_quotes = !in_quotes;
            }
        } else if c == delimiter && !in_quotes {
            row.push(std::mem::take(&mut cell));
        } else {
            cell.push(c);
        }
    }

    row.push(cell);
    row
}

/// Tokenize every non-blank line of `content`.
///
/// A single trailing `\r` is stripped from each line before anything else,
/// so CRLF files parse identically on every platform. Lines that are empty
/// after CR-stripping produce no row at all.
pub fn rows_from_str(content: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();

    for raw in content.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.is_empty() {
            continue;
        }
        rows.push(tokenize(line, delimiter));
    }

    rows
}

/// Zip data rows against the header (row 0) into JSON object records.
///
/// Column count is normalized per record: short rows are padded with empty
/// strings up to header width, extra cells beyond the header are dropped.
/// Every record therefore has exactly the header's keys, in header order.
pub fn records_from_rows(rows: &[Vec<String>]) -> Vec<Value> {
    let Some((header, data)) = rows.split_first() else {
        return Vec::new();
    };

    data.iter()
        .map(|row| {
            let mut obj = Map::new();
            for (j, name) in header.iter().enumerate() {
                let value = row.get(j).cloned().unwrap_or_default();
                obj.insert(name.clone(), Value::String(value));
            }
            Value::Object(obj)
        })
        .collect()
}

/// Parse a string into header-mapped records.
pub fn records_from_str(content: &str, delimiter: char) -> Vec<Value> {
    records_from_rows(&rows_from_str(content, delimiter))
}

/// Read a CSV file as raw rows, header included as row 0.
///
/// The file's bytes are decoded with encoding auto-detection, so Latin-1
/// and Windows-1252 exports read correctly. The only failure mode is the
/// file itself being unreadable; that propagates as [`CsvError::Io`].
pub fn read_rows(path: impl AsRef<Path>, delimiter: char) -> CsvResult<Vec<Vec<String>>> {
    let content = read_decoded(path.as_ref())?;
    Ok(rows_from_str(&content, delimiter))
}

/// Read a CSV file as header-mapped records.
///
/// Row 0 is the header; an empty file yields an empty vector with no error.
pub fn read_records(path: impl AsRef<Path>, delimiter: char) -> CsvResult<Vec<Value>> {
    let content = read_decoded(path.as_ref())?;
    Ok(records_from_str(&content, delimiter))
}

fn read_decoded(path: &Path) -> CsvResult<String> {
    let bytes = fs::read(path).map_err(|source| CsvError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let encoding = detect_encoding(&bytes);
    Ok(decode_content(&bytes, &encoding))
}

/// Parse CSV bytes with optional delimiter override.
///
/// Detects the encoding, decodes, and (when `delimiter` is `None`) detects
/// the delimiter from the header line. Used by the upload path, where the
/// bytes are already in memory.
pub fn parse_bytes(bytes: &[u8], delimiter: Option<char>) -> ParseResult {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(&content));

    let rows = rows_from_str(&content, delimiter);
    let headers = rows.first().cloned().unwrap_or_default();
    let records = records_from_rows(&rows);

    ParseResult {
        records,
        encoding,
        delimiter,
        headers,
    }
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string using the specified encoding.
///
/// Unknown encodings and invalid byte sequences fall back to lossy UTF-8,
/// so decoding never fails.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.to_string()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        _ => String::from_utf8_lossy(bytes).to_string(),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_tokenize_plain() {
        assert_eq!(tokenize("a,b,c", ','), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tokenize_round_trip() {
        let cells = vec!["uno", "dos tres", "", "4"];
        let line = cells.join(";");
        assert_eq!(tokenize(&line, ';'), cells);
    }

    #[test]
    fn test_tokenize_quotes_and_escapes() {
        assert_eq!(
            tokenize(r#"a,"b,c","d""e""#, ','),
            vec!["a", "b,c", "d\"e"]
        );
    }

    #[test]
    fn test_tokenize_empty_line() {
        assert_eq!(tokenize("", ','), vec![""]);
    }

    #[test]
    fn test_tokenize_trailing_delimiter() {
        assert_eq!(tokenize("a,b,", ','), vec!["a", "b", ""]);
    }

    #[test]
    fn test_tokenize_unterminated_quote_is_lenient() {
        // the open quote swallows the delimiter to end of line
        assert_eq!(tokenize(r#"a,"b,c"#, ','), vec!["a", "b,c"]);
    }

    #[test]
    fn test_rows_skip_blank_lines() {
        let rows = rows_from_str("a,b\n1,2\n\n3,4\n", ',');
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], vec!["3", "4"]);
    }

    #[test]
    fn test_rows_strip_crlf() {
        let rows = rows_from_str("a,b\r\n1,2\r\n", ',');
        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"]]);
    }

    #[test]
    fn test_records_pad_short_rows() {
        let records = records_from_str("a,b,c\n1,2\n", ',');
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["a"], "1");
        assert_eq!(records[0]["b"], "2");
        assert_eq!(records[0]["c"], "");
        assert_eq!(records[0].as_object().map(|o| o.len()), Some(3));
    }

    #[test]
    fn test_records_drop_extra_columns() {
        let records = records_from_str("a,b\n1,2,3,4\n", ',');
        assert_eq!(records[0]["a"], "1");
        assert_eq!(records[0]["b"], "2");
        assert_eq!(records[0].as_object().map(|o| o.len()), Some(2));
    }

    #[test]
    fn test_records_keep_header_order() {
        let records = records_from_str("zeta,alfa,media\n1,2,3\n", ',');
        let keys: Vec<&String> = records[0].as_object().map(|o| o.keys().collect()).unwrap_or_default();
        assert_eq!(keys, vec!["zeta", "alfa", "media"]);
    }

    #[test]
    fn test_empty_content_yields_no_records() {
        assert!(records_from_str("", ',').is_empty());
        assert!(records_from_str("\n\n", ',').is_empty());
    }

    #[test]
    fn test_header_only_yields_no_records() {
        assert!(records_from_str("a,b,c\n", ',').is_empty());
    }

    #[test]
    fn test_read_records_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "nombre,edad\nAna,34\nLuis,28\n").unwrap();

        let records = read_records(file.path(), ',').unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["nombre"], "Ana");
        assert_eq!(records[1]["edad"], "28");
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let err = read_records("/no/such/file.csv", ',').unwrap_err();
        assert!(err.to_string().contains("/no/such/file.csv"));
    }

    #[test]
    fn test_detect_delimiter_semicolon() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
    }

    #[test]
    fn test_detect_delimiter_defaults_to_comma() {
        assert_eq!(detect_delimiter("single-column\n1"), ',');
    }

    #[test]
    fn test_detect_delimiter_tab() {
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Satisfacción" in ISO-8859-1
        let bytes: &[u8] = &[
            0x53, 0x61, 0x74, 0x69, 0x73, 0x66, 0x61, 0x63, 0x63, 0x69, 0xF3, 0x6E,
        ];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert_eq!(decoded, "Satisfacción");
    }

    #[test]
    fn test_parse_bytes_auto() {
        let csv = "nombre;puntaje\nAna;8\nLuis;9";
        let result = parse_bytes(csv.as_bytes(), None);

        assert_eq!(result.delimiter, ';');
        assert_eq!(result.headers, vec!["nombre", "puntaje"]);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[1]["puntaje"], "9");
    }
}
