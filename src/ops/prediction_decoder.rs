//! Decoding of pose-estimation CSV exports into [`PredictionTensor`]s.
//!
//! The export has three header rows (scorer, body parts, coordinate labels)
//! followed by one row per frame. Each body part spans three columns:
//! `x, y, likelihood`. The likelihood column is ignored here.
//!
//! Decoding never fails. Malformed documents produce an empty tensor and
//! malformed rows or values are filled with `NaN`; every anomaly is reported
//! as a [`DecodeDiagnostic`].

use std::fmt;

use log::warn;

use crate::types::prediction::PredictionTensor;

const HEADER_ROWS: usize = 3;
const COLUMNS_PER_BODY_PART: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coord {
    X,
    Y,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeDiagnostic {
    /// The CSV reader itself rejected the document.
    Unreadable(String),
    TooFewRows { rows: usize },
    MalformedBodypartsHeader { columns: usize },
    CoordsHeaderMismatch { expected: usize, actual: usize },
    /// `line` is the 1-based line of the row among non-blank lines.
    ShortRow { line: usize, columns: usize },
    MissingColumns { line: usize, body_part: usize },
    UnparseableValue {
        line: usize,
        body_part: usize,
        coord: Coord,
        token: String,
    },
}

impl fmt::Display for DecodeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeDiagnostic::Unreadable(e) => write!(f, "unreadable CSV: {}", e),
            DecodeDiagnostic::TooFewRows { rows } => write!(
                f,
                "CSV must have at least 3 header lines and 1 data line, got {} lines",
                rows
            ),
            DecodeDiagnostic::MalformedBodypartsHeader { columns } => write!(
                f,
                "malformed bodyparts header (line 2) with {} columns",
                columns
            ),
            DecodeDiagnostic::CoordsHeaderMismatch { expected, actual } => write!(
                f,
                "coordinate header (line 3) has {} columns, bodyparts header has {}",
                actual, expected
            ),
            DecodeDiagnostic::ShortRow { line, columns } => {
                write!(f, "data row {} has only {} columns", line, columns)
            }
            DecodeDiagnostic::MissingColumns { line, body_part } => write!(
                f,
                "body part {} in data row {} has insufficient data",
                body_part, line
            ),
            DecodeDiagnostic::UnparseableValue {
                line,
                body_part,
                coord,
                token,
            } => write!(
                f,
                "could not parse {:?} of body part {} in data row {}: '{}'",
                coord, body_part, line, token
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub tensor: PredictionTensor,
    pub diagnostics: Vec<DecodeDiagnostic>,
}

impl Decoded {
    fn rejected(num_body_parts: usize, diagnostic: DecodeDiagnostic) -> Self {
        Self {
            tensor: PredictionTensor::empty(num_body_parts),
            diagnostics: vec![diagnostic],
        }
    }
}

/// Decodes a CSV document, logging any diagnostics.
pub fn decode(csv_text: &str) -> PredictionTensor {
    let decoded = decode_with_diagnostics(csv_text);
    for diagnostic in &decoded.diagnostics {
        warn!("{}", diagnostic);
    }
    decoded.tensor
}

pub fn decode_with_diagnostics(csv_text: &str) -> Decoded {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_text.trim().as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        match record {
            Ok(record) => rows.push(record),
            Err(e) => return Decoded::rejected(0, DecodeDiagnostic::Unreadable(e.to_string())),
        }
    }

    if rows.len() < HEADER_ROWS + 1 {
        return Decoded::rejected(0, DecodeDiagnostic::TooFewRows { rows: rows.len() });
    }

    let bodyparts_columns = rows[1].len();
    if bodyparts_columns <= 1 || (bodyparts_columns - 1) % COLUMNS_PER_BODY_PART != 0 {
        return Decoded::rejected(
            0,
            DecodeDiagnostic::MalformedBodypartsHeader {
                columns: bodyparts_columns,
            },
        );
    }
    let num_body_parts = (bodyparts_columns - 1) / COLUMNS_PER_BODY_PART;

    if rows[2].len() != bodyparts_columns {
        return Decoded::rejected(
            num_body_parts,
            DecodeDiagnostic::CoordsHeaderMismatch {
                expected: bodyparts_columns,
                actual: rows[2].len(),
            },
        );
    }

    let data_rows = &rows[HEADER_ROWS..];
    let required_columns = 1 + num_body_parts * COLUMNS_PER_BODY_PART;
    let mut data = Vec::with_capacity(data_rows.len() * num_body_parts * 2);
    let mut diagnostics = Vec::new();

    for (row_index, values) in data_rows.iter().enumerate() {
        let line = row_index + HEADER_ROWS + 1;

        if values.len() < required_columns {
            diagnostics.push(DecodeDiagnostic::ShortRow {
                line,
                columns: values.len(),
            });
            data.extend(std::iter::repeat_n(f64::NAN, num_body_parts * 2));
            continue;
        }

        for body_part in 0..num_body_parts {
            let x_index = 1 + body_part * COLUMNS_PER_BODY_PART;
            let (Some(x_token), Some(y_token)) = (values.get(x_index), values.get(x_index + 1))
            else {
                diagnostics.push(DecodeDiagnostic::MissingColumns { line, body_part });
                data.extend([f64::NAN, f64::NAN]);
                continue;
            };

            for (coord, token) in [(Coord::X, x_token), (Coord::Y, y_token)] {
                match parse_number(token) {
                    Some(value) => data.push(value),
                    None => {
                        diagnostics.push(DecodeDiagnostic::UnparseableValue {
                            line,
                            body_part,
                            coord,
                            token: token.to_string(),
                        });
                        data.push(f64::NAN);
                    }
                }
            }
        }
    }

    let tensor = PredictionTensor::from_flat(data, data_rows.len(), num_body_parts)
        .unwrap_or_else(|| PredictionTensor::empty(num_body_parts));
    Decoded {
        tensor,
        diagnostics,
    }
}

/// Parses the longest leading decimal number of `token`, ignoring
/// surrounding whitespace. Non-finite results are rejected.
fn parse_number(token: &str) -> Option<f64> {
    let token = token.trim();
    if let Ok(value) = token.parse::<f64>() {
        return value.is_finite().then_some(value);
    }

    let bytes = token.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }
    if digits == 0 {
        return None;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    token[..end]
        .trim_end_matches('.')
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
