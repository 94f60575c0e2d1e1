#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Advisory type tag for a column.
///
/// A column's dtype describes its inferred semantic class; the cells it
/// holds may still be heterogeneous, and every operator tolerates cells of
/// other tags by falling back to the `Opaque` path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Int64,
    Float64,
    Text,
    Bool,
    DateTime,
    Opaque,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Text => "text",
            Self::Bool => "bool",
            Self::DateTime => "datetime",
            Self::Opaque => "opaque",
        };
        write!(f, "{name}")
    }
}

/// Dynamically tagged value held at one (row, column) intersection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Na,
    Int64(i64),
    Float64(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Na => DType::Opaque,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Text(_) => DType::Text,
            Self::Bool(_) => DType::Bool,
            Self::DateTime(_) => DType::DateTime,
        }
    }

    /// NA recognition: the explicit marker, IEEE NaN for floats, and the
    /// text tokens accepted at input-normalization boundaries.
    #[must_use]
    pub fn is_na(&self) -> bool {
        match self {
            Self::Na => true,
            Self::Float64(v) => v.is_nan(),
            Self::Text(v) => matches!(v.as_str(), "" | "NA" | "NaN" | "null"),
            _ => false,
        }
    }

    /// Numeric coercion used by statistics and arithmetic: integers,
    /// floats, and numeric-parsable text succeed; everything else fails
    /// (callers skip or emit NA, they never raise).
    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Text(v) => v
                .trim()
                .parse::<f64>()
                .map_err(|_| TypeError::NonNumeric { value: v.clone() }),
            _ => Err(TypeError::NonNumeric {
                value: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for Cell {
    /// Canonical text rendering. This form is the basis of composed
    /// group/join keys, `unique`, and index set algebra.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Na => write!(f, "NA"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("cannot convert {value:?} to {target}")]
    InvalidCast { value: String, target: DType },
    #[error("cannot parse {value:?} as {target}")]
    ParseFailed { value: String, target: DType },
    #[error("value {value:?} is not numeric")]
    NonNumeric { value: String },
}

/// Infer the dtype of a single cell.
#[must_use]
pub fn infer_dtype(cell: &Cell) -> DType {
    cell.dtype()
}

/// Infer a column dtype from a sequence: the first cell that is not the
/// explicit absent marker wins; an empty or all-absent sequence is opaque.
#[must_use]
pub fn infer_dtype_slice(cells: &[Cell]) -> DType {
    cells
        .iter()
        .find(|cell| !matches!(cell, Cell::Na))
        .map_or(DType::Opaque, Cell::dtype)
}

/// Ordered list of accepted datetime renderings, ISO-8601 first.
fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed);
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Cast a cell to a target dtype. The absent marker casts to itself under
/// every target; a failure reports the offending value (callers annotate
/// the position).
pub fn cast_cell(cell: &Cell, target: DType) -> Result<Cell, TypeError> {
    if matches!(cell, Cell::Na) {
        return Ok(Cell::Na);
    }

    match target {
        DType::Opaque => Ok(cell.clone()),
        DType::Int64 => match cell {
            Cell::Int64(v) => Ok(Cell::Int64(*v)),
            Cell::Float64(v) => Ok(Cell::Int64(*v as i64)),
            Cell::Text(v) => v
                .trim()
                .parse::<i64>()
                .map(Cell::Int64)
                .map_err(|_| TypeError::ParseFailed {
                    value: v.clone(),
                    target,
                }),
            _ => Err(TypeError::InvalidCast {
                value: cell.to_string(),
                target,
            }),
        },
        DType::Float64 => match cell {
            Cell::Int64(v) => Ok(Cell::Float64(*v as f64)),
            Cell::Float64(v) => Ok(Cell::Float64(*v)),
            Cell::Text(v) => v
                .trim()
                .parse::<f64>()
                .map(Cell::Float64)
                .map_err(|_| TypeError::ParseFailed {
                    value: v.clone(),
                    target,
                }),
            _ => Err(TypeError::InvalidCast {
                value: cell.to_string(),
                target,
            }),
        },
        DType::Text => Ok(Cell::Text(cell.to_string())),
        DType::Bool => match cell {
            Cell::Bool(v) => Ok(Cell::Bool(*v)),
            Cell::Int64(v) => Ok(Cell::Bool(*v != 0)),
            Cell::Float64(v) => Ok(Cell::Bool(*v != 0.0)),
            Cell::Text(v) => Ok(Cell::Bool(!matches!(
                v.as_str(),
                "" | "0" | "false"
            ))),
            Cell::DateTime(_) | Cell::Na => Err(TypeError::InvalidCast {
                value: cell.to_string(),
                target,
            }),
        },
        DType::DateTime => match cell {
            Cell::DateTime(v) => Ok(Cell::DateTime(*v)),
            Cell::Text(v) => parse_datetime(v).map(Cell::DateTime).ok_or_else(|| {
                TypeError::ParseFailed {
                    value: v.clone(),
                    target,
                }
            }),
            _ => Err(TypeError::InvalidCast {
                value: cell.to_string(),
                target,
            }),
        },
    }
}

/// Ordering comparator shared by vector and frame sorting: numeric first,
/// canonical-text fallback when either side is not numerically coercible.
#[must_use]
pub fn compare_cells(left: &Cell, right: &Cell) -> Ordering {
    if let (Ok(a), Ok(b)) = (left.to_f64(), right.to_f64()) {
        return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    }
    left.to_string().cmp(&right.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::{Cell, DType, cast_cell, compare_cells, infer_dtype_slice};

    #[test]
    fn na_recognition_covers_normalization_tokens() {
        assert!(Cell::Na.is_na());
        assert!(Cell::Float64(f64::NAN).is_na());
        assert!(Cell::Text(String::new()).is_na());
        assert!(Cell::Text("NA".into()).is_na());
        assert!(Cell::Text("NaN".into()).is_na());
        assert!(Cell::Text("null".into()).is_na());
        assert!(!Cell::Text("na".into()).is_na());
        assert!(!Cell::Int64(0).is_na());
        assert!(!Cell::Bool(false).is_na());
    }

    #[test]
    fn dtype_inference_takes_first_non_absent_cell() {
        let cells = vec![Cell::Na, Cell::Float64(1.5), Cell::Int64(2)];
        assert_eq!(infer_dtype_slice(&cells), DType::Float64);
    }

    #[test]
    fn dtype_inference_of_all_absent_is_opaque() {
        assert_eq!(infer_dtype_slice(&[]), DType::Opaque);
        assert_eq!(infer_dtype_slice(&[Cell::Na, Cell::Na]), DType::Opaque);
    }

    #[test]
    fn na_text_token_still_infers_text() {
        // Inference skips only the explicit marker, so a "NA" token column
        // keeps the text tag even though is_na treats its cells as absent.
        let cells = vec![Cell::Text("NA".into()), Cell::Text("x".into())];
        assert_eq!(infer_dtype_slice(&cells), DType::Text);
    }

    #[test]
    fn cast_truncates_float_to_int64() {
        assert_eq!(
            cast_cell(&Cell::Float64(3.9), DType::Int64).expect("cast"),
            Cell::Int64(3)
        );
        assert_eq!(
            cast_cell(&Cell::Float64(-3.9), DType::Int64).expect("cast"),
            Cell::Int64(-3)
        );
    }

    #[test]
    fn cast_parses_signed_decimal_text() {
        assert_eq!(
            cast_cell(&Cell::Text(" -42 ".into()), DType::Int64).expect("cast"),
            Cell::Int64(-42)
        );
        assert_eq!(
            cast_cell(&Cell::Text("2.5".into()), DType::Float64).expect("cast"),
            Cell::Float64(2.5)
        );
    }

    #[test]
    fn cast_rejects_non_numeric_text() {
        let err = cast_cell(&Cell::Text("abc".into()), DType::Int64).expect_err("must fail");
        assert_eq!(err.to_string(), "cannot parse \"abc\" as int64");
    }

    #[test]
    fn cast_absent_marker_is_identity_for_every_target() {
        for target in [
            DType::Int64,
            DType::Float64,
            DType::Text,
            DType::Bool,
            DType::DateTime,
            DType::Opaque,
        ] {
            assert_eq!(cast_cell(&Cell::Na, target).expect("cast"), Cell::Na);
        }
    }

    #[test]
    fn bool_cast_follows_zero_and_token_rules() {
        assert_eq!(
            cast_cell(&Cell::Int64(0), DType::Bool).expect("cast"),
            Cell::Bool(false)
        );
        assert_eq!(
            cast_cell(&Cell::Float64(2.0), DType::Bool).expect("cast"),
            Cell::Bool(true)
        );
        for falsy in ["", "0", "false"] {
            assert_eq!(
                cast_cell(&Cell::Text(falsy.into()), DType::Bool).expect("cast"),
                Cell::Bool(false)
            );
        }
        assert_eq!(
            cast_cell(&Cell::Text("yes".into()), DType::Bool).expect("cast"),
            Cell::Bool(true)
        );
    }

    #[test]
    fn datetime_ladder_accepts_fixed_formats() {
        let midnight = |y: i32, m: u32, d: u32| {
            Cell::DateTime(
                NaiveDate::from_ymd_opt(y, m, d)
                    .expect("valid date")
                    .and_time(NaiveTime::MIN),
            )
        };

        assert_eq!(
            cast_cell(&Cell::Text("2024-03-01".into()), DType::DateTime).expect("cast"),
            midnight(2024, 3, 1)
        );
        assert_eq!(
            cast_cell(&Cell::Text("2024/03/01".into()), DType::DateTime).expect("cast"),
            midnight(2024, 3, 1)
        );
        assert_eq!(
            cast_cell(&Cell::Text("03/01/2024".into()), DType::DateTime).expect("cast"),
            midnight(2024, 3, 1)
        );
        assert_eq!(
            cast_cell(&Cell::Text("01-03-2024".into()), DType::DateTime).expect("cast"),
            midnight(2024, 3, 1)
        );
        let with_time =
            cast_cell(&Cell::Text("2024-03-01 12:30:45".into()), DType::DateTime).expect("cast");
        assert_eq!(with_time.to_string(), "2024-03-01 12:30:45");
    }

    #[test]
    fn datetime_ladder_rejects_unknown_format() {
        let err = cast_cell(&Cell::Text("March 1, 2024".into()), DType::DateTime)
            .expect_err("must fail");
        assert!(err.to_string().contains("datetime"));
    }

    #[test]
    fn numeric_coercion_parses_text_and_rejects_bool() {
        assert_eq!(Cell::Text("3.5".into()).to_f64().expect("parse"), 3.5);
        assert_eq!(Cell::Int64(4).to_f64().expect("widen"), 4.0);
        assert!(Cell::Bool(true).to_f64().is_err());
        assert!(Cell::Na.to_f64().is_err());
    }

    #[test]
    fn comparator_orders_numeric_first_then_lexicographic() {
        use std::cmp::Ordering;

        assert_eq!(
            compare_cells(&Cell::Int64(2), &Cell::Float64(10.0)),
            Ordering::Less
        );
        // Text that parses numerically compares numerically.
        assert_eq!(
            compare_cells(&Cell::Text("9".into()), &Cell::Int64(10)),
            Ordering::Less
        );
        // Non-numeric falls back to canonical text.
        assert_eq!(
            compare_cells(&Cell::Text("apple".into()), &Cell::Text("banana".into())),
            Ordering::Less
        );
    }

    #[test]
    fn canonical_rendering_is_stable() {
        assert_eq!(Cell::Na.to_string(), "NA");
        assert_eq!(Cell::Int64(7).to_string(), "7");
        assert_eq!(Cell::Float64(1.5).to_string(), "1.5");
        assert_eq!(Cell::Bool(true).to_string(), "true");
        assert_eq!(Cell::Text("x".into()).to_string(), "x");
    }

    #[test]
    fn cell_serde_round_trip() {
        let cells = vec![
            Cell::Na,
            Cell::Int64(-3),
            Cell::Float64(2.25),
            Cell::Text("hello".into()),
            Cell::Bool(false),
        ];
        let json = serde_json::to_string(&cells).expect("serialize");
        let back: Vec<Cell> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cells, back);
    }
}
