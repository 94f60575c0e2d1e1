#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use bumpalo::{Bump, collections::Vec as BumpVec};
use fk_frame::{Frame, FrameError};
use fk_types::Cell;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Outer,
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("key column {name:?} not found in {side} frame")]
    MissingKeyColumn { side: &'static str, name: String },
    #[error("left_on and right_on must have equal lengths ({left} vs {right})")]
    KeyLengthMismatch { left: usize, right: usize },
    #[error("no common columns to merge on and no keys specified")]
    NoCommonColumns,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Merge configuration. `on` names keys shared by both sides; otherwise
/// `left_on`/`right_on` pair keys positionally; otherwise keys are
/// auto-detected as the column-name intersection in left order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub how: JoinKind,
    pub on: Vec<String>,
    pub left_on: Vec<String>,
    pub right_on: Vec<String>,
    pub suffixes: (String, String),
    pub indicator: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            how: JoinKind::Inner,
            on: Vec::new(),
            left_on: Vec::new(),
            right_on: Vec::new(),
            suffixes: ("_x".to_owned(), "_y".to_owned()),
            indicator: false,
        }
    }
}

const KEY_SEPARATOR: char = '\u{0}';

/// Null-separated canonical rendering of one row's key cells; the same
/// composition discipline as group keys, so numerically equal but
/// textually distinct values form different keys.
fn row_key(frame: &Frame, keys: &[String], row: usize) -> String {
    let mut out = String::new();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push(KEY_SEPARATOR);
        }
        if let Some(column) = frame.column(key) {
            out.push_str(&column.cells()[row].to_string());
        }
    }
    out
}

fn require_columns(
    frame: &Frame,
    names: &[String],
    side: &'static str,
) -> Result<(), JoinError> {
    for name in names {
        if frame.column(name).is_none() {
            return Err(JoinError::MissingKeyColumn {
                side,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// Resolve the key columns for each side per the option precedence.
fn resolve_keys(
    left: &Frame,
    right: &Frame,
    options: &MergeOptions,
) -> Result<(Vec<String>, Vec<String>), JoinError> {
    if !options.on.is_empty() {
        require_columns(left, &options.on, "left")?;
        require_columns(right, &options.on, "right")?;
        return Ok((options.on.clone(), options.on.clone()));
    }

    if !options.left_on.is_empty() || !options.right_on.is_empty() {
        if options.left_on.len() != options.right_on.len() {
            return Err(JoinError::KeyLengthMismatch {
                left: options.left_on.len(),
                right: options.right_on.len(),
            });
        }
        require_columns(left, &options.left_on, "left")?;
        require_columns(right, &options.right_on, "right")?;
        return Ok((options.left_on.clone(), options.right_on.clone()));
    }

    let common: Vec<String> = left
        .columns()
        .iter()
        .filter(|name| right.column(name).is_some())
        .cloned()
        .collect();
    if common.is_empty() {
        return Err(JoinError::NoCommonColumns);
    }
    Ok((common.clone(), common))
}

/// Composed key → ordered row positions for one frame.
fn build_key_index<'a>(row_keys: &'a [String]) -> HashMap<&'a str, Vec<usize>> {
    let mut index = HashMap::<&str, Vec<usize>>::new();
    for (row, key) in row_keys.iter().enumerate() {
        index.entry(key.as_str()).or_default().push(row);
    }
    index
}

/// Upper bound on emitted rows, used to size the probe buffers.
fn estimate_output_rows(
    left_keys: &[String],
    right_keys: &[String],
    right_index: &HashMap<&str, Vec<usize>>,
    how: JoinKind,
) -> usize {
    let left_matched: usize = left_keys
        .iter()
        .map(|key| match right_index.get(key.as_str()) {
            Some(rows) => rows.len(),
            None if matches!(how, JoinKind::Left | JoinKind::Outer) => 1,
            None => 0,
        })
        .sum();
    match how {
        JoinKind::Inner | JoinKind::Left => left_matched,
        JoinKind::Right | JoinKind::Outer => left_matched + right_keys.len(),
    }
}

fn cell_at(frame: &Frame, column: &str, row: Option<usize>) -> Cell {
    match row {
        Some(row) => frame
            .column(column)
            .and_then(|vector| vector.cells().get(row).cloned())
            .unwrap_or(Cell::Na),
        None => Cell::Na,
    }
}

/// Merge two frames on resolved key columns.
///
/// Emission order: inner and left joins stream the left frame (matches
/// expand in right-insert order per key); a right join streams the right
/// frame; an outer join emits the left pass first, then unmatched right
/// rows in right order. The output owns a fresh range index.
pub fn merge(left: &Frame, right: &Frame, options: &MergeOptions) -> Result<Frame, JoinError> {
    let (left_on, right_on) = resolve_keys(left, right, options)?;

    let left_row_keys: Vec<String> = (0..left.len())
        .map(|row| row_key(left, &left_on, row))
        .collect();
    let right_row_keys: Vec<String> = (0..right.len())
        .map(|row| row_key(right, &right_on, row))
        .collect();

    let right_index = build_key_index(&right_row_keys);
    let left_index = if matches!(options.how, JoinKind::Right) {
        Some(build_key_index(&left_row_keys))
    } else {
        None
    };

    let estimated = estimate_output_rows(&left_row_keys, &right_row_keys, &right_index, options.how);

    // Probe-phase position vectors live in an arena and are freed in bulk
    // once the output columns have been materialized.
    let arena = Bump::new();
    let mut left_positions = BumpVec::<Option<usize>>::with_capacity_in(estimated, &arena);
    let mut right_positions = BumpVec::<Option<usize>>::with_capacity_in(estimated, &arena);

    match options.how {
        JoinKind::Inner | JoinKind::Left | JoinKind::Outer => {
            for (left_row, key) in left_row_keys.iter().enumerate() {
                if let Some(rows) = right_index.get(key.as_str()) {
                    for &right_row in rows {
                        left_positions.push(Some(left_row));
                        right_positions.push(Some(right_row));
                    }
                    continue;
                }
                if matches!(options.how, JoinKind::Left | JoinKind::Outer) {
                    left_positions.push(Some(left_row));
                    right_positions.push(None);
                }
            }

            if matches!(options.how, JoinKind::Outer) {
                let left_key_set: HashSet<&str> =
                    left_row_keys.iter().map(String::as_str).collect();
                for (right_row, key) in right_row_keys.iter().enumerate() {
                    if !left_key_set.contains(key.as_str()) {
                        left_positions.push(None);
                        right_positions.push(Some(right_row));
                    }
                }
            }
        }
        JoinKind::Right => {
            let left_index = left_index
                .as_ref()
                .expect("left index is built for right joins");
            for (right_row, key) in right_row_keys.iter().enumerate() {
                if let Some(rows) = left_index.get(key.as_str()) {
                    for &left_row in rows {
                        left_positions.push(Some(left_row));
                        right_positions.push(Some(right_row));
                    }
                    continue;
                }
                left_positions.push(None);
                right_positions.push(Some(right_row));
            }
        }
    }

    debug!(
        rows = left_positions.len(),
        estimated,
        how = ?options.how,
        "merged frames"
    );

    // Column layout: left columns first (keys under their left name,
    // non-key collisions suffixed), then right non-key columns (collisions
    // suffixed), then the optional indicator.
    let left_key_set: HashSet<&str> = left_on.iter().map(String::as_str).collect();
    let right_key_set: HashSet<&str> = right_on.iter().map(String::as_str).collect();
    let (suffix_left, suffix_right) = (&options.suffixes.0, &options.suffixes.1);

    let mut columns = Vec::<(String, Vec<Cell>)>::new();

    for name in left.columns() {
        if let Some(key_slot) = left_on.iter().position(|key| key == name) {
            // Key values come from the left side when it participates and
            // from the paired right key column for right-only rows.
            let right_key = &right_on[key_slot];
            let cells = left_positions
                .iter()
                .zip(right_positions.iter())
                .map(|(l, r)| match l {
                    Some(row) => cell_at(left, name, Some(*row)),
                    None => cell_at(right, right_key, *r),
                })
                .collect();
            columns.push((name.clone(), cells));
            continue;
        }

        let out_name = if right.column(name).is_some() {
            format!("{name}{suffix_left}")
        } else {
            name.clone()
        };
        let cells = left_positions
            .iter()
            .map(|l| cell_at(left, name, *l))
            .collect();
        columns.push((out_name, cells));
    }

    for name in right.columns() {
        // Right key columns are never re-emitted: their values ride the
        // left-named key column above.
        if right_key_set.contains(name.as_str()) {
            continue;
        }
        let collides =
            left.column(name).is_some() && !left_key_set.contains(name.as_str());
        let out_name = if collides {
            format!("{name}{suffix_right}")
        } else {
            name.clone()
        };
        if columns.iter().any(|(existing, _)| existing == &out_name) {
            continue;
        }
        let cells = right_positions
            .iter()
            .map(|r| cell_at(right, name, *r))
            .collect();
        columns.push((out_name, cells));
    }

    if options.indicator {
        let cells = left_positions
            .iter()
            .zip(right_positions.iter())
            .map(|(l, r)| match (l, r) {
                (Some(_), Some(_)) => Cell::from("both"),
                (Some(_), None) => Cell::from("left_only"),
                (None, Some(_)) => Cell::from("right_only"),
                (None, None) => Cell::Na,
            })
            .collect();
        columns.push(("_merge".to_owned(), cells));
    }

    Ok(Frame::new(columns)?)
}

/// Merge on keys shared by both sides.
pub fn join(left: &Frame, right: &Frame, on: &[&str], how: JoinKind) -> Result<Frame, JoinError> {
    let options = MergeOptions {
        how,
        on: on.iter().map(|key| (*key).to_owned()).collect(),
        ..MergeOptions::default()
    };
    merge(left, right, &options)
}

/// Merge on differently named key columns.
pub fn merge_on(
    left: &Frame,
    right: &Frame,
    left_on: &[&str],
    right_on: &[&str],
    how: JoinKind,
) -> Result<Frame, JoinError> {
    let options = MergeOptions {
        how,
        left_on: left_on.iter().map(|key| (*key).to_owned()).collect(),
        right_on: right_on.iter().map(|key| (*key).to_owned()).collect(),
        ..MergeOptions::default()
    };
    merge(left, right, &options)
}
