#![forbid(unsafe_code)]

//! Shared fixtures and structural assertions for the conformance suites.

use std::collections::HashSet;

use fk_frame::Frame;
use fk_types::Cell;

/// Integer cells from a slice.
#[must_use]
pub fn int_cells(values: &[i64]) -> Vec<Cell> {
    values.iter().copied().map(Cell::Int64).collect()
}

/// Text cells from a slice.
#[must_use]
pub fn text_cells(values: &[&str]) -> Vec<Cell> {
    values.iter().map(|value| Cell::from(*value)).collect()
}

/// Build a frame from literal columns, panicking on fixture mistakes.
#[must_use]
pub fn fixture_frame(columns: Vec<(&str, Vec<Cell>)>) -> Frame {
    Frame::new(
        columns
            .into_iter()
            .map(|(name, cells)| (name.to_owned(), cells))
            .collect(),
    )
    .expect("fixture frames are well formed")
}

/// Extract a column as integers; NA and non-integer cells panic, which is
/// what a fixture assertion wants.
#[must_use]
pub fn column_as_ints(frame: &Frame, name: &str) -> Vec<i64> {
    frame
        .column(name)
        .unwrap_or_else(|| panic!("column {name} exists"))
        .cells()
        .iter()
        .map(|cell| match cell {
            Cell::Int64(value) => *value,
            other => panic!("expected integer cell, found {other:?}"),
        })
        .collect()
}

/// Structural invariants every frame must uphold: column lengths equal
/// the row count, each column shares the row index, the shape matches,
/// and column names are unique.
pub fn assert_structure(frame: &Frame) {
    let (rows, cols) = frame.shape();
    assert_eq!(frame.index().len(), rows, "index length equals rows");
    assert_eq!(frame.columns().len(), cols, "column count equals cols");

    let mut seen = HashSet::new();
    for name in frame.columns() {
        assert!(seen.insert(name.clone()), "duplicate column name {name}");
        let column = frame
            .column(name)
            .unwrap_or_else(|| panic!("ordered column {name} is present"));
        assert_eq!(column.len(), rows, "column {name} spans every row");
        assert_eq!(
            column.index().labels(),
            frame.index().labels(),
            "column {name} shares the row index"
        );
    }
}
