#![forbid(unsafe_code)]

//! Selection, label, and index-algebra behavior through the public
//! surface: positional windows, label selectors, strict vs lenient
//! lookup, set algebra, and value-count summaries.

use fk_conformance::{assert_structure, fixture_frame, int_cells, text_cells};
use fk_frame::{ColumnSelection, Frame, RowSelection};
use fk_index::Index;
use fk_types::Cell;
use fk_vector::Vector;

fn people() -> Frame {
    fixture_frame(vec![
        ("name", text_cells(&["ada", "grace", "alan", "edsger"])),
        ("age", int_cells(&[36, 85, 41, 72])),
        ("city", text_cells(&["london", "arlington", "london", "austin"])),
    ])
}

#[test]
fn positional_windows_compose() {
    let frame = people();

    let middle = frame.slice(1, 3);
    assert_structure(&middle);
    assert_eq!(middle.len(), 2);
    assert_eq!(
        middle.index().labels(),
        &[Cell::Int64(1), Cell::Int64(2)]
    );

    // A window of a window keeps narrowing.
    let narrowed = middle.iloc(1, 2, 0, 2);
    assert_eq!(narrowed.shape(), (1, 2));
    assert_eq!(narrowed.columns(), &["name", "age"]);
    assert_eq!(
        narrowed.column("name").expect("name").cells(),
        &[Cell::from("alan")]
    );
}

#[test]
fn label_selection_is_lenient_and_ordered() {
    let frame = people();

    let picked = frame.loc(
        RowSelection::Many(&[Cell::Int64(3), Cell::Int64(0), Cell::Int64(99)]),
        ColumnSelection::Many(&["age", "nope", "name"]),
    );
    assert_structure(&picked);
    // Rows come back in selector order; the unknown label vanished.
    assert_eq!(picked.len(), 2);
    assert_eq!(
        picked.column("name").expect("name").cells(),
        &[Cell::from("edsger"), Cell::from("ada")]
    );
    // Columns keep selector order with the unknown name dropped.
    assert_eq!(picked.columns(), &["age", "name"]);
}

#[test]
fn strict_lookup_raises_where_lenient_selection_skips() {
    let frame = people();
    assert!(frame.at(&Cell::Int64(99), "name").is_err());
    assert!(frame.at(&Cell::Int64(0), "nope").is_err());

    let empty = frame.loc(
        RowSelection::One(&Cell::Int64(99)),
        ColumnSelection::All,
    );
    assert_eq!(empty.len(), 0);
    assert_eq!(empty.columns(), frame.columns());
}

#[test]
fn derived_selections_own_independent_labels() {
    let frame = people();
    let head = frame.head(2);

    // The derived index reflects only the selected rows.
    assert_eq!(head.index().len(), 2);
    assert_eq!(frame.index().len(), 4);

    // Mutating a copy of a column vector leaves the source untouched.
    let mut copy = frame.column("age").expect("age").clone();
    copy.set(0, Cell::Int64(0)).expect("set");
    assert_eq!(
        frame.column("age").expect("age").cells()[0],
        Cell::Int64(36)
    );
}

#[test]
fn index_set_algebra_first_appearance_order() {
    let left = Index::new(
        vec![Cell::from("a"), Cell::from("b"), Cell::from("c")],
        None,
    );
    let right = Index::new(vec![Cell::from("c"), Cell::from("d")], None);

    assert_eq!(
        left.union(&right).labels(),
        &[
            Cell::from("a"),
            Cell::from("b"),
            Cell::from("c"),
            Cell::from("d"),
        ]
    );
    assert_eq!(left.intersection(&right).labels(), &[Cell::from("c")]);
    assert_eq!(
        left.difference(&right).labels(),
        &[Cell::from("a"), Cell::from("b")]
    );
}

#[test]
fn row_label_lookup_uses_first_occurrence() {
    let index = Index::new(
        vec![Cell::from("dup"), Cell::from("x"), Cell::from("dup")],
        None,
    );
    let vector = Vector::with_index(int_cells(&[1, 2, 3]), "v", index).expect("vector");
    assert_eq!(vector.at(&Cell::from("dup")).expect("at"), &Cell::Int64(1));
}

#[test]
fn value_counts_summarizes_a_column() {
    let frame = people();
    let counts = frame.column("city").expect("city").value_counts();
    assert_eq!(counts.name(), "count");
    assert_eq!(counts.index().name(), Some("city"));
    assert_eq!(counts.len(), 3);
    assert_eq!(
        counts.at(&Cell::from("london")).expect("london"),
        &Cell::Int64(2)
    );
    assert_eq!(
        counts.at(&Cell::from("austin")).expect("austin"),
        &Cell::Int64(1)
    );
}

#[test]
fn rename_then_drop_pipeline_preserves_untouched_columns() {
    let frame = people();
    let trimmed = frame
        .rename(&[("age", "years")])
        .drop_columns(&["city"]);
    assert_structure(&trimmed);
    assert_eq!(trimmed.columns(), &["name", "years"]);
    assert_eq!(
        trimmed.column("years").expect("years").cells(),
        &int_cells(&[36, 85, 41, 72])[..]
    );
}

#[test]
fn head_and_tail_clamp_and_keep_labels() {
    let vector = Vector::from_values(vec![5_i64, 6, 7], "v");
    assert_eq!(vector.head(0).len(), 0);
    assert_eq!(vector.tail(0).len(), 0);
    assert_eq!(vector.head(10).len(), 3);

    let tail = vector.tail(2);
    assert_eq!(tail.index().labels(), &[Cell::Int64(1), Cell::Int64(2)]);
}

#[test]
fn describe_over_selection_narrows_with_it() {
    let frame = people();
    let summary = frame
        .loc(RowSelection::All, ColumnSelection::One("age"))
        .describe();
    assert_eq!(summary.shape(), (1, 5));
    assert_eq!(
        summary.at(&Cell::from("age"), "count").expect("count"),
        &Cell::Float64(4.0)
    );
    assert_eq!(
        summary.at(&Cell::from("age"), "min").expect("min"),
        &Cell::Float64(36.0)
    );
    assert_eq!(
        summary.at(&Cell::from("age"), "max").expect("max"),
        &Cell::Float64(85.0)
    );
}
