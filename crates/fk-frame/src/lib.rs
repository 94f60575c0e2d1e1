#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use fk_index::{Index, IndexError};
use fk_types::Cell;
use fk_vector::{Vector, VectorError, compare_for_sort};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("column {column:?} length {actual} does not match {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("row {row} length {actual} does not match column count {expected}")]
    RowLengthMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("column {name:?} not found")]
    ColumnNotFound { name: String },
    #[error("duplicate column name {name:?}")]
    DuplicateColumn { name: String },
    #[error(transparent)]
    Vector(#[from] VectorError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Row-label selector for `Frame::loc`. Unknown labels are silently
/// skipped rather than raised.
#[derive(Debug, Clone, Copy)]
pub enum RowSelection<'a> {
    All,
    One(&'a Cell),
    Many(&'a [Cell]),
}

/// Column-name selector for `Frame::loc`. Unknown names are silently
/// dropped.
#[derive(Debug, Clone, Copy)]
pub enum ColumnSelection<'a> {
    All,
    One(&'a str),
    Many(&'a [&'a str]),
}

/// Transient per-row view materialized for row-centric predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    cells: BTreeMap<String, Cell>,
}

impl RowView {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }
}

/// Two-dimensional labeled table: an ordered column-name list, a mapping
/// from name to column vector, and a shared row label index.
///
/// Invariants: every column has `rows` cells and carries the shared row
/// index; the column-name list has no duplicates and is the canonical
/// presentation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<String>,
    data: BTreeMap<String, Vector>,
    index: Index,
}

impl Frame {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            data: BTreeMap::new(),
            index: Index::range(0),
        }
    }

    /// Construct from an ordered column-name → cells mapping. Every
    /// column must have the same length.
    pub fn new(columns: Vec<(String, Vec<Cell>)>) -> Result<Self, FrameError> {
        let rows = columns.first().map_or(0, |(_, cells)| cells.len());
        let mut order = Vec::with_capacity(columns.len());
        let mut data = BTreeMap::new();
        let index = Index::range(rows);

        for (name, cells) in columns {
            if cells.len() != rows {
                return Err(FrameError::LengthMismatch {
                    column: name,
                    expected: rows,
                    actual: cells.len(),
                });
            }
            if data.contains_key(&name) {
                return Err(FrameError::DuplicateColumn { name });
            }
            let vector = Vector::with_index(cells, name.clone(), index.clone())?;
            data.insert(name.clone(), vector);
            order.push(name);
        }

        Ok(Self {
            columns: order,
            data,
            index,
        })
    }

    /// Construct from an ordered column mapping under an explicit row
    /// index; every column must match the index length.
    pub fn with_index(
        columns: Vec<(String, Vec<Cell>)>,
        index: Index,
    ) -> Result<Self, FrameError> {
        let mut order = Vec::with_capacity(columns.len());
        let mut data = BTreeMap::new();
        for (name, cells) in columns {
            if cells.len() != index.len() {
                return Err(FrameError::LengthMismatch {
                    column: name,
                    expected: index.len(),
                    actual: cells.len(),
                });
            }
            if data.contains_key(&name) {
                return Err(FrameError::DuplicateColumn { name });
            }
            let vector = Vector::with_index(cells, name.clone(), index.clone())?;
            data.insert(name.clone(), vector);
            order.push(name);
        }
        Ok(Self {
            columns: order,
            data,
            index,
        })
    }

    /// Construct from row-oriented records under an explicit column list.
    pub fn from_records(
        records: Vec<Vec<Cell>>,
        columns: Vec<String>,
    ) -> Result<Self, FrameError> {
        let width = columns.len();
        let mut column_cells: Vec<Vec<Cell>> =
            columns.iter().map(|_| Vec::with_capacity(records.len())).collect();

        for (row, record) in records.into_iter().enumerate() {
            if record.len() != width {
                return Err(FrameError::RowLengthMismatch {
                    row,
                    expected: width,
                    actual: record.len(),
                });
            }
            for (slot, cell) in column_cells.iter_mut().zip(record) {
                slot.push(cell);
            }
        }

        Self::new(columns.into_iter().zip(column_cells).collect())
    }

    /// Internal constructor from prebuilt parts; used by row-subset and
    /// reorder operations which uphold the invariants themselves.
    fn from_parts(columns: Vec<String>, data: BTreeMap<String, Vector>, index: Index) -> Self {
        Self {
            columns,
            data,
            index,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.index.len(), self.columns.len())
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Vector> {
        self.data.get(name)
    }

    pub fn column_required(&self, name: &str) -> Result<&Vector, FrameError> {
        self.data.get(name).ok_or_else(|| FrameError::ColumnNotFound {
            name: name.to_owned(),
        })
    }

    /// Set or replace a column in place. The vector length must match the
    /// row count; a new name is appended to the column order.
    pub fn set_column(&mut self, name: impl Into<String>, mut vector: Vector) -> Result<(), FrameError> {
        let name = name.into();
        if vector.len() != self.index.len() {
            return Err(FrameError::LengthMismatch {
                column: name,
                expected: self.index.len(),
                actual: vector.len(),
            });
        }
        vector.set_name(name.clone());
        if !self.data.contains_key(&name) {
            self.columns.push(name.clone());
        }
        self.data.insert(name, vector);
        Ok(())
    }

    /// A new frame with the column added or replaced.
    pub fn with_column(&self, name: impl Into<String>, vector: Vector) -> Result<Self, FrameError> {
        let mut out = self.clone();
        out.set_column(name, vector)?;
        Ok(out)
    }

    /// A new frame without the named columns; unknown names are ignored.
    #[must_use]
    pub fn drop_columns(&self, names: &[&str]) -> Self {
        let mut out = self.clone();
        for name in names {
            if out.data.remove(*name).is_some() {
                out.columns.retain(|col| col != name);
            }
        }
        out
    }

    /// A new frame with columns renamed per the mapping, preserving order.
    #[must_use]
    pub fn rename(&self, mapping: &[(&str, &str)]) -> Self {
        let rename_of = |name: &str| -> String {
            mapping
                .iter()
                .find(|(from, _)| *from == name)
                .map_or_else(|| name.to_owned(), |(_, to)| (*to).to_owned())
        };

        let columns: Vec<String> = self.columns.iter().map(|c| rename_of(c)).collect();
        let mut data = BTreeMap::new();
        for (old, new) in self.columns.iter().zip(&columns) {
            let mut vector = self.data[old].clone();
            vector.set_name(new.clone());
            data.insert(new.clone(), vector);
        }
        Self::from_parts(columns, data, self.index.clone())
    }

    /// Cell at a row label and column name; strict lookup on both axes.
    pub fn at(&self, row_label: &Cell, column: &str) -> Result<&Cell, FrameError> {
        let position = self.index.position(row_label)?;
        let vector = self.column_required(column)?;
        Ok(&vector.cells()[position])
    }

    /// Transient view of the row at `position`.
    pub fn row(&self, position: usize) -> Result<RowView, FrameError> {
        self.index.get(position)?;
        let cells = self
            .columns
            .iter()
            .map(|name| (name.clone(), self.data[name].cells()[position].clone()))
            .collect();
        Ok(RowView { cells })
    }

    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        self.iloc(0, n, 0, self.columns.len())
    }

    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let n = n.min(self.len());
        self.iloc(self.len() - n, self.len(), 0, self.columns.len())
    }

    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Self {
        self.iloc(start, end, 0, self.columns.len())
    }

    /// Rectangular positional window, clamped to bounds on both axes.
    #[must_use]
    pub fn iloc(&self, row_start: usize, row_end: usize, col_start: usize, col_end: usize) -> Self {
        let row_end = row_end.min(self.len());
        let row_start = row_start.min(row_end);
        let col_end = col_end.min(self.columns.len());
        let col_start = col_start.min(col_end);

        let index = self.index.slice(row_start, row_end);
        let columns: Vec<String> = self.columns[col_start..col_end].to_vec();
        let mut data = BTreeMap::new();
        for name in &columns {
            let cells = self.data[name].cells()[row_start..row_end].to_vec();
            let vector = Vector::with_index(cells, name.clone(), index.clone())
                .expect("window cells match the window index by construction");
            data.insert(name.clone(), vector);
        }
        Self::from_parts(columns, data, index)
    }

    /// Materialize an arbitrary row subset in the given order, carrying
    /// the original row labels. Shared by filter, sort, and the parallel
    /// fabric so that their sequential and parallel forms agree.
    #[must_use]
    pub fn take_rows(&self, positions: &[usize]) -> Self {
        let index = self.index.take(positions);
        let mut data = BTreeMap::new();
        for name in &self.columns {
            let source = self.data[name].cells();
            let cells: Vec<Cell> = positions
                .iter()
                .filter_map(|&pos| source.get(pos).cloned())
                .collect();
            let vector = Vector::with_index(cells, name.clone(), index.clone())
                .expect("taken cells match the taken index by construction");
            data.insert(name.clone(), vector);
        }
        Self::from_parts(self.columns.clone(), data, index)
    }

    /// Label-based selection. Unknown row labels are skipped and unknown
    /// column names dropped; use `at` for strict lookup.
    #[must_use]
    pub fn loc(&self, rows: RowSelection<'_>, cols: ColumnSelection<'_>) -> Self {
        let positions: Vec<usize> = match rows {
            RowSelection::All => (0..self.len()).collect(),
            RowSelection::One(label) => self.index.position(label).into_iter().collect(),
            RowSelection::Many(labels) => labels
                .iter()
                .filter_map(|label| self.index.position(label).ok())
                .collect(),
        };

        let selected: Vec<String> = match cols {
            ColumnSelection::All => self.columns.clone(),
            ColumnSelection::One(name) => self
                .columns
                .iter()
                .filter(|col| col.as_str() == name)
                .cloned()
                .collect(),
            ColumnSelection::Many(names) => names
                .iter()
                .filter(|name| self.data.contains_key(**name))
                .map(|name| (*name).to_owned())
                .collect(),
        };

        let subset = self.take_rows(&positions);
        let selected_refs: Vec<&str> = selected.iter().map(String::as_str).collect();
        subset.select_columns(&selected_refs)
    }

    /// A new frame restricted to the named columns, in the given order.
    /// Unknown names are dropped.
    #[must_use]
    pub fn select_columns(&self, names: &[&str]) -> Self {
        let columns: Vec<String> = names
            .iter()
            .filter(|name| self.data.contains_key(**name))
            .map(|name| (*name).to_owned())
            .collect();
        let data = columns
            .iter()
            .map(|name| (name.clone(), self.data[name].clone()))
            .collect();
        Self::from_parts(columns, data, self.index.clone())
    }

    /// Keep the rows whose view satisfies the predicate, in source order,
    /// carrying their original labels.
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&RowView) -> bool) -> Self {
        let mut positions = Vec::new();
        for pos in 0..self.len() {
            let Ok(view) = self.row(pos) else { continue };
            if predicate(&view) {
                positions.push(pos);
            }
        }
        self.take_rows(&positions)
    }

    /// Stable sort by one column; the permutation is applied uniformly to
    /// every column and the index. NA cells sort last ascending and first
    /// descending.
    pub fn sort_by(&self, column: &str, order: SortOrder) -> Result<Self, FrameError> {
        let ascending = matches!(order, SortOrder::Ascending);
        let keys = self.column_required(column)?.cells();
        let mut positions: Vec<usize> = (0..self.len()).collect();
        positions.sort_by(|&a, &b| compare_for_sort(&keys[a], &keys[b], ascending));
        Ok(self.take_rows(&positions))
    }

    /// Summary frame: one row per source column (index name "column"),
    /// columns count, mean, std, min, max in that order.
    #[must_use]
    pub fn describe(&self) -> Self {
        let mut count = Vec::with_capacity(self.columns.len());
        let mut mean = Vec::with_capacity(self.columns.len());
        let mut std = Vec::with_capacity(self.columns.len());
        let mut min = Vec::with_capacity(self.columns.len());
        let mut max = Vec::with_capacity(self.columns.len());
        let mut labels = Vec::with_capacity(self.columns.len());

        for name in &self.columns {
            let vector = &self.data[name];
            count.push(Cell::Float64(vector.count() as f64));
            mean.push(Cell::Float64(vector.mean()));
            std.push(Cell::Float64(vector.std()));
            min.push(vector.min());
            max.push(vector.max());
            labels.push(Cell::Text(name.clone()));
        }

        let mut index = Index::new(labels, None);
        index.set_name("column");

        let columns = vec![
            ("count".to_owned(), count),
            ("mean".to_owned(), mean),
            ("std".to_owned(), std),
            ("min".to_owned(), min),
            ("max".to_owned(), max),
        ];
        let order: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
        let data = columns
            .into_iter()
            .map(|(name, cells)| {
                let vector = Vector::with_index(cells, name.clone(), index.clone())
                    .expect("one summary cell per source column");
                (name, vector)
            })
            .collect();
        Self::from_parts(order, data, index)
    }
}

/// Rows shown at each end of a truncated frame rendering.
const DISPLAY_EDGE_ROWS: usize = 5;

impl fmt::Display for Frame {
    /// Tab-separated listing with an index column; long frames show the
    /// first and last rows around an ellipsis.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (rows, cols) = self.shape();
        writeln!(f, "Frame: rows={rows}, cols={cols}")?;
        if cols == 0 {
            return Ok(());
        }

        write!(f, "index\t")?;
        for name in &self.columns {
            write!(f, "{name}\t")?;
        }
        writeln!(f)?;

        let render = |f: &mut fmt::Formatter<'_>, position: usize| {
            write!(f, "{}\t", self.index.labels()[position])?;
            for name in &self.columns {
                write!(f, "{}\t", self.data[name].cells()[position])?;
            }
            writeln!(f)
        };

        if rows <= DISPLAY_EDGE_ROWS * 2 {
            for position in 0..rows {
                render(f, position)?;
            }
        } else {
            for position in 0..DISPLAY_EDGE_ROWS {
                render(f, position)?;
            }
            writeln!(f, "...")?;
            for position in rows - DISPLAY_EDGE_ROWS..rows {
                render(f, position)?;
            }
        }
        Ok(())
    }
}

/// Vertically stack frames. The first frame's column layout is canonical:
/// a later frame missing a canonical column contributes NA for its row
/// span, and columns only present in later frames are discarded. The
/// result owns a fresh range index.
#[must_use]
pub fn concat(frames: &[&Frame]) -> Frame {
    let Some(first) = frames.first() else {
        return Frame::empty();
    };

    let total_rows: usize = frames.iter().map(|frame| frame.len()).sum();
    let columns: Vec<(String, Vec<Cell>)> = first
        .columns()
        .iter()
        .map(|name| {
            let mut cells = Vec::with_capacity(total_rows);
            for frame in frames {
                match frame.column(name) {
                    Some(vector) => cells.extend_from_slice(vector.cells()),
                    None => cells.extend(std::iter::repeat_n(Cell::Na, frame.len())),
                }
            }
            (name.clone(), cells)
        })
        .collect();

    Frame::new(columns).expect("stacked columns share the total length by construction")
}
