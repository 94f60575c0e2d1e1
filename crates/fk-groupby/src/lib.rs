#![forbid(unsafe_code)]

use std::collections::HashMap;

use fk_frame::{Frame, FrameError, concat};
use fk_types::Cell;
use fk_vector::Vector;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GroupByError {
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Separator between the canonical renderings that make up a composed
/// group key. A null byte cannot appear in a rendered cell.
const KEY_SEPARATOR: char = '\u{0}';

/// Compose the group key for one row: the canonical text rendering of
/// each key cell, null-separated.
///
/// Numerically equal but textually distinct cells (`1` vs `1.0`) compose
/// different keys; this is intentional and relied upon by callers.
fn composed_key(frame: &Frame, keys: &[String], row: usize) -> String {
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

/// Aggregation function applied to a per-group column vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregator {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    Std,
    Var,
    First,
    Last,
}

impl Aggregator {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::Std => "std",
            Self::Var => "var",
            Self::First => "first",
            Self::Last => "last",
        }
    }

    /// Reduce one group's vector to a single cell.
    #[must_use]
    pub fn apply(self, vector: &Vector) -> Cell {
        match self {
            Self::Sum => Cell::Float64(vector.sum()),
            Self::Mean => Cell::Float64(vector.mean()),
            Self::Min => vector.min(),
            Self::Max => vector.max(),
            Self::Count => Cell::Int64(vector.count() as i64),
            Self::Std => Cell::Float64(vector.std()),
            Self::Var => Cell::Float64(vector.var()),
            Self::First => vector.cells().first().cloned().unwrap_or(Cell::Na),
            Self::Last => vector.cells().last().cloned().unwrap_or(Cell::Na),
        }
    }
}

/// Grouped view of a frame: a single scan composes one key per row and
/// records the row positions of each group plus first-appearance order.
#[derive(Debug)]
pub struct GroupBy<'a> {
    frame: &'a Frame,
    keys: Vec<String>,
    groups: HashMap<String, Vec<usize>>,
    key_order: Vec<String>,
}

impl<'a> GroupBy<'a> {
    pub fn new(frame: &'a Frame, keys: &[&str]) -> Result<Self, GroupByError> {
        for key in keys {
            frame.column_required(key)?;
        }
        let keys: Vec<String> = keys.iter().map(|key| (*key).to_owned()).collect();

        let mut groups = HashMap::<String, Vec<usize>>::new();
        let mut key_order = Vec::new();
        for row in 0..frame.len() {
            let key = composed_key(frame, &keys, row);
            let entry = groups.entry(key.clone()).or_default();
            if entry.is_empty() {
                key_order.push(key);
            }
            entry.push(row);
        }

        debug!(rows = frame.len(), groups = key_order.len(), "built group index");

        Ok(Self {
            frame,
            keys,
            groups,
            key_order,
        })
    }

    #[must_use]
    pub fn frame(&self) -> &Frame {
        self.frame
    }

    #[must_use]
    pub fn n_groups(&self) -> usize {
        self.key_order.len()
    }

    /// Composed key → ordered row positions.
    #[must_use]
    pub fn groups(&self) -> &HashMap<String, Vec<usize>> {
        &self.groups
    }

    /// Composed keys in first-appearance order.
    #[must_use]
    pub fn key_order(&self) -> &[String] {
        &self.key_order
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn group_rows(&self, composed: &str) -> Option<&[usize]> {
        self.groups.get(composed).map(Vec::as_slice)
    }

    /// The original per-key cell values, recovered from a group's first
    /// row.
    #[must_use]
    pub fn key_values_at(&self, row: usize) -> Vec<Cell> {
        self.keys
            .iter()
            .map(|key| {
                self.frame
                    .column(key)
                    .map_or(Cell::Na, |column| column.cells()[row].clone())
            })
            .collect()
    }

    /// One group's cells of `column` as a vector with a fresh range index.
    #[must_use]
    pub fn group_vector(&self, column: &str, rows: &[usize]) -> Vector {
        let cells = self.frame.column(column).map_or_else(Vec::new, |source| {
            rows.iter()
                .filter_map(|&row| source.cells().get(row).cloned())
                .collect()
        });
        Vector::new(cells, column)
    }

    /// One group's rows as a frame in the containing frame's column
    /// order, under a fresh range index.
    pub fn group_frame(&self, rows: &[usize]) -> Result<Frame, GroupByError> {
        let columns = self
            .frame
            .columns()
            .iter()
            .map(|name| (name.clone(), self.group_vector(name, rows).cells().to_vec()))
            .collect();
        Ok(Frame::new(columns)?)
    }

    /// Group sizes as a frame: the key columns followed by an integer
    /// `size` column, groups in first-appearance order.
    pub fn size(&self) -> Result<Frame, GroupByError> {
        let mut key_cells: Vec<Vec<Cell>> = self.keys.iter().map(|_| Vec::new()).collect();
        let mut sizes = Vec::with_capacity(self.key_order.len());

        for composed in &self.key_order {
            let rows = &self.groups[composed];
            let values = self.key_values_at(rows[0]);
            for (slot, value) in key_cells.iter_mut().zip(values) {
                slot.push(value);
            }
            sizes.push(Cell::Int64(rows.len() as i64));
        }

        let mut columns: Vec<(String, Vec<Cell>)> =
            self.keys.iter().cloned().zip(key_cells).collect();
        columns.push(("size".to_owned(), sizes));
        Ok(Frame::new(columns)?)
    }

    /// Multi-aggregator dispatch: the key columns lead in construction
    /// order, then one `<column>_<k>` column per aggregator, `k` being the
    /// aggregator's 0-based position in its list.
    pub fn agg(&self, aggregations: &[(&str, &[Aggregator])]) -> Result<Frame, GroupByError> {
        for (column, _) in aggregations {
            self.frame.column_required(column)?;
        }

        let mut key_cells: Vec<Vec<Cell>> = self.keys.iter().map(|_| Vec::new()).collect();
        let mut agg_cells: Vec<Vec<Cell>> = aggregations
            .iter()
            .flat_map(|(_, funcs)| funcs.iter().map(|_| Vec::new()))
            .collect();

        for composed in &self.key_order {
            let rows = &self.groups[composed];
            let values = self.key_values_at(rows[0]);
            for (slot, value) in key_cells.iter_mut().zip(values) {
                slot.push(value);
            }

            let mut slot = 0;
            for (column, funcs) in aggregations {
                let vector = self.group_vector(column, rows);
                for func in *funcs {
                    agg_cells[slot].push(func.apply(&vector));
                    slot += 1;
                }
            }
        }

        let mut columns: Vec<(String, Vec<Cell>)> =
            self.keys.iter().cloned().zip(key_cells).collect();
        let mut slot = 0;
        for (column, funcs) in aggregations {
            for position in 0..funcs.len() {
                columns.push((format!("{column}_{position}"), std::mem::take(&mut agg_cells[slot])));
                slot += 1;
            }
        }
        Ok(Frame::new(columns)?)
    }

    /// Single-aggregator dispatch over the named columns (all non-key
    /// columns in frame order when empty); output columns are
    /// `<column>_<suffix>`. Unknown names are skipped.
    pub fn aggregate_all(
        &self,
        func: Aggregator,
        suffix: &str,
        columns: &[&str],
    ) -> Result<Frame, GroupByError> {
        let targets: Vec<String> = if columns.is_empty() {
            self.frame
                .columns()
                .iter()
                .filter(|name| !self.keys.contains(name))
                .cloned()
                .collect()
        } else {
            columns
                .iter()
                .filter(|name| self.frame.column(name).is_some())
                .map(|name| (*name).to_owned())
                .collect()
        };

        let mut key_cells: Vec<Vec<Cell>> = self.keys.iter().map(|_| Vec::new()).collect();
        let mut agg_cells: Vec<Vec<Cell>> = targets.iter().map(|_| Vec::new()).collect();

        for composed in &self.key_order {
            let rows = &self.groups[composed];
            let values = self.key_values_at(rows[0]);
            for (slot, value) in key_cells.iter_mut().zip(values) {
                slot.push(value);
            }
            for (slot, column) in agg_cells.iter_mut().zip(&targets) {
                slot.push(func.apply(&self.group_vector(column, rows)));
            }
        }

        let mut out: Vec<(String, Vec<Cell>)> =
            self.keys.iter().cloned().zip(key_cells).collect();
        for (column, cells) in targets.into_iter().zip(agg_cells) {
            out.push((format!("{column}_{suffix}"), cells));
        }
        Ok(Frame::new(out)?)
    }

    pub fn sum(&self, columns: &[&str]) -> Result<Frame, GroupByError> {
        self.aggregate_all(Aggregator::Sum, "sum", columns)
    }

    pub fn mean(&self, columns: &[&str]) -> Result<Frame, GroupByError> {
        self.aggregate_all(Aggregator::Mean, "mean", columns)
    }

    pub fn min(&self, columns: &[&str]) -> Result<Frame, GroupByError> {
        self.aggregate_all(Aggregator::Min, "min", columns)
    }

    pub fn max(&self, columns: &[&str]) -> Result<Frame, GroupByError> {
        self.aggregate_all(Aggregator::Max, "max", columns)
    }

    pub fn count(&self, columns: &[&str]) -> Result<Frame, GroupByError> {
        self.aggregate_all(Aggregator::Count, "count", columns)
    }

    pub fn std(&self, columns: &[&str]) -> Result<Frame, GroupByError> {
        self.aggregate_all(Aggregator::Std, "std", columns)
    }

    pub fn first(&self, columns: &[&str]) -> Result<Frame, GroupByError> {
        self.aggregate_all(Aggregator::First, "first", columns)
    }

    pub fn last(&self, columns: &[&str]) -> Result<Frame, GroupByError> {
        self.aggregate_all(Aggregator::Last, "last", columns)
    }

    /// Feed each group's frame to a user function and vertically stack
    /// the non-empty results under the first result's column layout, with
    /// a fresh range index.
    pub fn apply(
        &self,
        func: impl Fn(&Frame) -> Option<Frame>,
    ) -> Result<Frame, GroupByError> {
        let mut results = Vec::new();
        for composed in &self.key_order {
            let rows = &self.groups[composed];
            let group = self.group_frame(rows)?;
            if let Some(out) = func(&group)
                && !out.is_empty()
            {
                results.push(out);
            }
        }

        let refs: Vec<&Frame> = results.iter().collect();
        Ok(concat(&refs))
    }

    /// Keep every row of the groups whose predicate holds; retained rows
    /// are re-sorted to source order under a fresh range index.
    pub fn filter(&self, predicate: impl Fn(&Frame) -> bool) -> Result<Frame, GroupByError> {
        let mut positions = Vec::new();
        for composed in &self.key_order {
            let rows = &self.groups[composed];
            let group = self.group_frame(rows)?;
            if predicate(&group) {
                positions.extend_from_slice(rows);
            }
        }
        positions.sort_unstable();

        let columns = self
            .frame
            .columns()
            .iter()
            .map(|name| {
                let source = self.frame.column(name).map(Vector::cells).unwrap_or_default();
                let cells = positions
                    .iter()
                    .filter_map(|&row| source.get(row).cloned())
                    .collect();
                (name.clone(), cells)
            })
            .collect();
        Ok(Frame::new(columns)?)
    }

    /// Apply `func` to each group's vector of `column` and scatter the
    /// result back to the group's source positions. A result shorter than
    /// its group leaves the trailing rows NA. The output spans the source
    /// frame under a fresh range index.
    pub fn transform(
        &self,
        column: &str,
        func: impl Fn(&Vector) -> Vector,
    ) -> Result<Vector, GroupByError> {
        self.frame.column_required(column)?;

        let mut cells = vec![Cell::Na; self.frame.len()];
        for rows in self.groups.values() {
            let transformed = func(&self.group_vector(column, rows));
            for (offset, &row) in rows.iter().enumerate() {
                if let Some(cell) = transformed.cells().get(offset) {
                    cells[row] = cell.clone();
                }
            }
        }
        Ok(Vector::new(cells, format!("{column}_transformed")))
    }
}
