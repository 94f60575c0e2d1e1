#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use fk_index::{Index, IndexError};
use fk_types::{Cell, DType, TypeError, cast_cell, compare_cells, infer_dtype_slice};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VectorError {
    #[error("cell count ({cells}) does not match index length ({index})")]
    LengthMismatch { cells: usize, index: usize },
    #[error("cast failed at position {position}: {source}")]
    CastFailed {
        position: usize,
        #[source]
        source: TypeError,
    },
    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// One-dimensional labeled column of cells.
///
/// The dtype is advisory (inferred from the first non-absent cell); cells
/// may be heterogeneous and every operator tolerates that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    name: String,
    dtype: DType,
    cells: Vec<Cell>,
    index: Index,
}

/// Compare two cells for sorting with the NA policy applied: absent cells
/// sort last ascending and first descending; ties keep source order via
/// the caller's stable sort.
#[must_use]
pub fn compare_for_sort(left: &Cell, right: &Cell, ascending: bool) -> Ordering {
    match (left.is_na(), right.is_na()) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if ascending {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, true) => {
            if ascending {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, false) => {
            let order = compare_cells(left, right);
            if ascending { order } else { order.reverse() }
        }
    }
}

impl Vector {
    /// Construct with an inferred dtype and a default range index.
    #[must_use]
    pub fn new(cells: Vec<Cell>, name: impl Into<String>) -> Self {
        let dtype = infer_dtype_slice(&cells);
        let index = Index::range(cells.len());
        Self {
            name: name.into(),
            dtype,
            cells,
            index,
        }
    }

    /// Construct from any slice of cell-convertible values.
    #[must_use]
    pub fn from_values<T: Into<Cell>>(values: Vec<T>, name: impl Into<String>) -> Self {
        Self::new(values.into_iter().map(Into::into).collect(), name)
    }

    /// Construct with an explicit dtype tag and index; used by transforms
    /// whose result class is fixed a priori rather than inferred.
    pub fn with_dtype(
        cells: Vec<Cell>,
        name: impl Into<String>,
        dtype: DType,
        index: Index,
    ) -> Result<Self, VectorError> {
        if cells.len() != index.len() {
            return Err(VectorError::LengthMismatch {
                cells: cells.len(),
                index: index.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            dtype,
            cells,
            index,
        })
    }

    /// Construct with a caller-provided index; lengths must agree.
    pub fn with_index(
        cells: Vec<Cell>,
        name: impl Into<String>,
        index: Index,
    ) -> Result<Self, VectorError> {
        if cells.len() != index.len() {
            return Err(VectorError::LengthMismatch {
                cells: cells.len(),
                index: index.len(),
            });
        }
        let dtype = infer_dtype_slice(&cells);
        Ok(Self {
            name: name.into(),
            dtype,
            cells,
            index,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get(&self, position: usize) -> Result<&Cell, VectorError> {
        self.index.get(position)?;
        Ok(&self.cells[position])
    }

    /// Cell at the first occurrence of `label`.
    pub fn at(&self, label: &Cell) -> Result<&Cell, VectorError> {
        let position = self.index.position(label)?;
        Ok(&self.cells[position])
    }

    pub fn set(&mut self, position: usize, cell: Cell) -> Result<(), VectorError> {
        self.index.get(position)?;
        self.cells[position] = cell;
        Ok(())
    }

    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        self.slice(0, n)
    }

    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let n = n.min(self.cells.len());
        self.slice(self.cells.len() - n, self.cells.len())
    }

    /// Window `[start, end)` clamped to bounds; the result owns an
    /// independent index slice.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.cells.len());
        let start = start.min(end);
        Self {
            name: self.name.clone(),
            dtype: self.dtype,
            cells: self.cells[start..end].to_vec(),
            index: self.index.slice(start, end),
        }
    }

    // ── Statistics (NA-aware: absent cells are skipped) ────────────────

    fn numeric_cells(&self) -> Vec<f64> {
        self.cells
            .iter()
            .filter(|cell| !cell.is_na())
            .filter_map(|cell| cell.to_f64().ok())
            .collect()
    }

    /// Sum of numerically coercible cells; 0 when there are none.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.numeric_cells().iter().sum()
    }

    /// Arithmetic mean; NaN when no cell is numeric.
    #[must_use]
    pub fn mean(&self) -> f64 {
        let nums = self.numeric_cells();
        if nums.is_empty() {
            return f64::NAN;
        }
        nums.iter().sum::<f64>() / nums.len() as f64
    }

    /// Exact middle by sorted position; the mean of the two middles for an
    /// even count; NaN when no cell is numeric.
    #[must_use]
    pub fn median(&self) -> f64 {
        let mut nums = self.numeric_cells();
        if nums.is_empty() {
            return f64::NAN;
        }
        nums.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = nums.len() / 2;
        if nums.len() % 2 == 0 {
            (nums[mid - 1] + nums[mid]) / 2.0
        } else {
            nums[mid]
        }
    }

    /// Sample variance (Bessel's correction); NaN when fewer than two
    /// numeric cells.
    #[must_use]
    pub fn var(&self) -> f64 {
        let nums = self.numeric_cells();
        if nums.len() <= 1 {
            return f64::NAN;
        }
        let mean = nums.iter().sum::<f64>() / nums.len() as f64;
        let sum_sq: f64 = nums.iter().map(|v| (v - mean) * (v - mean)).sum();
        sum_sq / (nums.len() - 1) as f64
    }

    #[must_use]
    pub fn std(&self) -> f64 {
        self.var().sqrt()
    }

    /// Minimum as a float cell, or NA when no cell is numeric.
    #[must_use]
    pub fn min(&self) -> Cell {
        let nums = self.numeric_cells();
        if nums.is_empty() {
            return Cell::Na;
        }
        Cell::Float64(nums.iter().copied().fold(f64::INFINITY, f64::min))
    }

    /// Maximum as a float cell, or NA when no cell is numeric.
    #[must_use]
    pub fn max(&self) -> Cell {
        let nums = self.numeric_cells();
        if nums.is_empty() {
            return Cell::Na;
        }
        Cell::Float64(nums.iter().copied().fold(f64::NEG_INFINITY, f64::max))
    }

    /// Number of non-NA cells.
    #[must_use]
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_na()).count()
    }

    /// Distinct cells in first-occurrence order, de-duplicated by
    /// canonical text form.
    #[must_use]
    pub fn unique(&self) -> Self {
        let mut seen = HashMap::<String, ()>::new();
        let cells: Vec<Cell> = self
            .cells
            .iter()
            .filter(|cell| seen.insert(cell.to_string(), ()).is_none())
            .cloned()
            .collect();
        Self::new(cells, self.name.clone())
    }

    #[must_use]
    pub fn nunique(&self) -> usize {
        self.unique().len()
    }

    /// Frequency of each distinct cell. The result's index holds the
    /// distinct cells and its values are integer counts; emission order is
    /// first appearance and callers must not assume more.
    #[must_use]
    pub fn value_counts(&self) -> Self {
        let mut order = Vec::<Cell>::new();
        let mut counts = HashMap::<String, i64>::new();
        for cell in &self.cells {
            let key = cell.to_string();
            if !counts.contains_key(&key) {
                order.push(cell.clone());
            }
            *counts.entry(key).or_insert(0) += 1;
        }

        let values: Vec<Cell> = order
            .iter()
            .map(|cell| Cell::Int64(counts[&cell.to_string()]))
            .collect();
        let mut index = Index::new(order, None);
        index.set_name(self.name.clone());
        Self {
            name: "count".to_owned(),
            dtype: DType::Int64,
            cells: values,
            index,
        }
    }

    // ── Transforms ─────────────────────────────────────────────────────

    /// Element-wise map through a user function. The result dtype is
    /// opaque since the function may return anything.
    #[must_use]
    pub fn apply(&self, func: impl Fn(&Cell) -> Cell) -> Self {
        Self {
            name: self.name.clone(),
            dtype: DType::Opaque,
            cells: self.cells.iter().map(func).collect(),
            index: self.index.clone(),
        }
    }

    /// Replace cells present in the lookup table (keyed on canonical text
    /// form); cells without an entry pass through untouched.
    #[must_use]
    pub fn map(&self, lookup: &[(Cell, Cell)]) -> Self {
        let table: HashMap<String, &Cell> = lookup
            .iter()
            .map(|(from, to)| (from.to_string(), to))
            .collect();
        let cells = self
            .cells
            .iter()
            .map(|cell| {
                table
                    .get(&cell.to_string())
                    .map_or_else(|| cell.clone(), |&replacement| replacement.clone())
            })
            .collect();
        Self {
            name: self.name.clone(),
            dtype: DType::Opaque,
            cells,
            index: self.index.clone(),
        }
    }

    /// Replace every NA cell with `fill`.
    #[must_use]
    pub fn fill_na(&self, fill: &Cell) -> Self {
        let cells = self
            .cells
            .iter()
            .map(|cell| {
                if cell.is_na() {
                    fill.clone()
                } else {
                    cell.clone()
                }
            })
            .collect();
        Self {
            name: self.name.clone(),
            dtype: self.dtype,
            cells,
            index: self.index.clone(),
        }
    }

    /// Drop NA cells together with their aligned labels.
    #[must_use]
    pub fn drop_na(&self) -> Self {
        let kept: Vec<usize> = self
            .cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| !cell.is_na())
            .map(|(pos, _)| pos)
            .collect();
        Self {
            name: self.name.clone(),
            dtype: self.dtype,
            cells: kept.iter().map(|&pos| self.cells[pos].clone()).collect(),
            index: self.index.take(&kept),
        }
    }

    /// Boolean mask of NA cells, on the same index.
    #[must_use]
    pub fn is_na(&self) -> Self {
        Self {
            name: format!("{}_isna", self.name),
            dtype: DType::Bool,
            cells: self.cells.iter().map(|c| Cell::Bool(c.is_na())).collect(),
            index: self.index.clone(),
        }
    }

    /// Boolean mask of non-NA cells, on the same index.
    #[must_use]
    pub fn not_na(&self) -> Self {
        Self {
            name: format!("{}_notna", self.name),
            dtype: DType::Bool,
            cells: self.cells.iter().map(|c| Cell::Bool(!c.is_na())).collect(),
            index: self.index.clone(),
        }
    }

    /// Cast every cell to `target`; the first failure aborts with the
    /// offending position.
    pub fn as_type(&self, target: DType) -> Result<Self, VectorError> {
        let cells = self
            .cells
            .iter()
            .enumerate()
            .map(|(position, cell)| {
                cast_cell(cell, target)
                    .map_err(|source| VectorError::CastFailed { position, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: self.name.clone(),
            dtype: target,
            cells,
            index: self.index.clone(),
        })
    }

    /// Stable value sort: numeric-first comparison with lexicographic
    /// fallback; NA cells sort last ascending and first descending.
    #[must_use]
    pub fn sort_values(&self, ascending: bool) -> Self {
        let mut order: Vec<usize> = (0..self.cells.len()).collect();
        order.sort_by(|&a, &b| compare_for_sort(&self.cells[a], &self.cells[b], ascending));
        Self {
            name: self.name.clone(),
            dtype: self.dtype,
            cells: order.iter().map(|&pos| self.cells[pos].clone()).collect(),
            index: self.index.take(&order),
        }
    }

    // ── Arithmetic ─────────────────────────────────────────────────────

    fn apply_op(a: f64, b: f64, op: ArithmeticOp) -> f64 {
        match op {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Sub => a - b,
            ArithmeticOp::Mul => a * b,
            ArithmeticOp::Div => {
                if b == 0.0 {
                    f64::NAN
                } else {
                    a / b
                }
            }
        }
    }

    /// Pairwise arithmetic up to the shorter length; positions beyond the
    /// other side and cells that fail numeric coercion produce NA. The
    /// result is float64 on the receiver's index.
    #[must_use]
    pub fn binary(&self, other: &Self, op: ArithmeticOp) -> Self {
        let cells = self
            .cells
            .iter()
            .enumerate()
            .map(|(pos, cell)| {
                let Some(rhs) = other.cells.get(pos) else {
                    return Cell::Na;
                };
                match (cell.to_f64(), rhs.to_f64()) {
                    (Ok(a), Ok(b)) => Cell::Float64(Self::apply_op(a, b, op)),
                    _ => Cell::Na,
                }
            })
            .collect();
        Self {
            name: self.name.clone(),
            dtype: DType::Float64,
            cells,
            index: self.index.clone(),
        }
    }

    /// Broadcast arithmetic against a scalar; a non-coercible scalar
    /// yields an all-NA result.
    #[must_use]
    pub fn binary_scalar(&self, value: &Cell, op: ArithmeticOp) -> Self {
        let rhs = value.to_f64();
        let cells = self
            .cells
            .iter()
            .map(|cell| match (&rhs, cell.to_f64()) {
                (Ok(b), Ok(a)) => Cell::Float64(Self::apply_op(a, *b, op)),
                _ => Cell::Na,
            })
            .collect();
        Self {
            name: self.name.clone(),
            dtype: DType::Float64,
            cells,
            index: self.index.clone(),
        }
    }

    #[must_use]
    pub fn add(&self, other: &Self) -> Self {
        self.binary(other, ArithmeticOp::Add)
    }

    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        self.binary(other, ArithmeticOp::Sub)
    }

    #[must_use]
    pub fn mul(&self, other: &Self) -> Self {
        self.binary(other, ArithmeticOp::Mul)
    }

    #[must_use]
    pub fn div(&self, other: &Self) -> Self {
        self.binary(other, ArithmeticOp::Div)
    }

    #[must_use]
    pub fn add_scalar(&self, value: &Cell) -> Self {
        self.binary_scalar(value, ArithmeticOp::Add)
    }

    #[must_use]
    pub fn sub_scalar(&self, value: &Cell) -> Self {
        self.binary_scalar(value, ArithmeticOp::Sub)
    }

    #[must_use]
    pub fn mul_scalar(&self, value: &Cell) -> Self {
        self.binary_scalar(value, ArithmeticOp::Mul)
    }

    #[must_use]
    pub fn div_scalar(&self, value: &Cell) -> Self {
        self.binary_scalar(value, ArithmeticOp::Div)
    }
}

/// Rows shown at each end of a truncated rendering.
const DISPLAY_EDGE_ROWS: usize = 10;

impl fmt::Display for Vector {
    /// Label/value listing with a one-line header; long vectors show the
    /// first and last rows around an ellipsis.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Vector: {} (dtype: {}, length: {})",
            self.name,
            self.dtype,
            self.cells.len()
        )?;

        let render = |f: &mut fmt::Formatter<'_>, position: usize| {
            writeln!(
                f,
                "{}    {}",
                self.index.labels()[position], self.cells[position]
            )
        };

        if self.cells.len() <= DISPLAY_EDGE_ROWS * 2 {
            for position in 0..self.cells.len() {
                render(f, position)?;
            }
        } else {
            for position in 0..DISPLAY_EDGE_ROWS {
                render(f, position)?;
            }
            writeln!(f, "...")?;
            for position in self.cells.len() - DISPLAY_EDGE_ROWS..self.cells.len() {
                render(f, position)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fk_index::Index;
    use fk_types::{Cell, DType};

    use super::{Vector, VectorError};

    fn mixed_vector() -> Vector {
        Vector::new(
            vec![
                Cell::Int64(1),
                Cell::Na,
                Cell::Float64(2.5),
                Cell::Text("7".into()),
                Cell::Text("oak".into()),
            ],
            "values",
        )
    }

    #[test]
    fn construction_infers_dtype_and_range_index() {
        let v = Vector::from_values(vec![1_i64, 2, 3], "ids");
        assert_eq!(v.dtype(), DType::Int64);
        assert_eq!(v.index().labels(), Index::range(3).labels());
    }

    #[test]
    fn with_index_rejects_length_mismatch() {
        let err = Vector::with_index(vec![Cell::Int64(1)], "v", Index::range(2))
            .expect_err("must fail");
        assert_eq!(err, VectorError::LengthMismatch { cells: 1, index: 2 });
    }

    #[test]
    fn get_at_and_set() {
        let mut v = Vector::with_index(
            vec![Cell::Int64(10), Cell::Int64(20)],
            "v",
            Index::new(vec!["a".into(), "b".into()], None),
        )
        .expect("build");

        assert_eq!(v.get(1).expect("get"), &Cell::Int64(20));
        assert_eq!(v.at(&Cell::from("a")).expect("at"), &Cell::Int64(10));
        v.set(0, Cell::Int64(99)).expect("set");
        assert_eq!(v.get(0).expect("get"), &Cell::Int64(99));
        assert!(v.get(5).is_err());
        assert!(v.at(&Cell::from("z")).is_err());
    }

    #[test]
    fn head_tail_slice_own_their_index() {
        let v = Vector::from_values(vec![1_i64, 2, 3, 4, 5], "v");
        assert_eq!(v.head(2).cells(), &[Cell::Int64(1), Cell::Int64(2)]);
        assert_eq!(v.tail(2).cells(), &[Cell::Int64(4), Cell::Int64(5)]);
        let sliced = v.slice(1, 3);
        assert_eq!(sliced.cells(), &[Cell::Int64(2), Cell::Int64(3)]);
        assert_eq!(
            sliced.index().labels(),
            &[Cell::Int64(1), Cell::Int64(2)]
        );
        // Oversized windows clamp instead of failing.
        assert_eq!(v.head(99).len(), 5);
        assert_eq!(v.tail(99).len(), 5);
    }

    #[test]
    fn statistics_skip_na_and_coerce_text() {
        let v = mixed_vector();
        // 1 + 2.5 + "7"; the NA and the non-numeric text are skipped.
        assert!((v.sum() - 10.5).abs() < 1e-12);
        assert!((v.mean() - 3.5).abs() < 1e-12);
        assert!((v.median() - 2.5).abs() < 1e-12);
        assert_eq!(v.count(), 4);
        assert_eq!(v.min(), Cell::Float64(1.0));
        assert_eq!(v.max(), Cell::Float64(7.0));
    }

    #[test]
    fn statistics_on_empty_or_non_numeric_input() {
        let empty = Vector::new(Vec::new(), "e");
        assert_eq!(empty.sum(), 0.0);
        assert!(empty.mean().is_nan());
        assert!(empty.median().is_nan());
        assert!(empty.var().is_nan());
        assert!(empty.std().is_nan());
        assert_eq!(empty.min(), Cell::Na);
        assert_eq!(empty.max(), Cell::Na);

        let words = Vector::from_values(vec!["a", "b"], "w");
        assert_eq!(words.sum(), 0.0);
        assert_eq!(words.min(), Cell::Na);
    }

    #[test]
    fn variance_uses_bessel_correction() {
        let v = Vector::from_values(vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], "v");
        assert!((v.var() - 32.0 / 7.0).abs() < 1e-10);
        assert!((v.std() - (32.0 / 7.0_f64).sqrt()).abs() < 1e-10);
        let single = Vector::from_values(vec![5.0], "s");
        assert!(single.var().is_nan());
    }

    #[test]
    fn unique_dedups_by_canonical_text_in_first_occurrence_order() {
        let v = Vector::new(
            vec![
                Cell::from("b"),
                Cell::from("a"),
                Cell::from("b"),
                Cell::Int64(1),
                Cell::from("1"),
            ],
            "v",
        );
        let uniq = v.unique();
        // Int64(1) and Text("1") share a canonical form.
        assert_eq!(
            uniq.cells(),
            &[Cell::from("b"), Cell::from("a"), Cell::Int64(1)]
        );
        assert_eq!(v.nunique(), 3);
    }

    #[test]
    fn value_counts_indexes_distinct_cells() {
        let v = Vector::from_values(vec!["x", "y", "x", "x"], "tag");
        let counts = v.value_counts();
        assert_eq!(counts.name(), "count");
        assert_eq!(counts.index().name(), Some("tag"));
        assert_eq!(counts.index().labels(), &[Cell::from("x"), Cell::from("y")]);
        assert_eq!(counts.cells(), &[Cell::Int64(3), Cell::Int64(1)]);
    }

    #[test]
    fn apply_marks_result_opaque() {
        let v = Vector::from_values(vec![1_i64, 2], "v");
        let doubled = v.apply(|cell| match cell {
            Cell::Int64(n) => Cell::Int64(n * 2),
            other => other.clone(),
        });
        assert_eq!(doubled.cells(), &[Cell::Int64(2), Cell::Int64(4)]);
        assert_eq!(doubled.dtype(), DType::Opaque);
    }

    #[test]
    fn map_replaces_only_listed_values() {
        let v = Vector::from_values(vec!["cat", "dog", "cat"], "pet");
        let mapped = v.map(&[(Cell::from("cat"), Cell::from("feline"))]);
        assert_eq!(
            mapped.cells(),
            &[Cell::from("feline"), Cell::from("dog"), Cell::from("feline")]
        );
    }

    #[test]
    fn fill_na_and_drop_na() {
        let v = Vector::new(vec![Cell::Int64(1), Cell::Na, Cell::Int64(3)], "v");
        let filled = v.fill_na(&Cell::Int64(0));
        assert!(filled.cells().iter().all(|c| !c.is_na()));

        let dropped = v.drop_na();
        assert_eq!(dropped.cells(), &[Cell::Int64(1), Cell::Int64(3)]);
        assert_eq!(
            dropped.index().labels(),
            &[Cell::Int64(0), Cell::Int64(2)]
        );
        assert!(dropped.is_na().cells().iter().all(|c| c == &Cell::Bool(false)));
    }

    #[test]
    fn na_masks_share_the_index() {
        let v = Vector::new(vec![Cell::Na, Cell::Int64(1)], "v");
        assert_eq!(
            v.is_na().cells(),
            &[Cell::Bool(true), Cell::Bool(false)]
        );
        assert_eq!(
            v.not_na().cells(),
            &[Cell::Bool(false), Cell::Bool(true)]
        );
        assert_eq!(v.is_na().index().labels(), v.index().labels());
    }

    #[test]
    fn as_type_reports_offending_position() {
        let v = Vector::new(
            vec![Cell::Text("1".into()), Cell::Text("oops".into())],
            "v",
        );
        let err = v.as_type(DType::Int64).expect_err("must fail");
        match err {
            VectorError::CastFailed { position, .. } => assert_eq!(position, 1),
            other => panic!("unexpected error {other:?}"),
        }

        let ok = v.as_type(DType::Text).expect("text cast");
        assert_eq!(ok.dtype(), DType::Text);
    }

    #[test]
    fn sort_values_is_stable_with_na_policy() {
        let v = Vector::new(
            vec![
                Cell::Int64(2),
                Cell::Na,
                Cell::Int64(1),
                Cell::Int64(2),
                Cell::Int64(1),
            ],
            "v",
        );
        let asc = v.sort_values(true);
        assert_eq!(
            asc.cells(),
            &[
                Cell::Int64(1),
                Cell::Int64(1),
                Cell::Int64(2),
                Cell::Int64(2),
                Cell::Na,
            ]
        );
        // Stability: the first 1 came from position 2, the second from 4.
        assert_eq!(
            asc.index().labels(),
            &[
                Cell::Int64(2),
                Cell::Int64(4),
                Cell::Int64(0),
                Cell::Int64(3),
                Cell::Int64(1),
            ]
        );

        let desc = v.sort_values(false);
        assert_eq!(desc.cells()[0], Cell::Na);
        assert_eq!(desc.cells()[1], Cell::Int64(2));
    }

    #[test]
    fn arithmetic_pairs_to_shorter_side() {
        let left = Vector::from_values(vec![1.0, 2.0, 3.0], "l");
        let right = Vector::from_values(vec![10.0, 20.0], "r");
        let out = left.add(&right);
        assert_eq!(out.dtype(), DType::Float64);
        assert_eq!(out.cells()[0], Cell::Float64(11.0));
        assert_eq!(out.cells()[1], Cell::Float64(22.0));
        assert_eq!(out.cells()[2], Cell::Na);
        assert_eq!(out.index().labels(), left.index().labels());
    }

    #[test]
    fn arithmetic_yields_na_for_non_numeric_cells() {
        let left = Vector::new(vec![Cell::Int64(1), Cell::from("oak")], "l");
        let right = Vector::from_values(vec![1_i64, 2], "r");
        let out = left.mul(&right);
        assert_eq!(out.cells(), &[Cell::Float64(1.0), Cell::Na]);
    }

    #[test]
    fn division_by_zero_is_nan() {
        let left = Vector::from_values(vec![1.0, 4.0], "l");
        let right = Vector::from_values(vec![0.0, 2.0], "r");
        let out = left.div(&right);
        assert!(out.cells()[0].is_na());
        assert_eq!(out.cells()[1], Cell::Float64(2.0));
    }

    #[test]
    fn scalar_arithmetic_broadcasts() {
        let v = Vector::from_values(vec![1_i64, 2, 3], "v");
        let out = v.add_scalar(&Cell::Int64(10));
        assert_eq!(
            out.cells(),
            &[Cell::Float64(11.0), Cell::Float64(12.0), Cell::Float64(13.0)]
        );

        let all_na = v.add_scalar(&Cell::from("oak"));
        assert!(all_na.cells().iter().all(Cell::is_na));
    }

    #[test]
    fn display_lists_labels_and_values() {
        let v = Vector::from_values(vec![10_i64, 20], "v");
        let rendered = v.to_string();
        assert!(rendered.starts_with("Vector: v (dtype: int64, length: 2)"));
        assert!(rendered.contains("0    10"));
        assert!(rendered.contains("1    20"));
        assert!(!rendered.contains("..."));
    }

    #[test]
    fn display_truncates_long_vectors() {
        let v = Vector::from_values((0..100).collect::<Vec<i64>>(), "v");
        let rendered = v.to_string();
        assert!(rendered.contains("..."));
        assert!(rendered.contains("0    0"));
        assert!(rendered.contains("99    99"));
        assert!(!rendered.contains("50    50"));
    }

    #[test]
    fn map_with_empty_lookup_is_identity() {
        let v = Vector::from_values(vec![1_i64, 2], "v");
        assert_eq!(v.map(&[]).cells(), v.cells());
    }

    #[test]
    fn value_counts_totals_cover_every_cell() {
        // The absent marker renders "NA" and float NaN renders "NaN":
        // distinct canonical forms, distinct count buckets.
        let v = Vector::new(
            vec![Cell::Na, Cell::Na, Cell::Int64(1), Cell::Float64(f64::NAN)],
            "v",
        );
        let counts = v.value_counts();
        assert_eq!(counts.len(), 3);
        let total: i64 = counts
            .cells()
            .iter()
            .map(|cell| match cell {
                Cell::Int64(n) => *n,
                other => panic!("unexpected count cell {other:?}"),
            })
            .sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn scalar_division_by_zero_scalar_is_nan() {
        let v = Vector::from_values(vec![1.0, 2.0], "v");
        let out = v.div_scalar(&Cell::Int64(0));
        assert!(out.cells().iter().all(Cell::is_na));
    }

    #[test]
    fn sub_and_mul_scalar_broadcast() {
        let v = Vector::from_values(vec![4_i64, 6], "v");
        assert_eq!(
            v.sub_scalar(&Cell::Int64(1)).cells(),
            &[Cell::Float64(3.0), Cell::Float64(5.0)]
        );
        assert_eq!(
            v.mul_scalar(&Cell::Int64(2)).cells(),
            &[Cell::Float64(8.0), Cell::Float64(12.0)]
        );
    }

    #[test]
    fn vector_serde_round_trip() {
        let v = mixed_vector();
        let json = serde_json::to_string(&v).expect("serialize");
        let back: Vector = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(v, back);
    }
}
