#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use fk_frame::{Frame, FrameError, RowView, concat};
use fk_groupby::{Aggregator, GroupBy, GroupByError};
use fk_types::{Cell, DType};
use fk_vector::{Vector, VectorError};
use parking_lot::Mutex;
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ParallelError {
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Vector(#[from] VectorError),
    #[error(transparent)]
    GroupBy(#[from] GroupByError),
}

/// Error surface of `parallel_read`: the first read failure wins, and
/// pool construction can fail before any read starts.
#[derive(Debug, Error)]
pub enum ParallelReadError<E: std::error::Error> {
    #[error("failed to build worker pool: {0}")]
    Pool(#[source] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Read(E),
}

/// Degree-of-parallelism configuration shared by every primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelOptions {
    /// Worker count; 0 selects automatic sizing.
    pub num_workers: usize,
    /// Minimum amount of work that justifies one worker.
    pub chunk_size: usize,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            num_workers: 0,
            chunk_size: 1000,
        }
    }
}

/// Worker sizing: an explicit count wins; otherwise
/// `min(cpu_count, ceil(data_size / max(chunk_size, 1)))`, floor 1.
#[must_use]
pub fn worker_count(options: &ParallelOptions, data_size: usize) -> usize {
    if options.num_workers > 0 {
        return options.num_workers;
    }
    let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    let chunk = options.chunk_size.max(1);
    let max_workers = data_size.div_ceil(chunk).max(1);
    cpus.min(max_workers)
}

fn build_pool(workers: usize) -> Result<rayon::ThreadPool, ParallelError> {
    debug!(workers, "building worker pool");
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()?)
}

/// Element-wise map over contiguous per-worker ranges into a
/// pre-allocated output; order-preserving and equal to `Vector::apply`.
pub fn parallel_apply(
    vector: &Vector,
    func: impl Fn(&Cell) -> Cell + Sync,
    options: &ParallelOptions,
) -> Result<Vector, ParallelError> {
    let n = vector.len();
    let workers = worker_count(options, n);
    if n == 0 || workers <= 1 {
        return Ok(vector.apply(func));
    }

    let range_len = n.div_ceil(workers);
    let mut out = vec![Cell::Na; n];
    let pool = build_pool(workers)?;
    pool.install(|| {
        out.par_chunks_mut(range_len)
            .zip(vector.cells().par_chunks(range_len))
            .for_each(|(dst, src)| {
                for (slot, cell) in dst.iter_mut().zip(src) {
                    *slot = func(cell);
                }
            });
    });

    Ok(Vector::with_dtype(
        out,
        vector.name(),
        DType::Opaque,
        vector.index().clone(),
    )?)
}

/// Row-predicate filter over contiguous ranges. Each range collects its
/// passing positions; ranges merge in range order, so the result keeps
/// source order and equals `Frame::filter`.
pub fn parallel_filter(
    frame: &Frame,
    predicate: impl Fn(&RowView) -> bool + Sync,
    options: &ParallelOptions,
) -> Result<Frame, ParallelError> {
    let n = frame.len();
    let workers = worker_count(options, n);
    if n == 0 || workers <= 1 {
        return Ok(frame.filter(predicate));
    }

    let range_len = n.div_ceil(workers);
    let rows: Vec<usize> = (0..n).collect();
    let pool = build_pool(workers)?;
    let per_range: Vec<Vec<usize>> = pool.install(|| {
        rows.par_chunks(range_len)
            .map(|range| {
                let mut hits = Vec::new();
                for &row in range {
                    let Ok(view) = frame.row(row) else { continue };
                    if predicate(&view) {
                        hits.push(row);
                    }
                }
                hits
            })
            .collect()
    });

    let positions: Vec<usize> = per_range.into_iter().flatten().collect();
    Ok(frame.take_rows(&positions))
}

/// Column-wise transform distributed over the worker pool; results are
/// inserted under a mutex and re-emitted in source column order on the
/// source row index.
pub fn parallel_transform(
    frame: &Frame,
    func: impl Fn(&Vector) -> Vector + Sync,
    options: &ParallelOptions,
) -> Result<Frame, ParallelError> {
    let cols = frame.columns().len();
    if cols == 0 {
        return Ok(frame.clone());
    }
    let workers = worker_count(options, cols).min(cols);
    let pool = build_pool(workers)?;

    let results = Mutex::new(BTreeMap::<String, Vector>::new());
    pool.install(|| {
        frame.columns().par_iter().for_each(|name| {
            if let Some(column) = frame.column(name) {
                let transformed = func(column);
                results.lock().insert(name.clone(), transformed);
            }
        });
    });

    let results = results.into_inner();
    let columns: Vec<(String, Vec<Cell>)> = frame
        .columns()
        .iter()
        .filter_map(|name| {
            results
                .get(name)
                .map(|vector| (name.clone(), vector.cells().to_vec()))
        })
        .collect();
    Ok(Frame::with_index(columns, frame.index().clone())?)
}

fn parallel_column_map<T: Send>(
    frame: &Frame,
    func: impl Fn(&Vector) -> T + Sync,
    options: &ParallelOptions,
) -> Result<BTreeMap<String, T>, ParallelError> {
    let cols = frame.columns().len();
    if cols == 0 {
        return Ok(BTreeMap::new());
    }
    let workers = worker_count(options, cols).min(cols);
    let pool = build_pool(workers)?;

    let results = Mutex::new(BTreeMap::<String, T>::new());
    pool.install(|| {
        frame.columns().par_iter().for_each(|name| {
            if let Some(column) = frame.column(name) {
                let value = func(column);
                results.lock().insert(name.clone(), value);
            }
        });
    });
    Ok(results.into_inner())
}

/// Per-column sums, one mutex-serialized write per column.
pub fn parallel_sum(
    frame: &Frame,
    options: &ParallelOptions,
) -> Result<BTreeMap<String, f64>, ParallelError> {
    parallel_column_map(frame, Vector::sum, options)
}

/// Per-column means.
pub fn parallel_mean(
    frame: &Frame,
    options: &ParallelOptions,
) -> Result<BTreeMap<String, f64>, ParallelError> {
    parallel_column_map(frame, Vector::mean, options)
}

/// Per-column minima (NA for columns with no numeric cells).
pub fn parallel_min(
    frame: &Frame,
    options: &ParallelOptions,
) -> Result<BTreeMap<String, Cell>, ParallelError> {
    parallel_column_map(frame, Vector::min, options)
}

/// Per-column maxima.
pub fn parallel_max(
    frame: &Frame,
    options: &ParallelOptions,
) -> Result<BTreeMap<String, Cell>, ParallelError> {
    parallel_column_map(frame, Vector::max, options)
}

/// Group-wise aggregation over contiguous ranges of group positions.
/// Each worker fills appearance-indexed result slots; the main thread
/// assembles them in group-appearance order, so the output equals
/// `GroupBy::agg`. A column missing from the frame yields an empty frame
/// rather than an error, diverging from the sequential path.
pub fn parallel_agg(
    grouped: &GroupBy<'_>,
    aggregations: &[(&str, &[Aggregator])],
    options: &ParallelOptions,
) -> Result<Frame, ParallelError> {
    for (column, _) in aggregations {
        if grouped.frame().column(column).is_none() {
            return Ok(Frame::empty());
        }
    }

    let num_groups = grouped.n_groups();
    if num_groups == 0 {
        return Ok(grouped.agg(aggregations)?);
    }
    let workers = worker_count(options, num_groups).min(num_groups);
    if workers <= 1 {
        return Ok(grouped.agg(aggregations)?);
    }

    let range_len = num_groups.div_ceil(workers);
    let pool = build_pool(workers)?;

    // One slot per group, indexed by first-appearance position.
    let slots: Vec<(Vec<Cell>, Vec<Cell>)> = pool.install(|| {
        (0..num_groups)
            .into_par_iter()
            .with_min_len(range_len)
            .map(|slot| {
                let composed = &grouped.key_order()[slot];
                let rows = grouped
                    .group_rows(composed)
                    .expect("key order references only recorded groups");
                let key_values = grouped.key_values_at(rows[0]);
                let mut agg_values = Vec::new();
                for (column, funcs) in aggregations {
                    let vector = grouped.group_vector(column, rows);
                    for func in *funcs {
                        agg_values.push(func.apply(&vector));
                    }
                }
                (key_values, agg_values)
            })
            .collect()
    });

    let mut key_cells: Vec<Vec<Cell>> =
        grouped.keys().iter().map(|_| Vec::with_capacity(num_groups)).collect();
    let mut agg_cells: Vec<Vec<Cell>> = aggregations
        .iter()
        .flat_map(|(_, funcs)| funcs.iter().map(|_| Vec::with_capacity(num_groups)))
        .collect();

    for (key_values, agg_values) in slots {
        for (slot, value) in key_cells.iter_mut().zip(key_values) {
            slot.push(value);
        }
        for (slot, value) in agg_cells.iter_mut().zip(agg_values) {
            slot.push(value);
        }
    }

    let mut columns: Vec<(String, Vec<Cell>)> = grouped
        .keys()
        .iter()
        .cloned()
        .zip(key_cells)
        .collect();
    let mut slot = 0;
    for (column, funcs) in aggregations {
        for position in 0..funcs.len() {
            columns.push((
                format!("{column}_{position}"),
                std::mem::take(&mut agg_cells[slot]),
            ));
            slot += 1;
        }
    }
    Ok(Frame::new(columns)?)
}

/// Apply a transform to many vectors through a shared work queue; the
/// results land in input order.
pub fn parallel_map_vectors(
    vectors: &[Vector],
    func: impl Fn(&Vector) -> Vector + Sync,
    options: &ParallelOptions,
) -> Result<Vec<Vector>, ParallelError> {
    if vectors.is_empty() {
        return Ok(Vec::new());
    }
    let workers = worker_count(options, vectors.len()).min(vectors.len());
    let pool = build_pool(workers)?;
    Ok(pool.install(|| vectors.par_iter().map(|vector| func(vector)).collect()))
}

/// Apply a user read function over a list of inputs through the worker
/// pool; the first error stops result emission and is returned, and
/// successful frames concatenate in input order.
pub fn parallel_read<T, E, F>(
    items: &[T],
    read: F,
    options: &ParallelOptions,
) -> Result<Frame, ParallelReadError<E>>
where
    T: Sync,
    E: std::error::Error + Send,
    F: Fn(&T) -> Result<Frame, E> + Sync,
{
    if items.is_empty() {
        return Ok(Frame::empty());
    }
    let workers = worker_count(options, items.len()).min(items.len());
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(ParallelReadError::Pool)?;

    let frames: Vec<Frame> = pool
        .install(|| {
            items
                .par_iter()
                .map(|item| read(item))
                .collect::<Result<Vec<_>, E>>()
        })
        .map_err(ParallelReadError::Read)?;

    let refs: Vec<&Frame> = frames.iter().collect();
    Ok(concat(&refs))
}

/// Sequential chunked map: the function sees `chunk_size` cells at a
/// time and its outputs concatenate in chunk order.
pub fn chunked_apply(
    vector: &Vector,
    func: impl Fn(&[Cell]) -> Vec<Cell>,
    chunk_size: usize,
) -> Result<Vector, ParallelError> {
    let chunk = if chunk_size == 0 { 10_000 } else { chunk_size };
    let mut out = Vec::with_capacity(vector.len());
    for cells in vector.cells().chunks(chunk.max(1)) {
        out.extend(func(cells));
    }
    Ok(Vector::with_dtype(
        out,
        vector.name(),
        DType::Opaque,
        vector.index().clone(),
    )?)
}

/// Parallel chunked map: chunks flow through a shared work queue and the
/// outputs land in chunk-indexed slots concatenated in ascending order,
/// so the result equals `chunked_apply`.
pub fn parallel_chunked_apply(
    vector: &Vector,
    func: impl Fn(&[Cell]) -> Vec<Cell> + Sync,
    chunk_size: usize,
    options: &ParallelOptions,
) -> Result<Vector, ParallelError> {
    let chunk = if chunk_size == 0 { 10_000 } else { chunk_size };
    let n = vector.len();
    if n == 0 {
        return chunked_apply(vector, func, chunk);
    }

    let num_chunks = n.div_ceil(chunk);
    let workers = worker_count(options, num_chunks).min(num_chunks);
    if workers <= 1 {
        return chunked_apply(vector, func, chunk);
    }

    let pool = build_pool(workers)?;
    let slots: Vec<Vec<Cell>> = pool.install(|| {
        vector
            .cells()
            .par_chunks(chunk)
            .map(|cells| func(cells))
            .collect()
    });

    let out: Vec<Cell> = slots.into_iter().flatten().collect();
    Ok(Vector::with_dtype(
        out,
        vector.name(),
        DType::Opaque,
        vector.index().clone(),
    )?)
}
