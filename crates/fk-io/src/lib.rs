#![forbid(unsafe_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use fk_frame::{Frame, FrameError};
use fk_types::{Cell, DType};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no header row")]
    MissingHeaders,
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

// ── Row-provider / row-sink contracts ──────────────────────────────────

/// A finite sequence of rows under an ordered header, consumed by frame
/// construction. A cell missing at the tail of a row is NA.
pub trait RowSource {
    fn columns(&self) -> &[String];
    fn next_row(&mut self) -> Option<Result<Vec<Cell>, IoError>>;
}

/// Row-at-a-time consumer fed in canonical column order.
pub trait RowSink {
    fn header(&mut self, columns: &[String]) -> Result<(), IoError>;
    fn row(&mut self, cells: &[Cell]) -> Result<(), IoError>;
}

/// Emission switches for `frame_to_sink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOptions {
    pub include_header: bool,
    pub include_label: bool,
    pub label_name: String,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            include_header: true,
            include_label: false,
            label_name: "index".to_owned(),
        }
    }
}

/// Build a frame by draining a row source. Short rows pad NA at the
/// tail; long rows are truncated to the header width.
pub fn frame_from_source(source: &mut dyn RowSource) -> Result<Frame, IoError> {
    let columns = source.columns().to_vec();
    let width = columns.len();
    let mut cells: Vec<Vec<Cell>> = columns.iter().map(|_| Vec::new()).collect();

    while let Some(row) = source.next_row() {
        let mut row = row?;
        row.resize(width, Cell::Na);
        for (slot, cell) in cells.iter_mut().zip(row) {
            slot.push(cell);
        }
    }

    Ok(Frame::new(columns.into_iter().zip(cells).collect())?)
}

/// Drive a sink over a frame: an optional header, then one row per
/// position with an optional leading label cell.
pub fn frame_to_sink(
    frame: &Frame,
    sink: &mut dyn RowSink,
    options: &SinkOptions,
) -> Result<(), IoError> {
    if options.include_header {
        let mut header = Vec::with_capacity(frame.columns().len() + 1);
        if options.include_label {
            header.push(options.label_name.clone());
        }
        header.extend(frame.columns().iter().cloned());
        sink.header(&header)?;
    }

    for position in 0..frame.len() {
        let mut cells = Vec::with_capacity(frame.columns().len() + 1);
        if options.include_label {
            let label = frame
                .index()
                .get(position)
                .map_err(FrameError::from)?
                .clone();
            cells.push(label);
        }
        for name in frame.columns() {
            let cell = frame
                .column(name)
                .and_then(|column| column.cells().get(position).cloned())
                .unwrap_or(Cell::Na);
            cells.push(cell);
        }
        sink.row(&cells)?;
    }
    Ok(())
}

/// In-memory row source; also the staging form the CSV reader feeds
/// through `frame_from_source`.
pub struct MemorySource {
    columns: Vec<String>,
    rows: std::vec::IntoIter<Vec<Cell>>,
}

impl MemorySource {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }
}

impl RowSource for MemorySource {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Option<Result<Vec<Cell>, IoError>> {
        self.rows.next().map(Ok)
    }
}

// ── CSV adapter ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CsvReadOptions {
    pub delimiter: u8,
    pub has_header: bool,
    pub skip_rows: usize,
    /// Column projection; empty keeps every column.
    pub use_columns: Vec<String>,
    /// Per-column dtype overrides applied after construction; a failed
    /// conversion leaves the column as parsed.
    pub dtypes: Vec<(String, DType)>,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            skip_rows: 0,
            use_columns: Vec::new(),
            dtypes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvWriteOptions {
    pub delimiter: u8,
    pub include_header: bool,
    pub include_index: bool,
    pub index_name: String,
}

impl Default for CsvWriteOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            include_header: true,
            include_index: false,
            index_name: "index".to_owned(),
        }
    }
}

/// Parse one CSV field: empty is NA, then int64, float64, bool, text.
fn parse_cell(field: &str) -> Cell {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Cell::Na;
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return Cell::Int64(value);
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return Cell::Float64(value);
    }
    if let Ok(value) = trimmed.parse::<bool>() {
        return Cell::Bool(value);
    }
    Cell::Text(trimmed.to_owned())
}

fn cell_to_field(cell: &Cell) -> String {
    match cell {
        Cell::Na => String::new(),
        Cell::Float64(v) if v.is_nan() => String::new(),
        other => other.to_string(),
    }
}

fn read_csv_records(
    records: Vec<csv::StringRecord>,
    options: &CsvReadOptions,
) -> Result<Frame, IoError> {
    let rows = records.get(options.skip_rows..).unwrap_or_default();
    let Some(first) = rows.first() else {
        return Ok(Frame::empty());
    };

    let (columns, data_rows): (Vec<String>, &[csv::StringRecord]) = if options.has_header {
        let names = first
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if name.is_empty() {
                    format!("col_{i}")
                } else {
                    name.to_owned()
                }
            })
            .collect();
        (names, &rows[1..])
    } else {
        if first.is_empty() {
            return Err(IoError::MissingHeaders);
        }
        let names = (0..first.len()).map(|i| format!("col_{i}")).collect();
        (names, rows)
    };

    // Column projection keeps header order.
    let keep: Vec<usize> = if options.use_columns.is_empty() {
        (0..columns.len()).collect()
    } else {
        columns
            .iter()
            .enumerate()
            .filter(|(_, name)| options.use_columns.contains(*name))
            .map(|(i, _)| i)
            .collect()
    };
    let kept_columns: Vec<String> = keep.iter().map(|&i| columns[i].clone()).collect();

    let parsed: Vec<Vec<Cell>> = data_rows
        .iter()
        .map(|record| {
            keep.iter()
                .map(|&i| record.get(i).map_or(Cell::Na, parse_cell))
                .collect()
        })
        .collect();

    debug!(rows = parsed.len(), columns = kept_columns.len(), "parsed csv");

    let mut source = MemorySource::new(kept_columns, parsed);
    let mut frame = frame_from_source(&mut source)?;

    for (name, dtype) in &options.dtypes {
        if let Some(column) = frame.column(name)
            && let Ok(converted) = column.as_type(*dtype)
        {
            frame.set_column(name.clone(), converted)?;
        }
    }

    Ok(frame)
}

pub fn read_csv_str(input: &str, options: &CsvReadOptions) -> Result<Frame, IoError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(input.as_bytes());
    let records = reader.records().collect::<Result<Vec<_>, _>>()?;
    read_csv_records(records, options)
}

pub fn read_csv_path(path: impl AsRef<Path>, options: &CsvReadOptions) -> Result<Frame, IoError> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    let records = reader.records().collect::<Result<Vec<_>, _>>()?;
    read_csv_records(records, options)
}

/// CSV-backed row sink over any writer.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W, delimiter: u8) -> Self {
        Self {
            writer: WriterBuilder::new().delimiter(delimiter).from_writer(writer),
        }
    }

    pub fn into_inner(self) -> Result<W, IoError> {
        self.writer
            .into_inner()
            .map_err(|err| IoError::Io(err.into_error()))
    }
}

impl<W: Write> RowSink for CsvSink<W> {
    fn header(&mut self, columns: &[String]) -> Result<(), IoError> {
        self.writer.write_record(columns)?;
        Ok(())
    }

    fn row(&mut self, cells: &[Cell]) -> Result<(), IoError> {
        let record: Vec<String> = cells.iter().map(cell_to_field).collect();
        self.writer.write_record(&record)?;
        Ok(())
    }
}

fn sink_options(options: &CsvWriteOptions) -> SinkOptions {
    SinkOptions {
        include_header: options.include_header,
        include_label: options.include_index,
        label_name: options.index_name.clone(),
    }
}

pub fn write_csv_string(frame: &Frame, options: &CsvWriteOptions) -> Result<String, IoError> {
    let mut sink = CsvSink::new(Vec::new(), options.delimiter);
    frame_to_sink(frame, &mut sink, &sink_options(options))?;
    Ok(String::from_utf8(sink.into_inner()?)?)
}

pub fn write_csv_path(
    path: impl AsRef<Path>,
    frame: &Frame,
    options: &CsvWriteOptions,
) -> Result<(), IoError> {
    let file = File::create(path)?;
    let mut sink = CsvSink::new(file, options.delimiter);
    frame_to_sink(frame, &mut sink, &sink_options(options))?;
    sink.into_inner()?.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use fk_types::{Cell, DType};

    use super::{
        CsvReadOptions, CsvWriteOptions, MemorySource, frame_from_source, read_csv_path,
        read_csv_str, write_csv_path, write_csv_string,
    };

    #[test]
    fn read_infers_cell_types_per_field() {
        let input = "id,score,name,flag\n1,9.5,ada,true\n2,,grace,false\n";
        let frame = read_csv_str(input, &CsvReadOptions::default()).expect("read");
        assert_eq!(frame.shape(), (2, 4));
        assert_eq!(
            frame.column("id").expect("id").cells(),
            &[Cell::Int64(1), Cell::Int64(2)]
        );
        assert_eq!(frame.column("score").expect("score").cells()[0], Cell::Float64(9.5));
        assert!(frame.column("score").expect("score").cells()[1].is_na());
        assert_eq!(frame.column("flag").expect("flag").cells()[1], Cell::Bool(false));
    }

    #[test]
    fn read_without_header_names_columns_positionally() {
        let input = "1,2\n3,4\n";
        let frame = read_csv_str(
            input,
            &CsvReadOptions {
                has_header: false,
                ..CsvReadOptions::default()
            },
        )
        .expect("read");
        assert_eq!(frame.columns(), &["col_0", "col_1"]);
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn blank_header_slots_get_positional_names() {
        let input = "a,,c\n1,2,3\n";
        let frame = read_csv_str(input, &CsvReadOptions::default()).expect("read");
        assert_eq!(frame.columns(), &["a", "col_1", "c"]);
    }

    #[test]
    fn skip_rows_discards_leading_records() {
        let input = "junk line,\nid,v\n1,10\n";
        let frame = read_csv_str(
            input,
            &CsvReadOptions {
                skip_rows: 1,
                ..CsvReadOptions::default()
            },
        )
        .expect("read");
        assert_eq!(frame.columns(), &["id", "v"]);
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn column_projection_keeps_header_order() {
        let input = "a,b,c\n1,2,3\n";
        let frame = read_csv_str(
            input,
            &CsvReadOptions {
                use_columns: vec!["c".to_owned(), "a".to_owned()],
                ..CsvReadOptions::default()
            },
        )
        .expect("read");
        assert_eq!(frame.columns(), &["a", "c"]);
    }

    #[test]
    fn short_rows_pad_na_at_the_tail() {
        let input = "a,b,c\n1,2,3\n4\n";
        let frame = read_csv_str(input, &CsvReadOptions::default()).expect("read");
        assert_eq!(frame.len(), 2);
        assert!(frame.column("b").expect("b").cells()[1].is_na());
        assert!(frame.column("c").expect("c").cells()[1].is_na());
    }

    #[test]
    fn dtype_overrides_convert_after_parse() {
        let input = "id,score\n1,10\n2,20\n";
        let frame = read_csv_str(
            input,
            &CsvReadOptions {
                dtypes: vec![("score".to_owned(), DType::Float64)],
                ..CsvReadOptions::default()
            },
        )
        .expect("read");
        let score = frame.column("score").expect("score");
        assert_eq!(score.dtype(), DType::Float64);
        assert_eq!(score.cells()[0], Cell::Float64(10.0));
        // An impossible override is ignored, not raised.
        let untouched = read_csv_str(
            "id,name\n1,ada\n",
            &CsvReadOptions {
                dtypes: vec![("name".to_owned(), DType::Int64)],
                ..CsvReadOptions::default()
            },
        )
        .expect("read");
        assert_eq!(
            untouched.column("name").expect("name").cells()[0],
            Cell::from("ada")
        );
    }

    #[test]
    fn custom_delimiter_round_trip() {
        let input = "a;b\n1;2\n";
        let options = CsvReadOptions {
            delimiter: b';',
            ..CsvReadOptions::default()
        };
        let frame = read_csv_str(input, &options).expect("read");
        let out = write_csv_string(
            &frame,
            &CsvWriteOptions {
                delimiter: b';',
                ..CsvWriteOptions::default()
            },
        )
        .expect("write");
        assert_eq!(out, "a;b\n1;2\n");
    }

    #[test]
    fn write_renders_na_as_empty_and_emits_optional_index() {
        let frame = read_csv_str("a,b\n1,\n2,x\n", &CsvReadOptions::default()).expect("read");
        let plain = write_csv_string(&frame, &CsvWriteOptions::default()).expect("write");
        assert_eq!(plain, "a,b\n1,\n2,x\n");

        let with_index = write_csv_string(
            &frame,
            &CsvWriteOptions {
                include_index: true,
                index_name: "row".to_owned(),
                ..CsvWriteOptions::default()
            },
        )
        .expect("write");
        assert_eq!(with_index, "row,a,b\n0,1,\n1,2,x\n");

        let headerless = write_csv_string(
            &frame,
            &CsvWriteOptions {
                include_header: false,
                ..CsvWriteOptions::default()
            },
        )
        .expect("write");
        assert_eq!(headerless, "1,\n2,x\n");
    }

    #[test]
    fn empty_input_yields_an_empty_frame() {
        let frame = read_csv_str("", &CsvReadOptions::default()).expect("read");
        assert!(frame.is_empty());
        assert_eq!(frame.shape(), (0, 0));
    }

    #[test]
    fn memory_source_feeds_frame_construction() {
        let mut source = MemorySource::new(
            vec!["a".to_owned(), "b".to_owned()],
            vec![
                vec![Cell::Int64(1), Cell::Int64(2)],
                vec![Cell::Int64(3)], // short row pads NA
            ],
        );
        let frame = frame_from_source(&mut source).expect("frame");
        assert_eq!(frame.shape(), (2, 2));
        assert!(frame.column("b").expect("b").cells()[1].is_na());
    }

    #[test]
    fn file_round_trip_via_tempdir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("frame.csv");

        let frame = read_csv_str("id,v\n1,10\n2,20\n", &CsvReadOptions::default()).expect("read");
        write_csv_path(&path, &frame, &CsvWriteOptions::default()).expect("write");
        let back = read_csv_path(&path, &CsvReadOptions::default()).expect("re-read");
        assert_eq!(frame, back);
    }
}
