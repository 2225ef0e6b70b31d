//! Streaming conversion of a sweep table into a per-run store.
//!
//! The table is read one record at a time. Rows are physical lines, blank
//! lines included, so the header sits at a fixed line. Rows before the
//! header are skipped, the header fixes the attribute names and the variable columns,
//! and every later row either creates its run or appends one sample to each
//! of the run's series. Only the current row, the schema and the writer's
//! open run handles are held in memory.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use csv::StringRecord;
use sv_store::{Attribute, StoreManifest, StoreSchema, StoreWriter, WriterOptions, is_valid_run_id};

use crate::error::{AppError, AppResult};
use crate::progress::{ConvertProgress, ConvertStage};

/// Structural constants of the BehaviorSpace "table" export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    /// 0-based row holding the column names; earlier rows are front matter.
    pub header_row: usize,
    /// Columns `0..attribute_columns` are per-run attributes (column 0 is the run id).
    pub attribute_columns: usize,
    pub tick_column: usize,
    /// Columns from here on are variables.
    pub first_variable_column: usize,
}

impl TableLayout {
    pub const BEHAVIOR_SPACE: Self = Self {
        header_row: 6,
        attribute_columns: 17,
        tick_column: 17,
        first_variable_column: 18,
    };

    pub const RUN_ID_COLUMN: usize = 0;
}

impl Default for TableLayout {
    fn default() -> Self {
        Self::BEHAVIOR_SPACE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableColumn {
    pub name: String,
    pub column: usize,
}

/// Column layout read from the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub attribute_names: Vec<String>,
    pub variables: Vec<VariableColumn>,
}

impl TableSchema {
    pub fn from_header(record: &StringRecord, layout: &TableLayout) -> AppResult<Self> {
        let row = layout.header_row;
        if record.len() <= layout.first_variable_column {
            return Err(AppError::MalformedInput {
                row,
                message: format!(
                    "header has {} columns, expected at least {}",
                    record.len(),
                    layout.first_variable_column + 1
                ),
            });
        }

        let attribute_names = record
            .iter()
            .take(layout.attribute_columns)
            .map(|name| name.to_string())
            .collect();

        let mut seen = HashSet::new();
        let mut variables = Vec::new();
        for (column, name) in record.iter().enumerate().skip(layout.first_variable_column) {
            if !seen.insert(name) {
                return Err(AppError::MalformedInput {
                    row,
                    message: format!("duplicate variable column {name:?}"),
                });
            }
            variables.push(VariableColumn {
                name: name.to_string(),
                column,
            });
        }

        Ok(Self {
            attribute_names,
            variables,
        })
    }

    pub fn store_schema(&self) -> StoreSchema {
        StoreSchema {
            attribute_names: self.attribute_names.clone(),
            variables: self.variables.iter().map(|v| v.name.clone()).collect(),
        }
    }

    /// Highest column index a data row must have.
    fn last_column(&self, layout: &TableLayout) -> usize {
        self.variables
            .iter()
            .map(|v| v.column)
            .chain([layout.tick_column, TableLayout::RUN_ID_COLUMN])
            .max()
            .unwrap_or(layout.tick_column)
    }

    /// Attribute values of a data row, trimmed like the run id and tick.
    fn attributes(&self, record: &StringRecord) -> Vec<Attribute> {
        self.attribute_names
            .iter()
            .zip(record.iter())
            .map(|(name, value)| Attribute {
                name: name.clone(),
                value: value.trim().to_string(),
            })
            .collect()
    }
}

/// A data row with every number already parsed.
struct ParsedRow {
    run_id: String,
    tick: i64,
    values: Vec<f64>,
}

fn parse_row(
    record: &StringRecord,
    schema: &TableSchema,
    layout: &TableLayout,
    row: usize,
) -> AppResult<ParsedRow> {
    let needed = schema.last_column(layout) + 1;
    if record.len() < needed {
        return Err(AppError::MalformedInput {
            row,
            message: format!("row has {} columns, expected {}", record.len(), needed),
        });
    }

    let run_id = record[TableLayout::RUN_ID_COLUMN].trim().to_string();
    if !is_valid_run_id(&run_id) {
        return Err(AppError::MalformedInput {
            row,
            message: format!("invalid run id {run_id:?}"),
        });
    }

    let tick_text = record[layout.tick_column].trim();
    let tick = tick_text
        .parse::<i64>()
        .map_err(|e| AppError::MalformedInput {
            row,
            message: format!("tick {tick_text:?} is not an integer: {e}"),
        })?;

    let values = schema
        .variables
        .iter()
        .map(|variable| {
            let text = record[variable.column].trim();
            text.parse::<f64>().map_err(|e| AppError::MalformedInput {
                row,
                message: format!("{} value {text:?} is not a number: {e}", variable.name),
            })
        })
        .collect::<AppResult<Vec<f64>>>()?;

    Ok(ParsedRow {
        run_id,
        tick,
        values,
    })
}

#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub writer: WriterOptions,
}

#[derive(Debug, Clone)]
pub struct ConvertSummary {
    pub store_path: PathBuf,
    pub manifest: StoreManifest,
    /// Rows consumed, front matter and header included.
    pub rows: usize,
    pub runs: usize,
    pub elapsed_wall_s: f64,
}

fn emit_progress(
    progress_cb: &mut Option<&mut dyn FnMut(ConvertProgress)>,
    event: ConvertProgress,
) {
    if let Some(cb) = progress_cb.as_deref_mut() {
        cb(event);
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableConverter {
    layout: TableLayout,
}

impl TableConverter {
    pub fn new(layout: TableLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Feed `(row, record)` pairs into `writer`. Returns the number of rows consumed.
    ///
    /// Rows must increase. The writer is left open; the caller finishes or
    /// discards it.
    pub fn convert_records<I>(
        &self,
        records: I,
        writer: &mut StoreWriter,
        total: Option<usize>,
        mut progress_cb: Option<&mut dyn FnMut(ConvertProgress)>,
    ) -> AppResult<usize>
    where
        I: IntoIterator<Item = AppResult<(usize, StringRecord)>>,
    {
        let layout = self.layout;
        let mut schema: Option<TableSchema> = None;
        let mut rows = 0usize;

        for item in records {
            let (row, record) = item?;
            if schema.is_none() && row > layout.header_row {
                return Err(AppError::MalformedInput {
                    row,
                    message: format!(
                        "header row missing (expected at row {})",
                        layout.header_row
                    ),
                });
            }

            let stage = if row < layout.header_row {
                ConvertStage::FrontMatter
            } else if row == layout.header_row {
                let header = TableSchema::from_header(&record, &layout)?;
                writer.set_schema(header.store_schema())?;
                tracing::debug!(
                    attributes = header.attribute_names.len(),
                    variables = header.variables.len(),
                    "read table header"
                );
                schema = Some(header);
                ConvertStage::Header
            } else {
                let Some(schema) = schema.as_ref() else {
                    return Err(AppError::MalformedInput {
                        row,
                        message: "data row before header".to_string(),
                    });
                };
                if record.is_empty() {
                    tracing::debug!(row, "skipping blank data row");
                } else {
                    let parsed = parse_row(&record, schema, &layout, row)?;
                    if writer.has_run(&parsed.run_id) {
                        writer.append(&parsed.run_id, parsed.tick, &parsed.values)?;
                    } else {
                        writer.create_run(
                            &parsed.run_id,
                            schema.attributes(&record),
                            parsed.tick,
                            &parsed.values,
                        )?;
                    }
                }
                ConvertStage::Data
            };

            rows = row + 1;
            emit_progress(
                &mut progress_cb,
                ConvertProgress {
                    row,
                    total,
                    stage,
                    runs: writer.run_count(),
                },
            );
        }

        if schema.is_none() {
            return Err(AppError::MalformedInput {
                row: rows,
                message: format!(
                    "header row missing (expected at row {})",
                    layout.header_row
                ),
            });
        }
        Ok(rows)
    }

    /// Stream a delimited table from any reader into `writer`.
    pub fn convert_reader<R: Read>(
        &self,
        reader: R,
        writer: &mut StoreWriter,
        total: Option<usize>,
        progress_cb: Option<&mut dyn FnMut(ConvertProgress)>,
    ) -> AppResult<usize> {
        self.convert_records(TableRecords::new(reader), writer, total, progress_cb)
    }

    /// Convert a CSV file into a new store at `store_path`.
    ///
    /// On failure the partially written store is removed; conversion has to
    /// be restarted from the beginning.
    pub fn convert_file(
        &self,
        csv_path: &Path,
        store_path: &Path,
        options: &ConvertOptions,
        progress_cb: Option<&mut dyn FnMut(ConvertProgress)>,
    ) -> AppResult<ConvertSummary> {
        let started = Instant::now();
        ensure_csv_path(csv_path)?;
        let total = count_rows(csv_path)?;
        let source_file = file_name(csv_path);

        tracing::info!(
            source = %csv_path.display(),
            store = %store_path.display(),
            rows = total + 1,
            "converting table"
        );

        let file = std::fs::File::open(csv_path)?;
        let mut writer = StoreWriter::create(
            store_path,
            source_file,
            StoreSchema::default(),
            options.writer.clone(),
        )?;

        let rows = match self.convert_reader(file, &mut writer, Some(total), progress_cb) {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(error = %err, store = %store_path.display(), "conversion failed; discarding store");
                if let Err(discard_err) = writer.discard() {
                    tracing::warn!(error = %discard_err, "could not remove partial store");
                }
                return Err(err);
            }
        };

        let manifest = writer.finish(rows)?;
        let summary = ConvertSummary {
            store_path: store_path.to_path_buf(),
            runs: manifest.runs.len(),
            manifest,
            rows,
            elapsed_wall_s: started.elapsed().as_secs_f64(),
        };
        tracing::info!(
            runs = summary.runs,
            rows = summary.rows,
            elapsed_s = summary.elapsed_wall_s,
            "conversion finished"
        );
        Ok(summary)
    }
}

/// Records of a table numbered by the physical line they start on.
///
/// A blank line is an empty record. A quoted field may continue over
/// several lines; the record keeps the row of its first line.
pub struct TableRecords<R> {
    lines: Lines<BufReader<R>>,
    next_row: usize,
}

impl<R: Read> TableRecords<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            next_row: 0,
        }
    }
}

impl<R: Read> Iterator for TableRecords<R> {
    type Item = AppResult<(usize, StringRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut text = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => return Some(Err(e.into())),
        };
        let row = self.next_row;
        self.next_row += 1;

        // unbalanced quotes: the field continues on the next line
        while text.matches('"').count() % 2 == 1 {
            match self.lines.next() {
                Some(Ok(line)) => {
                    text.push('\n');
                    text.push_str(&line);
                    self.next_row += 1;
                }
                Some(Err(e)) => return Some(Err(e.into())),
                None => break,
            }
        }

        Some(parse_record(&text).map(|record| (row, record)))
    }
}

fn parse_record(text: &str) -> AppResult<StringRecord> {
    let mut record = StringRecord::new();
    if text.is_empty() {
        return Ok(record);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .buffer_capacity(text.len() + 1)
        .from_reader(text.as_bytes());
    reader.read_record(&mut record)?;
    Ok(record)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Row of the last record of a table, the progress maximum.
pub fn count_rows(csv_path: &Path) -> AppResult<usize> {
    let file = std::fs::File::open(csv_path)?;
    let mut last = None;
    for item in TableRecords::new(file) {
        let (row, _) = item?;
        last = Some(row);
    }
    last.ok_or_else(|| AppError::EmptyInput(format!("{} has no rows", csv_path.display())))
}

/// Reject anything not named `*.csv`.
pub fn ensure_csv_path(csv_path: &Path) -> AppResult<()> {
    let is_csv = csv_path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "not a CSV file: {}",
            csv_path.display()
        )))
    }
}

/// Store path next to the table: `dir/sweep.csv` becomes `dir/sweep.<extension>`.
pub fn default_store_path(csv_path: &Path, extension: &str) -> PathBuf {
    csv_path.with_extension(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(variables: &[&str]) -> StringRecord {
        let mut fields: Vec<String> = vec!["[run number]".to_string()];
        fields.extend((1..17).map(|i| format!("param-{i}")));
        fields.push("[step]".to_string());
        fields.extend(variables.iter().map(|v| v.to_string()));
        StringRecord::from(fields)
    }

    fn data(run: &str, tick: &str, values: &[&str]) -> StringRecord {
        let mut fields: Vec<String> = vec![run.to_string()];
        fields.extend((1..17).map(|i| format!("{i}")));
        fields.push(tick.to_string());
        fields.extend(values.iter().map(|v| v.to_string()));
        StringRecord::from(fields)
    }

    #[test]
    fn header_defines_attributes_and_variables() {
        let schema =
            TableSchema::from_header(&header(&["count turtles", "mean energy"]), &TableLayout::default())
                .unwrap();
        assert_eq!(schema.attribute_names.len(), 17);
        assert_eq!(schema.attribute_names[0], "[run number]");
        assert_eq!(
            schema.variables,
            vec![
                VariableColumn {
                    name: "count turtles".to_string(),
                    column: 18
                },
                VariableColumn {
                    name: "mean energy".to_string(),
                    column: 19
                },
            ]
        );
    }

    #[test]
    fn short_or_duplicate_header_is_malformed() {
        let layout = TableLayout::default();
        let short = StringRecord::from(vec!["[run number]", "x"]);
        assert!(matches!(
            TableSchema::from_header(&short, &layout),
            Err(AppError::MalformedInput { row: 6, .. })
        ));
        assert!(matches!(
            TableSchema::from_header(&header(&["a", "a"]), &layout),
            Err(AppError::MalformedInput { .. })
        ));
    }

    #[test]
    fn rows_are_parsed_before_any_write() {
        let layout = TableLayout::default();
        let schema = TableSchema::from_header(&header(&["a", "b"]), &layout).unwrap();

        let parsed = parse_row(&data(" 3 ", "12", &["1.5", " 2 "]), &schema, &layout, 7).unwrap();
        assert_eq!(parsed.run_id, "3");
        assert_eq!(parsed.tick, 12);
        assert_eq!(parsed.values, vec![1.5, 2.0]);

        let attributes = schema.attributes(&data(" 3 ", "12", &["1.5", " 2 "]));
        assert_eq!(attributes[0].name, "[run number]");
        assert_eq!(attributes[0].value, parsed.run_id);

        let bad_tick = parse_row(&data("3", "1.5", &["1", "2"]), &schema, &layout, 8);
        assert!(matches!(bad_tick, Err(AppError::MalformedInput { row: 8, .. })));

        let bad_value = parse_row(&data("3", "1", &["1", "n/a"]), &schema, &layout, 9);
        assert!(matches!(bad_value, Err(AppError::MalformedInput { row: 9, .. })));

        let short = parse_row(&data("3", "1", &["1"]), &schema, &layout, 10);
        assert!(matches!(short, Err(AppError::MalformedInput { row: 10, .. })));

        let bad_id = parse_row(&data("a/b", "1", &["1", "2"]), &schema, &layout, 11);
        assert!(matches!(bad_id, Err(AppError::MalformedInput { row: 11, .. })));
    }

    fn rows_of(text: &str) -> Vec<(usize, Vec<String>)> {
        TableRecords::new(text.as_bytes())
            .map(|item| {
                let (row, record) = item.unwrap();
                (row, record.iter().map(str::to_string).collect())
            })
            .collect()
    }

    #[test]
    fn blank_lines_keep_their_row() {
        let rows = rows_of("\"a\"\n\n\"b\",\"c\"\r\n\n");
        assert_eq!(
            rows,
            vec![
                (0, vec!["a".to_string()]),
                (1, vec![]),
                (2, vec!["b".to_string(), "c".to_string()]),
                (3, vec![]),
            ]
        );
    }

    #[test]
    fn quoted_field_may_span_lines() {
        let rows = rows_of("\"x\",\"two\nlines\"\n\"y\"\n");
        assert_eq!(
            rows,
            vec![
                (0, vec!["x".to_string(), "two\nlines".to_string()]),
                (2, vec!["y".to_string()]),
            ]
        );
    }

    #[test]
    fn csv_paths() {
        assert!(ensure_csv_path(Path::new("/tmp/sweep.CSV")).is_ok());
        assert!(ensure_csv_path(Path::new("/tmp/sweep.txt")).is_err());
        assert!(ensure_csv_path(Path::new("/tmp/sweep")).is_err());
        assert_eq!(
            default_store_path(Path::new("/data/exp.1/sweep.csv"), "svstore"),
            PathBuf::from("/data/exp.1/sweep.svstore")
        );
    }
}
