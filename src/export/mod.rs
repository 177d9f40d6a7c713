//! Spreadsheet output.
//!
//! [`SheetWriter`] owns the layout rules (header, widths, row ceiling,
//! sheet naming); a [`SheetSink`] puts cells into an actual file.

pub mod xlsx;

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::models::{CellValue, ResultBatch};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub use xlsx::XlsxSink;

/// Data rows per sheet allowed by the xlsx format (header row excluded).
pub const MAX_DATA_ROWS_PER_SHEET: u32 = 1_048_575;
pub const MAX_COLUMNS: usize = 16_384;
pub const MAX_COLUMN_WIDTH: usize = 50;
const WIDTH_PADDING: usize = 2;
const MAX_SHEET_NAME_CHARS: usize = 31;

/// What happens when a sheet reaches its row ceiling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowLimitPolicy {
    /// Abort the export; nothing is saved.
    #[default]
    Fail,
    /// Continue on a numbered sheet.
    Split,
    /// Keep the rows that fit and drop the rest.
    Truncate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Stream the result in batches.
    #[default]
    Chunked,
    /// Materialize the full result, then write it.
    Single,
}

/// Destination and layout of one export.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    pub path: PathBuf,
    pub sheet_name: String,
    pub date_format: String,
    pub datetime_format: String,
    pub max_rows_per_sheet: u32,
    pub row_limit_policy: RowLimitPolicy,
    pub width_sample_rows: usize,
}

impl ExportTarget {
    pub fn new(path: impl Into<PathBuf>, sheet_name: &str, config: &ExportConfig) -> Self {
        Self {
            path: path.into(),
            sheet_name: sheet_name.to_string(),
            date_format: config.date_format.clone(),
            datetime_format: config.datetime_format.clone(),
            max_rows_per_sheet: config.max_rows_per_sheet.min(MAX_DATA_ROWS_PER_SHEET),
            row_limit_policy: config.row_limit_policy,
            width_sample_rows: config.width_sample_rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub rows_written: u64,
    pub rows_dropped: u64,
    pub sheets: usize,
}

/// Destination of the cells laid out by [`SheetWriter`].
///
/// Row indexes are absolute: row 0 holds the header. Rows of a sheet are
/// written once each, in increasing order.
pub trait SheetSink {
    fn add_sheet(&mut self, name: &str) -> Result<(), ExportError>;
    fn write_header(&mut self, columns: &[String]) -> Result<(), ExportError>;
    fn write_row(&mut self, row: u32, values: &[CellValue]) -> Result<(), ExportError>;
    fn set_column_widths(&mut self, widths: &[usize]) -> Result<(), ExportError>;
    fn save(&mut self) -> Result<(), ExportError>;
}

/// Column widths in characters: longest of header and rendered values,
/// plus padding, capped at [`MAX_COLUMN_WIDTH`].
pub fn column_widths(columns: &[String], rows: &[Vec<CellValue>]) -> Vec<usize> {
    columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let longest_value = rows
                .iter()
                .filter_map(|row| row.get(i))
                .map(|value| value.render().chars().count())
                .max()
                .unwrap_or(0);
            (name.chars().count().max(longest_value) + WIDTH_PADDING).min(MAX_COLUMN_WIDTH)
        })
        .collect()
}

/// Replaces characters Excel rejects in sheet names and enforces the length limit.
pub fn sanitize_sheet_name(name: &str) -> String {
    fit_sheet_name(name, MAX_SHEET_NAME_CHARS)
}

fn fit_sheet_name(name: &str, max_chars: usize) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    let trimmed: String = cleaned.trim_matches('\'').chars().take(max_chars).collect();
    if trimmed.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        trimmed
    }
}

/// `"<base> (n)"` for continuation sheets, shortened to fit the name limit.
fn continuation_sheet_name(base: &str, index: usize) -> String {
    let suffix = format!(" ({})", index);
    let room = MAX_SHEET_NAME_CHARS.saturating_sub(suffix.chars().count());
    format!("{}{}", fit_sheet_name(base, room), suffix)
}

struct SheetState {
    columns: Vec<String>,
    widths: Vec<usize>,
    sheet_index: usize,
    rows_in_sheet: u32,
    truncated: bool,
}

/// Lays out result batches into sheets.
///
/// Either call [`SheetWriter::export`] once, or feed batches through
/// [`SheetWriter::append`] and close with [`SheetWriter::finish`].
pub struct SheetWriter<S: SheetSink = XlsxSink> {
    sink: S,
    target: ExportTarget,
    state: Option<SheetState>,
    rows_written: u64,
    rows_dropped: u64,
}

impl SheetWriter<XlsxSink> {
    /// Writer backed by an xlsx file; creates the output directory.
    pub fn create(target: ExportTarget) -> Result<Self, ExportError> {
        ensure_parent_dir(&target.path)?;
        let sink = XlsxSink::new(&target.path, &target.date_format, &target.datetime_format);
        Ok(Self::with_sink(sink, target))
    }
}

impl<S: SheetSink> SheetWriter<S> {
    pub fn with_sink(sink: S, target: ExportTarget) -> Self {
        Self {
            sink,
            target,
            state: None,
            rows_written: 0,
            rows_dropped: 0,
        }
    }

    /// Writes the whole batch; widths account for every row.
    pub fn export(mut self, batch: &ResultBatch) -> Result<ExportSummary, ExportError> {
        if !batch.columns.is_empty() {
            self.begin(&batch.columns, &batch.rows)?;
            self.write_rows(&batch.rows)?;
        }
        self.finish()
    }

    /// Starts the first sheet: header and column widths from `sample`.
    pub fn begin(&mut self, columns: &[String], sample: &[Vec<CellValue>]) -> Result<(), ExportError> {
        if columns.len() > MAX_COLUMNS {
            return Err(ExportError::TooManyColumns(columns.len()));
        }
        let widths = column_widths(columns, sample);
        self.state = Some(SheetState {
            columns: columns.to_vec(),
            widths,
            sheet_index: 0,
            rows_in_sheet: 0,
            truncated: false,
        });
        self.open_next_sheet()
    }

    /// Appends a batch after the rows already written. The first batch
    /// starts the sheet, with widths sized from its leading rows.
    pub fn append(&mut self, batch: &ResultBatch) -> Result<(), ExportError> {
        if batch.is_empty() {
            return Ok(());
        }
        match self.state.as_ref().map(|state| state.columns.len()) {
            None => {
                let sample = &batch.rows[..batch.len().min(self.target.width_sample_rows)];
                self.begin(&batch.columns, sample)?;
            }
            Some(expected) if expected != batch.columns.len() => {
                return Err(ExportError::SchemaMismatch {
                    expected,
                    found: batch.columns.len(),
                });
            }
            Some(_) => {}
        }
        self.write_rows(&batch.rows)
    }

    /// Convenience over [`SheetWriter::append`] for an in-memory sequence of batches.
    pub fn export_chunks<I>(mut self, batches: I) -> Result<ExportSummary, ExportError>
    where
        I: IntoIterator<Item = ResultBatch>,
    {
        for batch in batches {
            self.append(&batch)?;
        }
        self.finish()
    }

    /// Saves the file. A writer that never saw a row produces one empty sheet.
    pub fn finish(mut self) -> Result<ExportSummary, ExportError> {
        let sheets = match &self.state {
            Some(state) => state.sheet_index,
            None => {
                warn!(
                    "No rows to export; writing empty sheet `{}`",
                    self.target.sheet_name
                );
                self.sink.add_sheet(&sanitize_sheet_name(&self.target.sheet_name))?;
                1
            }
        };

        if self.rows_dropped > 0 {
            warn!(
                "Sheet row limit of {} reached; {} rows were not written",
                self.target.max_rows_per_sheet, self.rows_dropped
            );
        }

        self.sink.save()?;
        info!(
            "Wrote {} rows to {} ({} sheet(s))",
            self.rows_written,
            self.target.path.display(),
            sheets
        );

        Ok(ExportSummary {
            path: self.target.path,
            rows_written: self.rows_written,
            rows_dropped: self.rows_dropped,
            sheets,
        })
    }

    fn open_next_sheet(&mut self) -> Result<(), ExportError> {
        let state = self.state.as_mut().ok_or(ExportError::NoSheet)?;
        state.sheet_index += 1;
        state.rows_in_sheet = 0;

        let name = if state.sheet_index == 1 {
            sanitize_sheet_name(&self.target.sheet_name)
        } else {
            continuation_sheet_name(&self.target.sheet_name, state.sheet_index)
        };

        self.sink.add_sheet(&name)?;
        self.sink.write_header(&state.columns)?;
        self.sink.set_column_widths(&state.widths)
    }

    fn write_rows(&mut self, rows: &[Vec<CellValue>]) -> Result<(), ExportError> {
        let limit = self.target.max_rows_per_sheet;
        for row in rows {
            let state = self.state.as_mut().ok_or(ExportError::NoSheet)?;
            if state.truncated {
                self.rows_dropped += 1;
                continue;
            }
            if state.rows_in_sheet >= limit {
                match self.target.row_limit_policy {
                    RowLimitPolicy::Fail => {
                        return Err(ExportError::RowLimitExceeded {
                            sheet: self.target.sheet_name.clone(),
                            limit,
                        })
                    }
                    RowLimitPolicy::Truncate => {
                        state.truncated = true;
                        self.rows_dropped += 1;
                        continue;
                    }
                    RowLimitPolicy::Split => self.open_next_sheet()?,
                }
            }

            let state = self.state.as_mut().ok_or(ExportError::NoSheet)?;
            state.rows_in_sheet += 1;
            let excel_row = state.rows_in_sheet;
            self.sink.write_row(excel_row, row)?;
            self.rows_written += 1;
        }
        Ok(())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct RecordedSheet {
        name: String,
        header: Vec<String>,
        widths: Vec<usize>,
        rows: BTreeMap<u32, Vec<CellValue>>,
    }

    #[derive(Debug, Default)]
    struct RecordingSink {
        sheets: Vec<RecordedSheet>,
        saved: bool,
    }

    impl RecordingSink {
        fn current(&mut self) -> Result<&mut RecordedSheet, ExportError> {
            self.sheets.last_mut().ok_or(ExportError::NoSheet)
        }
    }

    impl SheetSink for &mut RecordingSink {
        fn add_sheet(&mut self, name: &str) -> Result<(), ExportError> {
            self.sheets.push(RecordedSheet {
                name: name.to_string(),
                ..RecordedSheet::default()
            });
            Ok(())
        }

        fn write_header(&mut self, columns: &[String]) -> Result<(), ExportError> {
            self.current()?.header = columns.to_vec();
            Ok(())
        }

        fn write_row(&mut self, row: u32, values: &[CellValue]) -> Result<(), ExportError> {
            self.current()?.rows.insert(row, values.to_vec());
            Ok(())
        }

        fn set_column_widths(&mut self, widths: &[usize]) -> Result<(), ExportError> {
            self.current()?.widths = widths.to_vec();
            Ok(())
        }

        fn save(&mut self) -> Result<(), ExportError> {
            self.saved = true;
            Ok(())
        }
    }

    fn target(max_rows: u32, policy: RowLimitPolicy) -> ExportTarget {
        ExportTarget {
            path: PathBuf::from("unused.xlsx"),
            sheet_name: "Supplier Site".to_string(),
            date_format: "yyyy-mm-dd".to_string(),
            datetime_format: "yyyy-mm-dd".to_string(),
            max_rows_per_sheet: max_rows,
            row_limit_policy: policy,
            width_sample_rows: 100,
        }
    }

    fn columns() -> Vec<String> {
        vec!["VENDOR_ID (M)".to_string(), "TRX_1Y_COUNT (M)".to_string()]
    }

    fn rows(range: std::ops::Range<i64>) -> Vec<Vec<CellValue>> {
        range
            .map(|i| vec![CellValue::Text(format!("V{:03}", i)), CellValue::Integer(i)])
            .collect()
    }

    #[test]
    fn chunked_export_matches_single_export() {
        let mut single = RecordingSink::default();
        let summary = SheetWriter::with_sink(&mut single, target(1000, RowLimitPolicy::Fail))
            .export(&ResultBatch::new(columns(), rows(0..10)))
            .unwrap();
        assert_eq!(summary.rows_written, 10);

        let mut chunked = RecordingSink::default();
        let batches = vec![
            ResultBatch::new(columns(), rows(0..3)),
            ResultBatch::new(columns(), rows(3..6)),
            ResultBatch::new(columns(), rows(6..10)),
        ];
        let summary = SheetWriter::with_sink(&mut chunked, target(1000, RowLimitPolicy::Fail))
            .export_chunks(batches)
            .unwrap();
        assert_eq!(summary.rows_written, 10);
        assert_eq!(summary.sheets, 1);

        assert!(single.saved && chunked.saved);
        assert_eq!(single.sheets.len(), 1);
        assert_eq!(chunked.sheets.len(), 1);
        assert_eq!(single.sheets[0].header, chunked.sheets[0].header);
        assert_eq!(single.sheets[0].rows, chunked.sheets[0].rows);
        assert_eq!(*chunked.sheets[0].rows.keys().next().unwrap(), 1);
        assert_eq!(*chunked.sheets[0].rows.keys().last().unwrap(), 10);
    }

    #[test]
    fn widths_are_capped_and_stable() {
        let cols = vec!["ID".to_string(), "ADDRESS1 (M)".to_string()];
        let data = vec![
            vec![CellValue::Integer(7), CellValue::Text("x".repeat(80))],
            vec![CellValue::Null, CellValue::Text("Av. Siempre Viva 742".to_string())],
        ];
        let widths = column_widths(&cols, &data);
        assert_eq!(widths, vec![4, MAX_COLUMN_WIDTH]);
        assert_eq!(column_widths(&cols, &data), widths);
    }

    #[test]
    fn widths_count_characters_not_bytes() {
        let cols = vec!["Ñ".to_string()];
        let data = vec![vec![CellValue::Text("Peñalolén".to_string())]];
        assert_eq!(column_widths(&cols, &data), vec![11]);
    }

    #[test]
    fn fail_policy_aborts_without_saving() {
        let mut sink = RecordingSink::default();
        let result = SheetWriter::with_sink(&mut sink, target(5, RowLimitPolicy::Fail))
            .export(&ResultBatch::new(columns(), rows(0..6)));
        assert!(matches!(
            result,
            Err(ExportError::RowLimitExceeded { limit: 5, .. })
        ));
        assert!(!sink.saved);
    }

    #[test]
    fn split_policy_continues_on_numbered_sheets() {
        let mut sink = RecordingSink::default();
        let summary = SheetWriter::with_sink(&mut sink, target(4, RowLimitPolicy::Split))
            .export(&ResultBatch::new(columns(), rows(0..10)))
            .unwrap();
        assert_eq!(summary.sheets, 3);
        assert_eq!(summary.rows_written, 10);

        let names: Vec<_> = sink.sheets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Supplier Site", "Supplier Site (2)", "Supplier Site (3)"]);
        assert!(sink.sheets.iter().all(|s| s.header == columns()));
        assert_eq!(sink.sheets[2].rows.len(), 2);
        assert_eq!(sink.sheets[1].rows[&1][1], CellValue::Integer(4));
    }

    #[test]
    fn truncate_policy_drops_overflow() {
        let mut sink = RecordingSink::default();
        let summary = SheetWriter::with_sink(&mut sink, target(4, RowLimitPolicy::Truncate))
            .export_chunks(vec![
                ResultBatch::new(columns(), rows(0..3)),
                ResultBatch::new(columns(), rows(3..7)),
            ])
            .unwrap();
        assert_eq!(summary.rows_written, 4);
        assert_eq!(summary.rows_dropped, 3);
        assert_eq!(sink.sheets.len(), 1);
        assert!(sink.saved);
    }

    #[test]
    fn later_batches_must_keep_the_column_count() {
        let mut sink = RecordingSink::default();
        let mut writer = SheetWriter::with_sink(&mut sink, target(100, RowLimitPolicy::Fail));
        writer.append(&ResultBatch::new(columns(), rows(0..2))).unwrap();
        let narrow = ResultBatch::new(
            vec!["VENDOR_ID (M)".to_string()],
            vec![vec![CellValue::from("V9")]],
        );
        assert!(matches!(
            writer.append(&narrow),
            Err(ExportError::SchemaMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn empty_result_yields_one_empty_sheet() {
        let mut sink = RecordingSink::default();
        let summary = SheetWriter::with_sink(&mut sink, target(100, RowLimitPolicy::Fail))
            .export_chunks(Vec::new())
            .unwrap();
        assert_eq!(summary.rows_written, 0);
        assert_eq!(summary.sheets, 1);
        assert_eq!(sink.sheets.len(), 1);
        assert!(sink.sheets[0].header.is_empty());
    }

    #[test]
    fn sheet_names_are_sanitized() {
        assert_eq!(sanitize_sheet_name("Q1/Q2 [draft]"), "Q1_Q2 _draft_");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).chars().count(), 31);
        assert_eq!(sanitize_sheet_name("''"), "Sheet1");
        let continued = continuation_sheet_name(&"y".repeat(40), 12);
        assert_eq!(continued.chars().count(), 31);
        assert!(continued.ends_with(" (12)"));
    }
}
