use crate::config::ExportConfig;
use crate::db::Database;
use crate::error::{Error, Result, TransformError};
use crate::export::{ExportMode, ExportSummary, ExportTarget, SheetWriter};
use crate::models::ResultBatch;
use crate::report::{ColumnMapping, OutputTarget, Report, ReportRegistry};
use crate::rules::RuleSet;
use chrono::Local;
use futures::TryStreamExt;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Runs reports against one data-source session, strictly one at a time.
pub struct ReportService {
    db: Database,
    rules: Arc<RuleSet>,
    export: ExportConfig,
}

/// Result of a best-effort batch run.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub generated: Vec<ExportSummary>,
    pub failed: Vec<(String, Error)>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl ReportService {
    pub fn new(db: Database, rules: Arc<RuleSet>, export: ExportConfig) -> Self {
        Self { db, rules, export }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub async fn test_connection(&self) -> Result<()> {
        self.db.test_connection().await?;
        Ok(())
    }

    /// Generates one report file. The first failure aborts the report and
    /// leaves no file behind.
    pub async fn generate(
        &self,
        report: &dyn Report,
        output: &OutputTarget,
        limit: Option<NonZeroU32>,
    ) -> Result<ExportSummary> {
        let start = Instant::now();

        // 1. resolve the output file
        let path = output.resolve(report.name(), Local::now().naive_local());
        info!("Generating report {} -> {}", report.name(), path.display());

        // 2. build the query
        let query = report.build_query(&self.rules, limit);
        let target = ExportTarget::new(&path, &report.sheet_name(), &self.export);
        let mapping = report.column_mapping();

        // 3. execute and write
        let summary = match self.export.mode {
            ExportMode::Single => {
                let batch = self.db.execute(&query).await?;
                info!("Fetched {} rows", batch.len());
                let batch = prepare(report, mapping.as_ref(), batch)?;
                SheetWriter::create(target)?.export(&batch)?
            }
            ExportMode::Chunked => {
                let mut writer = SheetWriter::create(target)?;
                let mut batches = self.db.execute_chunked(&query, self.export.chunk_size)?;
                let mut chunk = 0usize;
                while let Some(batch) = batches.try_next().await? {
                    chunk += 1;
                    let batch = prepare(report, mapping.as_ref(), batch)?;
                    writer.append(&batch)?;
                    debug!("Processed chunk {}: {} rows", chunk, batch.len());
                }
                writer.finish()?
            }
        };

        info!(
            "Report {} done: {} rows in {:?}",
            report.name(),
            summary.rows_written,
            start.elapsed()
        );
        Ok(summary)
    }

    /// Generates every registered report into `output_dir`, in registration
    /// order. Failures are logged and collected; the batch keeps going.
    pub async fn generate_all(
        &self,
        registry: &ReportRegistry,
        output_dir: &Path,
        limit: Option<NonZeroU32>,
    ) -> BatchOutcome {
        let output = OutputTarget::Directory(output_dir.to_path_buf());
        let mut outcome = BatchOutcome::default();

        for report in registry.iter() {
            match self.generate(report, &output, limit).await {
                Ok(summary) => outcome.generated.push(summary),
                Err(e) => {
                    error!("Failed to generate {}: {}", report.name(), e);
                    outcome.failed.push((report.name().to_string(), e));
                }
            }
        }

        info!(
            "Generated {} of {} reports",
            outcome.generated.len(),
            registry.len()
        );
        outcome
    }

    /// First `rows` rows of a report after transform and rename, without
    /// writing anything.
    pub async fn preview(&self, report: &dyn Report, rows: NonZeroU32) -> Result<ResultBatch> {
        let query = report.build_query(&self.rules, Some(rows));
        let batch = self.db.execute(&query).await?;
        Ok(prepare(report, report.column_mapping().as_ref(), batch)?)
    }

    /// Ends the data-source session.
    pub async fn close(&mut self) {
        self.db.close().await;
    }
}

fn prepare(
    report: &dyn Report,
    mapping: Option<&ColumnMapping>,
    batch: ResultBatch,
) -> std::result::Result<ResultBatch, TransformError> {
    let batch = report.transform(batch)?;
    match mapping {
        Some(mapping) => mapping.apply(batch),
        None => Ok(batch),
    }
}
