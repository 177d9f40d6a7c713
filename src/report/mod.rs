//! Report definitions and the registry the CLI dispatches on.

pub mod output;
pub mod supplier_header;
pub mod supplier_site;

use crate::db::ReportQuery;
use crate::error::{ConfigError, TransformError};
use crate::models::ResultBatch;
use crate::rules::{CodeCategory, RuleSet};
use indexmap::IndexMap;
use std::num::NonZeroU32;

pub use output::{resolve_output_path, OutputTarget};
pub use supplier_header::SupplierHeaderReport;
pub use supplier_site::SupplierSiteReport;

/// A named extraction: a query plus optional post-processing.
pub trait Report: Send + Sync {
    /// Identifier used on the command line and in file names.
    fn name(&self) -> &str;

    /// Worksheet title; `supplier_header` becomes `Supplier Header`.
    fn sheet_name(&self) -> String {
        title_case(self.name())
    }

    /// Code sets that must be non-empty for the query to make sense.
    fn required_categories(&self) -> &[CodeCategory];

    fn build_query(&self, rules: &RuleSet, limit: Option<NonZeroU32>) -> ReportQuery;

    fn column_mapping(&self) -> Option<ColumnMapping> {
        None
    }

    /// Applied to every batch before the column mapping.
    fn transform(&self, batch: ResultBatch) -> Result<ResultBatch, TransformError> {
        Ok(batch)
    }
}

fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Column relabeling: source label to output label, in order.
/// An empty output label drops the column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping(IndexMap<String, String>);

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.0.insert(from.into(), to.into());
        self
    }

    pub fn drop_column(self, name: impl Into<String>) -> Self {
        self.rename(name, "")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Relabels columns in place; column order and row values are untouched
    /// except for dropped columns. A batch without columns passes through.
    pub fn apply(&self, batch: ResultBatch) -> Result<ResultBatch, TransformError> {
        if self.0.is_empty() || batch.columns.is_empty() {
            return Ok(batch);
        }
        if let Some(missing) = self.0.keys().find(|from| batch.column_index(from).is_none()) {
            return Err(TransformError::UnknownColumn(missing.clone()));
        }

        let keep: Vec<bool> = batch
            .columns
            .iter()
            .map(|c| self.0.get(c).map_or(true, |to| !to.is_empty()))
            .collect();

        let columns = batch
            .columns
            .into_iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|(c, _)| match self.0.get(&c) {
                Some(to) => to.clone(),
                None => c,
            })
            .collect();

        let rows = if keep.iter().all(|k| *k) {
            batch.rows
        } else {
            batch
                .rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .zip(&keep)
                        .filter(|(_, keep)| **keep)
                        .map(|(value, _)| value)
                        .collect()
                })
                .collect()
        };

        Ok(ResultBatch::new(columns, rows))
    }
}

/// Ordered name-to-report lookup. Registration validates the report's
/// code-set dependencies against the rules.
#[derive(Default)]
pub struct ReportRegistry {
    reports: IndexMap<String, Box<dyn Report>>,
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The supplier header and site reports.
    pub fn standard(rules: &RuleSet) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        registry.register(Box::new(SupplierHeaderReport), rules)?;
        registry.register(Box::new(SupplierSiteReport), rules)?;
        Ok(registry)
    }

    pub fn register(&mut self, report: Box<dyn Report>, rules: &RuleSet) -> Result<(), ConfigError> {
        for category in report.required_categories() {
            rules.require(*category, report.name())?;
        }
        let name = report.name().to_string();
        if self.reports.insert(name.clone(), report).is_some() {
            tracing::warn!("report `{}` registered twice; keeping the latest", name);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Report> {
        self.reports.get(name).map(|r| r.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Report> {
        self.reports.values().map(|r| r.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.reports.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}
