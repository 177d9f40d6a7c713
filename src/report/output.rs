use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

/// Where a report is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Exact file path.
    File(PathBuf),
    /// Directory receiving a timestamped file per report.
    Directory(PathBuf),
}

impl OutputTarget {
    pub fn resolve(&self, report_name: &str, now: NaiveDateTime) -> PathBuf {
        match self {
            OutputTarget::File(path) => path.clone(),
            OutputTarget::Directory(dir) => dir.join(output_file_name(report_name, now)),
        }
    }
}

/// An explicit path wins; otherwise `<output_dir>/<name>_<YYYYMMDD_HHMMSS>.xlsx`.
pub fn resolve_output_path(
    report_name: &str,
    explicit_path: Option<&Path>,
    output_dir: &Path,
    now: NaiveDateTime,
) -> PathBuf {
    match explicit_path {
        Some(path) => path.to_path_buf(),
        None => output_dir.join(output_file_name(report_name, now)),
    }
}

pub fn output_file_name(report_name: &str, now: NaiveDateTime) -> String {
    format!("{}_{}.xlsx", report_name, now.format("%Y%m%d_%H%M%S"))
}
