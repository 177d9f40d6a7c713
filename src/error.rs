use thiserror::Error;

/// Malformed configuration, detected at load or report registration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("code set `{category}` is empty but report `{report}` requires it")]
    EmptyCodeSet {
        category: &'static str,
        report: String,
    },

    #[error("blank code in `{0}`")]
    BlankCode(&'static str),

    #[error("code `{code}` is listed in both `{left}` and `{right}`")]
    OverlappingCodes {
        code: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("invalid conversion rate `{value}`: {reason}")]
    InvalidRate { value: String, reason: String },

    #[error("invalid export setting: {0}")]
    InvalidExport(String),
}

/// Failures of the relational source.
///
/// Connection problems (credentials, network) are kept apart from
/// failures of an individual query (bad SQL, schema mismatch).
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("not connected to the data source")]
    NotConnected,

    #[error("cannot connect to the data source: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("query execution failed: {0}")]
    QueryExecution(#[source] sqlx::Error),

    #[error("cannot decode column `{column}`: {source}")]
    Decode {
        column: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("column `{column}` has unsupported type {type_name}")]
    UnsupportedType { column: String, type_name: String },
}

/// Post-query transform or column rename failures.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("column `{0}` referenced by the column mapping does not exist")]
    UnknownColumn(String),

    #[error("transform failed: {0}")]
    Failed(String),
}

/// Spreadsheet output failures.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xlsx error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("sheet `{sheet}` would exceed {limit} data rows")]
    RowLimitExceeded { sheet: String, limit: u32 },

    #[error("batch has {found} columns, expected {expected}")]
    SchemaMismatch { expected: usize, found: usize },

    #[error("{0} columns exceed the spreadsheet column limit")]
    TooManyColumns(usize),

    #[error("no sheet has been started")]
    NoSheet,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("unknown report `{0}`")]
    UnknownReport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
