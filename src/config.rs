use crate::error::ConfigError;
use crate::export::{ExportMode, RowLimitPolicy, MAX_DATA_ROWS_PER_SHEET};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::ConnectOptions;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "vendor-export";

/// Prefix of environment overrides, e.g. `VENDOR_EXPORT__DATABASE__PASSWORD`.
pub const ENV_PREFIX: &str = "VENDOR_EXPORT";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub export: ExportConfig,
    pub rules: RulesConfig,
}

impl AppConfig {
    /// Layered load: serde defaults, then the config file, then
    /// `VENDOR_EXPORT__*` variables, then `DATABASE_URL`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut app = Self::from_sources(path, None)?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            app.database.url = Some(url);
        }

        app.export.validate()?;
        Ok(app)
    }

    /// File and environment layers. `env` stands in for the process
    /// environment when given.
    fn from_sources(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let app = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        Ok(app)
    }
}

/// Connection parameters of the relational source.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the discrete fields.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Encrypt the session without verifying the server certificate.
    pub trust_certificate: bool,
    pub application_name: String,
    pub acquire_timeout_secs: u64,
    pub slow_statement_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "bdcmc".to_string(),
            username: String::new(),
            password: String::new(),
            trust_certificate: true,
            application_name: "vendor-export".to_string(),
            acquire_timeout_secs: 10,
            slow_statement_secs: 5,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("trust_certificate", &self.trust_certificate)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        let options = match &self.url {
            Some(url) => {
                let options = PgConnectOptions::from_str(url)?;
                match self.ssl_mode() {
                    Some(mode) => options.ssl_mode(mode),
                    None => options,
                }
            }
            None => {
                let mut options = PgConnectOptions::new()
                    .host(&self.host)
                    .port(self.port)
                    .database(&self.database);
                if !self.username.is_empty() {
                    options = options.username(&self.username);
                }
                if !self.password.is_empty() {
                    options = options.password(&self.password);
                }
                options.ssl_mode(self.trust_mode())
            }
        };

        // slow query threshold
        Ok(options
            .application_name(&self.application_name)
            .log_slow_statements(
                tracing::log::LevelFilter::Warn,
                Duration::from_secs(self.slow_statement_secs),
            ))
    }

    /// TLS mode to impose on the connection; `None` when the URL carries
    /// its own `sslmode`, which then wins over `trust_certificate`.
    fn ssl_mode(&self) -> Option<PgSslMode> {
        match &self.url {
            Some(url) if url_sets_ssl_mode(url) => None,
            _ => Some(self.trust_mode()),
        }
    }

    fn trust_mode(&self) -> PgSslMode {
        if self.trust_certificate {
            PgSslMode::Require
        } else {
            PgSslMode::VerifyFull
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

fn url_sets_ssl_mode(url: &str) -> bool {
    url.split_once('?').is_some_and(|(_, query)| {
        query
            .split('&')
            .any(|pair| pair.split('=').next().is_some_and(|key| key.eq_ignore_ascii_case("sslmode")))
    })
}

/// Spreadsheet export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Rows per batch in chunked mode.
    pub chunk_size: usize,
    /// Data rows per sheet, header excluded.
    pub max_rows_per_sheet: u32,
    pub row_limit_policy: RowLimitPolicy,
    pub mode: ExportMode,
    pub default_output_dir: PathBuf,
    /// Excel number format for DATE columns.
    pub date_format: String,
    /// Excel number format for TIMESTAMP columns.
    pub datetime_format: String,
    /// Rows of the first batch used to size columns in chunked mode.
    pub width_sample_rows: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5000,
            max_rows_per_sheet: 1_000_000,
            row_limit_policy: RowLimitPolicy::Fail,
            mode: ExportMode::Chunked,
            default_output_dir: PathBuf::from("./exports"),
            date_format: "yyyy-mm-dd".to_string(),
            datetime_format: "yyyy-mm-dd hh:mm:ss".to_string(),
            width_sample_rows: 100,
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidExport(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.max_rows_per_sheet == 0 || self.max_rows_per_sheet > MAX_DATA_ROWS_PER_SHEET {
            return Err(ConfigError::InvalidExport(format!(
                "max_rows_per_sheet must be between 1 and {}",
                MAX_DATA_ROWS_PER_SHEET
            )));
        }
        if self.date_format.trim().is_empty() || self.datetime_format.trim().is_empty() {
            return Err(ConfigError::InvalidExport(
                "date formats must not be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Raw business-rule settings; validated into a [`crate::rules::RuleSet`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Source currency to CHF, kept as text so no float rounding happens.
    pub conversion_rate: String,
    pub document_types: DocumentTypesConfig,
    #[serde(deserialize_with = "code_list")]
    pub valid_origins: Vec<String>,
    #[serde(deserialize_with = "code_list")]
    pub excluded_vendors: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            conversion_rate: "0.000210699".to_string(),
            document_types: DocumentTypesConfig::default(),
            valid_origins: codes(&["011", "F490401", "F490411", "F491201", "F494101", "F494151"]),
            excluded_vendors: codes(&[
                "0000000012",
                "0000000011",
                "F491201",
                "F490411",
                "F490401",
                "F490421",
                "2000022410",
                "2000103488",
            ]),
        }
    }
}

/// Document type codes per category.
///
/// `all_transactional` is not configurable: it is always the union of the
/// two balance categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentTypesConfig {
    #[serde(deserialize_with = "code_list")]
    pub invoice_debit: Vec<String>,
    #[serde(deserialize_with = "code_list")]
    pub credit_notes: Vec<String>,
    #[serde(deserialize_with = "code_list")]
    pub balance_positive: Vec<String>,
    #[serde(deserialize_with = "code_list")]
    pub balance_negative: Vec<String>,
    #[serde(deserialize_with = "code_list")]
    pub purchase_orders: Vec<String>,
    #[serde(deserialize_with = "code_list")]
    pub agreements: Vec<String>,
    #[serde(deserialize_with = "code_list")]
    pub excluded: Vec<String>,
    /// Types that count as recent activity for eligibility priority 3.
    #[serde(deserialize_with = "code_list")]
    pub qualifying_recent: Vec<String>,
}

impl Default for DocumentTypesConfig {
    fn default() -> Self {
        Self {
            invoice_debit: codes(&["FE", "FD", "DE"]),
            credit_notes: codes(&["NP", "NA"]),
            balance_positive: codes(&["C2", "DE", "FD", "FE", "FP", "LG", "NO", "RG"]),
            balance_negative: codes(&["M2", "N2", "NA", "NP"]),
            purchase_orders: codes(&["OC", "OS"]),
            agreements: codes(&["CX"]),
            excluded: codes(&["EC", "ER", "SB", "SD"]),
            qualifying_recent: codes(&["AP", "C2", "FE", "FP", "NP", "NA", "DE", "NO"]),
        }
    }
}

/// Accepts a list or a comma-separated string, so that environment
/// variables can override code lists: `VENDOR_EXPORT__RULES__VALID_ORIGINS=011,F490401`.
fn code_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::List(codes) => codes,
        Raw::Joined(joined) if joined.trim().is_empty() => Vec::new(),
        Raw::Joined(joined) => joined.split(',').map(|code| code.trim().to_string()).collect(),
    })
}

fn codes(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
