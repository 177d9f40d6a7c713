pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod report;
pub mod rules;
pub mod service;

pub use config::AppConfig;
pub use db::Database;
pub use error::{Error, Result};
pub use report::{OutputTarget, Report, ReportRegistry};
pub use rules::RuleSet;
pub use service::ReportService;
