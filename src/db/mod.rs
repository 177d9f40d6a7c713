mod fragments;
pub mod gateway;
pub mod queries_header;
pub mod queries_site;
pub mod query;
pub mod row;

pub use gateway::Database;
pub use queries_header::supplier_header_query;
pub use queries_site::supplier_site_query;
pub use query::{QueryParam, ReportQuery};
