use super::query::{QueryParam, ReportQuery};
use super::row::batch_from_rows;
use crate::config::DatabaseConfig;
use crate::error::DataSourceError;
use crate::models::ResultBatch;
use futures::stream::{BoxStream, StreamExt, TryChunksError, TryStreamExt};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use std::time::Instant;
use tracing::{debug, info};

/// One session against the relational source.
///
/// The pool is capped at a single connection, so everything executed
/// through a `Database` shares one session.
pub struct Database {
    config: DatabaseConfig,
    pool: Option<PgPool>,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config, pool: None }
    }

    /// Opens the session; a no-op when already connected.
    pub async fn connect(&mut self) -> Result<(), DataSourceError> {
        if self.is_connected() {
            return Ok(());
        }

        let options = self
            .config
            .connect_options()
            .map_err(DataSourceError::Connection)?;

        let start = Instant::now();
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.config.acquire_timeout())
            .connect_with(options)
            .await
            .map_err(DataSourceError::Connection)?;

        info!("Connected to data source in {:?}", start.elapsed());
        self.pool = Some(pool);
        Ok(())
    }

    pub async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            info!("Data source session closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.pool.as_ref().is_some_and(|pool| !pool.is_closed())
    }

    fn pool(&self) -> Result<&PgPool, DataSourceError> {
        self.pool
            .as_ref()
            .filter(|pool| !pool.is_closed())
            .ok_or(DataSourceError::NotConnected)
    }

    /// Runs the query and materializes every row.
    pub async fn execute(&self, query: &ReportQuery) -> Result<ResultBatch, DataSourceError> {
        let pool = self.pool()?;
        let start = Instant::now();

        let rows = bind_params(sqlx::query(query.sql()), query.params())
            .fetch_all(pool)
            .await
            .map_err(DataSourceError::QueryExecution)?;

        debug!("Fetched {} rows in {:?}", rows.len(), start.elapsed());
        batch_from_rows(&rows)
    }

    /// Streams the result in batches of at most `chunk_size` rows.
    ///
    /// Rows are pulled from the server as the stream is polled; no batch is
    /// empty and the stream ends after the last row.
    pub fn execute_chunked<'a>(
        &'a self,
        query: &'a ReportQuery,
        chunk_size: usize,
    ) -> Result<BoxStream<'a, Result<ResultBatch, DataSourceError>>, DataSourceError> {
        let pool = self.pool()?;

        let stream = bind_params(sqlx::query(query.sql()), query.params())
            .fetch(pool)
            .try_chunks(chunk_size.max(1))
            .map_err(|TryChunksError(_, e)| DataSourceError::QueryExecution(e))
            .and_then(|rows| futures::future::ready(batch_from_rows(&rows)));

        Ok(stream.boxed())
    }

    /// `SELECT 1` round trip.
    pub async fn test_connection(&self) -> Result<(), DataSourceError> {
        let batch = self.execute(&ReportQuery::raw("SELECT 1 AS test")).await?;
        debug!("Connection test returned {} row(s)", batch.len());
        Ok(())
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[QueryParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            QueryParam::Codes(codes) => query.bind(codes.clone()),
            QueryParam::Decimal(value) => query.bind(value.clone()),
            QueryParam::Int(value) => query.bind(*value),
        };
    }
    query
}
