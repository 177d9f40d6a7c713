use crate::error::DataSourceError;
use crate::models::{CellValue, ResultBatch};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgColumn, PgRow};
use sqlx::{Column, Row, TypeInfo};

/// Decodes fetched rows into a batch. Column labels come from the first
/// row, so an empty result has no columns.
pub fn batch_from_rows(rows: &[PgRow]) -> Result<ResultBatch, DataSourceError> {
    let Some(first) = rows.first() else {
        return Ok(ResultBatch::default());
    };

    let columns = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let decoded = rows
        .iter()
        .map(|row| {
            row.columns()
                .iter()
                .map(|column| decode_cell(row, column))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResultBatch::new(columns, decoded))
}

fn decode_cell(row: &PgRow, column: &PgColumn) -> Result<CellValue, DataSourceError> {
    let index = column.ordinal();
    let decoded = match column.type_info().name() {
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
            row.try_get::<Option<String>, _>(index).map(CellValue::from)
        }
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map(|v| CellValue::from(v.map(i64::from))),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map(|v| CellValue::from(v.map(i64::from))),
        "INT8" => row.try_get::<Option<i64>, _>(index).map(CellValue::from),
        "NUMERIC" => row
            .try_get::<Option<BigDecimal>, _>(index)
            .map(CellValue::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map(|v| CellValue::from(v.map(f64::from))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map(CellValue::from),
        "BOOL" => row.try_get::<Option<bool>, _>(index).map(CellValue::from),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .map(CellValue::from),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .map(CellValue::from),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map(|v| CellValue::from(v.map(|dt| dt.naive_utc()))),
        other => {
            return Err(DataSourceError::UnsupportedType {
                column: column.name().to_string(),
                type_name: other.to_string(),
            })
        }
    };

    decoded.map_err(|source| DataSourceError::Decode {
        column: column.name().to_string(),
        source,
    })
}
