//! SQL Server-backed `DataSource`

use super::connection::MssqlPool;
use super::{DataSource, ResultSet};
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tiberius::{ColumnData, Row};
use tracing::debug;

pub struct MssqlDataSource {
    pool: MssqlPool,
}

impl MssqlDataSource {
    pub fn new(pool: MssqlPool) -> Self {
        Self { pool }
    }

    pub fn connect_lazy(connection_string: &str, timeout: Duration) -> Result<Self> {
        Ok(Self::new(MssqlPool::lazy(connection_string, timeout)?))
    }
}

#[async_trait]
impl DataSource for MssqlDataSource {
    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        debug!(sql_len = sql.len(), "executing statement");
        let sql = sql.to_string();
        self.pool
            .with_client(move |client| {
                Box::pin(async move {
                    let mut stream = client
                        .simple_query(sql)
                        .await
                        .map_err(|e| AgentError::DataAccess(format!("Query failed: {}", e)))?;

                    // Column metadata arrives even when the result has no rows.
                    let columns: Vec<String> = stream
                        .columns()
                        .await
                        .map_err(|e| AgentError::DataAccess(format!("Query failed: {}", e)))?
                        .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
                        .unwrap_or_default();

                    let rows = stream
                        .into_first_result()
                        .await
                        .map_err(|e| AgentError::DataAccess(format!("Query failed: {}", e)))?;

                    let data = rows.iter().map(decode_row).collect();
                    Ok(ResultSet::new(columns, data))
                })
            })
            .await
    }
}

fn decode_row(row: &Row) -> Vec<Value> {
    row.cells()
        .enumerate()
        .map(|(idx, (_, data))| decode_cell(row, idx, data))
        .collect()
}

fn decode_cell(row: &Row, idx: usize, data: &ColumnData<'static>) -> Value {
    let value = match data {
        ColumnData::U8(v) => v.map(Value::from),
        ColumnData::I16(v) => v.map(Value::from),
        ColumnData::I32(v) => v.map(Value::from),
        ColumnData::I64(v) => v.map(Value::from),
        ColumnData::F32(v) => v.map(|f| Value::from(f as f64)),
        ColumnData::F64(v) => v.map(Value::from),
        ColumnData::Bit(v) => v.map(Value::from),
        ColumnData::String(v) => v.as_ref().map(|s| Value::String(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| Value::String(g.to_string())),
        ColumnData::Numeric(v) => v
            .as_ref()
            .and_then(|n| decimal_text(n.value(), n.scale()))
            .map(Value::String),
        ColumnData::Binary(_) | ColumnData::Xml(_) => None,
        _ => temporal_text(row, idx).map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

/// Exact decimal rendering with trailing zeros removed.
fn decimal_text(value: i128, scale: u8) -> Option<String> {
    Decimal::try_from_i128_with_scale(value, scale as u32)
        .ok()
        .map(|d| d.normalize().to_string())
}

fn temporal_text(row: &Row, idx: usize) -> Option<String> {
    if let Ok(Some(v)) = row.try_get::<NaiveDateTime, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<NaiveDate, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<NaiveTime, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<DateTime<FixedOffset>, _>(idx) {
        return Some(v.to_rfc3339());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_text() {
        assert_eq!(decimal_text(12350, 3).as_deref(), Some("12.35"));
        assert_eq!(decimal_text(-5, 0).as_deref(), Some("-5"));
        assert_eq!(decimal_text(1_000_000, 2).as_deref(), Some("10000"));
    }
}
