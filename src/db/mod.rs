//! Relational data source
//!
//! The core only ever needs `execute(sql) -> rows`; everything dialect or driver
//! specific lives behind the `DataSource` trait.

pub mod connection;
pub mod mssql_source;
pub mod schema_check;

pub use connection::{init_pool, MssqlPool};
pub use mssql_source::MssqlDataSource;
pub use schema_check::{check_schema, SchemaReport};

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Rows returned by a query, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Case-insensitive column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Run a statement and return every row. Fails with `AgentError::DataAccess`.
    async fn execute(&self, sql: &str) -> Result<ResultSet>;
}
