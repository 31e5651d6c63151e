pub mod aggregates;
pub mod memory;
pub mod postgres;

pub use memory::MemoryExecutor;
pub use postgres::{PgExecutor, PoolConfig};

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::data::Value;
use crate::query::QueryPlan;

/// One result row keyed by output alias
pub type Row = BTreeMap<String, Value>;

/// Rows returned by a single plan execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutput {
    /// Output aliases in projection order
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Number of rows actually returned, not a total over the table
    pub count: usize,
}

impl QueryOutput {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let count = rows.len();
        Self { columns, rows, count }
    }

    /// Values of one output column, in row order
    pub fn column_values(&self, alias: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(alias).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// Runs a compiled plan. Implementations issue exactly one query per call.
#[async_trait]
pub trait PlanExecutor: Send + Sync {
    async fn execute(&self, plan: &QueryPlan) -> Result<QueryOutput, ExecuteError>;
}

/// Failure while running a plan. Not retried and not classified further.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Evaluation error: {0}")]
    Evaluation(String),
}
