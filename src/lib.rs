//! DVF Analytics: property-sale statistics over the French DVF dataset
//!
//! Requests arrive as small JSON plans (filters, group-by, metrics,
//! computations, sort, pagination), usually produced by a language-model tool
//! call. They are compiled against a closed column registry into a
//! [`query::QueryPlan`] and executed as one parameterized Postgres statement.
//! Column names never come from the caller and values are always bound.
//!
//! # Example
//!
//! ```no_run
//! use dvf_analytics::executor::MemoryExecutor;
//! use dvf_analytics::query::{run_computation_plan, ColumnRegistry, ComputationArgs, ComputationRequest};
//!
//! # async fn demo() -> Result<(), dvf_analytics::QueryError> {
//! let executor = MemoryExecutor::new();
//! let args = ComputationArgs {
//!     computations: vec![ComputationRequest::AvgPricePerM2],
//!     group_by: vec!["inseeCode".into()],
//!     ..Default::default()
//! };
//! let output = run_computation_plan(&executor, ColumnRegistry::transactions(), &args).await?;
//! println!("{} communes", output.count);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod assistant;
pub mod data;
pub mod executor;
pub mod query;

// Re-export commonly used types
pub use data::{Transaction, Value};
pub use executor::{ExecuteError, PlanExecutor, QueryOutput};
pub use query::{CompileError, ColumnRegistry, PlanRequest, QueryError, QueryPlan};
