pub mod expr;
pub mod filter;
pub mod metrics;
pub mod ordering;
pub mod plan;
pub mod registry;
pub mod sql;

pub use filter::{compile_filters, Filter, FilterOperator};
pub use metrics::{compile_computations, compile_metrics, ComputationRequest, Metric, MetricRequest};
pub use ordering::{compile_group_by, compile_sort, SortSpec};
pub use plan::{
    build_aggregation_args, build_computation_args, build_query_args, normalize_pagination,
    AggregationArgs, ComputationArgs, Pagination, PlanKind, QueryArgs, QueryPlan,
};
pub use registry::{ColumnRef, ColumnRegistry, ValueType};
pub use sql::{render, SqlStatement};

use crate::executor::{ExecuteError, PlanExecutor, QueryOutput};

/// Compile and execute a raw selection
pub async fn run_query_plan(
    executor: &dyn PlanExecutor,
    registry: &ColumnRegistry,
    args: &QueryArgs,
) -> Result<QueryOutput, QueryError> {
    let plan = build_query_args(registry, args)?;
    Ok(executor.execute(&plan).await?)
}

/// Compile and execute a grouped metric plan
pub async fn run_aggregation_plan(
    executor: &dyn PlanExecutor,
    registry: &ColumnRegistry,
    args: &AggregationArgs,
) -> Result<QueryOutput, QueryError> {
    let plan = build_aggregation_args(registry, args)?;
    Ok(executor.execute(&plan).await?)
}

/// Compile and execute a grouped computation plan
pub async fn run_computation_plan(
    executor: &dyn PlanExecutor,
    registry: &ColumnRegistry,
    args: &ComputationArgs,
) -> Result<QueryOutput, QueryError> {
    let plan = build_computation_args(registry, args)?;
    Ok(executor.execute(&plan).await?)
}

/// Any of the three request shapes
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", content = "args", rename_all = "lowercase")]
pub enum PlanRequest {
    Query(QueryArgs),
    Aggregation(AggregationArgs),
    Computation(ComputationArgs),
}

impl PlanRequest {
    pub async fn run(
        &self,
        executor: &dyn PlanExecutor,
        registry: &ColumnRegistry,
    ) -> Result<QueryOutput, QueryError> {
        match self {
            PlanRequest::Query(args) => run_query_plan(executor, registry, args).await,
            PlanRequest::Aggregation(args) => run_aggregation_plan(executor, registry, args).await,
            PlanRequest::Computation(args) => run_computation_plan(executor, registry, args).await,
        }
    }
}

/// Rejections raised while turning a request into a plan. Nothing has been
/// executed when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Invalid value for filter '{field} {operator}': {reason}")]
    InvalidFilterValue {
        field: String,
        operator: &'static str,
        reason: String,
    },

    #[error("Operator '{operator}' is not supported on column '{field}'")]
    UnsupportedOperator {
        field: String,
        operator: &'static str,
    },

    #[error("Invalid metric '{metric}': {reason}")]
    InvalidMetric { metric: &'static str, reason: String },

    #[error("Column '{0}' is not numeric")]
    NonNumericField(String),

    #[error("Percentile must be within [0, 100], got {0}")]
    InvalidPercentile(f64),

    #[error("A computation plan needs at least one computation")]
    EmptyComputationSet,

    #[error("Output alias '{0}' is produced more than once")]
    DuplicateAlias(String),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Execute error: {0}")]
    Execute(#[from] ExecuteError),
}
