//! In-memory executor
//!
//! Evaluates a [`QueryPlan`] over rows held in process with the same
//! semantics as the rendered SQL: NULL comparisons never match, grouping
//! without keys yields one row, and every sort key puts NULLs last.

use async_trait::async_trait;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use regex::Regex;
use std::cmp::Ordering;

use super::aggregates::{create_accumulator, Accumulator};
use super::{ExecuteError, PlanExecutor, QueryOutput, Row};
use crate::data::{Transaction, Value};
use crate::query::expr::{OrderExpr, OrderTarget, Predicate, SelectExpr, SortDirection};
use crate::query::{ColumnRef, ColumnRegistry, QueryPlan};

/// One stored row keyed by physical column name
pub type StoredRow = FxHashMap<&'static str, Value>;

pub struct MemoryExecutor {
    registry: &'static ColumnRegistry,
    rows: RwLock<Vec<StoredRow>>,
}

impl Default for MemoryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self {
            registry: ColumnRegistry::transactions(),
            rows: RwLock::new(Vec::new()),
        }
    }

    pub fn with_transactions(transactions: impl IntoIterator<Item = Transaction>) -> Self {
        let executor = Self::new();
        executor.insert_batch(transactions);
        executor
    }

    /// Insert many transactions, returns the number stored
    pub fn insert_batch(&self, transactions: impl IntoIterator<Item = Transaction>) -> usize {
        let rows: Vec<StoredRow> = transactions.into_iter().map(|t| self.to_row(&t)).collect();
        let inserted = rows.len();
        self.rows.write().extend(rows);
        inserted
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn to_row(&self, transaction: &Transaction) -> StoredRow {
        transaction
            .fields()
            .into_iter()
            .filter_map(|(name, value)| {
                self.registry
                    .resolve(name)
                    .ok()
                    .map(|column| (column.physical_name(), value))
            })
            .collect()
    }

    fn evaluate(&self, plan: &QueryPlan) -> Result<QueryOutput, ExecuteError> {
        let filter = plan.filter().map(RowFilter::compile).transpose()?;

        let rows = self.rows.read();
        let matching: Vec<&StoredRow> = rows
            .iter()
            .filter(|row| filter.as_ref().map_or(true, |f| f.matches(row)))
            .collect();

        let output = if plan.has_aggregates() {
            aggregate(plan, &matching)?
        } else {
            select(plan, matching)?
        };

        let pagination = plan.pagination();
        let page: Vec<Row> = output
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();

        let columns = plan.aliases().into_iter().map(str::to_string).collect();
        Ok(QueryOutput::new(columns, page))
    }
}

#[async_trait]
impl PlanExecutor for MemoryExecutor {
    async fn execute(&self, plan: &QueryPlan) -> Result<QueryOutput, ExecuteError> {
        tracing::debug!(kind = ?plan.kind(), rows = self.len(), "Evaluating plan in memory");
        self.evaluate(plan)
    }
}

fn read(row: &StoredRow, column: ColumnRef) -> &Value {
    row.get(column.physical_name()).unwrap_or(&Value::Null)
}

// ============================================================================
// Filtering
// ============================================================================

/// Predicate with ILIKE patterns compiled once per plan
enum RowFilter<'p> {
    Leaf(&'p Predicate),
    ILike { column: ColumnRef, regex: Regex },
    And(Vec<RowFilter<'p>>),
}

impl<'p> RowFilter<'p> {
    fn compile(predicate: &'p Predicate) -> Result<Self, ExecuteError> {
        match predicate {
            Predicate::ILike { column, pattern } => Ok(RowFilter::ILike {
                column: *column,
                regex: like_regex(pattern)?,
            }),
            Predicate::And(parts) => Ok(RowFilter::And(
                parts.iter().map(RowFilter::compile).collect::<Result<_, _>>()?,
            )),
            other => Ok(RowFilter::Leaf(other)),
        }
    }

    fn matches(&self, row: &StoredRow) -> bool {
        match self {
            RowFilter::And(parts) => parts.iter().all(|p| p.matches(row)),
            RowFilter::ILike { column, regex } => read(row, *column)
                .as_str()
                .map_or(false, |s| regex.is_match(s)),
            RowFilter::Leaf(predicate) => leaf_matches(predicate, row),
        }
    }
}

fn leaf_matches(predicate: &Predicate, row: &StoredRow) -> bool {
    match predicate {
        Predicate::Compare { column, op, value } => {
            let left = read(row, *column);
            !left.is_null() && !value.is_null() && op.holds(left.cmp(value))
        }
        Predicate::Between { column, low, high } => {
            let v = read(row, *column);
            !v.is_null() && v >= low && v <= high
        }
        Predicate::In { column, values } => {
            let v = read(row, *column);
            !v.is_null() && values.iter().any(|candidate| candidate == v)
        }
        Predicate::IsNull(column) => read(row, *column).is_null(),
        Predicate::And(parts) => parts.iter().all(|p| leaf_matches(p, row)),
        // Compiled into RowFilter::ILike before evaluation
        Predicate::ILike { .. } => false,
    }
}

/// Translate a LIKE pattern (`%`, `_`, `\` escape) into an anchored,
/// case-insensitive regex
fn like_regex(pattern: &str) -> Result<Regex, ExecuteError> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push_str("(?is)^");

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => expr.push_str(&regex::escape(&escaped.to_string())),
                None => {
                    return Err(ExecuteError::Evaluation(format!(
                        "LIKE pattern '{}' must not end with escape character",
                        pattern
                    )))
                }
            },
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');

    Regex::new(&expr).map_err(|e| ExecuteError::Evaluation(format!("invalid pattern '{}': {}", pattern, e)))
}

// ============================================================================
// Projection and grouping
// ============================================================================

fn select(plan: &QueryPlan, mut rows: Vec<&StoredRow>) -> Result<Vec<Row>, ExecuteError> {
    for order in plan.order_by() {
        if let OrderTarget::Alias(alias) = &order.target {
            return Err(ExecuteError::Evaluation(format!(
                "alias '{}' cannot be sorted in a selection",
                alias
            )));
        }
    }

    rows.sort_by(|a, b| {
        compare_keys(plan.order_by(), |target| match target {
            OrderTarget::Column(column) => (read(a, *column), read(b, *column)),
            OrderTarget::Alias(_) => (&Value::Null, &Value::Null),
        })
    });

    Ok(rows
        .into_iter()
        .map(|stored| {
            plan.select()
                .iter()
                .map(|item| {
                    let value = match &item.expr {
                        SelectExpr::Column(column) => read(stored, *column).clone(),
                        SelectExpr::Aggregate(_) => Value::Null,
                    };
                    (item.alias.clone(), value)
                })
                .collect()
        })
        .collect())
}

struct Group {
    key: Vec<Value>,
    accumulators: Vec<Box<dyn Accumulator>>,
}

fn aggregate(plan: &QueryPlan, rows: &[&StoredRow]) -> Result<Vec<Row>, ExecuteError> {
    let group_by = plan.group_by();
    for order in plan.order_by() {
        if let OrderTarget::Column(column) = &order.target {
            group_value(group_by, &[], *column)?;
        }
    }

    let mut groups: FxHashMap<Vec<Value>, Group> = FxHashMap::default();
    let new_group = |key: Vec<Value>| Group {
        key,
        accumulators: plan
            .select()
            .iter()
            .filter_map(|item| match &item.expr {
                SelectExpr::Aggregate(aggregate) => Some(create_accumulator(aggregate)),
                SelectExpr::Column(_) => None,
            })
            .collect(),
    };

    // Without GROUP BY an aggregate always yields exactly one row
    if group_by.is_empty() {
        groups.insert(Vec::new(), new_group(Vec::new()));
    }

    for row in rows {
        let key: Vec<Value> = group_by.iter().map(|c| read(row, *c).clone()).collect();
        let group = groups
            .entry(key)
            .or_insert_with_key(|key| new_group(key.clone()));
        for acc in &mut group.accumulators {
            acc.accumulate(row);
        }
    }

    let mut out: Vec<(Vec<Value>, Row)> = Vec::with_capacity(groups.len());
    for group in groups.into_values() {
        let mut row = Row::new();
        let mut results = group.accumulators.iter().map(|acc| acc.result());
        for item in plan.select() {
            let value = match &item.expr {
                SelectExpr::Column(column) => group_value(group_by, &group.key, *column)?.clone(),
                SelectExpr::Aggregate(_) => results.next().unwrap_or(Value::Null),
            };
            row.insert(item.alias.clone(), value);
        }
        out.push((group.key, row));
    }

    out.sort_by(|(key_a, row_a), (key_b, row_b)| {
        compare_keys(plan.order_by(), |target| match target {
            OrderTarget::Column(column) => (
                group_value(group_by, key_a, *column).unwrap_or(&Value::Null),
                group_value(group_by, key_b, *column).unwrap_or(&Value::Null),
            ),
            OrderTarget::Alias(alias) => (
                row_a.get(alias).unwrap_or(&Value::Null),
                row_b.get(alias).unwrap_or(&Value::Null),
            ),
        })
    });

    Ok(out.into_iter().map(|(_, row)| row).collect())
}

fn group_value<'a>(
    group_by: &[ColumnRef],
    key: &'a [Value],
    column: ColumnRef,
) -> Result<&'a Value, ExecuteError> {
    match group_by.iter().position(|c| *c == column) {
        Some(idx) => Ok(key.get(idx).unwrap_or(&Value::Null)),
        None => Err(ExecuteError::Evaluation(format!(
            "column '{}' must appear in the group-by list",
            column.logical_name()
        ))),
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// Compare two rows key by key, NULLs last regardless of direction
fn compare_keys<'v, F>(order_by: &[OrderExpr], mut values: F) -> Ordering
where
    F: FnMut(&OrderTarget) -> (&'v Value, &'v Value),
{
    for order in order_by {
        let (a, b) = values(&order.target);
        let ordering = match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match order.direction {
                SortDirection::Asc => a.cmp(b),
                SortDirection::Desc => b.cmp(a),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::metrics::{ComputationRequest, Metric, MetricRequest};
    use crate::query::{
        build_aggregation_args, build_computation_args, build_query_args, AggregationArgs,
        ComputationArgs, Filter, FilterOperator, QueryArgs, SortSpec,
    };
    use chrono::NaiveDate;
    use serde_json::json;

    fn sale(insee: &str, year: i64, price: Option<f64>, area: Option<f64>) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(year as i32, 6, 1),
            year: Some(year),
            insee_code: Some(insee.to_string()),
            commune_name: Some(format!("Commune {}", insee)),
            property_type_label: Some("Appartement".to_string()),
            price,
            area,
            price_per_m2: match (price, area) {
                (Some(p), Some(a)) if a > 0.0 => Some(p / a),
                _ => None,
            },
            ..Default::default()
        }
    }

    fn executor() -> MemoryExecutor {
        MemoryExecutor::with_transactions(vec![
            sale("75056", 2019, Some(400_000.0), Some(40.0)),
            sale("75056", 2020, Some(500_000.0), Some(50.0)),
            sale("75056", 2021, Some(600_000.0), Some(50.0)),
            sale("69123", 2020, Some(200_000.0), Some(50.0)),
            sale("69123", 2022, Some(300_000.0), Some(60.0)),
            sale("13055", 2021, Some(150_000.0), None),
            sale("13055", 2022, None, Some(30.0)),
        ])
    }

    fn registry() -> &'static ColumnRegistry {
        ColumnRegistry::transactions()
    }

    #[tokio::test]
    async fn test_count_matches_rows() {
        let exec = executor();
        let plan = build_query_args(
            registry(),
            &QueryArgs {
                limit: Some(3),
                ..Default::default()
            },
        )
        .unwrap();
        let output = exec.execute(&plan).await.unwrap();

        assert_eq!(output.count, 3);
        assert_eq!(output.count, output.rows.len());
        assert_eq!(output.columns, plan.aliases());
    }

    #[tokio::test]
    async fn test_select_filters_and_sorts_nulls_last() {
        let exec = executor();
        let args = QueryArgs {
            select: vec!["inseeCode".into(), "price".into()],
            filters: vec![Filter::new("inseeCode", FilterOperator::In, json!(["13055", "69123"]))],
            sort: vec![SortSpec::new("price", SortDirection::Desc)],
            ..Default::default()
        };
        let plan = build_query_args(registry(), &args).unwrap();
        let output = exec.execute(&plan).await.unwrap();

        assert_eq!(
            output.column_values("price"),
            vec![
                Value::Float64(300_000.0),
                Value::Float64(200_000.0),
                Value::Float64(150_000.0),
                Value::Null,
            ]
        );
    }

    #[tokio::test]
    async fn test_null_never_matches_comparison() {
        let exec = executor();
        let args = QueryArgs {
            filters: vec![Filter::new("price", FilterOperator::NotEq, json!(1.0))],
            ..Default::default()
        };
        let plan = build_query_args(registry(), &args).unwrap();
        let output = exec.execute(&plan).await.unwrap();

        assert_eq!(output.count, 6);
    }

    #[tokio::test]
    async fn test_pagination_offset() {
        let exec = executor();
        let base = QueryArgs {
            select: vec!["price".into()],
            filters: vec![Filter::new("price", FilterOperator::IsNull, serde_json::Value::Null)],
            ..Default::default()
        };
        let plan = build_query_args(registry(), &base).unwrap();
        assert_eq!(exec.execute(&plan).await.unwrap().count, 1);

        let args = QueryArgs {
            select: vec!["year".into()],
            sort: vec![SortSpec::new("year", SortDirection::Asc)],
            limit: Some(2),
            offset: Some(5),
            ..Default::default()
        };
        let plan = build_query_args(registry(), &args).unwrap();
        let output = exec.execute(&plan).await.unwrap();
        assert_eq!(output.column_values("year"), vec![Value::Int64(2022), Value::Int64(2022)]);
    }

    #[tokio::test]
    async fn test_ilike_is_case_insensitive_and_literal() {
        let exec = executor();
        let args = QueryArgs {
            select: vec!["communeName".into()],
            filters: vec![Filter::new("communeName", FilterOperator::ILike, json!("commune 75%"))],
            ..Default::default()
        };
        let plan = build_query_args(registry(), &args).unwrap();
        assert_eq!(exec.execute(&plan).await.unwrap().count, 3);

        let args = QueryArgs {
            filters: vec![Filter::new("communeName", FilterOperator::ILike, json!("(.*)"))],
            ..Default::default()
        };
        let plan = build_query_args(registry(), &args).unwrap();
        assert_eq!(exec.execute(&plan).await.unwrap().count, 0);
    }

    #[test]
    fn test_like_regex_translation() {
        let re = like_regex("a_c%").unwrap();
        assert!(re.is_match("ABCdef"));
        assert!(!re.is_match("ac"));

        let re = like_regex("100\\%").unwrap();
        assert!(re.is_match("100%"));
        assert!(!re.is_match("1000"));

        assert!(matches!(like_regex("abc\\"), Err(ExecuteError::Evaluation(_))));
    }

    #[tokio::test]
    async fn test_trailing_escape_in_ilike_fails() {
        let exec = executor();
        let args = QueryArgs {
            filters: vec![Filter::new("inseeCode", FilterOperator::ILike, json!("750\\"))],
            ..Default::default()
        };
        let plan = build_query_args(registry(), &args).unwrap();

        assert!(matches!(
            exec.execute(&plan).await,
            Err(ExecuteError::Evaluation(_))
        ));
    }

    #[tokio::test]
    async fn test_between_is_inclusive() {
        let exec = MemoryExecutor::with_transactions(
            (2019..=2022).map(|year| sale("75056", year, Some(300_000.0), Some(40.0))),
        );
        let args = QueryArgs {
            select: vec!["year".into()],
            filters: vec![Filter::new("year", FilterOperator::Between, json!([2020, 2021]))],
            sort: vec![SortSpec::new("year", SortDirection::Asc)],
            ..Default::default()
        };
        let plan = build_query_args(registry(), &args).unwrap();
        let output = exec.execute(&plan).await.unwrap();

        assert_eq!(output.count, 2);
        let years: Vec<&Value> = output.rows.iter().map(|row| &row["year"]).collect();
        assert_eq!(years, vec![&Value::Int64(2020), &Value::Int64(2021)]);
    }

    #[tokio::test]
    async fn test_avg_price_per_m2_single_row() {
        let exec = executor();
        let args = ComputationArgs {
            computations: vec![ComputationRequest::AvgPricePerM2],
            limit: Some(1),
            ..Default::default()
        };
        let plan = build_computation_args(registry(), &args).unwrap();
        let output = exec.execute(&plan).await.unwrap();

        assert_eq!(output.count, 1);
        // Each sum skips its own NULLs
        let expected = (400_000.0 + 500_000.0 + 600_000.0 + 200_000.0 + 300_000.0 + 150_000.0)
            / (40.0 + 50.0 + 50.0 + 50.0 + 60.0 + 30.0);
        assert_eq!(output.rows[0]["avgPricePerM2"], Value::Float64(expected));
    }

    #[tokio::test]
    async fn test_aggregate_without_group_on_empty_input() {
        let exec = MemoryExecutor::new();
        let plan = build_aggregation_args(registry(), &AggregationArgs::default()).unwrap();
        let output = exec.execute(&plan).await.unwrap();

        assert_eq!(output.count, 1);
        assert_eq!(output.rows[0]["count"], Value::Int64(0));
        assert_eq!(output.rows[0]["avg_price"], Value::Null);
    }

    #[tokio::test]
    async fn test_ratio_division_by_zero_is_null() {
        let exec = MemoryExecutor::with_transactions(vec![
            sale("75056", 2021, Some(100_000.0), Some(0.0)),
            sale("75056", 2021, Some(100_000.0), None),
        ]);
        let args = ComputationArgs {
            computations: vec![ComputationRequest::AvgPricePerM2],
            group_by: vec!["inseeCode".into()],
            ..Default::default()
        };
        let plan = build_computation_args(registry(), &args).unwrap();
        let output = exec.execute(&plan).await.unwrap();

        assert_eq!(output.count, 1);
        assert_eq!(output.rows[0]["avgPricePerM2"], Value::Null);
    }

    #[tokio::test]
    async fn test_grouped_median_since_2020() {
        let exec = executor();
        let args = ComputationArgs {
            computations: vec![ComputationRequest::percentile("price", 50.0)],
            group_by: vec!["inseeCode".into()],
            filters: vec![Filter::new("year", FilterOperator::GtEq, json!(2020))],
            ..Default::default()
        };
        let plan = build_computation_args(registry(), &args).unwrap();
        let output = exec.execute(&plan).await.unwrap();

        assert_eq!(
            output.column_values("inseeCode"),
            vec![
                Value::String("13055".into()),
                Value::String("69123".into()),
                Value::String("75056".into()),
            ]
        );
        assert_eq!(
            output.column_values("percentile_price_50"),
            vec![
                Value::Float64(150_000.0),
                Value::Float64(250_000.0),
                Value::Float64(550_000.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_grouped_sort_is_stable_across_runs() {
        let exec = executor();
        let args = AggregationArgs {
            group_by: vec!["year".into(), "inseeCode".into()],
            metrics: vec![MetricRequest::count()],
            sort: vec![SortSpec::new("year", SortDirection::Desc)],
            ..Default::default()
        };
        let plan = build_aggregation_args(registry(), &args).unwrap();

        let first = exec.execute(&plan).await.unwrap();
        for _ in 0..5 {
            assert_eq!(exec.execute(&plan).await.unwrap(), first);
        }

        let keys: Vec<(Value, Value)> = first
            .rows
            .iter()
            .map(|r| (r["year"].clone(), r["inseeCode"].clone()))
            .collect();
        assert_eq!(keys[0], (Value::Int64(2022), Value::String("13055".into())));
        assert_eq!(keys[1], (Value::Int64(2022), Value::String("69123".into())));
        assert_eq!(keys.last().unwrap().0, Value::Int64(2019));
    }

    #[tokio::test]
    async fn test_grouped_percentile_by_year_respects_filter() {
        let exec = executor();
        let args: ComputationArgs = serde_json::from_value(json!({
            "computations": [{ "name": "percentile", "field": "price", "percentileValue": 50 }],
            "groupBy": ["year"],
            "filters": [{ "field": "year", "operator": ">=", "value": 2020 }],
            "limit": 10
        }))
        .unwrap();
        let plan = build_computation_args(registry(), &args).unwrap();
        let output = exec.execute(&plan).await.unwrap();

        assert_eq!(output.count, 3);
        for row in &output.rows {
            assert!(row.contains_key("percentile_price_50"));
            assert!(row["year"] >= Value::Int64(2020));
        }
    }

    #[tokio::test]
    async fn test_year_descending_is_non_increasing() {
        let exec = executor();
        let args: AggregationArgs = serde_json::from_value(json!({
            "groupBy": ["year"],
            "sort": [{ "field": "year", "dir": "desc" }],
            "limit": 5
        }))
        .unwrap();
        let plan = build_aggregation_args(registry(), &args).unwrap();
        let years = exec.execute(&plan).await.unwrap().column_values("year");

        assert_eq!(
            years,
            vec![
                Value::Int64(2022),
                Value::Int64(2021),
                Value::Int64(2020),
                Value::Int64(2019),
            ]
        );
        assert!(years.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn test_sort_by_metric_alias() {
        let exec = executor();
        let args = AggregationArgs {
            group_by: vec!["inseeCode".into()],
            metrics: vec![MetricRequest::new(Metric::Sum, "price")],
            sort: vec![SortSpec::new("sum_price", SortDirection::Desc)],
            ..Default::default()
        };
        let plan = build_aggregation_args(registry(), &args).unwrap();
        let output = exec.execute(&plan).await.unwrap();

        assert_eq!(
            output.column_values("sum_price"),
            vec![
                Value::Float64(1_500_000.0),
                Value::Float64(500_000.0),
                Value::Float64(150_000.0),
            ]
        );
    }

    #[tokio::test]
    async fn test_percentiles_are_monotonic_through_executor() {
        let exec = executor();
        let args = ComputationArgs {
            computations: vec![
                ComputationRequest::percentile("price", 10.0),
                ComputationRequest::percentile("price", 50.0),
                ComputationRequest::percentile("price", 90.0),
            ],
            ..Default::default()
        };
        let plan = build_computation_args(registry(), &args).unwrap();
        let output = exec.execute(&plan).await.unwrap();
        let row = &output.rows[0];

        assert!(row["percentile_price_10"] <= row["percentile_price_50"]);
        assert!(row["percentile_price_50"] <= row["percentile_price_90"]);
    }

    #[tokio::test]
    async fn test_sort_by_ungrouped_column_fails() {
        let exec = executor();
        let args = AggregationArgs {
            group_by: vec!["inseeCode".into()],
            sort: vec![SortSpec::new("price", SortDirection::Asc)],
            ..Default::default()
        };
        let plan = build_aggregation_args(registry(), &args).unwrap();

        assert!(matches!(
            exec.execute(&plan).await,
            Err(ExecuteError::Evaluation(_))
        ));
    }
}
