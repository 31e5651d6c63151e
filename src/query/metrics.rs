//! Metric and computation compiler
//!
//! Metrics are plain aggregates (`count`, `sum`, ...) over one field.
//! Computations are named derived statistics: the price-per-m² ratio and
//! continuous percentiles.

use serde::{Deserialize, Serialize};

use super::expr::{AggregateExpr, SelectItem};
use super::registry::{ColumnRef, ColumnRegistry};
use super::CompileError;

/// Field summarized by the default metric set
pub const DEFAULT_METRIC_FIELD: &str = "price";

/// Numerator and denominator of `avgPricePerM2`
const RATIO_NUMERATOR: &str = "price";
const RATIO_DENOMINATOR: &str = "area";

pub const AVG_PRICE_PER_M2: &str = "avgPricePerM2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Metric {
    pub const ALL: [Metric; 5] = [Metric::Count, Metric::Sum, Metric::Avg, Metric::Min, Metric::Max];

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Count => "count",
            Metric::Sum => "sum",
            Metric::Avg => "avg",
            Metric::Min => "min",
            Metric::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricRequest {
    pub metric: Metric,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl MetricRequest {
    pub fn new(metric: Metric, field: &str) -> Self {
        Self {
            metric,
            field: Some(field.to_string()),
        }
    }

    pub fn count() -> Self {
        Self {
            metric: Metric::Count,
            field: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", deny_unknown_fields)]
pub enum ComputationRequest {
    #[serde(rename = "avgPricePerM2")]
    AvgPricePerM2,
    #[serde(rename = "percentile", rename_all = "camelCase")]
    Percentile { field: String, percentile_value: f64 },
}

impl ComputationRequest {
    pub const NAMES: [&'static str; 2] = [AVG_PRICE_PER_M2, "percentile"];

    pub fn percentile(field: &str, percentile_value: f64) -> Self {
        ComputationRequest::Percentile {
            field: field.to_string(),
            percentile_value,
        }
    }
}

/// Compile metric requests, falling back to the default summary set when empty
pub fn compile_metrics(
    registry: &ColumnRegistry,
    metrics: &[MetricRequest],
) -> Result<Vec<SelectItem>, CompileError> {
    if metrics.is_empty() {
        return default_metrics(registry);
    }

    let mut items = Vec::with_capacity(metrics.len());
    for request in metrics {
        push_unique(&mut items, compile_metric(registry, request)?)?;
    }
    Ok(items)
}

/// `count`, then sum/avg/min/max over [`DEFAULT_METRIC_FIELD`]
fn default_metrics(registry: &ColumnRegistry) -> Result<Vec<SelectItem>, CompileError> {
    let mut requests = vec![MetricRequest::count()];
    requests.extend(
        [Metric::Sum, Metric::Avg, Metric::Min, Metric::Max]
            .into_iter()
            .map(|m| MetricRequest::new(m, DEFAULT_METRIC_FIELD)),
    );
    requests
        .iter()
        .map(|request| compile_metric(registry, request))
        .collect()
}

fn compile_metric(registry: &ColumnRegistry, request: &MetricRequest) -> Result<SelectItem, CompileError> {
    let Some(field) = request.field.as_deref() else {
        return match request.metric {
            Metric::Count => Ok(SelectItem::aggregate("count", AggregateExpr::CountAll)),
            other => Err(CompileError::InvalidMetric {
                metric: other.as_str(),
                reason: "a field is required".to_string(),
            }),
        };
    };

    let column = registry.resolve(field)?;
    let alias = format!("{}_{}", request.metric.as_str(), column.logical_name());

    let aggregate = match request.metric {
        Metric::Count => AggregateExpr::Count(column),
        Metric::Sum => AggregateExpr::Sum(numeric(column)?),
        Metric::Avg => AggregateExpr::Avg(numeric(column)?),
        Metric::Min => AggregateExpr::Min(numeric(column)?),
        Metric::Max => AggregateExpr::Max(numeric(column)?),
    };

    Ok(SelectItem::aggregate(alias, aggregate))
}

/// Compile computations; an empty list is rejected
pub fn compile_computations(
    registry: &ColumnRegistry,
    computations: &[ComputationRequest],
) -> Result<Vec<SelectItem>, CompileError> {
    if computations.is_empty() {
        return Err(CompileError::EmptyComputationSet);
    }

    let mut items = Vec::with_capacity(computations.len());
    for request in computations {
        push_unique(&mut items, compile_computation(registry, request)?)?;
    }
    Ok(items)
}

fn compile_computation(
    registry: &ColumnRegistry,
    request: &ComputationRequest,
) -> Result<SelectItem, CompileError> {
    match request {
        ComputationRequest::AvgPricePerM2 => Ok(SelectItem::aggregate(
            AVG_PRICE_PER_M2,
            AggregateExpr::Ratio {
                numerator: registry.resolve(RATIO_NUMERATOR)?,
                denominator: registry.resolve(RATIO_DENOMINATOR)?,
            },
        )),
        ComputationRequest::Percentile {
            field,
            percentile_value,
        } => {
            let column = numeric(registry.resolve(field)?)?;
            let p = *percentile_value;
            if !p.is_finite() || !(0.0..=100.0).contains(&p) {
                return Err(CompileError::InvalidPercentile(p));
            }
            Ok(SelectItem::aggregate(
                percentile_alias(column, p),
                AggregateExpr::Percentile {
                    column,
                    fraction: p / 100.0,
                },
            ))
        }
    }
}

/// `percentile_price_50`, `percentile_price_12_5`
pub fn percentile_alias(column: ColumnRef, p: f64) -> String {
    let suffix = if p.fract() == 0.0 {
        format!("{}", p as i64)
    } else {
        p.to_string().replace('.', "_")
    };
    format!("percentile_{}_{}", column.logical_name(), suffix)
}

fn numeric(column: ColumnRef) -> Result<ColumnRef, CompileError> {
    if column.value_type().is_numeric() {
        Ok(column)
    } else {
        Err(CompileError::NonNumericField(column.logical_name().to_string()))
    }
}

/// Append an item, rejecting a second item under the same alias
pub(crate) fn push_unique(items: &mut Vec<SelectItem>, item: SelectItem) -> Result<(), CompileError> {
    if items.iter().any(|existing| existing.alias == item.alias) {
        return Err(CompileError::DuplicateAlias(item.alias));
    }
    items.push(item);
    Ok(())
}
