//! Plan assembler
//!
//! Combines the filter, metric, computation, group-by and sort compilers
//! into one immutable [`QueryPlan`] per request.

use serde::{Deserialize, Serialize};

use super::expr::{OrderExpr, OrderTarget, Predicate, SelectItem, SortDirection};
use super::filter::{compile_filters, Filter};
use super::metrics::{compile_computations, compile_metrics, push_unique, ComputationRequest, MetricRequest};
use super::ordering::{compile_group_by, compile_sort, SortSpec};
use super::registry::{ColumnRef, ColumnRegistry};
use super::CompileError;

pub const DEFAULT_LIMIT: u32 = 200;
pub const MAX_LIMIT: u32 = 500;

/// Columns returned by a select plan that names none
pub const DEFAULT_PROJECTION: [&str; 8] = [
    "date",
    "inseeCode",
    "section",
    "propertyTypeLabel",
    "price",
    "area",
    "pricePerM2",
    "rooms",
];

/// Raw row selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryArgs {
    pub select: Vec<String>,
    pub filters: Vec<Filter>,
    pub sort: Vec<SortSpec>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Grouped metrics. `offset` is accepted but aggregation plans always start at 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct AggregationArgs {
    pub group_by: Vec<String>,
    pub metrics: Vec<MetricRequest>,
    pub filters: Vec<Filter>,
    pub sort: Vec<SortSpec>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Grouped computations. `offset` is accepted but computation plans always start at 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ComputationArgs {
    pub computations: Vec<ComputationRequest>,
    pub group_by: Vec<String>,
    pub filters: Vec<Filter>,
    pub sort: Vec<SortSpec>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u64,
}

/// Clamp `limit` into `[1, MAX_LIMIT]` (default [`DEFAULT_LIMIT`]) and `offset` to `>= 0`
pub fn normalize_pagination(limit: Option<i64>, offset: Option<i64>) -> Pagination {
    let limit = limit
        .unwrap_or(DEFAULT_LIMIT as i64)
        .clamp(1, MAX_LIMIT as i64) as u32;
    let offset = offset.unwrap_or(0).max(0) as u64;
    Pagination { limit, offset }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    Select,
    Aggregate,
    Compute,
}

/// A fully resolved, immutable description of one query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    kind: PlanKind,
    table: &'static str,
    select: Vec<SelectItem>,
    filter: Option<Predicate>,
    group_by: Vec<ColumnRef>,
    order_by: Vec<OrderExpr>,
    pagination: Pagination,
}

impl QueryPlan {
    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn select(&self) -> &[SelectItem] {
        &self.select
    }

    pub fn filter(&self) -> Option<&Predicate> {
        self.filter.as_ref()
    }

    pub fn group_by(&self) -> &[ColumnRef] {
        &self.group_by
    }

    pub fn order_by(&self) -> &[OrderExpr] {
        &self.order_by
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.select.iter().map(|item| item.alias.as_str()).collect()
    }

    pub fn has_aggregates(&self) -> bool {
        self.select.iter().any(|item| item.expr.is_aggregate())
    }
}

/// Build a raw selection plan
pub fn build_query_args(registry: &ColumnRegistry, args: &QueryArgs) -> Result<QueryPlan, CompileError> {
    let mut select = Vec::new();
    if args.select.is_empty() {
        for name in DEFAULT_PROJECTION {
            select.push(SelectItem::column(registry.resolve(name)?));
        }
    } else {
        for name in &args.select {
            push_unique(&mut select, SelectItem::column(registry.resolve(name)?))?;
        }
    }

    Ok(QueryPlan {
        kind: PlanKind::Select,
        table: registry.table(),
        select,
        filter: compile_filters(registry, &args.filters)?,
        group_by: Vec::new(),
        order_by: compile_sort(registry, &args.sort)?,
        pagination: normalize_pagination(args.limit, args.offset),
    })
}

/// Build a grouped metric plan
pub fn build_aggregation_args(
    registry: &ColumnRegistry,
    args: &AggregationArgs,
) -> Result<QueryPlan, CompileError> {
    let aggregates = compile_metrics(registry, &args.metrics)?;
    assemble_grouped(
        registry,
        PlanKind::Aggregate,
        aggregates,
        &args.group_by,
        &args.filters,
        &args.sort,
        args.limit,
    )
}

/// Build a grouped computation plan
pub fn build_computation_args(
    registry: &ColumnRegistry,
    args: &ComputationArgs,
) -> Result<QueryPlan, CompileError> {
    let aggregates = compile_computations(registry, &args.computations)?;
    assemble_grouped(
        registry,
        PlanKind::Compute,
        aggregates,
        &args.group_by,
        &args.filters,
        &args.sort,
        args.limit,
    )
}

fn assemble_grouped(
    registry: &ColumnRegistry,
    kind: PlanKind,
    aggregates: Vec<SelectItem>,
    group_by: &[String],
    filters: &[Filter],
    sort: &[SortSpec],
    limit: Option<i64>,
) -> Result<QueryPlan, CompileError> {
    let group_by = compile_group_by(registry, group_by)?;

    let mut select = Vec::with_capacity(group_by.len() + aggregates.len());
    for column in &group_by {
        push_unique(&mut select, SelectItem::column(*column))?;
    }
    for item in aggregates {
        push_unique(&mut select, item)?;
    }

    let order_by = grouped_order(registry, sort, &select, &group_by)?;

    Ok(QueryPlan {
        kind,
        table: registry.table(),
        select,
        filter: compile_filters(registry, filters)?,
        group_by,
        order_by,
        pagination: normalize_pagination(limit, None),
    })
}

/// Caller sort keys (aggregate aliases or registry columns), then every
/// remaining group-by column ascending as a tie-break.
fn grouped_order(
    registry: &ColumnRegistry,
    sort: &[SortSpec],
    select: &[SelectItem],
    group_by: &[ColumnRef],
) -> Result<Vec<OrderExpr>, CompileError> {
    let mut order = Vec::with_capacity(sort.len() + group_by.len());

    for spec in sort {
        let aggregate_alias = select
            .iter()
            .find(|item| item.expr.is_aggregate() && item.alias == spec.field);

        match aggregate_alias {
            Some(item) => order.push(OrderExpr {
                target: OrderTarget::Alias(item.alias.clone()),
                direction: spec.dir,
            }),
            None => order.extend(compile_sort(registry, std::slice::from_ref(spec))?),
        }
    }

    for column in group_by {
        if !order.iter().any(|o| o.targets_column(*column)) {
            order.push(OrderExpr::column(*column, SortDirection::Asc));
        }
    }

    Ok(order)
}
