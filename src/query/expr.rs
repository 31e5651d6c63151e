//! Expression tree for compiled plans
//!
//! Every node is built from registry-resolved [`ColumnRef`]s and typed
//! [`Value`]s. Nothing here holds caller text that could end up in the query
//! string: values become bind parameters, columns come from the static map.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::registry::ColumnRef;
use crate::data::Value;

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
        }
    }

    /// Whether `left.cmp(right) == ordering` satisfies the operator
    #[inline]
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
        }
    }
}

/// WHERE clause predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: Value,
    },
    /// Inclusive on both ends
    Between {
        column: ColumnRef,
        low: Value,
        high: Value,
    },
    In {
        column: ColumnRef,
        values: Vec<Value>,
    },
    /// Case-insensitive LIKE with caller-supplied `%`/`_` wildcards
    ILike {
        column: ColumnRef,
        pattern: String,
    },
    IsNull(ColumnRef),
    And(Vec<Predicate>),
}

/// Aggregate functions a plan may project
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateExpr {
    CountAll,
    Count(ColumnRef),
    Sum(ColumnRef),
    Avg(ColumnRef),
    Min(ColumnRef),
    Max(ColumnRef),
    /// `sum(numerator) / nullif(sum(denominator), 0)`
    Ratio {
        numerator: ColumnRef,
        denominator: ColumnRef,
    },
    /// Continuous percentile over non-null values, `fraction` in `[0, 1]`
    Percentile { column: ColumnRef, fraction: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectExpr {
    Column(ColumnRef),
    Aggregate(AggregateExpr),
}

impl SelectExpr {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, SelectExpr::Aggregate(_))
    }
}

/// One aliased output column
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub alias: String,
    pub expr: SelectExpr,
}

impl SelectItem {
    pub fn column(column: ColumnRef) -> Self {
        Self {
            alias: column.logical_name().to_string(),
            expr: SelectExpr::Column(column),
        }
    }

    pub fn aggregate(alias: impl Into<String>, aggregate: AggregateExpr) -> Self {
        Self {
            alias: alias.into(),
            expr: SelectExpr::Aggregate(aggregate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    Column(ColumnRef),
    /// Output alias generated by the plan itself (aggregate columns)
    Alias(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderExpr {
    pub target: OrderTarget,
    pub direction: SortDirection,
}

impl OrderExpr {
    pub fn column(column: ColumnRef, direction: SortDirection) -> Self {
        Self {
            target: OrderTarget::Column(column),
            direction,
        }
    }

    pub fn targets_column(&self, column: ColumnRef) -> bool {
        matches!(self.target, OrderTarget::Column(c) if c == column)
    }
}
