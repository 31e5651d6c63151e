//! Postgres rendering of compiled plans
//!
//! Produces one statement plus its bind parameters. Identifiers only ever
//! come from the column registry; every value is a `$n` placeholder.

use super::expr::{AggregateExpr, OrderTarget, Predicate, SelectExpr};
use super::plan::QueryPlan;
use super::registry::{ColumnRef, ValueType};
use crate::data::Value;

/// A parameterized SQL statement
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub text: String,
    pub params: Vec<Value>,
}

/// Render a plan to a single SELECT statement
pub fn render(plan: &QueryPlan) -> SqlStatement {
    let mut w = SqlWriter::default();

    w.push("SELECT ");
    for (i, item) in plan.select().iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        match &item.expr {
            SelectExpr::Column(column) => w.typed_column(*column),
            SelectExpr::Aggregate(aggregate) => w.aggregate(aggregate),
        }
        w.push(" AS ");
        w.ident(&item.alias);
    }

    w.push(" FROM ");
    w.ident(plan.table());

    if let Some(predicate) = plan.filter() {
        w.push(" WHERE ");
        w.predicate(predicate);
    }

    if !plan.group_by().is_empty() {
        w.push(" GROUP BY ");
        for (i, column) in plan.group_by().iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.column(*column);
        }
    }

    if !plan.order_by().is_empty() {
        w.push(" ORDER BY ");
        for (i, order) in plan.order_by().iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match &order.target {
                OrderTarget::Column(column) => w.column(*column),
                OrderTarget::Alias(alias) => w.ident(alias),
            }
            w.push(" ");
            w.push(order.direction.sql());
            w.push(" NULLS LAST");
        }
    }

    let pagination = plan.pagination();
    w.push(" LIMIT ");
    w.param(Value::Int64(pagination.limit as i64));
    w.push(" OFFSET ");
    w.param(Value::Int64(pagination.offset as i64));

    SqlStatement {
        text: w.text,
        params: w.params,
    }
}

#[derive(Default)]
struct SqlWriter {
    text: String,
    params: Vec<Value>,
}

impl SqlWriter {
    fn push(&mut self, s: &str) {
        self.text.push_str(s);
    }

    fn ident(&mut self, name: &str) {
        self.text.push('"');
        self.text.push_str(&name.replace('"', "\"\""));
        self.text.push('"');
    }

    fn column(&mut self, column: ColumnRef) {
        self.ident(column.physical_name());
    }

    fn param(&mut self, value: Value) {
        self.params.push(value);
        self.text.push('$');
        self.text.push_str(&self.params.len().to_string());
    }

    /// Column projected with a decode-friendly type
    fn typed_column(&mut self, column: ColumnRef) {
        match column.value_type() {
            ValueType::Float => self.cast(|w| w.column(column), "DOUBLE PRECISION"),
            ValueType::Integer => self.cast(|w| w.column(column), "BIGINT"),
            ValueType::String | ValueType::Date => self.column(column),
        }
    }

    fn cast(&mut self, inner: impl FnOnce(&mut Self), sql_type: &str) {
        self.push("CAST(");
        inner(self);
        self.push(" AS ");
        self.push(sql_type);
        self.push(")");
    }

    fn call(&mut self, function: &str, column: ColumnRef) {
        self.push(function);
        self.push("(");
        self.column(column);
        self.push(")");
    }

    fn aggregate(&mut self, aggregate: &AggregateExpr) {
        match aggregate {
            AggregateExpr::CountAll => self.push("COUNT(*)"),
            AggregateExpr::Count(column) => self.call("COUNT", *column),
            AggregateExpr::Sum(column) => self.cast(|w| w.call("SUM", *column), "DOUBLE PRECISION"),
            AggregateExpr::Avg(column) => self.cast(|w| w.call("AVG", *column), "DOUBLE PRECISION"),
            AggregateExpr::Min(column) => self.extremum("MIN", *column),
            AggregateExpr::Max(column) => self.extremum("MAX", *column),
            AggregateExpr::Ratio {
                numerator,
                denominator,
            } => {
                self.cast(|w| w.call("SUM", *numerator), "DOUBLE PRECISION");
                self.push(" / NULLIF(");
                self.cast(|w| w.call("SUM", *denominator), "DOUBLE PRECISION");
                self.push(", 0)");
            }
            AggregateExpr::Percentile { column, fraction } => {
                self.push("percentile_cont(");
                self.param(Value::Float64(*fraction));
                self.push(") WITHIN GROUP (ORDER BY ");
                self.cast(|w| w.column(*column), "DOUBLE PRECISION");
                self.push(") FILTER (WHERE ");
                self.column(*column);
                self.push(" IS NOT NULL)");
            }
        }
    }

    fn extremum(&mut self, function: &str, column: ColumnRef) {
        match column.value_type() {
            ValueType::Integer => self.cast(|w| w.call(function, column), "BIGINT"),
            _ => self.cast(|w| w.call(function, column), "DOUBLE PRECISION"),
        }
    }

    fn predicate(&mut self, predicate: &Predicate) {
        match predicate {
            Predicate::Compare { column, op, value } => {
                self.column(*column);
                self.push(" ");
                self.push(op.sql());
                self.push(" ");
                self.param(value.clone());
            }
            Predicate::Between { column, low, high } => {
                self.column(*column);
                self.push(" BETWEEN ");
                self.param(low.clone());
                self.push(" AND ");
                self.param(high.clone());
            }
            Predicate::In { column, values } => {
                self.column(*column);
                self.push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.param(value.clone());
                }
                self.push(")");
            }
            Predicate::ILike { column, pattern } => {
                self.column(*column);
                self.push(" ILIKE ");
                self.param(Value::String(pattern.clone()));
            }
            Predicate::IsNull(column) => {
                self.column(*column);
                self.push(" IS NULL");
            }
            Predicate::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        self.push(" AND ");
                    }
                    self.push("(");
                    self.predicate(part);
                    self.push(")");
                }
            }
        }
    }
}
