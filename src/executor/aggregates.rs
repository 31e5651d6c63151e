use super::memory::StoredRow;
use crate::data::Value;
use crate::query::expr::AggregateExpr;
use crate::query::ColumnRef;

/// Accumulator trait for in-memory aggregation
pub trait Accumulator: Send {
    /// Fold one input row into the accumulator
    fn accumulate(&mut self, row: &StoredRow);

    /// Get the final result
    fn result(&self) -> Value;
}

fn read(row: &StoredRow, column: ColumnRef) -> &Value {
    row.get(column.physical_name()).unwrap_or(&Value::Null)
}

/// COUNT(*) or COUNT(column)
#[derive(Debug, Clone)]
pub struct CountAccumulator {
    count: i64,
    column: Option<ColumnRef>, // None counts every row
}

impl CountAccumulator {
    pub fn count_all() -> Self {
        Self { count: 0, column: None }
    }

    pub fn count_column(column: ColumnRef) -> Self {
        Self {
            count: 0,
            column: Some(column),
        }
    }
}

impl Accumulator for CountAccumulator {
    fn accumulate(&mut self, row: &StoredRow) {
        match self.column {
            Some(column) if read(row, column).is_null() => {}
            _ => self.count += 1,
        }
    }

    fn result(&self) -> Value {
        Value::Int64(self.count)
    }
}

/// SUM(column)
#[derive(Debug, Clone)]
pub struct SumAccumulator {
    column: ColumnRef,
    sum: f64,
    has_value: bool,
}

impl SumAccumulator {
    pub fn new(column: ColumnRef) -> Self {
        Self {
            column,
            sum: 0.0,
            has_value: false,
        }
    }
}

impl Accumulator for SumAccumulator {
    fn accumulate(&mut self, row: &StoredRow) {
        if let Some(v) = read(row, self.column).as_f64() {
            self.sum += v;
            self.has_value = true;
        }
    }

    fn result(&self) -> Value {
        if self.has_value {
            Value::Float64(self.sum)
        } else {
            Value::Null
        }
    }
}

/// AVG(column)
#[derive(Debug, Clone)]
pub struct AvgAccumulator {
    column: ColumnRef,
    sum: f64,
    count: i64,
}

impl AvgAccumulator {
    pub fn new(column: ColumnRef) -> Self {
        Self {
            column,
            sum: 0.0,
            count: 0,
        }
    }
}

impl Accumulator for AvgAccumulator {
    fn accumulate(&mut self, row: &StoredRow) {
        if let Some(v) = read(row, self.column).as_f64() {
            self.sum += v;
            self.count += 1;
        }
    }

    fn result(&self) -> Value {
        if self.count > 0 {
            Value::Float64(self.sum / self.count as f64)
        } else {
            Value::Null
        }
    }
}

/// MIN(column) / MAX(column)
#[derive(Debug, Clone)]
pub struct ExtremumAccumulator {
    column: ColumnRef,
    keep_max: bool,
    current: Option<Value>,
}

impl ExtremumAccumulator {
    pub fn min(column: ColumnRef) -> Self {
        Self {
            column,
            keep_max: false,
            current: None,
        }
    }

    pub fn max(column: ColumnRef) -> Self {
        Self {
            column,
            keep_max: true,
            current: None,
        }
    }
}

impl Accumulator for ExtremumAccumulator {
    fn accumulate(&mut self, row: &StoredRow) {
        let value = read(row, self.column);
        if value.is_null() {
            return;
        }
        let replace = match &self.current {
            None => true,
            Some(current) if self.keep_max => value > current,
            Some(current) => value < current,
        };
        if replace {
            self.current = Some(value.clone());
        }
    }

    fn result(&self) -> Value {
        self.current.clone().unwrap_or(Value::Null)
    }
}

/// sum(numerator) / sum(denominator), `Null` when the denominator sums to zero
#[derive(Debug, Clone)]
pub struct RatioAccumulator {
    numerator: SumAccumulator,
    denominator: SumAccumulator,
}

impl RatioAccumulator {
    pub fn new(numerator: ColumnRef, denominator: ColumnRef) -> Self {
        Self {
            numerator: SumAccumulator::new(numerator),
            denominator: SumAccumulator::new(denominator),
        }
    }
}

impl Accumulator for RatioAccumulator {
    fn accumulate(&mut self, row: &StoredRow) {
        self.numerator.accumulate(row);
        self.denominator.accumulate(row);
    }

    fn result(&self) -> Value {
        match (self.numerator.result().as_f64(), self.denominator.result().as_f64()) {
            (Some(_), Some(den)) if den == 0.0 => Value::Null,
            (Some(num), Some(den)) => Value::finite(Some(num / den)),
            _ => Value::Null,
        }
    }
}

/// Exact continuous percentile (linear interpolation between order statistics)
#[derive(Debug, Clone)]
pub struct PercentileAccumulator {
    column: ColumnRef,
    fraction: f64,
    values: Vec<f64>,
}

impl PercentileAccumulator {
    pub fn new(column: ColumnRef, fraction: f64) -> Self {
        Self {
            column,
            fraction: fraction.clamp(0.0, 1.0),
            values: Vec::new(),
        }
    }
}

impl Accumulator for PercentileAccumulator {
    fn accumulate(&mut self, row: &StoredRow) {
        if let Some(v) = read(row, self.column).as_f64() {
            self.values.push(v);
        }
    }

    fn result(&self) -> Value {
        Value::finite(continuous_percentile(&self.values, self.fraction))
    }
}

/// Continuous percentile of `values` at `fraction` in `[0, 1]`
pub fn continuous_percentile(values: &[f64], fraction: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = fraction * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Factory for creating accumulators
pub fn create_accumulator(aggregate: &AggregateExpr) -> Box<dyn Accumulator> {
    match aggregate {
        AggregateExpr::CountAll => Box::new(CountAccumulator::count_all()),
        AggregateExpr::Count(column) => Box::new(CountAccumulator::count_column(*column)),
        AggregateExpr::Sum(column) => Box::new(SumAccumulator::new(*column)),
        AggregateExpr::Avg(column) => Box::new(AvgAccumulator::new(*column)),
        AggregateExpr::Min(column) => Box::new(ExtremumAccumulator::min(*column)),
        AggregateExpr::Max(column) => Box::new(ExtremumAccumulator::max(*column)),
        AggregateExpr::Ratio {
            numerator,
            denominator,
        } => Box::new(RatioAccumulator::new(*numerator, *denominator)),
        AggregateExpr::Percentile { column, fraction } => {
            Box::new(PercentileAccumulator::new(*column, *fraction))
        }
    }
}
