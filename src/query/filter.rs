//! Filter compiler
//!
//! Turns `{field, operator, value}` triples into one conjunctive predicate.
//! Only AND is supported.

use serde::{Deserialize, Serialize};

use super::expr::{CompareOp, Predicate};
use super::registry::{ColumnRef, ColumnRegistry, ValueType};
use super::CompileError;
use crate::data::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "ilike")]
    ILike,
    #[serde(rename = "is_null")]
    IsNull,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 10] = [
        FilterOperator::Eq,
        FilterOperator::NotEq,
        FilterOperator::Gt,
        FilterOperator::GtEq,
        FilterOperator::Lt,
        FilterOperator::LtEq,
        FilterOperator::Between,
        FilterOperator::In,
        FilterOperator::ILike,
        FilterOperator::IsNull,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::GtEq => ">=",
            FilterOperator::Lt => "<",
            FilterOperator::LtEq => "<=",
            FilterOperator::Between => "between",
            FilterOperator::In => "in",
            FilterOperator::ILike => "ilike",
            FilterOperator::IsNull => "is_null",
        }
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One caller-supplied filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filter {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl Filter {
    pub fn new(field: &str, operator: FilterOperator, value: serde_json::Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: Some(value),
        }
    }
}

/// Compile a filter list into a single predicate, `None` when the list is empty
pub fn compile_filters(
    registry: &ColumnRegistry,
    filters: &[Filter],
) -> Result<Option<Predicate>, CompileError> {
    if filters.is_empty() {
        return Ok(None);
    }

    let mut predicates = filters
        .iter()
        .map(|filter| compile_filter(registry, filter))
        .collect::<Result<Vec<_>, _>>()?;

    if predicates.len() == 1 {
        Ok(predicates.pop())
    } else {
        Ok(Some(Predicate::And(predicates)))
    }
}

fn compile_filter(registry: &ColumnRegistry, filter: &Filter) -> Result<Predicate, CompileError> {
    let column = registry.resolve(&filter.field)?;

    match filter.operator {
        FilterOperator::Eq => compare(column, CompareOp::Eq, filter),
        FilterOperator::NotEq => compare(column, CompareOp::NotEq, filter),
        FilterOperator::Gt => compare(column, CompareOp::Gt, filter),
        FilterOperator::GtEq => compare(column, CompareOp::GtEq, filter),
        FilterOperator::Lt => compare(column, CompareOp::Lt, filter),
        FilterOperator::LtEq => compare(column, CompareOp::LtEq, filter),
        FilterOperator::Between => {
            let values = array(column, filter)?;
            match <[Value; 2]>::try_from(values) {
                Ok([low, high]) => Ok(Predicate::Between { column, low, high }),
                Err(values) => Err(invalid(
                    filter,
                    format!("between expects exactly 2 values, got {}", values.len()),
                )),
            }
        }
        FilterOperator::In => {
            let values = array(column, filter)?;
            if values.is_empty() {
                return Err(invalid(filter, "in expects at least one value"));
            }
            Ok(Predicate::In { column, values })
        }
        FilterOperator::ILike => {
            if column.value_type() != ValueType::String {
                return Err(CompileError::UnsupportedOperator {
                    field: filter.field.clone(),
                    operator: filter.operator.as_str(),
                });
            }
            match scalar(column, filter)? {
                Value::String(pattern) => Ok(Predicate::ILike { column, pattern }),
                other => Err(invalid(filter, format!("expected a string pattern, got {}", other.type_name()))),
            }
        }
        FilterOperator::IsNull => Ok(Predicate::IsNull(column)),
    }
}

fn compare(column: ColumnRef, op: CompareOp, filter: &Filter) -> Result<Predicate, CompileError> {
    let value = scalar(column, filter)?;
    Ok(Predicate::Compare { column, op, value })
}

fn scalar(column: ColumnRef, filter: &Filter) -> Result<Value, CompileError> {
    match &filter.value {
        None | Some(serde_json::Value::Null) => Err(invalid(filter, "a value is required")),
        Some(serde_json::Value::Array(_)) => Err(invalid(filter, "expected a single value, got an array")),
        Some(json) => coerce(column, filter, json),
    }
}

fn array(column: ColumnRef, filter: &Filter) -> Result<Vec<Value>, CompileError> {
    match &filter.value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|json| coerce(column, filter, json))
            .collect(),
        _ => Err(invalid(filter, "expected an array value")),
    }
}

fn coerce(column: ColumnRef, filter: &Filter, json: &serde_json::Value) -> Result<Value, CompileError> {
    column.value_type().coerce(json).ok_or_else(|| {
        invalid(
            filter,
            format!("{} is not a valid {} value", json, column.value_type().name()),
        )
    })
}

fn invalid(filter: &Filter, reason: impl Into<String>) -> CompileError {
    CompileError::InvalidFilterValue {
        field: filter.field.clone(),
        operator: filter.operator.as_str(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> &'static ColumnRegistry {
        ColumnRegistry::transactions()
    }

    #[test]
    fn test_empty_filters_compile_to_none() {
        assert_eq!(compile_filters(registry(), &[]).unwrap(), None);
    }

    #[test]
    fn test_single_filter_is_not_wrapped() {
        let filters = vec![Filter::new("year", FilterOperator::GtEq, json!(2020))];
        let predicate = compile_filters(registry(), &filters).unwrap().unwrap();

        assert_eq!(
            predicate,
            Predicate::Compare {
                column: registry().resolve("year").unwrap(),
                op: CompareOp::GtEq,
                value: Value::Int64(2020),
            }
        );
    }

    #[test]
    fn test_filters_combine_with_and() {
        let filters = vec![
            Filter::new("year", FilterOperator::Between, json!([2019, 2021])),
            Filter::new("inseeCode", FilterOperator::In, json!(["75056", "69123"])),
            Filter {
                field: "area".into(),
                operator: FilterOperator::IsNull,
                value: Some(json!("ignored")),
            },
        ];
        let predicate = compile_filters(registry(), &filters).unwrap().unwrap();

        let Predicate::And(parts) = predicate else {
            panic!("expected a conjunction");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], Predicate::Between { low: Value::Int64(2019), high: Value::Int64(2021), .. }));
        assert!(matches!(&parts[1], Predicate::In { values, .. } if values.len() == 2));
        assert!(matches!(&parts[2], Predicate::IsNull(c) if c.logical_name() == "area"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let filters = vec![
            Filter::new("year", FilterOperator::Eq, json!(2020)),
            Filter::new("annee", FilterOperator::Eq, json!(2020)),
        ];
        let err = compile_filters(registry(), &filters).unwrap_err();
        assert!(matches!(err, CompileError::UnknownColumn(name) if name == "annee"));
    }

    #[test]
    fn test_between_requires_two_values() {
        for value in [json!([2020]), json!([2019, 2020, 2021]), json!(2020)] {
            let filters = vec![Filter::new("year", FilterOperator::Between, value)];
            let err = compile_filters(registry(), &filters).unwrap_err();
            assert!(matches!(err, CompileError::InvalidFilterValue { .. }));
        }
    }

    #[test]
    fn test_in_requires_non_empty_array() {
        let filters = vec![Filter::new("section", FilterOperator::In, json!([]))];
        assert!(matches!(
            compile_filters(registry(), &filters),
            Err(CompileError::InvalidFilterValue { .. })
        ));
    }

    #[test]
    fn test_values_are_type_checked() {
        let cases = [
            Filter::new("year", FilterOperator::Eq, json!("2020")),
            Filter::new("year", FilterOperator::Gt, json!(2020.5)),
            Filter::new("year", FilterOperator::Eq, json!(1e20)),
            Filter::new("rooms", FilterOperator::Between, json!([1, 1e300])),
            Filter::new("inseeCode", FilterOperator::Eq, json!(75056)),
            Filter::new("date", FilterOperator::GtEq, json!("not-a-date")),
            Filter::new("price", FilterOperator::In, json!([100000, "cheap"])),
            Filter {
                field: "price".into(),
                operator: FilterOperator::Lt,
                value: None,
            },
        ];

        for filter in cases {
            let err = compile_filters(registry(), &[filter.clone()]).unwrap_err();
            assert!(
                matches!(err, CompileError::InvalidFilterValue { .. }),
                "{:?} should be rejected",
                filter
            );
        }
    }

    #[test]
    fn test_ilike_only_on_string_columns() {
        let ok = vec![Filter::new("communeName", FilterOperator::ILike, json!("%lyon%"))];
        assert!(matches!(
            compile_filters(registry(), &ok).unwrap(),
            Some(Predicate::ILike { pattern, .. }) if pattern == "%lyon%"
        ));

        let bad = vec![Filter::new("price", FilterOperator::ILike, json!("%1%"))];
        assert!(matches!(
            compile_filters(registry(), &bad),
            Err(CompileError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_operator_wire_names() {
        let filter: Filter =
            serde_json::from_value(json!({"field": "price", "operator": "!=", "value": 1})).unwrap();
        assert_eq!(filter.operator, FilterOperator::NotEq);

        let filter: Filter =
            serde_json::from_value(json!({"field": "area", "operator": "is_null"})).unwrap();
        assert_eq!(filter.operator, FilterOperator::IsNull);
        assert!(filter.value.is_none());

        assert!(serde_json::from_value::<Filter>(json!({"field": "area", "operator": "or"})).is_err());
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let filters = vec![
            Filter::new("year", FilterOperator::GtEq, json!(2020)),
            Filter::new("propertyTypeCode", FilterOperator::In, json!([1, 2])),
        ];
        assert_eq!(
            compile_filters(registry(), &filters).unwrap(),
            compile_filters(registry(), &filters).unwrap()
        );
    }
}
