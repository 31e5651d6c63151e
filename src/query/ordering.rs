//! Group-by and sort compiler

use serde::{Deserialize, Serialize};

use super::expr::{OrderExpr, SortDirection};
use super::registry::{ColumnRef, ColumnRegistry};
use super::CompileError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub dir: SortDirection,
}

impl SortSpec {
    pub fn new(field: &str, dir: SortDirection) -> Self {
        Self {
            field: field.to_string(),
            dir,
        }
    }
}

/// Resolve group-by fields, preserving input order
pub fn compile_group_by(
    registry: &ColumnRegistry,
    fields: &[String],
) -> Result<Vec<ColumnRef>, CompileError> {
    fields.iter().map(|field| registry.resolve(field)).collect()
}

/// One order expression per sort spec; the first entry is the primary key.
///
/// Fields only need to exist in the registry. They do not have to be part
/// of the plan's projection.
pub fn compile_sort(
    registry: &ColumnRegistry,
    sorts: &[SortSpec],
) -> Result<Vec<OrderExpr>, CompileError> {
    sorts
        .iter()
        .map(|spec| Ok(OrderExpr::column(registry.resolve(&spec.field)?, spec.dir)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::expr::OrderTarget;

    fn registry() -> &'static ColumnRegistry {
        ColumnRegistry::transactions()
    }

    #[test]
    fn test_group_by_preserves_order() {
        let fields = vec!["year".to_string(), "inseeCode".to_string(), "month".to_string()];
        let columns = compile_group_by(registry(), &fields).unwrap();

        let names: Vec<&str> = columns.iter().map(|c| c.logical_name()).collect();
        assert_eq!(names, vec!["year", "inseeCode", "month"]);
    }

    #[test]
    fn test_group_by_unknown_field() {
        let fields = vec!["year".to_string(), "commune".to_string()];
        assert!(matches!(
            compile_group_by(registry(), &fields),
            Err(CompileError::UnknownColumn(name)) if name == "commune"
        ));
    }

    #[test]
    fn test_sort_defaults_to_desc() {
        let sorts: Vec<SortSpec> = serde_json::from_value(serde_json::json!([
            {"field": "price"},
            {"field": "date", "dir": "asc"}
        ]))
        .unwrap();
        let order = compile_sort(registry(), &sorts).unwrap();

        assert_eq!(order.len(), 2);
        assert_eq!(order[0].direction, SortDirection::Desc);
        assert!(matches!(order[0].target, OrderTarget::Column(c) if c.logical_name() == "price"));
        assert_eq!(order[1].direction, SortDirection::Asc);
    }

    #[test]
    fn test_sort_unknown_field() {
        let sorts = vec![SortSpec::new("avg_price", SortDirection::Desc)];
        assert!(matches!(
            compile_sort(registry(), &sorts),
            Err(CompileError::UnknownColumn(_))
        ));
    }
}
