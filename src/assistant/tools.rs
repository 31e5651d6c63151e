//! Function-tool definitions offered to the language model
//!
//! Every enum in the schemas is generated from the same closed vocabularies
//! the compilers accept, so a schema-valid tool call can only name columns,
//! operators and metrics that exist.

use serde_json::{json, Value as JsonValue};

use super::AssistantError;
use crate::query::{
    ColumnRegistry, ComputationRequest, FilterOperator, Metric, PlanRequest,
};

pub const QUERY_TOOL: &str = "query_transactions";
pub const AGGREGATE_TOOL: &str = "aggregate_transactions";
pub const COMPUTE_TOOL: &str = "compute_transactions";

pub const TOOL_NAMES: [&str; 3] = [QUERY_TOOL, AGGREGATE_TOOL, COMPUTE_TOOL];

/// OpenAI-style `tools` array for the three plan kinds
pub fn tool_definitions(registry: &ColumnRegistry) -> Vec<JsonValue> {
    let fields = registry.logical_names();
    let numeric: Vec<&str> = registry
        .columns()
        .filter(|c| c.value_type().is_numeric())
        .map(|c| c.logical_name())
        .collect();

    let filters = json!({
        "type": "array",
        "items": filter_schema(&fields),
    });
    let pagination = |max: u32| {
        json!({ "type": "integer", "minimum": 1, "maximum": max })
    };

    vec![
        function(
            QUERY_TOOL,
            "List individual property sales, optionally filtered and sorted.",
            json!({
                "type": "object",
                "properties": {
                    "select": { "type": "array", "items": { "type": "string", "enum": fields } },
                    "filters": filters,
                    "sort": { "type": "array", "items": sort_schema(Some(&fields)) },
                    "limit": pagination(crate::query::plan::MAX_LIMIT),
                    "offset": { "type": "integer", "minimum": 0 },
                },
                "additionalProperties": false,
            }),
        ),
        function(
            AGGREGATE_TOOL,
            "Count, sum, average, min or max sales, grouped by columns.",
            json!({
                "type": "object",
                "properties": {
                    "groupBy": { "type": "array", "items": { "type": "string", "enum": fields } },
                    "metrics": { "type": "array", "items": metric_schema(&fields) },
                    "filters": filters,
                    "sort": { "type": "array", "items": sort_schema(None) },
                    "limit": pagination(crate::query::plan::MAX_LIMIT),
                },
                "additionalProperties": false,
            }),
        ),
        function(
            COMPUTE_TOOL,
            "Derived statistics: area-weighted price per m2 and price percentiles.",
            json!({
                "type": "object",
                "properties": {
                    "computations": {
                        "type": "array",
                        "minItems": 1,
                        "items": computation_schema(&numeric),
                    },
                    "groupBy": { "type": "array", "items": { "type": "string", "enum": fields } },
                    "filters": filters,
                    "sort": { "type": "array", "items": sort_schema(None) },
                    "limit": pagination(crate::query::plan::MAX_LIMIT),
                },
                "required": ["computations"],
                "additionalProperties": false,
            }),
        ),
    ]
}

fn function(name: &str, description: &str, parameters: JsonValue) -> JsonValue {
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": parameters,
        }
    })
}

fn filter_schema(fields: &[&str]) -> JsonValue {
    let operators: Vec<&str> = FilterOperator::ALL.iter().map(|op| op.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "field": { "type": "string", "enum": fields },
            "operator": { "type": "string", "enum": operators },
            "value": {
                "description": "Scalar, [low, high] for between, list for in, omitted for is_null"
            },
        },
        "required": ["field", "operator"],
        "additionalProperties": false,
    })
}

/// Grouped plans also sort by metric aliases, so their field stays free text
fn sort_schema(fields: Option<&[&str]>) -> JsonValue {
    let field = match fields {
        Some(fields) => json!({ "type": "string", "enum": fields }),
        None => json!({
            "type": "string",
            "description": "A group-by column or a metric alias such as count or avg_price",
        }),
    };
    json!({
        "type": "object",
        "properties": {
            "field": field,
            "dir": { "type": "string", "enum": ["asc", "desc"] },
        },
        "required": ["field"],
        "additionalProperties": false,
    })
}

fn metric_schema(fields: &[&str]) -> JsonValue {
    let metrics: Vec<&str> = Metric::ALL.iter().map(|m| m.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "metric": { "type": "string", "enum": metrics },
            "field": { "type": "string", "enum": fields },
        },
        "required": ["metric"],
        "additionalProperties": false,
    })
}

fn computation_schema(numeric: &[&str]) -> JsonValue {
    let [ratio, percentile] = ComputationRequest::NAMES;
    json!({
        "oneOf": [
            {
                "type": "object",
                "properties": { "name": { "const": ratio } },
                "required": ["name"],
                "additionalProperties": false,
            },
            {
                "type": "object",
                "properties": {
                    "name": { "const": percentile },
                    "field": { "type": "string", "enum": numeric },
                    "percentileValue": { "type": "number", "minimum": 0, "maximum": 100 },
                },
                "required": ["name", "field", "percentileValue"],
                "additionalProperties": false,
            },
        ]
    })
}

impl PlanRequest {
    /// Decode a model tool call into the matching request
    pub fn from_tool_call(name: &str, arguments: &str) -> Result<Self, AssistantError> {
        let arguments = if arguments.trim().is_empty() { "{}" } else { arguments };
        let invalid = |e: serde_json::Error| {
            AssistantError::InvalidToolCall(format!("{}: {}", name, e))
        };

        match name {
            QUERY_TOOL => serde_json::from_str(arguments).map(PlanRequest::Query).map_err(invalid),
            AGGREGATE_TOOL => serde_json::from_str(arguments)
                .map(PlanRequest::Aggregation)
                .map_err(invalid),
            COMPUTE_TOOL => serde_json::from_str(arguments)
                .map(PlanRequest::Computation)
                .map_err(invalid),
            other => Err(AssistantError::InvalidToolCall(format!("unknown tool '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::metrics::MetricRequest;
    use crate::query::{AggregationArgs, ComputationArgs, QueryArgs};

    fn enum_of<'a>(schema: &'a JsonValue, pointer: &str) -> Vec<&'a str> {
        schema
            .pointer(pointer)
            .and_then(|v| v.as_array())
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_tool_names_and_order() {
        let tools = tool_definitions(ColumnRegistry::transactions());
        let names: Vec<&str> = tools
            .iter()
            .map(|t| t["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, TOOL_NAMES);
    }

    #[test]
    fn test_enums_follow_vocabularies() {
        let registry = ColumnRegistry::transactions();
        let tools = tool_definitions(registry);

        let query = &tools[0]["function"]["parameters"];
        assert_eq!(enum_of(query, "/properties/select/items/enum"), registry.logical_names());
        assert_eq!(
            enum_of(query, "/properties/filters/items/properties/operator/enum"),
            vec!["=", "!=", ">", ">=", "<", "<=", "between", "in", "ilike", "is_null"]
        );

        let aggregate = &tools[1]["function"]["parameters"];
        assert_eq!(
            enum_of(aggregate, "/properties/metrics/items/properties/metric/enum"),
            vec!["count", "sum", "avg", "min", "max"]
        );

        let compute = &tools[2]["function"]["parameters"];
        let fields = enum_of(compute, "/properties/computations/items/oneOf/1/properties/field/enum");
        assert!(fields.contains(&"price"));
        assert!(!fields.contains(&"inseeCode"));
    }

    #[test]
    fn test_from_tool_call_decodes_each_kind() {
        let request = PlanRequest::from_tool_call(QUERY_TOOL, r#"{"select":["price"],"limit":5}"#).unwrap();
        assert_eq!(
            request,
            PlanRequest::Query(QueryArgs {
                select: vec!["price".into()],
                limit: Some(5),
                ..Default::default()
            })
        );

        let request = PlanRequest::from_tool_call(
            AGGREGATE_TOOL,
            r#"{"groupBy":["inseeCode"],"metrics":[{"metric":"count"}]}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            PlanRequest::Aggregation(AggregationArgs {
                group_by: vec!["inseeCode".into()],
                metrics: vec![MetricRequest::count()],
                ..Default::default()
            })
        );

        let request = PlanRequest::from_tool_call(
            COMPUTE_TOOL,
            r#"{"computations":[{"name":"percentile","field":"price","percentileValue":90}]}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            PlanRequest::Computation(ComputationArgs {
                computations: vec![ComputationRequest::percentile("price", 90.0)],
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_from_tool_call_empty_arguments() {
        let request = PlanRequest::from_tool_call(AGGREGATE_TOOL, "").unwrap();
        assert_eq!(request, PlanRequest::Aggregation(AggregationArgs::default()));
    }

    #[test]
    fn test_from_tool_call_rejects_unknown_input() {
        assert!(matches!(
            PlanRequest::from_tool_call("drop_table", "{}"),
            Err(AssistantError::InvalidToolCall(_))
        ));
        assert!(matches!(
            PlanRequest::from_tool_call(QUERY_TOOL, r#"{"sql":"DELETE FROM x"}"#),
            Err(AssistantError::InvalidToolCall(_))
        ));
        assert!(matches!(
            PlanRequest::from_tool_call(QUERY_TOOL, "not json"),
            Err(AssistantError::InvalidToolCall(_))
        ));
    }
}
