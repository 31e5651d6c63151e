use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::assistant::{tool_definitions, Assistant, AssistantError, AssistantReply};
use crate::executor::{PlanExecutor, QueryOutput};
use crate::query::{
    run_aggregation_plan, run_computation_plan, run_query_plan, AggregationArgs, ColumnRegistry,
    ComputationArgs, QueryArgs, QueryError,
};

/// Application state shared across handlers
pub struct AppState {
    pub executor: Arc<dyn PlanExecutor>,
    pub registry: &'static ColumnRegistry,
    pub assistant: Option<Assistant>,
}

impl AppState {
    pub fn new(executor: Arc<dyn PlanExecutor>) -> Self {
        Self {
            executor,
            registry: ColumnRegistry::transactions(),
            assistant: None,
        }
    }

    pub fn with_assistant(mut self, assistant: Assistant) -> Self {
        self.assistant = Some(assistant);
        self
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub assistant: bool,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        assistant: state.assistant.is_some(),
    })
}

// ============================================================================
// Catalogue
// ============================================================================

#[derive(Serialize)]
pub struct ColumnInfo {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub value_type: &'static str,
}

#[derive(Serialize)]
pub struct ColumnsResponse {
    pub table: &'static str,
    pub columns: Vec<ColumnInfo>,
}

pub async fn list_columns(State(state): State<Arc<AppState>>) -> Json<ColumnsResponse> {
    let columns = state
        .registry
        .columns()
        .map(|c| ColumnInfo {
            name: c.logical_name(),
            value_type: c.value_type().name(),
        })
        .collect();

    Json(ColumnsResponse {
        table: state.registry.table(),
        columns,
    })
}

pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Vec<serde_json::Value>> {
    Json(tool_definitions(state.registry))
}

// ============================================================================
// Plans
// ============================================================================

pub async fn query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryArgs>, JsonRejection>,
) -> Result<Json<QueryOutput>, ApiError> {
    let Json(args) = payload?;
    let output = run_query_plan(state.executor.as_ref(), state.registry, &args).await?;
    Ok(Json(output))
}

pub async fn aggregate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AggregationArgs>, JsonRejection>,
) -> Result<Json<QueryOutput>, ApiError> {
    let Json(args) = payload?;
    let output = run_aggregation_plan(state.executor.as_ref(), state.registry, &args).await?;
    Ok(Json(output))
}

pub async fn compute(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ComputationArgs>, JsonRejection>,
) -> Result<Json<QueryOutput>, ApiError> {
    let Json(args) = payload?;
    let output = run_computation_plan(state.executor.as_ref(), state.registry, &args).await?;
    Ok(Json(output))
}

// ============================================================================
// Assistant
// ============================================================================

#[derive(Deserialize)]
pub struct AssistantRequest {
    pub prompt: String,
}

pub async fn ask_assistant(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AssistantRequest>, JsonRejection>,
) -> Result<Json<AssistantReply>, ApiError> {
    let Some(assistant) = state.assistant.as_ref() else {
        return Err(ApiError::Unavailable("assistant is not configured".to_string()));
    };
    let Json(request) = payload?;

    let reply = assistant
        .answer(&request.prompt, state.executor.as_ref())
        .await?;
    Ok(Json(reply))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
    BadGateway(String),
    Unavailable(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Compile(e) => {
                tracing::warn!(error = %e, "Rejected plan");
                ApiError::BadRequest(e.to_string())
            }
            QueryError::Execute(e) => {
                tracing::error!(error = %e, "Plan execution failed");
                ApiError::Internal(e.to_string())
            }
        }
    }
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::Query(e) => e.into(),
            e @ AssistantError::EmptyPrompt => ApiError::BadRequest(e.to_string()),
            other => {
                tracing::warn!(error = %other, "Assistant call failed");
                ApiError::BadGateway(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
