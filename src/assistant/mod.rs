//! Natural-language front end
//!
//! A prompt is sent to the model together with the three plan tools. The
//! returned tool call is decoded into a [`PlanRequest`] and goes through the
//! same compilers as any HTTP request, so the model never writes SQL.

pub mod client;
pub mod config;
pub mod tools;

pub use client::{ChatClient, ToolCall};
pub use config::LlmConfig;
pub use tools::{tool_definitions, AGGREGATE_TOOL, COMPUTE_TOOL, QUERY_TOOL};

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::executor::{PlanExecutor, QueryOutput};
use crate::query::{ColumnRegistry, PlanRequest, QueryError};

#[derive(Debug, Serialize)]
pub struct AssistantReply {
    pub tool: String,
    pub arguments: JsonValue,
    pub output: QueryOutput,
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Empty prompt")]
    EmptyPrompt,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Invalid tool call: {0}")]
    InvalidToolCall(String),

    #[error(transparent)]
    Query(#[from] QueryError),
}

pub struct Assistant {
    client: ChatClient,
    registry: &'static ColumnRegistry,
    tools: Vec<JsonValue>,
    system_prompt: String,
}

impl Assistant {
    pub fn new(client: ChatClient, registry: &'static ColumnRegistry) -> Self {
        Self {
            client,
            registry,
            tools: tool_definitions(registry),
            system_prompt: system_prompt(registry),
        }
    }

    pub fn from_config(config: LlmConfig) -> Result<Self, AssistantError> {
        Ok(Self::new(ChatClient::new(config)?, ColumnRegistry::transactions()))
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Translate the prompt into one plan and run it
    pub async fn answer(
        &self,
        prompt: &str,
        executor: &dyn PlanExecutor,
    ) -> Result<AssistantReply, AssistantError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AssistantError::EmptyPrompt);
        }

        let call = self.client.tool_call(&self.system_prompt, prompt, &self.tools).await?;
        tracing::info!(tool = %call.name, model = %self.model(), "Model selected tool");

        let request = PlanRequest::from_tool_call(&call.name, &call.arguments)?;
        let output = request.run(executor, self.registry).await?;

        Ok(AssistantReply {
            arguments: serde_json::from_str(&call.arguments).unwrap_or(JsonValue::Null),
            tool: call.name,
            output,
        })
    }
}

fn system_prompt(registry: &ColumnRegistry) -> String {
    let columns: Vec<String> = registry
        .columns()
        .map(|c| format!("{} ({})", c.logical_name(), c.value_type().name()))
        .collect();

    format!(
        "You answer questions about French property sales (DVF). \
         Always call exactly one of the provided tools. \
         Available columns: {}. \
         Prices are in euros, areas in square meters, dates are YYYY-MM-DD. \
         Use aggregate_transactions for counts and totals, compute_transactions for \
         price per m2 and percentiles, query_transactions to list individual sales.",
        columns.join(", ")
    )
}
