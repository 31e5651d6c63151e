use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Language model endpoint configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Read the assistant settings, `None` when `DVF_LLM_BASE_URL` is unset.
    /// DVF_LLM_BASE_URL=https://api.openai.com/v1
    /// DVF_LLM_API_KEY=sk-...
    /// DVF_LLM_MODEL=gpt-4o-mini
    /// DVF_LLM_TIMEOUT_SECS=30
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("DVF_LLM_BASE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())?;
        let mut config = Self::new(base_url);

        config.api_key = std::env::var("DVF_LLM_API_KEY").ok().filter(|k| !k.is_empty());
        if let Ok(model) = std::env::var("DVF_LLM_MODEL") {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        if let Some(secs) = std::env::var("DVF_LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }

        Some(config)
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LlmConfig::new("http://localhost:11434/v1");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_completions_url_trims_slash() {
        assert_eq!(
            LlmConfig::new("http://llm.local/v1/").completions_url(),
            "http://llm.local/v1/chat/completions"
        );
        assert_eq!(
            LlmConfig::new("http://llm.local/v1").completions_url(),
            "http://llm.local/v1/chat/completions"
        );
    }
}
