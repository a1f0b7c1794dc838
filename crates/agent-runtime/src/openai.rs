//! OpenAI LLM Provider
//!
//! Implementation of `LlmProvider` for the OpenAI chat-completions API and
//! compatible endpoints.

use std::time::Duration;

use agent_core::{
    credential::Credential,
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, TokenUsage, DEFAULT_MODEL},
    reasoning::AgentConfig,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API key
    pub api_key: Credential,

    /// API base URL, without trailing slash
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(api_key: Credential) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            timeout_secs: 120,
        }
    }

    /// Read `OPENAI_BASE_URL` and `OPENAI_TIMEOUT_SECS`
    pub fn from_env(api_key: Credential) -> Result<Self> {
        let mut config = Self::new(api_key);

        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            if !base_url.trim().is_empty() {
                config.base_url = base_url.trim().trim_end_matches('/').to_string();
            }
        }

        if let Ok(raw) = std::env::var("OPENAI_TIMEOUT_SECS") {
            config.timeout_secs = raw
                .trim()
                .parse()
                .map_err(|_| AgentError::Config(format!("OPENAI_TIMEOUT_SECS must be a number of seconds, got '{raw}'")))?;
        }

        Ok(config)
    }
}

/// Generation options from `OPENAI_MODEL` and `OPENAI_TEMPERATURE`
pub fn generation_from_env() -> Result<GenerationOptions> {
    let mut options = GenerationOptions::default();

    if let Ok(model) = std::env::var("OPENAI_MODEL") {
        if !model.trim().is_empty() {
            options.model = model.trim().to_string();
        }
    }

    if let Ok(raw) = std::env::var("OPENAI_TEMPERATURE") {
        options.temperature = raw
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|t| (0.0..=2.0).contains(t))
            .ok_or_else(|| AgentError::Config(format!("OPENAI_TEMPERATURE must be between 0 and 2, got '{raw}'")))?;
    }

    Ok(options)
}

/// Agent configuration with generation options taken from the environment
pub fn agent_config_from_env() -> Result<AgentConfig> {
    Ok(AgentConfig {
        generation: generation_from_env()?,
        ..AgentConfig::from_env()?
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// OpenAI LLM provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Config(format!("could not build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create against the public API with default settings
    pub fn new(api_key: Credential) -> Result<Self> {
        Self::from_config(OpenAiConfig::new(api_key))
    }

    pub const fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// Convert agent messages to the wire format
    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage<'_>> {
        messages
            .iter()
            .map(|m| ChatMessage {
                role: match m.role {
                    Role::System => "system",
                    // Observations are plain context for the model
                    Role::User | Role::Tool => "user",
                    Role::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect()
    }

    fn build_request<'a>(messages: &'a [Message], options: &'a GenerationOptions) -> ChatRequest<'a> {
        ChatRequest {
            model: if options.model.is_empty() { DEFAULT_MODEL } else { &options.model },
            messages: Self::convert_messages(messages),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
            stop: (!options.stop_sequences.is_empty()).then_some(options.stop_sequences.as_slice()),
        }
    }

    /// Convert the API response to an agent completion
    fn convert_completion(response: ChatResponse, requested_model: &str) -> Result<Completion> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("no choices in response".into()))?;

        let content = choice.message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(AgentError::Provider("empty response from API".into()));
        }

        Ok(Completion {
            content,
            model: response.model.unwrap_or_else(|| requested_model.to_string()),
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_api),
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }
}

/// Map a failed HTTP status to the agent error taxonomy
fn status_error(status: StatusCode, body: &str) -> AgentError {
    let detail = api_error_message(body).unwrap_or_else(|| body.chars().take(200).collect());
    let message = format!("{status}: {detail}");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(message),
        s if s.is_server_error() => AgentError::ProviderUnavailable(message),
        _ => AgentError::Provider(message),
    }
}

/// Pull `error.message` out of an OpenAI error body
fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(ToString::to_string)
}

fn transport_error(e: &reqwest::Error) -> AgentError {
    if e.is_connect() || e.is_timeout() {
        AgentError::ProviderUnavailable(e.to_string())
    } else {
        AgentError::Provider(e.to_string())
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .bearer_auth(self.config.api_key.expose())
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => Ok(true),
            Ok(r) => {
                tracing::debug!(status = %r.status(), "OpenAI health check rejected");
                Ok(false)
            }
            Err(e) => {
                tracing::debug!("OpenAI health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        let request = Self::build_request(messages, options);

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(self.config.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| transport_error(&e))?;
        let completion = Self::convert_completion(parsed, request.model)?;

        if let Some(usage) = &completion.usage {
            tracing::debug!(
                model = %completion.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "OpenAI completion"
            );
        }

        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::credential::load_credential_with;

    fn credential() -> Credential {
        load_credential_with("OPENAI_API_KEY", |_| Some("sk-test".into())).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = OpenAiConfig::new(credential());
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn request_maps_roles_and_options() {
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("What is 17 * 4?"),
            Message::assistant("```tool\n{}\n```"),
            Message::tool("[Tool 'Calculator' returned]\nAnswer: 68", None),
        ];
        let options = GenerationOptions::default().with_stop("...calculator output...");

        let request = OpenAiProvider::build_request(&messages, &options);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-3.5-turbo");
        let roles: Vec<_> = json["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(json["stop"][0], "...calculator output...");
        assert_eq!(json["max_tokens"], 1024);
    }

    #[test]
    fn empty_stop_list_is_omitted() {
        let messages = vec![Message::user("hi")];
        let options = GenerationOptions::default();
        let json = serde_json::to_value(OpenAiProvider::build_request(&messages, &options)).unwrap();
        assert!(json.get("stop").is_none());
    }

    #[test]
    fn response_is_converted() {
        let body = r#"{
            "id": "chatcmpl-1",
            "model": "gpt-3.5-turbo-0125",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "68"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13}
        }"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        let completion = OpenAiProvider::convert_completion(response, "gpt-3.5-turbo").unwrap();

        assert_eq!(completion.content, "68");
        assert_eq!(completion.model, "gpt-3.5-turbo-0125");
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
        assert_eq!(completion.usage.unwrap().total_tokens, 13);
    }

    #[test]
    fn empty_or_missing_choices_are_errors() {
        let none: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            OpenAiProvider::convert_completion(none, "m"),
            Err(AgentError::Provider(_))
        ));

        let blank: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(OpenAiProvider::convert_completion(blank, "m").is_err());
    }

    #[test]
    fn statuses_map_to_error_kinds() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        let auth = status_error(StatusCode::UNAUTHORIZED, body);
        assert!(matches!(auth, AgentError::Auth(ref m) if m.contains("Incorrect API key provided")));

        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            AgentError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "<html>"),
            AgentError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "nope"),
            AgentError::Provider(ref m) if m.ends_with("nope")
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let config = OpenAiConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 5,
            ..OpenAiConfig::new(credential())
        };
        let provider = OpenAiProvider::from_config(config).unwrap();

        let err = provider
            .complete(&[Message::user("hi")], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ProviderUnavailable(_)));
        assert!(!provider.health_check().await.unwrap());
    }
}
