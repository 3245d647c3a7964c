use crate::error::OracleError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub force_json_output: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_owned(),
            temperature: 0.0,
            max_output_tokens: 4096,
            force_json_output: true,
        }
    }
}

/// Anything that can turn a prompt into raw completion text.
///
/// This is the only network boundary of the tool. Implementations must not
/// retry on their own: every call to `complete` is one outbound request.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, OracleError>;
}

/// OpenAI-compatible chat completions endpoint (OpenRouter by default).
pub struct OpenRouterOracle {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenRouterOracle {
    pub fn new(api_key: String, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

pub fn build_request_body(
    system_instruction: &str,
    user_prompt: &str,
    options: &CompletionOptions,
) -> Value {
    let mut body = json!({
        "model": options.model,
        "messages": [
            { "role": "system", "content": system_instruction },
            { "role": "user", "content": user_prompt }
        ],
        "temperature": options.temperature,
        "max_tokens": options.max_output_tokens,
    });

    if options.force_json_output {
        body["response_format"] = json!({ "type": "json_object" });
    }

    body
}

/// Pulls the assistant message text out of a chat completions response.
pub fn extract_content(response: &Value) -> Result<String, OracleError> {
    if let Some(message) = response["error"]["message"].as_str() {
        return Err(OracleError::MalformedResponse(format!(
            "provider reported an error: {message}"
        )));
    }

    response["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| {
            OracleError::MalformedResponse(
                "no choices[0].message.content in completion".to_owned(),
            )
        })
}

#[async_trait]
impl Oracle for OpenRouterOracle {
    async fn complete(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, OracleError> {
        let request_body =
            build_request_body(system_instruction, user_prompt, options);

        debug!(model = %options.model, prompt_len = user_prompt.len(), "sending completion request");

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: response_text,
            });
        }

        let response_json: Value = serde_json::from_str(&response_text)
            .map_err(|e| {
                OracleError::MalformedResponse(format!(
                    "completion body is not JSON: {e}"
                ))
            })?;

        extract_content(&response_json)
    }
}
