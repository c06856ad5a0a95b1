//! OpenAI-compatible `/chat/completions` client.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::ReplyGenerator;
use crate::config::LlmConfig;
use crate::models::history::{HistoryTurn, TurnRole};
use crate::{AppError, Result};

/// Chat-completions client.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    system_prompt: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    /// Build a client from the `[llm]` section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn request_body(&self, prompt: &str, history: &[HistoryTurn], images: &[String]) -> Value {
        build_messages(&self.model, &self.system_prompt, prompt, history, images)
    }

    async fn complete(
        &self,
        prompt: &str,
        history: &[HistoryTurn],
        images: &[String],
    ) -> Result<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(prompt, history, images));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let res = request
            .send()
            .await
            .map_err(|err| AppError::Generation(err.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(AppError::Generation(format!("completion failed: {status} {text}")));
        }
        let body: CompletionResponse = res
            .json()
            .await
            .map_err(|err| AppError::Generation(format!("invalid completion body: {err}")))?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        debug!(chars = reply.len(), "completion received");
        Ok(reply.trim().to_owned())
    }
}

impl ReplyGenerator for OpenAiGenerator {
    fn generate_reply<'a>(
        &'a self,
        prompt: &'a str,
        history: &'a [HistoryTurn],
        images: &'a [String],
    ) -> BoxFuture<'a, Result<String>> {
        self.complete(prompt, history, images).boxed()
    }
}

/// Assemble a chat-completions request body.
///
/// Images ride along with the current prompt as `image_url` content parts.
#[must_use]
pub fn build_messages(
    model: &str,
    system_prompt: &str,
    prompt: &str,
    history: &[HistoryTurn],
    images: &[String],
) -> Value {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(json!({ "role": "system", "content": system_prompt }));
    for turn in history {
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        };
        messages.push(json!({ "role": role, "content": turn.text }));
    }

    let content = if images.is_empty() {
        Value::String(prompt.to_owned())
    } else {
        let mut parts = Vec::with_capacity(images.len() + 1);
        if !prompt.is_empty() {
            parts.push(json!({ "type": "text", "text": prompt }));
        }
        parts.extend(
            images
                .iter()
                .map(|url| json!({ "type": "image_url", "image_url": { "url": url } })),
        );
        Value::Array(parts)
    };
    messages.push(json!({ "role": "user", "content": content }));

    json!({ "model": model, "messages": messages })
}
