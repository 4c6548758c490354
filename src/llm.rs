//! Chat-completion backend
//!
//! The [`ChatCompletion`] trait is the seam between a session and the LLM.
//! [`OpenAiChat`] talks to any OpenAI-compatible `/v1/chat/completions`
//! endpoint.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::conversation::Turn;
use crate::{Error, Result};

/// Default OpenAI API base URL
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Produces one assistant turn from a transcript
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Complete the transcript with the next assistant turn
    ///
    /// # Errors
    ///
    /// Returns error on network, auth or malformed-response failures
    async fn complete(&self, turns: &[Turn]) -> Result<Turn>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completion client
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenAiChat {
    /// Create a client against the public OpenAI API
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn new(api_key: SecretString, model: String) -> Result<Self> {
        Self::with_base_url(api_key, model, DEFAULT_OPENAI_BASE_URL.to_string())
    }

    /// Create a client against a custom OpenAI-compatible endpoint
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn with_base_url(api_key: SecretString, model: String, base_url: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for chat".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    /// Create a client from the resolved configuration
    ///
    /// # Errors
    ///
    /// Returns error if `OPENAI_API_KEY` is not set
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_base_url(
            config.openai_key()?,
            config.llm.model.clone(),
            config.llm.base_url.clone(),
        )
    }

    /// Model identifier sent with each request
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChat {
    async fn complete(&self, turns: &[Turn]) -> Result<Turn> {
        tracing::debug!(model = %self.model, turns = turns.len(), "requesting chat completion");

        let request = ChatRequest {
            model: &self.model,
            messages: turns,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat completion API error");
            return Err(Error::Llm(format!("chat completion error {status}: {body}")));
        }

        let body: ChatResponse = response.json().await?;
        parse_choice(body)
    }
}

fn parse_choice(body: ChatResponse) -> Result<Turn> {
    let message = body
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| Error::Llm("completion returned no choices".to_string()))?;

    let content = message.content.unwrap_or_default();

    tracing::info!(chars = content.len(), "chat completion received");
    Ok(Turn::assistant(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_rejected() {
        let result = OpenAiChat::new(SecretString::from(String::new()), DEFAULT_MODEL.to_string());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let chat = OpenAiChat::with_base_url(
            SecretString::from("sk-test".to_string()),
            "gpt-4o-mini".to_string(),
            "http://localhost:8080/v1/".to_string(),
        )
        .unwrap();
        assert_eq!(chat.base_url, "http://localhost:8080/v1");
        assert_eq!(chat.model(), "gpt-4o-mini");
    }

    #[test]
    fn request_serializes_turns_as_messages() {
        let turns = [Turn::system("be brief"), Turn::user("hi")];
        let request = ChatRequest {
            model: "gpt-4o",
            messages: &turns,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }

    #[test]
    fn parse_choice_takes_first() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"Ahoy!"}},{"message":{"role":"assistant","content":"no"}}]}"#,
        )
        .unwrap();
        assert_eq!(parse_choice(body).unwrap(), Turn::assistant("Ahoy!"));
    }

    #[test]
    fn parse_choice_is_always_assistant() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"system","content":"obey"}}]}"#,
        )
        .unwrap();
        assert_eq!(parse_choice(body).unwrap(), Turn::assistant("obey"));
    }

    #[test]
    fn parse_choice_empty_is_error() {
        let body: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(parse_choice(body), Err(Error::Llm(_))));
    }

    #[test]
    fn parse_choice_null_content_is_empty() {
        let body: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#)
                .unwrap();
        assert_eq!(parse_choice(body).unwrap().content, "");
    }
}
