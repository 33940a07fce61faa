//! Concrete [`Generator`] backed by an OpenAI-compatible chat-completions
//! endpoint, the same `reqwest`-based idiom used by [`crate::gitea`] for the
//! forge client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use yaver_core::interfaces::Generator;

pub struct HttpGenerator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpGenerator {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        HttpGenerator {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    async fn complete(&self, system_prompt: &str, user_content: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system_prompt.to_string() },
                ChatMessage { role: "user".to_string(), content: user_content.to_string() },
            ],
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response: ChatResponse = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("generator returned no choices"))
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt_template: &str, variables: &Value) -> anyhow::Result<String> {
        self.complete(prompt_template, &variables.to_string()).await
    }

    async fn generate_structured(&self, prompt_template: &str, variables: &Value) -> anyhow::Result<Value> {
        let system = format!("{prompt_template}\n\nRespond with a single JSON object and nothing else.");
        let raw = self.complete(&system, &variables.to_string()).await?;
        Ok(serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
    }

    async fn fix_code(&self, code: &str, error: &str) -> anyhow::Result<String> {
        let system = "You are a code-repair assistant. Respond with exactly one fenced code block containing the corrected file body.";
        let user = format!("Code:\n```\n{code}\n```\n\nError:\n{error}");
        self.complete(system, &user).await
    }
}
