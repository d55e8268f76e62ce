use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use super::ChatBackend;
use crate::config::{BackendKind, ResolvedBackend};

pub struct HttpChatBackend {
    backend: ResolvedBackend,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl HttpChatBackend {
    pub fn new(backend: ResolvedBackend, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(backend.timeout_secs.max(1)))
            .build()
            .context("build http client")?;
        Ok(Self {
            backend,
            api_key,
            client,
        })
    }

    fn complete_openai(&self, prompt: &str) -> anyhow::Result<String> {
        let body = ChatRequest {
            model: &self.backend.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.backend.temperature,
            max_tokens: self.backend.max_tokens,
        };
        let resp: ChatResponse = self
            .client
            .post(&self.backend.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("POST {}", self.backend.url))?
            .json()
            .context("decode chat response")?;
        resp.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("chat response has no choices"))
    }

    fn complete_gemini(&self, prompt: &str) -> anyhow::Result<String> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.backend.temperature,
                max_output_tokens: self.backend.max_tokens,
            },
        };
        let resp: GeminiResponse = self
            .client
            .post(&self.backend.url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("POST {}", self.backend.url))?
            .json()
            .context("decode gemini response")?;
        resp.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow!("gemini response has no candidates"))
    }
}

impl ChatBackend for HttpChatBackend {
    fn name(&self) -> &str {
        &self.backend.name
    }

    fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        match self.backend.kind {
            BackendKind::OpenaiChat => self.complete_openai(prompt),
            BackendKind::Gemini => self.complete_gemini(prompt),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Default)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize, Default)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiReplyContent,
}

#[derive(Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Deserialize)]
struct GeminiReplyPart {
    #[serde(default)]
    text: String,
}
