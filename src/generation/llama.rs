//! Client for an OpenAI-compatible chat endpoint (llama.cpp `llama-server`)

use std::io::{BufRead, BufReader};
use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompt::{build_messages, ChatMessage};
use super::Generator;
use crate::config::GeneratorSection;
use crate::error::{RagError, Result};
use crate::passage::RankedResultSet;

/// Local LLM served over HTTP
pub struct LlamaServerGenerator {
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    refusal: String,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<MessageContent>,
    #[serde(default)]
    delta: Option<MessageContent>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
}

/// One line of a server-sent-event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Text fragment from `choices[0].delta.content`
    Delta(String),
    /// `data: [DONE]`
    Done,
    /// Blank lines, comments, role-only chunks
    Skip,
}

/// Parse a single SSE line from a streaming chat completion
pub fn parse_sse_line(line: &str) -> Result<SseEvent> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }
    if data.is_empty() {
        return Ok(SseEvent::Skip);
    }

    let chunk: ChatCompletion = serde_json::from_str(data)?;
    let fragment = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .filter(|text| !text.is_empty());

    Ok(fragment.map(SseEvent::Delta).unwrap_or(SseEvent::Skip))
}

impl LlamaServerGenerator {
    pub fn new(config: &GeneratorSection) -> Result<Self> {
        let base_url = if config.endpoint.starts_with("http://")
            || config.endpoint.starts_with("https://")
        {
            config.endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", config.endpoint.trim_end_matches('/'))
        };

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            refusal: config.refusal.clone(),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn send(&self, query: &str, passages: &RankedResultSet, stream: bool) -> Result<Response> {
        let messages = build_messages(query, passages, &self.refusal);
        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(url = %url, passages = passages.len(), stream, "sending chat completion");
        let response = self.http.post(&url).json(&request).send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(RagError::Generation(format!(
                "LLM server returned {}: {}",
                status, body
            )));
        }
        Ok(response)
    }
}

impl Generator for LlamaServerGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    fn generate(&self, query: &str, passages: &RankedResultSet) -> Result<String> {
        let completion: ChatCompletion = self.send(query, passages, false)?.json()?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| RagError::Generation("response has no message content".to_string()))
    }

    fn generate_stream(
        &self,
        query: &str,
        passages: &RankedResultSet,
        sink: &mut dyn FnMut(&str),
    ) -> Result<String> {
        let response = self.send(query, passages, true)?;
        let mut answer = String::new();

        for line in BufReader::new(response).lines() {
            match parse_sse_line(&line?)? {
                SseEvent::Delta(fragment) => {
                    sink(&fragment);
                    answer.push_str(&fragment);
                }
                SseEvent::Done => break,
                SseEvent::Skip => {}
            }
        }
        Ok(answer)
    }
}
