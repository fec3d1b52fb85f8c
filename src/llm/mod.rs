//! LLM 모듈 - Ollama 채팅 API를 통한 답변 생성
//!
//! 단발 생성(`generate`)과 토큰 스트리밍(`stream`) 두 가지 방식을 제공합니다.
//! 스트리밍 응답은 NDJSON(줄 단위 JSON)으로 도착합니다.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{Device, Settings};

/// 생성 텍스트 조각 스트림 (순서 보장, 재시작 불가)
pub type TextStream = BoxStream<'static, Result<String>>;

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 단발 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 스트리밍 생성
    ///
    /// 호출할 때마다 새 생성을 시작합니다. 스트림을 drop하면 백엔드 응답 수신도 중단됩니다.
    async fn stream(&self, prompt: &str) -> Result<TextStream>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Chat
// ============================================================================

/// 초기화 확인용 메시지
const SMOKE_TEST_PROMPT: &str = "안녕하세요";

/// Ollama `/api/chat` 기반 채팅 모델
///
/// ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion
#[derive(Debug, Clone)]
pub struct OllamaChat {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    temperature: f32,
    device: Device,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_gpu: Option<u32>,
}

/// 응답 (단발 응답 또는 스트리밍의 한 줄)
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<AssistantMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: String,
}

impl OllamaChat {
    /// 네트워크 호출 없이 인스턴스 생성
    pub fn new(
        base_url: &Url,
        model: impl Into<String>,
        temperature: f32,
        device: Device,
    ) -> Result<Self> {
        let endpoint = base_url.join("api/chat").context("Invalid Ollama base URL")?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            model: model.into(),
            temperature,
            device,
        })
    }

    /// 설정으로 생성하고 테스트 메시지로 연결 확인
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let llm = Self::new(
            &settings.ollama_base_url,
            settings.ollama_model.clone(),
            settings.temperature,
            settings.device,
        )?;

        tracing::info!("Initializing Ollama model: {}", llm.model);
        let start = Instant::now();

        let response = llm
            .generate(SMOKE_TEST_PROMPT)
            .await
            .context("LLM smoke test failed")?;

        tracing::info!("Smoke test response: {}", preview(&response, 100));
        tracing::info!(
            "Ollama model ready ({:.2}s)",
            start.elapsed().as_secs_f64()
        );
        Ok(llm)
    }

    fn request<'a>(&'a self, prompt: &'a str, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream,
            options: ChatOptions {
                temperature: self.temperature,
                num_gpu: match self.device {
                    Device::Cpu => Some(0),
                    Device::Cuda | Device::Mps => None,
                },
            },
        }
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&self.request(prompt, stream))
            .send()
            .await
            .context("Failed to call Ollama chat API")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("Ollama returned {}: {}", status, text);
        }
        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.send(prompt, false).await?;
        let chunk: ChatChunk = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        if let Some(error) = chunk.error {
            anyhow::bail!("Ollama error: {}", error);
        }
        Ok(chunk.message.map(|m| m.content).unwrap_or_default())
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let response = self.send(prompt, true).await?;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut decoder = NdjsonDecoder::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.context("Ollama stream interrupted")?;
                for line in decoder.push(&chunk) {
                    if let Some(text) = line? {
                        yield text;
                    }
                }
            }

            if let Some(text) = decoder.finish()? {
                yield text;
            }
        };

        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// NDJSON Decoder
// ============================================================================

/// 바이트 조각을 줄 단위 응답으로 복원
///
/// 줄 하나가 여러 네트워크 조각에 걸쳐 도착할 수 있습니다.
#[derive(Debug, Default)]
struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    /// 조각 추가, 완성된 줄마다 텍스트(빈 조각은 None) 반환
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<Option<String>>> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(parse_line(&line));
        }
        lines
    }

    /// 스트림 종료 시 남은 줄 처리
    fn finish(&mut self) -> Result<Option<String>> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Result<Option<String>> {
    let line = std::str::from_utf8(line).context("Invalid UTF-8 in Ollama stream")?;
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: ChatChunk = serde_json::from_str(line).context("Failed to parse stream line")?;
    if let Some(error) = chunk.error {
        anyhow::bail!("Ollama error: {}", error);
    }
    if chunk.done && chunk.message.as_ref().map_or(true, |m| m.content.is_empty()) {
        return Ok(None);
    }

    Ok(chunk
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty()))
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let url = Url::parse("http://localhost:11434/").unwrap();
        let llm = OllamaChat::new(&url, "qwen3:14b", 0.1, Device::Cpu).unwrap();
        assert_eq!(llm.endpoint.as_str(), "http://localhost:11434/api/chat");

        let json = serde_json::to_value(llm.request("질문", true)).unwrap();
        assert_eq!(json["model"], "qwen3:14b");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "질문");
        assert_eq!(json["options"]["num_gpu"], 0);

        let gpu = OllamaChat::new(&url, "qwen3:14b", 0.1, Device::Cuda).unwrap();
        let json = serde_json::to_value(gpu.request("질문", false)).unwrap();
        assert!(json["options"].get("num_gpu").is_none());
    }

    #[test]
    fn test_ndjson_line_split_across_chunks() {
        let mut decoder = NdjsonDecoder::default();

        let first = decoder.push(r#"{"message":{"role":"assistant","content":"안녕"},"done":false}"#.as_bytes());
        assert!(first.is_empty());

        let second = decoder.push(b"\n{\"message\":{\"content\":\"\xED\x95\x98");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].as_ref().unwrap().as_deref(), Some("안녕"));

        // 멀티바이트 문자가 조각 경계에서 잘려도 줄 단위로 복원됨
        let third = decoder.push(b"\xEC\x84\xB8\xEC\x9A\x94\"},\"done\":false}\n");
        assert_eq!(third[0].as_ref().unwrap().as_deref(), Some("하세요"));

        let last = decoder.push(b"{\"message\":{\"content\":\"\"},\"done\":true}");
        assert!(last.is_empty());
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn test_ndjson_error_line() {
        let mut decoder = NdjsonDecoder::default();
        let lines = decoder.push(b"{\"error\":\"model not found\"}\n");
        let err = lines.into_iter().next().unwrap().unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails() {
        let url = Url::parse("http://127.0.0.1:9").unwrap();
        let llm = OllamaChat::new(&url, "qwen3:14b", 0.1, Device::Cpu).unwrap();

        assert!(llm.generate("안녕하세요").await.is_err());
        assert!(llm.stream("안녕하세요").await.is_err());
    }
}
