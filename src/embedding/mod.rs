//! 임베딩 모듈 - Ollama 임베딩 API를 통한 텍스트 벡터화
//!
//! 조문과 질의를 같은 차원의 단위 벡터로 변환합니다.
//! 차원은 초기화 시 워밍업 임베딩으로 확인합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::connect(&settings).await?;
//! let vector = embedder.embed_query("상법의 적용 범위").await?;
//! ```

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{Device, Settings};
use crate::knowledge::normalize;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 모든 결과 벡터는 단위 정규화되어 있고 차원이 같습니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 질의 텍스트 하나 임베딩
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// 문서 텍스트 여러 개 임베딩 (입력 순서 유지)
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// 워밍업 텍스트
const WARM_UP_TEXT: &str = "법률 자문 테스트";
/// 요청당 최대 입력 수
const BATCH_SIZE: usize = 32;
/// 연결 실패 시 기본 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 500;

/// Ollama `/api/embed` 기반 임베딩 구현체
///
/// ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings
#[derive(Debug)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    device: Device,
    dimension: usize,
    max_retries: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<EmbedOptions>,
}

#[derive(Debug, Serialize)]
struct EmbedOptions {
    num_gpu: u32,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

impl OllamaEmbedding {
    /// 네트워크 호출 없이 인스턴스 생성 (차원 미확정)
    pub fn new(base_url: &Url, model: impl Into<String>, device: Device) -> Result<Self> {
        let endpoint = base_url
            .join("api/embed")
            .context("Invalid embedding base URL")?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            model: model.into(),
            device,
            dimension: 0,
            max_retries: MAX_RETRIES,
        })
    }

    /// 재시도 횟수 지정
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 설정으로 생성하고 워밍업 임베딩으로 모델 상태 확인
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let mut embedder = Self::new(
            settings.embedding_url(),
            settings.embedding_model.clone(),
            settings.device,
        )?;
        embedder.warm_up().await?;
        Ok(embedder)
    }

    /// 워밍업 임베딩 1회 수행, 차원 확정
    pub async fn warm_up(&mut self) -> Result<()> {
        tracing::info!("Initializing embedding model: {}", self.model);
        let start = Instant::now();

        let vectors = self
            .request(&[WARM_UP_TEXT.to_string()])
            .await
            .context("Embedding warm-up failed")?;
        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        if dimension == 0 {
            anyhow::bail!("Embedding model returned an empty vector");
        }

        self.dimension = dimension;
        tracing::info!("Embedding dimension: {}", dimension);
        tracing::info!(
            "Embedding model ready ({:.2}s)",
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    fn options(&self) -> Option<EmbedOptions> {
        match self.device {
            Device::Cpu => Some(EmbedOptions { num_gpu: 0 }),
            Device::Cuda | Device::Mps => None,
        }
    }

    /// 단일 배치 요청 (연결 실패 시 지수 백오프 재시도)
    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
            options: self.options(),
        };

        let mut attempt = 0;
        let response = loop {
            match self
                .client
                .post(self.endpoint.clone())
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => break resp,
                Err(e) if attempt < self.max_retries => {
                    let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        "Embedding request failed ({}), retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e).context("Failed to send embedding request"),
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<OllamaError>(&body) {
                anyhow::bail!("Embedding API error ({}): {}", status, error.error);
            }
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        parse_embeddings(&body, texts.len())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if self.dimension != 0 && vector.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension changed: expected {}, got {}",
                self.dimension,
                vector.len()
            );
        }
        Ok(())
    }
}

/// 응답 본문 파싱 + 단위 정규화
fn parse_embeddings(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let response: EmbedResponse =
        serde_json::from_str(body).context("Failed to parse embedding response")?;

    if response.embeddings.len() != expected {
        anyhow::bail!(
            "Embedding count mismatch: sent {}, received {}",
            expected,
            response.embeddings.len()
        );
    }

    Ok(response.embeddings.into_iter().map(normalize).collect())
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding API returned no vector"))?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{}",
                i + 1,
                texts.len().div_ceil(BATCH_SIZE)
            );
            for vector in self.request(batch).await? {
                self.check_dimension(&vector)?;
                results.push(vector);
            }
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn local_url() -> Url {
        Url::parse("http://localhost:11434").unwrap()
    }

    #[test]
    fn test_endpoint_join() {
        let embedder = OllamaEmbedding::new(&local_url(), "nlpai-lab/KoE5", Device::Cpu).unwrap();
        assert_eq!(embedder.endpoint.as_str(), "http://localhost:11434/api/embed");
        assert_eq!(embedder.dimension(), 0);
        assert_eq!(embedder.name(), "nlpai-lab/KoE5");
    }

    #[test]
    fn test_cpu_device_disables_gpu() {
        let texts = vec!["조문".to_string()];
        let cpu = OllamaEmbedding::new(&local_url(), "m", Device::Cpu).unwrap();
        let json = serde_json::to_value(EmbedRequest {
            model: "m",
            input: &texts,
            options: cpu.options(),
        })
        .unwrap();
        assert_eq!(json["options"]["num_gpu"], 0);
        assert_eq!(json["input"][0], "조문");

        let cuda = OllamaEmbedding::new(&local_url(), "m", Device::Cuda).unwrap();
        let json = serde_json::to_value(EmbedRequest {
            model: "m",
            input: &texts,
            options: cuda.options(),
        })
        .unwrap();
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_parse_embeddings_normalizes() {
        let vectors = parse_embeddings(r#"{"embeddings": [[3.0, 4.0], [0.0, 2.0]]}"#, 2).unwrap();
        assert!((vectors[0][0] - 0.6).abs() < 0.0001);
        assert!((vectors[1][1] - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_parse_embeddings_count_mismatch() {
        let err = parse_embeddings(r#"{"embeddings": [[1.0]]}"#, 2).unwrap_err();
        assert!(err.to_string().contains("count mismatch"));
    }

    #[test]
    fn test_check_dimension() {
        let mut embedder = OllamaEmbedding::new(&local_url(), "m", Device::Cpu).unwrap();
        assert!(embedder.check_dimension(&[1.0, 0.0]).is_ok());

        embedder.dimension = 3;
        assert!(embedder.check_dimension(&[1.0, 0.0, 0.0]).is_ok());
        assert!(embedder.check_dimension(&[1.0, 0.0]).is_err());
    }

    #[tokio::test]
    async fn test_connect_unreachable_backend_fails() {
        let url = Url::parse("http://127.0.0.1:9").unwrap();
        let mut embedder = OllamaEmbedding::new(&url, "m", Device::Cpu)
            .unwrap()
            .with_max_retries(0);

        let result = embedder.warm_up().await;
        assert!(result.is_err());
        assert_eq!(embedder.dimension(), 0);
    }
}
