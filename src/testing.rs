//! 테스트용 가짜 프로바이더

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;

use crate::embedding::EmbeddingProvider;
use crate::knowledge::normalize;
use crate::llm::{LanguageModel, TextStream};

/// 문자 코드 분포로 만드는 결정적 임베딩
///
/// 같은 글자를 많이 공유하는 텍스트일수록 유사도가 높습니다.
pub struct CharHistogramEmbedding {
    pub dimension: usize,
}

impl CharHistogramEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dimension];
        for ch in text.chars().filter(|c| !c.is_whitespace()) {
            v[ch as usize % self.dimension] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        normalize(v)
    }
}

#[async_trait]
impl EmbeddingProvider for CharHistogramEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "char-histogram"
    }
}

/// 미리 정한 조각을 순서대로 내보내는 언어 모델
#[derive(Default)]
pub struct ScriptedModel {
    pub fragments: Vec<String>,
    /// 지정한 개수의 조각 이후 스트림 에러
    pub fail_after: Option<usize>,
    /// 스트림 시작 자체가 실패
    pub fail_to_open: bool,
}

impl ScriptedModel {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        if self.fail_to_open {
            anyhow::bail!("connection refused");
        }
        Ok(self.fragments.concat())
    }

    async fn stream(&self, _prompt: &str) -> Result<TextStream> {
        if self.fail_to_open {
            anyhow::bail!("connection refused");
        }

        let mut items: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(anyhow::anyhow!("backend disconnected")));
        }
        Ok(futures::stream::iter(items).boxed())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
