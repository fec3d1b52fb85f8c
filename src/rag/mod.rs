//! RAG 모듈 - 검색 결과 기반 스트리밍 답변 생성
//!
//! 질의 → 조문 검색 → 프롬프트 구성 → LLM 스트리밍 → 사고 과정 태그 제거 → 클라이언트

mod filter;
mod prompt;

use std::sync::Arc;

use futures::StreamExt;

use crate::error::{Component, LegalRagError};
use crate::knowledge::{format_context, Retriever};
use crate::llm::{LanguageModel, TextStream};

pub use filter::{strip_think_tags, ThinkFilter, THINK_END, THINK_START};
pub use prompt::{build_prompt, SYSTEM_TEMPLATE};

/// 검색 결과가 없을 때의 안내 메시지
pub const NO_DOCUMENTS_MESSAGE: &str = "관련 문서를 찾을 수 없습니다.";

/// 생성 도중 실패 시 마지막 조각
pub fn generation_error_message(error: &anyhow::Error) -> String {
    format!("응답 생성 중 오류가 발생했습니다: {}", error)
}

/// 스트리밍 답변 파이프라인
#[derive(Clone)]
pub struct RagPipeline {
    retriever: Retriever,
    llm: Arc<dyn LanguageModel>,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, llm: Arc<dyn LanguageModel>) -> Self {
        Self { retriever, llm }
    }

    /// 답변 스트림 생성
    ///
    /// - 스트림 시작 전 실패(검색 실패, LLM 연결 실패)는 `Err` 항목 하나로 끝남
    /// - 생성 도중 실패는 오류 안내 조각 하나를 내보내고 끝남 (재시도 없음)
    /// - 빈 문자열 조각은 내보내지 않음
    pub fn answer_stream(&self, query: &str, domain: &str) -> TextStream {
        let retriever = self.retriever.clone();
        let llm = Arc::clone(&self.llm);
        let query = query.to_string();
        let domain = domain.to_string();

        let stream = async_stream::try_stream! {
            tracing::info!("RAG streaming query ({}): {}", domain, query);

            let docs = retriever.retrieve(&query, &domain).await?;

            if docs.is_empty() {
                yield NO_DOCUMENTS_MESSAGE.to_string();
            } else {
                let context = format_context(&docs);
                tracing::debug!("Context length: {} chars", context.chars().count());

                let prompt = build_prompt(&context, &query);
                tracing::debug!("Prompt length: {} chars", prompt.chars().count());

                let mut fragments = llm.stream(&prompt).await.map_err(|e| {
                    tracing::error!("Failed to start generation: {:#}", e);
                    LegalRagError::ServiceUnavailable(Component::Llm)
                })?;

                let mut filter = ThinkFilter::new();
                let mut failed = false;

                while let Some(fragment) = fragments.next().await {
                    match fragment {
                        Ok(text) => {
                            let visible = filter.push(&text);
                            if !visible.is_empty() {
                                yield visible;
                            }
                        }
                        Err(e) => {
                            tracing::error!("Streaming generation failed: {:#}", e);
                            yield generation_error_message(&e);
                            failed = true;
                            break;
                        }
                    }
                }

                if !failed {
                    let tail = filter.finish();
                    if !tail.is_empty() {
                        yield tail;
                    }
                }
            }
        };

        stream.boxed()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{LanceVectorStore, StatuteDocument, StatuteMetadata, VectorStoreManager};
    use crate::testing::{CharHistogramEmbedding, ScriptedModel};
    use tempfile::TempDir;

    async fn pipeline(dir: &TempDir, llm: ScriptedModel) -> RagPipeline {
        let embedder = Arc::new(CharHistogramEmbedding::new(16));
        let store = LanceVectorStore::open(dir.path()).await.unwrap();
        let manager = VectorStoreManager::new(Arc::new(store));

        let doc = StatuteDocument::new(
            "상사적용법규 상사에 관하여 본법에 규정이 없으면 상관습법에 의한다",
            StatuteMetadata {
                law_domain: "commercial".into(),
                title: "상사적용법규".into(),
                ..Default::default()
            },
        );
        manager
            .build_collection("commercial_law", &[doc], embedder.as_ref())
            .await
            .unwrap();

        let retriever = Retriever::new(
            embedder,
            manager,
            vec!["civil_law".into(), "commercial_law".into()],
        );
        RagPipeline::new(retriever, Arc::new(llm))
    }

    async fn collect(stream: TextStream) -> Vec<Result<String, String>> {
        stream
            .map(|item| item.map_err(|e| e.to_string()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_answer_filters_thinking() {
        let temp_dir = TempDir::new().unwrap();
        let llm = ScriptedModel::new(&["<think>\n상법 1조", "를 찾자\n</th", "ink>\n\n상관습법", "이 적용됩니다."]);
        let pipeline = pipeline(&temp_dir, llm).await;

        let items = collect(pipeline.answer_stream("상사에 관한 법규", "all")).await;
        let text: String = items.into_iter().map(|i| i.unwrap()).collect();

        assert_eq!(text, "\n\n상관습법이 적용됩니다.");
    }

    #[tokio::test]
    async fn test_absent_domain_yields_empty_message() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(&temp_dir, ScriptedModel::new(&["unused"])).await;

        let items = collect(pipeline.answer_stream("계약", "civil")).await;
        assert_eq!(items, vec![Ok(NO_DOCUMENTS_MESSAGE.to_string())]);
    }

    #[tokio::test]
    async fn test_stream_open_failure_is_single_error() {
        let temp_dir = TempDir::new().unwrap();
        let llm = ScriptedModel {
            fail_to_open: true,
            ..Default::default()
        };
        let pipeline = pipeline(&temp_dir, llm).await;

        let items = collect(pipeline.answer_stream("상사", "commercial")).await;
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0],
            Err("LLM 서비스를 사용할 수 없습니다".to_string())
        );
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_with_error_fragment() {
        let temp_dir = TempDir::new().unwrap();
        let llm = ScriptedModel {
            fragments: vec!["상관습법".into(), "이".into(), "적용".into()],
            fail_after: Some(2),
            ..Default::default()
        };
        let pipeline = pipeline(&temp_dir, llm).await;

        let items = collect(pipeline.answer_stream("상사", "all")).await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], Ok("상관습법".to_string()));
        assert_eq!(items[1], Ok("이".to_string()));
        let last = items[2].as_ref().unwrap();
        assert!(last.starts_with("응답 생성 중 오류가 발생했습니다"));
        assert!(last.contains("backend disconnected"));
    }
}
