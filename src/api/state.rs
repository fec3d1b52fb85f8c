//! 애플리케이션 컨텍스트
//!
//! 임베딩/LLM/벡터 스토어 핸들을 보관합니다. 시작 시 초기화를 시도하고,
//! 실패한 컴포넌트는 비어 있는 채로 두었다가 처음 사용할 때 다시 초기화합니다.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::OnceCell;

use crate::config::Settings;
use crate::embedding::{EmbeddingProvider, OllamaEmbedding};
use crate::error::{Component, LegalRagError};
use crate::knowledge::{IndexOutcome, Retriever, VectorStoreManager};
use crate::llm::{LanguageModel, OllamaChat};
use crate::rag::RagPipeline;

/// 핸들러 간 공유 상태
pub struct AppContext {
    settings: Arc<Settings>,
    embedder: OnceCell<Arc<dyn EmbeddingProvider>>,
    llm: OnceCell<Arc<dyn LanguageModel>>,
    store: OnceCell<VectorStoreManager>,
}

impl AppContext {
    /// 컴포넌트 미초기화 상태로 생성
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            embedder: OnceCell::new(),
            llm: OnceCell::new(),
            store: OnceCell::new(),
        }
    }

    /// 미리 만든 컴포넌트로 생성 (`None`은 지연 초기화 대상)
    pub fn with_components(
        settings: Settings,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        llm: Option<Arc<dyn LanguageModel>>,
        store: Option<VectorStoreManager>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            embedder: OnceCell::new_with(embedder),
            llm: OnceCell::new_with(llm),
            store: OnceCell::new_with(store),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 시작 시 초기화 (best-effort)
    ///
    /// 디렉토리 준비 → 컴포넌트 초기화 → 컬렉션 색인.
    /// 어느 단계가 실패해도 로그만 남기고 나머지를 계속 진행합니다.
    pub async fn initialize(&self) {
        tracing::info!("Starting {}", self.settings.project_name);

        if let Err(e) = self.settings.bootstrap_dirs() {
            tracing::error!("Directory bootstrap failed: {:#}", e);
        }

        tracing::info!("LLM model: {}", self.settings.ollama_model);
        tracing::info!("Embedding model: {}", self.settings.embedding_model);
        tracing::info!("Device: {}", self.settings.device);

        let embedder_ready = self.embedder().await.is_ok();
        let _ = self.llm().await;
        let store_ready = self.store().await.is_ok();

        if embedder_ready && store_ready {
            self.index_all(self.settings.rebuild_on_startup).await;
        } else {
            tracing::warn!("Skipping startup indexing: embedding or vector store unavailable");
        }

        tracing::info!("Startup complete");
    }

    /// 임베딩 프로바이더 (없으면 초기화 시도)
    pub async fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>, LegalRagError> {
        let settings = Arc::clone(&self.settings);
        self.embedder
            .get_or_try_init(|| async move {
                let embedder = OllamaEmbedding::connect(&settings).await?;
                Ok::<_, anyhow::Error>(Arc::new(embedder) as Arc<dyn EmbeddingProvider>)
            })
            .await
            .cloned()
            .map_err(|e| unavailable(Component::Embedding, e))
    }

    /// 언어 모델 (없으면 초기화 시도)
    pub async fn llm(&self) -> Result<Arc<dyn LanguageModel>, LegalRagError> {
        let settings = Arc::clone(&self.settings);
        self.llm
            .get_or_try_init(|| async move {
                let llm = OllamaChat::connect(&settings).await?;
                Ok::<_, anyhow::Error>(Arc::new(llm) as Arc<dyn LanguageModel>)
            })
            .await
            .cloned()
            .map_err(|e| unavailable(Component::Llm, e))
    }

    /// 벡터 스토어 관리자 (없으면 초기화 시도)
    pub async fn store(&self) -> Result<VectorStoreManager, LegalRagError> {
        let settings = Arc::clone(&self.settings);
        self.store
            .get_or_try_init(|| async move { VectorStoreManager::open(&settings).await })
            .await
            .cloned()
            .map_err(|e| unavailable(Component::VectorStore, e))
    }

    /// 검색기 (임베딩 + 벡터 스토어)
    pub async fn retriever(&self) -> Result<Retriever, LegalRagError> {
        Ok(Retriever::new(
            self.embedder().await?,
            self.store().await?,
            self.settings.collections.clone(),
        ))
    }

    /// 질의응답 파이프라인 (모든 컴포넌트 필요)
    pub async fn pipeline(&self) -> Result<RagPipeline, LegalRagError> {
        let retriever = self.retriever().await?;
        let llm = self.llm().await?;
        Ok(RagPipeline::new(retriever, llm))
    }

    /// 컬렉션 하나 색인
    pub async fn index_collection(&self, collection: &str, rebuild: bool) -> Result<IndexOutcome> {
        let embedder = self.embedder().await?;
        let store = self.store().await?;
        store
            .index_collection(&self.settings, collection, embedder.as_ref(), rebuild)
            .await
    }

    /// 설정된 모든 컬렉션 색인 (실패한 컬렉션은 로그 후 건너뜀)
    pub async fn index_all(&self, rebuild: bool) -> Vec<(String, IndexOutcome)> {
        let mut outcomes = Vec::new();

        for collection in &self.settings.collections {
            match self.index_collection(collection, rebuild).await {
                Ok(outcome) => {
                    tracing::info!("Collection '{}': {:?}", collection, outcome);
                    outcomes.push((collection.clone(), outcome));
                }
                Err(e) => {
                    tracing::error!("Failed to index '{}': {:#}", collection, e);
                }
            }
        }

        outcomes
    }
}

fn unavailable(component: Component, error: anyhow::Error) -> LegalRagError {
    tracing::error!("{} initialization failed: {:#}", component, error);
    LegalRagError::ServiceUnavailable(component)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::LanceVectorStore;
    use crate::testing::{CharHistogramEmbedding, ScriptedModel};
    use tempfile::TempDir;

    fn offline_settings(dir: &TempDir) -> Settings {
        let mut settings = Settings::from_env();
        // 연결이 즉시 거부되는 주소
        settings.ollama_base_url = "http://127.0.0.1:9/".parse().unwrap();
        settings.embedding_base_url = None;
        settings.data_root = dir.path().join("data");
        settings.vector_store_path = dir.path().join("vector_db");
        settings.collections = vec!["civil_law".into(), "commercial_law".into()];
        settings
    }

    #[tokio::test]
    async fn test_missing_llm_is_service_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = AppContext::with_components(
            offline_settings(&temp_dir),
            Some(Arc::new(CharHistogramEmbedding::new(8))),
            None,
            None,
        );

        let err = ctx.llm().await.err().unwrap();
        assert!(matches!(
            err,
            LegalRagError::ServiceUnavailable(Component::Llm)
        ));

        // 벡터 스토어는 지연 초기화로 열림
        assert!(ctx.store().await.is_ok());
        assert!(ctx.pipeline().await.is_err());
    }

    #[tokio::test]
    async fn test_index_all_from_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let settings = offline_settings(&temp_dir);
        settings.bootstrap_dirs().unwrap();
        std::fs::write(
            settings.domain_dir("civil_law").join("civil-law.json"),
            r#"[{"제목": "권리능력", "내용": "사람은 생존한 동안 권리와 의무의 주체가 된다."}]"#,
        )
        .unwrap();

        let store = LanceVectorStore::open(&settings.vector_store_path)
            .await
            .unwrap();
        let ctx = AppContext::with_components(
            settings,
            Some(Arc::new(CharHistogramEmbedding::new(8))),
            Some(Arc::new(ScriptedModel::new(&["답변"]))),
            Some(VectorStoreManager::new(Arc::new(store))),
        );

        let outcomes = ctx.index_all(true).await;
        assert_eq!(
            outcomes,
            vec![
                ("civil_law".to_string(), IndexOutcome::Built(1)),
                ("commercial_law".to_string(), IndexOutcome::NoSource),
            ]
        );
        assert!(ctx.pipeline().await.is_ok());
    }
}
