//! 컬렉션 관리자 - 법률 분야별 컬렉션의 구축과 검색
//!
//! 재구축은 파괴적입니다: 같은 이름의 컬렉션을 지우고 처음부터 다시 만듭니다.
//! 같은 컬렉션을 동시에 재구축하면 마지막 쓰기가 남습니다.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::embedding::EmbeddingProvider;

use super::document::{ScoredDocument, StatuteDocument};
use super::lance::LanceVectorStore;
use super::loader::{find_source_file, law_domain_of, StatuteLoader};
use super::vector::{IndexedPoint, PointPayload, VectorStore};

/// 컬렉션 색인 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// 재구축 완료 (색인된 문서 수)
    Built(usize),
    /// 기존 컬렉션 재사용 (포인트 수)
    Reused(usize),
    /// 원본 데이터 없음, 미구축 상태 유지
    NoSource,
}

/// 벡터 스토어 관리자
#[derive(Clone)]
pub struct VectorStoreManager {
    store: Arc<dyn VectorStore>,
}

impl VectorStoreManager {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// 설정된 경로의 LanceDB 저장소로 생성
    pub async fn open(settings: &Settings) -> Result<Self> {
        let store = LanceVectorStore::open(&settings.vector_store_path).await?;
        Ok(Self::new(Arc::new(store)))
    }

    /// 컬렉션 (재)구축
    ///
    /// 기존 컬렉션 삭제 → 전체 임베딩 → 임베딩 차원으로 컬렉션 생성 → 0부터 순번 업서트
    pub async fn build_collection(
        &self,
        name: &str,
        documents: &[StatuteDocument],
        embedder: &dyn EmbeddingProvider,
    ) -> Result<usize> {
        if self.store.drop_collection(name).await? {
            tracing::info!("Dropped existing collection '{}'", name);
        }

        tracing::info!("Embedding {} documents for '{}'", documents.len(), name);
        let start = Instant::now();

        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = embedder
            .embed_documents(&texts)
            .await
            .with_context(|| format!("Failed to embed documents for '{}'", name))?;

        if vectors.len() != documents.len() {
            anyhow::bail!(
                "Embedding count mismatch for '{}': {} documents, {} vectors",
                name,
                documents.len(),
                vectors.len()
            );
        }
        tracing::info!(
            "Embeddings ready ({:.2}s)",
            start.elapsed().as_secs_f64()
        );

        let dimension = vectors
            .first()
            .map(|v| v.len())
            .unwrap_or_else(|| embedder.dimension());
        if dimension == 0 {
            anyhow::bail!("Unknown embedding dimension for '{}'", name);
        }

        self.store.create_collection(name, dimension).await?;
        tracing::info!("Created collection '{}' (dimension {})", name, dimension);

        let points: Vec<IndexedPoint> = documents
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (doc, vector))| IndexedPoint {
                id: i as i64,
                vector,
                payload: PointPayload::from(doc),
            })
            .collect();

        let inserted = self.store.upsert(name, &points).await?;
        tracing::info!("Upserted {} points into '{}'", inserted, name);

        Ok(inserted)
    }

    /// 상위 k개 유사 문서 검색 (컬렉션이 없으면 빈 결과)
    pub async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let points = self.store.search(name, query_vector, k).await?;
        Ok(points.into_iter().map(ScoredDocument::from).collect())
    }

    pub async fn has_collection(&self, name: &str) -> Result<bool> {
        self.store.has_collection(name).await
    }

    pub async fn count(&self, name: &str) -> Result<usize> {
        self.store.count(name).await
    }

    /// 데이터 디렉토리의 조문 파일로 컬렉션 색인
    ///
    /// `rebuild`가 false이고 컬렉션이 이미 있으면 그대로 재사용합니다.
    pub async fn index_collection(
        &self,
        settings: &Settings,
        collection: &str,
        embedder: &dyn EmbeddingProvider,
        rebuild: bool,
    ) -> Result<IndexOutcome> {
        if !rebuild && self.has_collection(collection).await? {
            let count = self.count(collection).await?;
            tracing::info!("Reusing collection '{}' ({} points)", collection, count);
            return Ok(IndexOutcome::Reused(count));
        }

        let dir = settings.domain_dir(collection);
        let Some(path) = find_source_file(&dir) else {
            tracing::info!("No source data for '{}' in {}", collection, dir.display());
            return Ok(IndexOutcome::NoSource);
        };

        let loader = StatuteLoader::new(&path, law_domain_of(collection));
        let mut documents = loader.load()?.documents;

        if settings.index_limit > 0 && documents.len() > settings.index_limit {
            tracing::info!(
                "Indexing first {} of {} documents",
                settings.index_limit,
                documents.len()
            );
            documents.truncate(settings.index_limit);
        }

        let built = self
            .build_collection(collection, &documents, embedder)
            .await?;
        Ok(IndexOutcome::Built(built))
    }
}

// ============================================================================
// Tests
// ============================================================================
