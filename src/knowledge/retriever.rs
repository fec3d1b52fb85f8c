//! 검색 병합기 - 법률 분야 컬렉션 검색 결과 통합
//!
//! - `"all"`: 설정된 모든 컬렉션에서 2개씩 검색해 설정 순서대로 이어 붙임
//! - 특정 분야: 해당 컬렉션 하나에서 3개 검색
//!
//! 컬렉션 간 점수 재정렬은 하지 않습니다. 컬렉션마다 결과가 고르게 들어가도록
//! 한 것이며, 병합 결과는 컬렉션 순서를 따릅니다.

use std::sync::Arc;

use anyhow::Result;

use crate::config::collection_for;
use crate::embedding::EmbeddingProvider;

use super::document::ScoredDocument;
use super::manager::VectorStoreManager;

/// 전체 분야 검색 키워드
pub const ALL_DOMAINS: &str = "all";
/// 전체 검색 시 컬렉션당 결과 수
pub const PER_COLLECTION_K: usize = 2;
/// 단일 분야 검색 결과 수
pub const SINGLE_DOMAIN_K: usize = 3;

/// 다중 컬렉션 검색기
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: VectorStoreManager,
    /// 병합 순서
    collections: Vec<String>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: VectorStoreManager,
        collections: Vec<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            collections,
        }
    }

    /// 질의에 관련된 조문 검색
    ///
    /// 결과가 없어도 에러가 아닙니다.
    pub async fn retrieve(&self, query: &str, domain: &str) -> Result<Vec<ScoredDocument>> {
        let targets = self.targets(domain).await?;
        if targets.is_empty() {
            return Ok(vec![]);
        }

        let query_vector = self.embedder.embed_query(query).await?;
        let mut all_docs = Vec::new();

        for (collection, k) in targets {
            let docs = self.store.search(&collection, &query_vector, k).await?;
            tracing::info!("Retrieved {} documents from {}", docs.len(), collection);

            for (i, doc) in docs.iter().enumerate() {
                tracing::debug!(
                    "[{}] #{} article={} title={} score={:.4} preview={}",
                    collection,
                    i + 1,
                    doc.document.metadata.article_id,
                    doc.document.metadata.title,
                    doc.score,
                    doc.document.preview(100)
                );
            }

            all_docs.extend(docs);
        }

        tracing::info!("Retrieved {} documents in total", all_docs.len());
        Ok(all_docs)
    }

    /// 검색 대상 (컬렉션, k) 목록. 미구축 컬렉션은 제외
    async fn targets(&self, domain: &str) -> Result<Vec<(String, usize)>> {
        if domain.trim().eq_ignore_ascii_case(ALL_DOMAINS) {
            let mut targets = Vec::with_capacity(self.collections.len());
            for collection in &self.collections {
                if self.store.has_collection(collection).await? {
                    targets.push((collection.clone(), PER_COLLECTION_K));
                } else {
                    tracing::info!("{} is not built yet, skipping", collection);
                }
            }
            return Ok(targets);
        }

        let collection = collection_for(domain);
        if self.store.has_collection(&collection).await? {
            Ok(vec![(collection, SINGLE_DOMAIN_K)])
        } else {
            tracing::warn!("No vector store for {}", collection);
            Ok(vec![])
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{LanceVectorStore, StatuteDocument, StatuteMetadata};
    use crate::testing::CharHistogramEmbedding;
    use tempfile::TempDir;

    fn doc(domain: &str, title: &str) -> StatuteDocument {
        StatuteDocument::new(
            format!("{} 조문 본문", title),
            StatuteMetadata {
                source: String::new(),
                law_domain: domain.into(),
                article_id: String::new(),
                title: title.into(),
            },
        )
    }

    /// civil_law: 2건, commercial_law: 0건, criminal_law: 미구축
    async fn fixture(dir: &TempDir) -> Retriever {
        let embedder = Arc::new(CharHistogramEmbedding::new(16));
        let store = LanceVectorStore::open(dir.path()).await.unwrap();
        let manager = VectorStoreManager::new(Arc::new(store));

        manager
            .build_collection(
                "civil_law",
                &[doc("civil", "권리능력"), doc("civil", "신의성실")],
                embedder.as_ref(),
            )
            .await
            .unwrap();
        manager
            .build_collection("commercial_law", &[], embedder.as_ref())
            .await
            .unwrap();

        Retriever::new(
            embedder,
            manager,
            vec![
                "civil_law".to_string(),
                "commercial_law".to_string(),
                "criminal_law".to_string(),
            ],
        )
    }

    #[tokio::test]
    async fn test_all_domains_skips_empty_and_unbuilt() {
        let temp_dir = TempDir::new().unwrap();
        let retriever = fixture(&temp_dir).await;

        let docs = retriever.retrieve("신의성실의 원칙", "all").await.unwrap();

        assert!(!docs.is_empty());
        assert!(docs.len() <= PER_COLLECTION_K);
        assert!(docs.iter().all(|d| d.document.metadata.law_domain == "civil"));
    }

    #[tokio::test]
    async fn test_single_domain_uses_named_collection() {
        let temp_dir = TempDir::new().unwrap();
        let retriever = fixture(&temp_dir).await;

        let docs = retriever.retrieve("권리능력", "civil").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].document.metadata.title, "권리능력");

        let docs = retriever.retrieve("권리능력", "civil_law").await.unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn test_absent_domain_is_empty_not_error() {
        let temp_dir = TempDir::new().unwrap();
        let retriever = fixture(&temp_dir).await;

        let docs = retriever.retrieve("절도죄", "criminal").await.unwrap();
        assert!(docs.is_empty());

        let docs = retriever.retrieve("세금", "tax").await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_all_preserves_collection_order() {
        let temp_dir = TempDir::new().unwrap();
        let embedder = Arc::new(CharHistogramEmbedding::new(16));
        let store = LanceVectorStore::open(temp_dir.path()).await.unwrap();
        let manager = VectorStoreManager::new(Arc::new(store));

        for (collection, domain) in [("criminal_law", "criminal"), ("civil_law", "civil")] {
            manager
                .build_collection(
                    collection,
                    &[doc(domain, "가"), doc(domain, "나"), doc(domain, "다")],
                    embedder.as_ref(),
                )
                .await
                .unwrap();
        }

        let retriever = Retriever::new(
            embedder,
            manager,
            vec!["civil_law".to_string(), "criminal_law".to_string()],
        );
        let docs = retriever.retrieve("가", "all").await.unwrap();

        let domains: Vec<&str> = docs
            .iter()
            .map(|d| d.document.metadata.law_domain.as_str())
            .collect();
        assert_eq!(domains, vec!["civil", "civil", "criminal", "criminal"]);
    }
}
