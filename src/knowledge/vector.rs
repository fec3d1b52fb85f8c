//! Vector Store - 컬렉션 단위 벡터 저장소 트레이트 및 유틸리티
//!
//! 법률 분야별로 컬렉션을 하나씩 두고, 코사인 유사도로 검색합니다.

use anyhow::Result;
use async_trait::async_trait;

use super::document::{ScoredDocument, StatuteDocument, StatuteMetadata};

// ============================================================================
// Types
// ============================================================================

/// 색인된 포인트 (저장용)
///
/// 업서트 이후 변경되지 않으며, 재구축 시 컬렉션 전체가 교체됩니다.
#[derive(Debug, Clone)]
pub struct IndexedPoint {
    /// 컬렉션 내 순번 (0부터)
    pub id: i64,
    /// 단위 정규화된 임베딩 벡터
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// 포인트 페이로드
#[derive(Debug, Clone, PartialEq)]
pub struct PointPayload {
    pub text: String,
    pub source: String,
    pub law_domain: String,
    pub article_id: String,
    pub title: String,
}

impl From<&StatuteDocument> for PointPayload {
    fn from(doc: &StatuteDocument) -> Self {
        Self {
            text: doc.content.clone(),
            source: doc.metadata.source.clone(),
            law_domain: doc.metadata.law_domain.clone(),
            article_id: doc.metadata.article_id.clone(),
            title: doc.metadata.title.clone(),
        }
    }
}

impl From<PointPayload> for StatuteDocument {
    fn from(payload: PointPayload) -> Self {
        StatuteDocument::new(
            payload.text,
            StatuteMetadata {
                source: payload.source,
                law_domain: payload.law_domain,
                article_id: payload.article_id,
                title: payload.title,
            },
        )
    }
}

/// 검색 결과 포인트
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: i64,
    pub payload: PointPayload,
    /// 코사인 유사도
    pub similarity: f32,
}

impl From<ScoredPoint> for ScoredDocument {
    fn from(point: ScoredPoint) -> Self {
        ScoredDocument {
            document: point.payload.into(),
            score: point.similarity,
        }
    }
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 이름이 붙은 컬렉션들을 관리하는 벡터 저장소의 공통 인터페이스입니다.
/// 컬렉션의 차원과 거리 함수(코사인)는 생성 시 고정됩니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 컬렉션 존재 여부
    async fn has_collection(&self, name: &str) -> Result<bool>;

    /// 컬렉션 삭제 (없으면 false, 에러 아님)
    async fn drop_collection(&self, name: &str) -> Result<bool>;

    /// 빈 컬렉션 생성
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// 포인트 업서트
    async fn upsert(&self, name: &str, points: &[IndexedPoint]) -> Result<usize>;

    /// 코사인 유사도 기준 상위 k개 검색 (컬렉션이 없으면 빈 결과)
    async fn search(&self, name: &str, query: &[f32], k: usize) -> Result<Vec<ScoredPoint>>;

    /// 포인트 개수 (컬렉션이 없으면 0)
    async fn count(&self, name: &str) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 벡터를 단위 길이로 정규화 (영벡터는 그대로)
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

// ============================================================================
// Tests
// ============================================================================
