//! Knowledge 모듈 - 법률 조문 색인과 검색
//!
//! - Loader: 조문 JSON 파일을 문서로 변환
//! - LanceDB: 법률 분야별 컬렉션 벡터 검색 (코사인 유사도)
//! - Manager: 컬렉션 구축/재구축, 단일 컬렉션 검색
//! - Retriever: 여러 컬렉션 검색 결과 병합

mod document;
mod lance;
mod loader;
mod manager;
mod retriever;
mod vector;

// Re-exports
pub use document::{format_context, ScoredDocument, StatuteDocument, StatuteMetadata};
pub use lance::LanceVectorStore;
pub use loader::{find_source_file, law_domain_of, LoadReport, StatuteLoader};
pub use manager::{IndexOutcome, VectorStoreManager};
pub use retriever::{Retriever, ALL_DOMAINS, PER_COLLECTION_K, SINGLE_DOMAIN_K};
pub use vector::{
    cosine_similarity, normalize, IndexedPoint, PointPayload, ScoredPoint, VectorStore,
};
