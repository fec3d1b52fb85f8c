//! legal-rag - 한국 법률 조문 RAG 서비스
//!
//! 법률 분야별 조문을 LanceDB에 색인하고, 질의와 관련된 조문을 검색해
//! Ollama 언어 모델의 답변을 SSE로 스트리밍합니다.
//! 추론 모델의 사고 과정(`<think>...</think>`)은 스트리밍 중에 제거됩니다.

pub mod api;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod rag;

#[cfg(test)]
mod testing;

// Re-exports
pub use api::AppContext;
pub use config::{Device, Settings};
pub use embedding::{EmbeddingProvider, OllamaEmbedding};
pub use error::{Component, LegalRagError};
pub use knowledge::{
    LanceVectorStore, Retriever, ScoredDocument, StatuteDocument, StatuteLoader,
    StatuteMetadata, VectorStore, VectorStoreManager,
};
pub use llm::{LanguageModel, OllamaChat, TextStream};
pub use rag::{strip_think_tags, RagPipeline, ThinkFilter};
