//! 에러 타입
//!
//! 도메인 수준 에러는 `LegalRagError`로 표현하고,
//! 외부 백엔드 연동 코드는 `anyhow::Result`로 컨텍스트를 붙여 전파합니다.

use std::path::PathBuf;

use thiserror::Error;

/// legal-rag 도메인 에러
#[derive(Debug, Error)]
pub enum LegalRagError {
    /// 입력 파일 없음 (해당 로드 작업만 실패)
    #[error("파일을 찾을 수 없습니다: {}", .0.display())]
    NotFound(PathBuf),

    /// JSON 파싱 실패 (파일 전체)
    #[error("JSON 파싱 실패 ({}): {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON 최상위 구조가 배열이 아님
    #[error("JSON 최상위 구조가 배열이 아닙니다: {}", .0.display())]
    NotAnArray(PathBuf),

    /// 파일 읽기 실패
    #[error("파일 읽기 실패 ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 임베딩/LLM/벡터 스토어 백엔드 사용 불가
    #[error("{0} 서비스를 사용할 수 없습니다")]
    ServiceUnavailable(Component),
}

impl LegalRagError {
    /// 파싱 계열 에러인지 여부
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::NotAnArray(_))
    }
}

/// 초기화 대상 컴포넌트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Embedding,
    Llm,
    VectorStore,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Component::Embedding => "임베딩",
            Component::Llm => "LLM",
            Component::VectorStore => "벡터 스토어",
        };
        f.write_str(name)
    }
}
