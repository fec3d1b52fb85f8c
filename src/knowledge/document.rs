//! 법률 문서 타입

use serde::{Deserialize, Serialize};

/// 조문 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatuteMetadata {
    /// 원본 출처 (없으면 빈 문자열)
    pub source: String,
    /// 법률 분야 (예: "commercial")
    pub law_domain: String,
    /// 조문 번호 (예: "제1조")
    pub article_id: String,
    /// 조문 제목
    pub title: String,
}

/// 법률 조문 문서
///
/// 로더가 JSON 레코드 하나로부터 생성하며, 생성 이후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatuteDocument {
    /// 임베딩 대상 본문 ("{제목} {내용}")
    pub content: String,
    pub metadata: StatuteMetadata,
}

impl StatuteDocument {
    pub fn new(content: impl Into<String>, metadata: StatuteMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// 로그 출력용 본문 미리보기 (UTF-8 안전)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            self.content.clone()
        } else {
            let truncated: String = self.content.chars().take(max_chars).collect();
            format!("{}...", truncated)
        }
    }
}

/// 유사도 점수가 붙은 검색 결과 문서
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: StatuteDocument,
    /// 코사인 유사도 (-1.0 ~ 1.0, 높을수록 유사)
    pub score: f32,
}

/// 검색된 문서들을 LLM 컨텍스트 문자열로 변환 (빈 줄로 구분)
pub fn format_context(docs: &[ScoredDocument]) -> String {
    docs.iter()
        .map(|d| d.document.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(content: &str) -> ScoredDocument {
        ScoredDocument {
            document: StatuteDocument::new(content, StatuteMetadata::default()),
            score: 1.0,
        }
    }

    #[test]
    fn test_format_context_joins_with_blank_line() {
        let docs = vec![scored("제1조 목적"), scored("제2조 정의")];
        assert_eq!(format_context(&docs), "제1조 목적\n\n제2조 정의");
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn test_preview_unicode() {
        let doc = StatuteDocument::new("상법 제1조 상사에 관하여", StatuteMetadata::default());
        assert_eq!(doc.preview(4), "상법 제...");
        assert_eq!(doc.preview(100), "상법 제1조 상사에 관하여");
    }
}
