//! 법률 조문 JSON 로더
//!
//! 조문 레코드 배열(JSON)을 읽어 `StatuteDocument` 목록으로 변환합니다.
//!
//! ```json
//! [{ "조문": "제1조", "제목": "상사적용법규", "내용": "상사에 관하여 ..." }]
//! ```
//!
//! 레코드 단위 오류는 경고 후 건너뛰고, 파일 단위 오류는 전체 로드를 중단합니다.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use walkdir::WalkDir;

use crate::error::LegalRagError;

use super::document::{StatuteDocument, StatuteMetadata};

// ============================================================================
// Record
// ============================================================================

/// JSON 조문 레코드 (한글 키 우선, 영문 키 허용)
#[derive(Debug, Deserialize)]
struct StatuteRecord {
    #[serde(rename = "제목", alias = "title")]
    title: String,
    #[serde(rename = "내용", alias = "content")]
    body: String,
    #[serde(
        rename = "조문",
        alias = "article",
        default,
        deserialize_with = "string_or_number"
    )]
    article: String,
    #[serde(rename = "출처", alias = "source", default)]
    source: String,
}

/// 조문 번호는 문자열 또는 숫자로 들어옵니다
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

// ============================================================================
// Loader
// ============================================================================

/// 로드 결과
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub documents: Vec<StatuteDocument>,
    /// 건너뛴 레코드 수
    pub skipped: usize,
}

impl LoadReport {
    /// 파일 내 전체 레코드 수
    pub fn total(&self) -> usize {
        self.documents.len() + self.skipped
    }
}

/// 법률 조문 로더
#[derive(Debug, Clone)]
pub struct StatuteLoader {
    path: PathBuf,
    law_domain: String,
}

impl StatuteLoader {
    /// # Arguments
    /// * `path` - 조문 JSON 파일 경로
    /// * `law_domain` - 문서 메타데이터에 기록할 법률 분야 (예: "commercial")
    pub fn new(path: impl Into<PathBuf>, law_domain: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            law_domain: law_domain.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// JSON 파일을 로드하여 문서 목록 반환
    pub fn load(&self) -> Result<LoadReport, LegalRagError> {
        tracing::info!("Loading statutes: {}", self.path.display());

        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LegalRagError::NotFound(self.path.clone())
            } else {
                LegalRagError::Io {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })?;

        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            tracing::error!("Failed to parse JSON {}: {}", self.path.display(), e);
            LegalRagError::Parse {
                path: self.path.clone(),
                source: e,
            }
        })?;

        let Value::Array(records) = value else {
            return Err(LegalRagError::NotAnArray(self.path.clone()));
        };
        tracing::info!("JSON loaded: {} records", records.len());

        let mut documents = Vec::with_capacity(records.len());
        let mut skipped = 0;

        for (index, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<StatuteRecord>(record) {
                Ok(record) => documents.push(self.to_document(record)),
                Err(e) => {
                    tracing::warn!("Skipping record #{}: {}", index, e);
                    skipped += 1;
                }
            }
        }

        tracing::info!(
            "Converted {} documents ({} skipped) from {}",
            documents.len(),
            skipped,
            self.path.display()
        );

        Ok(LoadReport { documents, skipped })
    }

    fn to_document(&self, record: StatuteRecord) -> StatuteDocument {
        let content = format!("{} {}", record.title, record.body);
        StatuteDocument::new(
            content,
            StatuteMetadata {
                source: record.source,
                law_domain: self.law_domain.clone(),
                article_id: record.article,
                title: record.title,
            },
        )
    }
}

/// 컬렉션 이름에서 법률 분야 추출 ("commercial_law" -> "commercial")
pub fn law_domain_of(collection: &str) -> &str {
    collection.strip_suffix("_law").unwrap_or(collection)
}

/// 분야 디렉토리에서 조문 JSON 파일 탐색 (파일명 순 첫 번째)
pub fn find_source_file(dir: &Path) -> Option<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .find(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false)
        })
}

// ============================================================================
// Tests
// ============================================================================
