//! 설정 모듈
//!
//! 모든 설정은 선택 사항이며 CLI 플래그 > 환경변수(.env 포함) > 기본값 순으로 적용됩니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, ValueEnum};
use url::Url;

/// 기본 법률 분야 컬렉션 (반복 순서가 곧 병합 순서)
pub const DEFAULT_COLLECTIONS: &str = "civil_law,commercial_law,criminal_law";

/// 임베딩/생성 연산 장치
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Device {
    Cpu,
    Cuda,
    Mps,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
            Device::Mps => "mps",
        };
        f.write_str(name)
    }
}

/// 애플리케이션 설정
#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// 서비스 이름
    #[arg(long, env = "PROJECT_NAME", default_value = "LegalPlan RAG API")]
    pub project_name: String,

    /// Ollama 서버 주소
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub ollama_base_url: Url,

    /// 생성 모델 식별자
    #[arg(long, env = "OLLAMA_MODEL", default_value = "qwen3:14b")]
    pub ollama_model: String,

    /// 생성 temperature
    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.1)]
    pub temperature: f32,

    /// 임베딩 서버 주소 (미지정 시 Ollama 주소 사용)
    #[arg(long, env = "EMBEDDING_BASE_URL")]
    pub embedding_base_url: Option<Url>,

    /// 임베딩 모델 식별자
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "nlpai-lab/KoE5")]
    pub embedding_model: String,

    /// 연산 장치
    #[arg(long, env = "DEVICE", value_enum, default_value_t = Device::Cpu)]
    pub device: Device,

    /// 벡터 스토어 저장 경로
    #[arg(long, env = "VECTOR_STORE_PATH", default_value = "./vector_db")]
    pub vector_store_path: PathBuf,

    /// 법률 데이터 루트 디렉토리
    #[arg(long, env = "DATA_ROOT", default_value = "./data")]
    pub data_root: PathBuf,

    /// 법률 분야 컬렉션 목록 (쉼표 구분)
    #[arg(long, env = "COLLECTIONS", value_delimiter = ',', default_value = DEFAULT_COLLECTIONS)]
    pub collections: Vec<String>,

    /// 청크 크기 (향후 문서 분할용, 현재 미사용)
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 1000)]
    pub chunk_size: usize,

    /// 청크 오버랩 (향후 문서 분할용, 현재 미사용)
    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = 200)]
    pub chunk_overlap: usize,

    /// 컬렉션당 색인 문서 수 상한 (0 = 제한 없음)
    #[arg(long, env = "INDEX_LIMIT", default_value_t = 0)]
    pub index_limit: usize,

    /// 시작 시 컬렉션 재구축 여부
    #[arg(long, env = "REBUILD_ON_STARTUP", default_value_t = true, action = ArgAction::Set)]
    pub rebuild_on_startup: bool,

    /// HTTP 서버 바인드 주소
    #[arg(long, env = "BIND", default_value = "0.0.0.0:8000")]
    pub bind: String,

    /// CORS 허용 origin 목록 (쉼표 구분, "*" = 전체)
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,
}

#[derive(Parser)]
struct Standalone {
    #[command(flatten)]
    settings: Settings,
}

impl Settings {
    /// 환경변수와 기본값만으로 설정 생성
    pub fn from_env() -> Self {
        Standalone::parse_from(["legal-rag"]).settings
    }

    /// 임베딩 서버 주소
    pub fn embedding_url(&self) -> &Url {
        self.embedding_base_url.as_ref().unwrap_or(&self.ollama_base_url)
    }

    /// 컬렉션별 데이터 디렉토리 (DATA_ROOT/<collection>)
    pub fn domain_dir(&self, collection: &str) -> PathBuf {
        self.data_root.join(collection)
    }

    /// 필요한 디렉토리 생성 (없을 때만)
    pub fn bootstrap_dirs(&self) -> Result<()> {
        let mut dirs: Vec<PathBuf> = vec![self.data_root.clone()];
        dirs.extend(self.collections.iter().map(|c| self.domain_dir(c)));
        dirs.push(self.vector_store_path.clone());

        for dir in dirs {
            ensure_dir(&dir)?;
        }
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        tracing::info!("Directory found: {}", dir.display());
    } else {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        tracing::info!("Directory created: {}", dir.display());
    }
    Ok(())
}

/// 요청된 법률 분야를 컬렉션 이름으로 변환
///
/// `"civil"` -> `"civil_law"`, `"civil_law"`는 그대로 반환합니다.
pub fn collection_for(domain: &str) -> String {
    let domain = domain.trim();
    if domain.ends_with("_law") {
        domain.to_string()
    } else {
        format!("{}_law", domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_in(dir: &Path) -> Settings {
        let mut settings = Standalone::parse_from(["legal-rag"]).settings;
        settings.data_root = dir.join("data");
        settings.vector_store_path = dir.join("vector_db");
        settings
    }

    #[test]
    fn test_collection_for() {
        assert_eq!(collection_for("civil"), "civil_law");
        assert_eq!(collection_for("commercial_law"), "commercial_law");
        assert_eq!(collection_for(" criminal "), "criminal_law");
    }

    #[test]
    fn test_flags_override_defaults() {
        let settings = Standalone::parse_from([
            "legal-rag",
            "--collections",
            "tax_law,labor_law",
            "--device",
            "cuda",
            "--rebuild-on-startup",
            "false",
        ])
        .settings;

        assert_eq!(settings.collections, vec!["tax_law", "labor_law"]);
        assert_eq!(settings.device, Device::Cuda);
        assert!(!settings.rebuild_on_startup);
    }

    #[test]
    fn test_embedding_url_falls_back_to_ollama() {
        let mut settings = Standalone::parse_from(["legal-rag"]).settings;
        settings.embedding_base_url = None;
        assert_eq!(settings.embedding_url(), &settings.ollama_base_url);

        let tei = Url::parse("http://localhost:8080").unwrap();
        settings.embedding_base_url = Some(tei.clone());
        assert_eq!(settings.embedding_url(), &tei);
    }

    #[test]
    fn test_bootstrap_dirs_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = settings_in(temp_dir.path());
        settings.collections = vec!["civil_law".into(), "commercial_law".into()];

        settings.bootstrap_dirs().unwrap();
        // 두 번째 호출도 성공해야 함
        settings.bootstrap_dirs().unwrap();

        assert!(settings.domain_dir("civil_law").is_dir());
        assert!(settings.domain_dir("commercial_law").is_dir());
        assert!(settings.vector_store_path.is_dir());
    }
}
