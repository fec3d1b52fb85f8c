//! CLI 모듈
//!
//! legal-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;

use crate::api::{self, AppContext};
use crate::config::{collection_for, Settings};
use crate::knowledge::{find_source_file, IndexOutcome, VectorStoreManager, ALL_DOMAINS};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "legal-rag")]
#[command(version, about = "한국 법률 조문 RAG 질의응답 서비스", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    /// 생략 시 serve
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTP API 서버 실행 (시작 시 디렉토리 준비와 컬렉션 색인 수행)
    Serve,

    /// 데이터 디렉토리의 조문 파일로 컬렉션 재구축
    Index {
        /// 법률 분야 (예: civil, commercial_law). 생략 시 전체
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// 질문하고 답변을 스트리밍으로 출력
    Ask {
        /// 질문
        query: String,

        /// 법률 분야 ("all" = 전체)
        #[arg(short, long, default_value = ALL_DOMAINS)]
        law_type: String,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(settings).await,
        Commands::Index { domain } => cmd_index(settings, domain).await,
        Commands::Ask { query, law_type } => cmd_ask(settings, &query, &law_type).await,
        Commands::Status => cmd_status(settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 서버 명령어 (serve)
async fn cmd_serve(settings: Settings) -> Result<()> {
    let bind = settings.bind.clone();
    let ctx = Arc::new(AppContext::new(settings));
    api::serve(ctx, &bind).await
}

/// 색인 명령어 (index)
///
/// 지정한 분야(또는 전체)의 컬렉션을 지우고 다시 만듭니다.
async fn cmd_index(settings: Settings, domain: Option<String>) -> Result<()> {
    let collections = match domain {
        Some(domain) => vec![collection_for(&domain)],
        None => settings.collections.clone(),
    };

    settings.bootstrap_dirs()?;
    let ctx = AppContext::new(settings);

    for collection in &collections {
        println!("[*] 색인 중: {}", collection);

        let outcome = ctx
            .index_collection(collection, true)
            .await
            .with_context(|| format!("{} 색인 실패", collection))?;

        match outcome {
            IndexOutcome::Built(count) => println!("[OK] {}: {} 건 색인 완료", collection, count),
            IndexOutcome::Reused(count) => println!("[OK] {}: 기존 {} 건 유지", collection, count),
            IndexOutcome::NoSource => println!(
                "[!] {}: 데이터 파일 없음 ({})",
                collection,
                ctx.settings().domain_dir(collection).display()
            ),
        }
    }

    Ok(())
}

/// 질문 명령어 (ask)
///
/// 이미 구축된 컬렉션에서 검색하고, 사고 과정을 제거한 답변을 출력합니다.
async fn cmd_ask(settings: Settings, query: &str, law_type: &str) -> Result<()> {
    let ctx = AppContext::new(settings);
    let pipeline = ctx.pipeline().await?;

    println!("[*] 질문: \"{}\" ({})\n", query, law_type);

    let mut answer = pipeline.answer_stream(query, law_type);
    let mut stdout = std::io::stdout();

    while let Some(chunk) = answer.next().await {
        let chunk = chunk?;
        stdout.write_all(chunk.as_bytes())?;
        stdout.flush()?;
    }
    println!();

    Ok(())
}

/// 상태 명령어 (status)
///
/// 설정과 컬렉션별 색인 상태를 확인합니다.
async fn cmd_status(settings: Settings) -> Result<()> {
    println!("legal-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] Ollama: {} ({})", settings.ollama_base_url, settings.ollama_model);
    println!(
        "[*] 임베딩: {} ({})",
        settings.embedding_url(),
        settings.embedding_model
    );
    println!("[*] 장치: {}", settings.device);
    println!("[*] 데이터 디렉토리: {}", settings.data_root.display());
    println!("[*] 벡터 스토어: {}", settings.vector_store_path.display());
    println!();

    let store = match VectorStoreManager::open(&settings).await {
        Ok(store) => store,
        Err(e) => {
            println!("[!] 벡터 스토어 열기 실패: {:#}", e);
            return Ok(());
        }
    };

    for collection in &settings.collections {
        let source = find_source_file(&settings.domain_dir(collection));
        let source = source
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "데이터 파일 없음".to_string());

        if store.has_collection(collection).await? {
            let count = store.count(collection).await?;
            println!("[OK] {}: {} 건 ({})", collection, count, source);
        } else {
            println!("[!] {}: 미구축 ({})", collection, source);
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
