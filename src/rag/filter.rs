//! 사고 과정 태그 필터
//!
//! 추론 모델은 답변 앞에 `<think>...</think>` 블록으로 사고 과정을 출력합니다.
//! 스트리밍 중에는 태그가 여러 조각에 걸쳐 도착하므로, 태그 판별이 끝날 때까지
//! 필요한 만큼만 버퍼에 남기고 나머지를 즉시 내보냅니다.
//!
//! 보장:
//! - 태그 내부 텍스트와 태그 문자 자체는 절대 출력되지 않음
//! - 어떤 방식으로 조각을 나눠도 출력을 이어 붙이면 한 번에 처리한 결과와 같음
//! - 태그가 없는 텍스트는 그대로 통과

use std::sync::OnceLock;

use regex::Regex;

/// 사고 과정 시작 태그
pub const THINK_START: &str = "<think>";
/// 사고 과정 종료 태그
pub const THINK_END: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterState {
    /// 태그 밖: 보이는 텍스트
    Scanning,
    /// 시작 태그 이후, 종료 태그 대기 중
    InThought,
}

/// 스트리밍 태그 필터 (요청 하나당 하나)
#[derive(Debug, Clone)]
pub struct ThinkFilter {
    start_tag: String,
    end_tag: String,
    state: FilterState,
    buffer: String,
}

impl Default for ThinkFilter {
    fn default() -> Self {
        Self::with_tags(THINK_START, THINK_END)
    }
}

impl ThinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 임의의 태그 쌍으로 생성
    pub fn with_tags(start_tag: impl Into<String>, end_tag: impl Into<String>) -> Self {
        Self {
            start_tag: start_tag.into(),
            end_tag: end_tag.into(),
            state: FilterState::Scanning,
            buffer: String::new(),
        }
    }

    /// 사고 블록 내부인지 여부
    pub fn in_thought(&self) -> bool {
        self.state == FilterState::InThought
    }

    /// 조각 추가, 지금 내보낼 수 있는 텍스트 반환 (없으면 빈 문자열)
    pub fn push(&mut self, fragment: &str) -> String {
        self.buffer.push_str(fragment);
        let mut visible = String::new();

        loop {
            match self.state {
                FilterState::Scanning => match self.buffer.find(&self.start_tag) {
                    Some(pos) => {
                        visible.push_str(&self.buffer[..pos]);
                        self.buffer.drain(..pos + self.start_tag.len());
                        self.state = FilterState::InThought;
                    }
                    None => {
                        // 끝부분이 시작 태그의 앞부분일 수 있으면 보류
                        let held = partial_tag_len(&self.buffer, &self.start_tag);
                        let emit_to = self.buffer.len() - held;
                        visible.push_str(&self.buffer[..emit_to]);
                        self.buffer.drain(..emit_to);
                        break;
                    }
                },
                FilterState::InThought => match self.buffer.find(&self.end_tag) {
                    Some(pos) => {
                        self.buffer.drain(..pos + self.end_tag.len());
                        self.state = FilterState::Scanning;
                    }
                    None => {
                        // 종료 태그 판별에 필요한 끝부분만 유지
                        let held = partial_tag_len(&self.buffer, &self.end_tag);
                        let discard_to = self.buffer.len() - held;
                        self.buffer.drain(..discard_to);
                        break;
                    }
                },
            }
        }

        visible
    }

    /// 스트림 종료 처리
    ///
    /// 닫히지 않은 사고 블록은 버리고, 보류 중이던 태그 앞부분은 일반 텍스트로 내보냅니다.
    pub fn finish(&mut self) -> String {
        let residual = std::mem::take(&mut self.buffer);
        let state = std::mem::replace(&mut self.state, FilterState::Scanning);

        match state {
            FilterState::Scanning => strip_think_tags(&residual).trim().to_string(),
            FilterState::InThought => String::new(),
        }
    }
}

/// `text` 끝부분 중 `tag`의 진부분 접두사와 일치하는 가장 긴 길이 (바이트)
fn partial_tag_len(text: &str, tag: &str) -> usize {
    let max = tag.len().saturating_sub(1).min(text.len());
    (1..=max)
        .rev()
        .find(|&len| tag.is_char_boundary(len) && text.ends_with(&tag[..len]))
        .unwrap_or(0)
}

fn think_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // 닫힌 블록 또는 끝까지 닫히지 않은 블록
        Regex::new(r"(?s)<think>.*?</think>|<think>.*\z").expect("valid think-tag pattern")
    })
}

/// 완성된 텍스트에서 사고 블록 제거 (단발 응답용)
///
/// 기본 태그(`<think>`, `</think>`)에 대해 `ThinkFilter` 스트리밍 결과와 동일합니다.
pub fn strip_think_tags(text: &str) -> String {
    think_block_regex().replace_all(text, "").into_owned()
}

// ============================================================================
// Tests
// ============================================================================
