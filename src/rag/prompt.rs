//! 법률 상담 프롬프트

/// 시스템 프롬프트 (`{context}`, `{question}` 치환)
pub const SYSTEM_TEMPLATE: &str = "당신은 한국 법률 전문 AI 어시스턴트입니다.
다음 법률 문서 컨텍스트를 참고하여 사용자의 법률 관련 질문에 정확하고 도움이 되는 답변을 제공하세요.
컨텍스트에 관련 정보가 없는 경우, \"제가 가진 정보로는 답변드리기 어렵습니다\"라고 정직하게 답변하세요.

컨텍스트:
{context}

사용자 질문: {question}

답변 작성 지침:
1. 법률 용어는 정확하게 사용하세요.
2. 관련 법조항이 있다면 명시하세요.
3. 복잡한 개념은 쉽게 풀어서 설명하세요.
4. 확실하지 않은 내용에 대해서는 단정적으로 답변하지 마세요.
5. 법률 조언이 아닌 정보 제공 차원의 답변임을 명시하세요.
";

/// 컨텍스트와 질문으로 프롬프트 구성
pub fn build_prompt(context: &str, question: &str) -> String {
    // 입력 안의 자리표시자가 다시 치환되지 않도록 템플릿 조각 단위로 조립
    match SYSTEM_TEMPLATE.split_once("{question}") {
        Some((head, tail)) => {
            let mut prompt = head.replace("{context}", context);
            prompt.push_str(question);
            prompt.push_str(tail);
            prompt
        }
        None => SYSTEM_TEMPLATE.replace("{context}", context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt("상법 제1조 상사적용법규", "상관습법은 언제 적용되나요?");

        assert!(prompt.starts_with("당신은 한국 법률 전문 AI 어시스턴트입니다."));
        assert!(prompt.contains("컨텍스트:\n상법 제1조 상사적용법규\n"));
        assert!(prompt.contains("사용자 질문: 상관습법은 언제 적용되나요?\n"));
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn test_placeholders_in_input_are_literal() {
        let prompt = build_prompt("문맥 {question}", "질문 {context}");
        assert!(prompt.contains("컨텍스트:\n문맥 {question}\n"));
        assert!(prompt.contains("사용자 질문: 질문 {context}\n"));
    }
}
