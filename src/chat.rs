use crate::llm::{self, ChatModel, LlmError, LlmMessage};
use crate::models::ChatTurn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

const HISTORY_TURNS: usize = 10;
const SUMMARY_INPUT_CHARS: usize = 3_000;
const MAX_QUICK_ACTIONS: usize = 3;

pub const MARKETING_SYSTEM_PROMPT: &str = "당신은 전문 마케팅 전략가이자 e-커머스 컨설턴트입니다.

역할:
1. 상품 마케팅 전략 제안
2. SWOT/3C 분석 해석 및 인사이트 제공
3. 상세페이지 구성 조언
4. 타겟 고객 분석
5. 경쟁사 대응 전략

답변 스타일:
- 구체적이고 실행 가능한 조언
- 데이터 기반 인사이트
- 간결하고 명확한 표현
- 필요시 단계별 가이드 제공

특별 기능:
사용자가 요청하면 다음 작업을 수행할 수 있습니다:
- \"/상세페이지 생성\" → 상세페이지 자동 생성
- \"/SWOT 분석\" → 경쟁사 분석 시작
- \"/키워드 추천\" → SEO 키워드 제안
- \"/가격 전략\" → 가격 포지셔닝 조언";

const SUMMARY_PROMPT: &str = "당신은 마케팅 전문가입니다.
제공된 내용을 다음 관점에서 요약하세요:
1. 주요 제품 특징
2. 가격 정보
3. 고객 리뷰 하이라이트
4. 경쟁 우위 요소

간결하고 핵심만 추출하세요.";

/// Prompt list for one chatbot turn: system prompt, optional project block,
/// the most recent history and the new message.
pub fn build_messages(
    message: &str,
    history: &[ChatTurn],
    context: Option<&str>,
    knowledge: Option<&str>,
) -> Vec<LlmMessage> {
    let mut messages = vec![LlmMessage::system(MARKETING_SYSTEM_PROMPT)];

    let mut parts = Vec::new();
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        parts.push(context.to_string());
    }
    if let Some(knowledge) = knowledge.filter(|k| !k.trim().is_empty()) {
        parts.push(format!("\n[SWOT 분석 결과]\n{knowledge}"));
    }
    if !parts.is_empty() {
        messages.push(LlmMessage::system(format!(
            "\n\n=== 현재 프로젝트 정보 ===\n{}",
            parts.join("\n")
        )));
    }

    let start = history.len().saturating_sub(HISTORY_TURNS);
    for turn in &history[start..] {
        match turn.role.as_str() {
            "user" => messages.push(LlmMessage::user(turn.content.clone())),
            "assistant" => messages.push(LlmMessage::assistant(turn.content.clone())),
            _ => {}
        }
    }
    messages.push(LlmMessage::user(message));
    messages
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub quick_actions: Vec<String>,
}

pub async fn reply(llm: &dyn ChatModel, messages: &[LlmMessage]) -> Result<ChatReply, LlmError> {
    let response = llm.chat(messages).await?.text;
    let quick_actions = detect_quick_actions(&response)
        .into_iter()
        .map(str::to_string)
        .collect();
    Ok(ChatReply {
        response,
        quick_actions,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickAction {
    SuggestKeywords,
    AnalyzeTarget,
    PriceStrategy,
}

impl FromStr for QuickAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "suggest_keywords" => Ok(Self::SuggestKeywords),
            "analyze_target" => Ok(Self::AnalyzeTarget),
            "price_strategy" => Ok(Self::PriceStrategy),
            other => Err(format!("알 수 없는 작업: {other}")),
        }
    }
}

impl QuickAction {
    pub fn prompt(self, product_info: &Value) -> String {
        let field = |keys: &[&str], default: &str| {
            keys.iter()
                .find_map(|k| match product_info.get(*k) {
                    Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                })
                .unwrap_or_else(|| default.to_string())
        };
        let name = field(&["name", "product_name"], "");
        match self {
            Self::SuggestKeywords => format!(
                "상품 정보:\n- 이름: {name}\n- 카테고리: {}\n\n위 상품에 적합한 SEO 키워드 10개를 추천하세요.\n검색량이 높고 경쟁이 낮은 롱테일 키워드 포함.\n\nJSON 형식으로 답변:\n{{\"keywords\": [\"키워드1\", \"키워드2\", ...]}}",
                field(&["category"], "")
            ),
            Self::AnalyzeTarget => format!(
                "상품: {name}\n\n이 상품의 주요 타겟 고객을 3가지 페르소나로 분석하세요:\n1. 인구통계학적 특성\n2. 구매 동기\n3. 페인 포인트\n\nJSON 형식으로 답변."
            ),
            Self::PriceStrategy => format!(
                "상품: {name}\n현재 가격: {}\n\n가격 전략을 제안하세요:\n1. 포지셔닝 (고가/중가/저가)\n2. 근거\n3. 프로모션 아이디어\n\nJSON 형식으로 답변.",
                field(&["price"], "미정")
            ),
        }
    }
}

pub async fn quick_action(
    llm: &dyn ChatModel,
    action: QuickAction,
    product_info: &Value,
) -> Result<String, LlmError> {
    llm::ask(llm, MARKETING_SYSTEM_PROMPT, action.prompt(product_info)).await
}

pub async fn suggestions(
    llm: &dyn ChatModel,
    product_name: &str,
    category: &str,
) -> Result<String, LlmError> {
    let prompt = format!(
        "상품: {product_name}\n카테고리: {category}\n\n이 상품의 마케팅 전략을 간략히 제안하세요:\n1. 핵심 셀링 포인트 3가지\n2. 주요 타겟 고객\n3. 추천 플랫폼 (쿠팡/네이버/11번가 등)\n4. 가격대 제안\n\n간결하고 실행 가능하게 작성하세요."
    );
    llm::ask(llm, MARKETING_SYSTEM_PROMPT, prompt).await
}

/// Only the first 3,000 characters are sent; without content the URL alone
/// is summarized.
pub async fn summarize_document(
    llm: &dyn ChatModel,
    url: &str,
    content: Option<&str>,
) -> Result<String, LlmError> {
    let content = content
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("URL: {url}"));
    let excerpt: String = content.chars().take(SUMMARY_INPUT_CHARS).collect();
    llm::ask(llm, SUMMARY_PROMPT, format!("다음 내용을 요약하세요:\n\n{excerpt}")).await
}

const ACTION_KEYWORDS: [(&str, &str); 5] = [
    ("상세페이지", "generate_page"),
    ("SWOT", "analyze_swot"),
    ("키워드", "suggest_keywords"),
    ("가격", "price_strategy"),
    ("타겟", "analyze_target"),
];

/// Follow-up buttons suggested by keywords in a reply, at most three.
pub fn detect_quick_actions(text: &str) -> Vec<&'static str> {
    ACTION_KEYWORDS
        .iter()
        .filter(|(keyword, _)| text.contains(keyword))
        .map(|(_, action)| *action)
        .take(MAX_QUICK_ACTIONS)
        .collect()
}
