use crate::llm::{self, ChatModel, structured};
use crate::search::CompetitorData;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetitorInsights {
    #[serde(default)]
    pub common_points: Vec<String>,
    #[serde(default)]
    pub customer_complaints: Vec<String>,
    #[serde(default)]
    pub price_positioning: Option<String>,
    #[serde(default)]
    pub visual_patterns: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl CompetitorInsights {
    pub fn no_data() -> Self {
        Self {
            summary: "경쟁사 데이터 없음".into(),
            ..Default::default()
        }
    }

    fn defaults(reason: &str) -> Self {
        Self {
            common_points: strings(&["품질 강조", "빠른 배송", "가성비"]),
            customer_complaints: strings(&["사이즈 불만", "포장 문제"]),
            price_positioning: Some("중가".into()),
            visual_patterns: strings(&["제품 단독 이미지", "사용 장면"]),
            summary: format!("분석 중 오류 발생: {reason}"),
        }
    }

    /// Reads a model JSON answer without trusting its value types: lists may
    /// hold objects and the price field may be a nested structure.
    fn from_json(value: &Value) -> Self {
        Self {
            common_points: string_list(value.get("common_points")),
            customer_complaints: string_list(value.get("customer_complaints")),
            price_positioning: value.get("price_positioning").and_then(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }),
            visual_patterns: string_list(value.get("visual_patterns")),
            summary: value
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Fallback for prose answers: sections are found by their Korean
    /// headings and bullets are `-` or `•` lines.
    fn from_text(text: &str) -> Self {
        Self {
            common_points: section_list(text, "공통"),
            customer_complaints: section_list(text, "불만"),
            price_positioning: Some(section_text(text, "가격")).filter(|s| !s.is_empty()),
            visual_patterns: section_list(text, "시각"),
            summary: text.chars().take(200).collect(),
        }
    }
}

const SYSTEM_PROMPT: &str = "당신은 e-커머스 경쟁 분석 전문가입니다.
제공된 경쟁 상품 정보를 분석하여 다음을 추출하세요:

1. **공통 셀링 포인트**: 여러 경쟁사가 강조하는 공통 특징 (3-5개)
2. **고객 불만 사항**: 리뷰나 Q&A에서 언급되는 문제점 (3-5개)
3. **가격 포지셔닝**: 경쟁사의 평균 가격대 및 전략
4. **시각적 패턴**: 상세페이지에서 자주 사용되는 이미지 스타일이나 레이아웃

JSON 형식으로 답변하세요. 키: common_points, customer_complaints, price_positioning, visual_patterns, summary";

pub async fn summarize(llm: &dyn ChatModel, data: &CompetitorData) -> CompetitorInsights {
    if data.success_count() == 0 {
        return CompetitorInsights::no_data();
    }

    let combined = data
        .records()
        .take(10)
        .map(|r| format!("제목: {}\n내용: {}", r.title, r.snippet))
        .collect::<Vec<_>>()
        .join("\n\n");
    let user = format!("경쟁 상품 정보:\n\n{combined}\n\n위 정보를 분석하여 인사이트를 추출해주세요.");

    match llm::ask(llm, SYSTEM_PROMPT, user).await {
        Ok(text) => match structured::extract_json_object(&text) {
            Ok(value) => CompetitorInsights::from_json(&value),
            Err(_) => CompetitorInsights::from_text(&text),
        },
        Err(err) => {
            warn!(target = "studio.analysis", error = %err, "competitor_insights_failed");
            crate::metrics::llm_fallback("insights");
            CompetitorInsights::defaults(&err.to_string())
        }
    }
}

fn section_body<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let pattern = format!(r"(?is){}[^:]*:\s*(.+?)(?:\n\n|\z)", regex::escape(keyword));
    let re = Regex::new(&pattern).ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn section_list(text: &str, keyword: &str) -> Vec<String> {
    let Some(body) = section_body(text, keyword) else {
        return Vec::new();
    };
    body.lines()
        .filter_map(|line| {
            let line = line.trim_start();
            line.strip_prefix('-')
                .or_else(|| line.strip_prefix('•'))
                .map(|item| item.trim().to_string())
        })
        .filter(|item| !item.is_empty())
        .take(5)
        .collect()
}

fn section_text(text: &str, keyword: &str) -> String {
    section_body(text, keyword)
        .map(|body| body.trim().chars().take(100).collect())
        .unwrap_or_default()
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::search::{CompetitorRecord, SearchHit};

    fn one_hit() -> CompetitorData {
        CompetitorData::from_records(vec![CompetitorRecord::new(
            "coupang",
            "감자칩",
            "https://www.coupang.com/vp/products/1",
            "바삭한 식감",
        )])
    }

    #[tokio::test]
    async fn no_successful_hits_short_circuits() {
        let llm = ScriptedModel::failing();
        let data = CompetitorData {
            results: vec![SearchHit::Failed {
                platform: "naver".into(),
                error: "down".into(),
            }],
            ..Default::default()
        };
        let insights = summarize(&llm, &data).await;
        assert_eq!(insights.summary, "경쟁사 데이터 없음");
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn json_answer_is_read_leniently() {
        let llm = ScriptedModel::replying(&[
            r#"```json
{"common_points": ["바삭함", {"point": "저칼로리"}], "price_positioning": {"avg": "1만원대"}, "visual_patterns": "흰 배경"}
```"#,
        ]);
        let insights = summarize(&llm, &one_hit()).await;
        assert_eq!(insights.common_points.len(), 2);
        assert_eq!(insights.visual_patterns, vec!["흰 배경"]);
        assert!(insights.price_positioning.is_some());
    }

    #[tokio::test]
    async fn prose_answer_is_split_by_headings() {
        let llm = ScriptedModel::replying(&[
            "공통 셀링 포인트:\n- 바삭함\n• 국산 감자\n\n고객 불만 사항:\n- 양이 적음\n\n가격 포지셔닝: 1만원대 중가\n\n시각적 패턴:\n- 클로즈업",
        ]);
        let insights = summarize(&llm, &one_hit()).await;
        assert_eq!(insights.common_points, vec!["바삭함", "국산 감자"]);
        assert_eq!(insights.customer_complaints, vec!["양이 적음"]);
        assert_eq!(insights.price_positioning.as_deref(), Some("1만원대 중가"));
        assert_eq!(insights.visual_patterns, vec!["클로즈업"]);
    }

    #[tokio::test]
    async fn outage_yields_default_insights() {
        let insights = summarize(&ScriptedModel::failing(), &one_hit()).await;
        assert_eq!(insights.common_points, vec!["품질 강조", "빠른 배송", "가성비"]);
        assert_eq!(insights.price_positioning.as_deref(), Some("중가"));
    }
}
