use crate::insights::CompetitorInsights;
use crate::llm::{ChatModel, LlmMessage, structured};
use crate::models::ProductInput;
use serde::{Deserialize, Serialize};
use tracing::warn;

const MAX_POINTS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellingPoint {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub evidence: Option<String>,
}

impl SellingPoint {
    fn new(title: impl Into<String>, description: impl Into<String>, evidence: Option<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            evidence,
        }
    }
}

const SYSTEM_PROMPT: &str = r#"당신은 e-커머스 마케팅 카피라이터입니다.
상품 정보와 경쟁사 분석을 바탕으로 강력한 USP(Unique Selling Points)를 생성하세요.

각 셀링 포인트는:
1. **간결한 제목** (5-10자)
2. **설명** (20-40자)
3. **증거/근거** (선택적, 있으면 신뢰도 향상)

형식 (JSON):
[
  {
    "title": "셀링 포인트 제목",
    "description": "구체적인 설명",
    "evidence": "증거나 데이터 (선택)"
  }
]

원칙:
- 경쟁사와 차별화되는 점 강조
- 고객 불만을 해결하는 포인트 우선
- 구체적인 숫자나 사실 활용
- 감성적 + 이성적 균형"#;

pub async fn generate(
    llm: &dyn ChatModel,
    product: &ProductInput,
    insights: &CompetitorInsights,
) -> Vec<SellingPoint> {
    let messages = [
        LlmMessage::system(SYSTEM_PROMPT),
        LlmMessage::user(user_prompt(product, insights)),
    ];
    match structured::request_array::<Vec<SellingPoint>>(llm, &messages).await {
        Ok(points) if !points.is_empty() => points.into_iter().take(MAX_POINTS).collect(),
        Ok(_) => {
            warn!(target = "studio.content", "selling_points_empty");
            default_points(product)
        }
        Err(err) => {
            warn!(target = "studio.content", error = %err, "selling_points_fallback");
            crate::metrics::llm_fallback("selling_points");
            default_points(product)
        }
    }
}

fn user_prompt(product: &ProductInput, insights: &CompetitorInsights) -> String {
    let specs = product
        .specs
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut prompt = format!(
        "상품 정보:\n- 이름: {}\n- 카테고리: {}\n- 주요 스펙: {}\n- 키워드: {}\n- 제조국: {}\n\n경쟁사 인사이트:\n- 공통 포인트: {}\n- 고객 불만: {}\n- 가격 포지셔닝: {}",
        product.product_name,
        product.category,
        specs,
        product.keywords.join(", "),
        product.manufacture_country,
        insights.common_points.join(", "),
        insights.customer_complaints.join(", "),
        insights.price_positioning.as_deref().unwrap_or("중가"),
    );
    if let Some(review) = product.review_insights.as_deref() {
        prompt.push_str(&format!("\n\n경쟁사 리뷰 인사이트:\n{review}"));
    }
    prompt.push_str("\n\n3-6개의 강력한 USP를 생성해주세요.");
    prompt
}

pub fn default_points(product: &ProductInput) -> Vec<SellingPoint> {
    let country = if product.manufacture_country.trim().is_empty() {
        "국내"
    } else {
        product.manufacture_country.as_str()
    };
    let mut points = vec![
        SellingPoint::new(
            "최상의 품질",
            format!("{country} 제조로 품질 보증"),
            Some(format!("{country} 생산")),
        ),
        SellingPoint::new("합리적 가격", "가성비 최고의 선택", None),
    ];
    points.extend(
        product
            .specs
            .iter()
            .take(2)
            .map(|(k, v)| SellingPoint::new(k.clone(), format!("{k}: {v}"), Some(v.clone()))),
    );
    points.extend(
        product
            .keywords
            .iter()
            .take(2)
            .map(|kw| SellingPoint::new(kw.clone(), format!("{kw} 특화 제품"), None)),
    );
    points.truncate(MAX_POINTS);
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::models::sample_product;

    #[tokio::test]
    async fn caps_model_points_at_six() {
        let many = (0..9)
            .map(|i| format!(r#"{{"title":"포인트{i}","description":"설명{i}"}}"#))
            .collect::<Vec<_>>()
            .join(",");
        let llm = ScriptedModel::new(vec![Ok(format!("[{many}]"))]);
        let points = generate(&llm, &sample_product(), &CompetitorInsights::default()).await;
        assert_eq!(points.len(), MAX_POINTS);
        assert_eq!(points[0].title, "포인트0");
        assert_eq!(points[0].evidence, None);
    }

    #[tokio::test]
    async fn failure_builds_defaults_from_input() {
        let product = sample_product();
        let points = generate(&ScriptedModel::failing(), &product, &CompetitorInsights::default()).await;
        let titles: Vec<_> = points.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["최상의 품질", "합리적 가격", "유통기한", "중량", "저칼로리", "간식"]);
        assert_eq!(points[0].description, "대한민국 제조로 품질 보증");
        assert_eq!(points[3].description, "중량: 120g");
    }
}
