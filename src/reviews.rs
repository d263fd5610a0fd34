use crate::llm::{self, ChatModel, LlmMessage, structured};
use crate::models::ProductInfo;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

const MAX_REVIEWS: usize = 20;
const MIN_REVIEW_CHARS: usize = 10;

static COUPANG_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#""review-content">([^<]+)<"#,
        r#""sdp-review__article__list__review__content">([^<]+)<"#,
    ])
});

static NAVER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r#""reviewContent":"([^"]+)""#,
        r#"class="review-text">([^<]+)<"#,
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("review pattern"))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub text: String,
    pub platform: String,
}

/// Pulls review snippets out of a marketplace page. Only coupang and naver
/// smartstore pages have known markup; anything else yields nothing.
pub fn extract_reviews(raw_content: &str, url: &str) -> Vec<Review> {
    let (platform, patterns) = if url.contains("coupang.com") {
        ("coupang", &*COUPANG_PATTERNS)
    } else if url.contains("smartstore.naver.com") {
        ("naver", &*NAVER_PATTERNS)
    } else {
        return Vec::new();
    };

    patterns
        .iter()
        .flat_map(|re| re.captures_iter(raw_content))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|text| text.chars().count() > MIN_REVIEW_CHARS)
        .take(MAX_REVIEWS)
        .map(|text| Review {
            text: text.to_string(),
            platform: platform.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub positive_points: Vec<String>,
    #[serde(default)]
    pub negative_points: Vec<String>,
    #[serde(default)]
    pub key_features: Vec<String>,
    #[serde(default)]
    pub customer_needs: Vec<String>,
}

impl ReviewAnalysis {
    fn with_summary(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }
}

const ANALYZE_PROMPT: &str = "당신은 상품 리뷰 분석 전문가입니다.
주어진 리뷰들을 분석하여 다음을 추출하세요:

1. 긍정적 평가 (3-5개)
2. 부정적 평가 (2-3개)
3. 자주 언급되는 주요 기능/특징 (3-5개)
4. 고객이 원하는 것 (니즈) (3-5개)

JSON 형식으로 반환:
{
  \"positive_points\": [\"항목1\", \"항목2\"],
  \"negative_points\": [\"항목1\", \"항목2\"],
  \"key_features\": [\"특징1\", \"특징2\"],
  \"customer_needs\": [\"니즈1\", \"니즈2\"]
}";

const INSIGHT_PROMPT: &str = "당신은 마케팅 전략가입니다.
경쟁사 리뷰 분석 결과를 바탕으로 자사 상품의 차별화 포인트와 마케팅 전략을 제안하세요.

다음 관점에서 분석:
1. 경쟁사의 약점을 우리 강점으로 전환
2. 고객이 원하는 것을 우리 상품에서 강조
3. 경쟁사가 놓친 니즈 발굴
4. 구체적인 카피/문구 제안

간결하고 실용적으로 작성하세요.";

pub const INSIGHT_FALLBACK: &str = "인사이트 생성 중 오류가 발생했습니다.";

pub struct ReviewAnalyzer {
    llm: Arc<dyn ChatModel>,
}

impl ReviewAnalyzer {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    pub async fn analyze(&self, reviews: &[Review], product_name: &str) -> ReviewAnalysis {
        if reviews.is_empty() {
            return ReviewAnalysis::with_summary("리뷰를 찾을 수 없습니다.");
        }

        let review_texts = reviews
            .iter()
            .take(15)
            .map(|r| format!("- {}", r.text))
            .collect::<Vec<_>>()
            .join("\n");
        let messages = [
            LlmMessage::system(ANALYZE_PROMPT),
            LlmMessage::user(format!("상품: {product_name}\n\n리뷰:\n{review_texts}")),
        ];

        match structured::request_object::<ReviewAnalysis>(self.llm.as_ref(), &messages).await {
            Ok(mut analysis) => {
                analysis.summary = format!("{}개의 리뷰를 분석했습니다.", reviews.len());
                analysis
            }
            Err(err) => {
                warn!(target = "studio.analysis", error = %err, "review_analysis_failed");
                crate::metrics::llm_fallback("reviews");
                ReviewAnalysis::with_summary(format!("리뷰 분석 중 오류 발생: {err}"))
            }
        }
    }

    pub async fn marketing_insights(
        &self,
        analysis: &ReviewAnalysis,
        product: &ProductInfo,
    ) -> String {
        let user = format!(
            "자사 상품: {} ({})\n타겟: {}\n\n경쟁사 리뷰 분석:\n긍정 평가: {}\n부정 평가: {}\n주요 기능: {}\n고객 니즈: {}\n\n마케팅 인사이트를 제공하세요.",
            product.product_name,
            product.category,
            product.target_customer,
            analysis.positive_points.join(", "),
            analysis.negative_points.join(", "),
            analysis.key_features.join(", "),
            analysis.customer_needs.join(", "),
        );
        match llm::ask(self.llm.as_ref(), INSIGHT_PROMPT, user).await {
            Ok(text) => text,
            Err(err) => {
                warn!(target = "studio.analysis", error = %err, "review_insight_failed");
                crate::metrics::llm_fallback("reviews");
                INSIGHT_FALLBACK.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    #[test]
    fn extracts_coupang_reviews_and_drops_short_ones() {
        let html = r#"<div class="review-content">배송이 빠르고 맛도 정말 좋아요</div>
<div class="review-content">좋아요</div>
<p class="sdp-review__article__list__review__content">재구매 의사 있습니다 아이들이 좋아해요</p>"#;
        let reviews = extract_reviews(html, "https://www.coupang.com/vp/products/1");
        assert_eq!(reviews.len(), 2);
        assert!(reviews.iter().all(|r| r.platform == "coupang"));
        assert_eq!(reviews[0].text, "배송이 빠르고 맛도 정말 좋아요");
    }

    #[test]
    fn extracts_naver_json_reviews() {
        let raw = r#"{"reviewContent":"포장이 꼼꼼하고 사은품도 챙겨주셨어요"}"#;
        let reviews = extract_reviews(raw, "https://smartstore.naver.com/shop/products/9");
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].platform, "naver");
    }

    #[test]
    fn caps_at_twenty_reviews() {
        let raw = r#"<span class="review-text">이 제품은 정말 만족스럽습니다</span>"#.repeat(30);
        let reviews = extract_reviews(&raw, "https://smartstore.naver.com/a");
        assert_eq!(reviews.len(), MAX_REVIEWS);
    }

    #[test]
    fn unknown_site_yields_nothing() {
        let raw = r#"<div class="review-content">아주 아주 좋은 상품이에요</div>"#;
        assert!(extract_reviews(raw, "https://example.com/item").is_empty());
    }

    #[tokio::test]
    async fn empty_reviews_skip_the_model() {
        let llm = Arc::new(ScriptedModel::failing());
        let analyzer = ReviewAnalyzer::new(llm.clone());
        let analysis = analyzer.analyze(&[], "감자칩").await;
        assert_eq!(analysis.summary, "리뷰를 찾을 수 없습니다.");
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn analysis_counts_reviews() {
        let llm = Arc::new(ScriptedModel::replying(&[
            r#"{"positive_points":["맛"],"negative_points":["가격"],"key_features":[],"customer_needs":["소포장"]}"#,
        ]));
        let analyzer = ReviewAnalyzer::new(llm);
        let reviews = vec![Review {
            text: "맛있어요 또 살게요 정말로".into(),
            platform: "coupang".into(),
        }];
        let analysis = analyzer.analyze(&reviews, "감자칩").await;
        assert_eq!(analysis.summary, "1개의 리뷰를 분석했습니다.");
        assert_eq!(analysis.customer_needs, vec!["소포장"]);
    }

    #[tokio::test]
    async fn insight_failure_uses_fixed_sentence() {
        let analyzer = ReviewAnalyzer::new(Arc::new(ScriptedModel::failing()));
        let text = analyzer
            .marketing_insights(&ReviewAnalysis::default(), &ProductInfo::default())
            .await;
        assert_eq!(text, INSIGHT_FALLBACK);
    }
}
