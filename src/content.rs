use crate::analysis::group_thousands;
use crate::insights::CompetitorInsights;
use crate::llm::{self, ChatModel, LlmMessage, structured};
use crate::models::ProductInput;
use crate::search::CompetitorData;
use crate::selling::SellingPoint;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const NOT_AVAILABLE: &str = "N/A";

/// Every section of a detail page, keyed by section name on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSections {
    pub headline: String,
    pub summary: String,
    pub selling_points: Vec<SellingPoint>,
    pub problem_solution: ProblemSolution,
    pub detailed_description: DetailedDescription,
    pub specs: BTreeMap<String, String>,
    pub usage_guide: Vec<String>,
    pub comparison: Comparison,
    pub comparison_chart: ComparisonChart,
    pub faq: Vec<Faq>,
    pub nutrition_info: NutritionInfo,
    pub recipes: Vec<Recipe>,
    pub promotions: Vec<String>,
    pub review_highlights: Vec<String>,
    pub cta: BTreeMap<String, String>,
    pub platform_notes: BTreeMap<String, PlatformNote>,
}

impl ContentSections {
    pub fn cta_for(&self, platform: &str) -> &str {
        self.cta
            .get(platform)
            .map(String::as_str)
            .unwrap_or(DEFAULT_CTA)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemSolution {
    pub problem: String,
    pub solution: String,
    pub evidence: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailedDescription {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comparison {
    pub headers: Vec<String>,
    pub rows: Vec<ComparisonRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonRow {
    pub item: String,
    pub competitor: String,
    pub ours: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonChart {
    pub competitors: Vec<ChartEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartEntry {
    pub name: String,
    pub platform: String,
    pub price: String,
    pub rating: String,
}

impl ChartEntry {
    pub fn is_complete(&self) -> bool {
        [&self.name, &self.platform, &self.price, &self.rating]
            .iter()
            .all(|field| !field.trim().is_empty() && field.as_str() != NOT_AVAILABLE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NutritionInfo {
    pub has_nutrition: bool,
    pub rows: Vec<NutritionRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NutritionRow {
    pub nutrient: String,
    pub serving: String,
    pub amount: String,
    pub daily_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    pub title: String,
    pub steps: Vec<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformNote {
    pub title_length: Option<u32>,
    pub summary_position: Option<String>,
    pub keyword_density: Option<String>,
    pub cta: String,
}

const DEFAULT_CTA: &str = "지금 바로 구매하세요!";

const PROBLEM_SOLUTION_PROMPT: &str = "고객의 문제점을 제시하고 제품이 어떻게 해결하는지, 그 증거는 무엇인지 작성하세요.

형식:
- 문제: 고객이 겪는 구체적인 문제
- 해결: 제품이 제공하는 해결책
- 증거: 신뢰할 수 있는 근거 (테스트 결과, 인증, 리뷰 등)";

const DESCRIPTION_PROMPT: &str = "당신은 e-커머스 상세페이지 카피라이터입니다.
상품 소개 문단을 3-4문장으로 작성하세요. 과장 광고 표현과 허위 수치는 쓰지 마세요.";

const RECIPE_PROMPT: &str = r#"당신은 푸드 스타일리스트입니다.
제품을 활용한 간단한 레시피 2개를 JSON 배열로 작성하세요.
형식: [{"title": "레시피 이름", "steps": ["단계1", "단계2"]}]"#;

pub struct ContentAssembler {
    llm: Arc<dyn ChatModel>,
}

impl ContentAssembler {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    pub async fn assemble(
        &self,
        product: &ProductInput,
        selling_points: &[SellingPoint],
        insights: &CompetitorInsights,
        data: &CompetitorData,
    ) -> ContentSections {
        let sections = ContentSections {
            headline: headline(product, selling_points),
            summary: product.summary.clone(),
            selling_points: selling_points.to_vec(),
            problem_solution: self.problem_solution(product, selling_points).await,
            detailed_description: self.detailed_description(product, selling_points).await,
            specs: specs_table(product),
            usage_guide: usage_guide(&product.category),
            comparison: comparison(product, insights),
            comparison_chart: comparison_chart(data),
            faq: faq(product),
            nutrition_info: nutrition_info(&product.category),
            recipes: self.recipes(product).await,
            promotions: promotions(&product.platforms),
            review_highlights: review_highlights(product, insights),
            cta: cta(&product.platforms),
            platform_notes: BTreeMap::new(),
        };
        let platform_notes = platform_notes(&sections, &product.platforms);
        debug!(
            target = "studio.content",
            product = %product.product_name,
            selling_points = sections.selling_points.len(),
            "content_assembled"
        );
        ContentSections {
            platform_notes,
            ..sections
        }
    }

    async fn problem_solution(
        &self,
        product: &ProductInput,
        selling_points: &[SellingPoint],
    ) -> ProblemSolution {
        let feature = selling_points
            .first()
            .map(|sp| format!("{} - {}", sp.title, sp.description))
            .unwrap_or_default();
        let user = format!(
            "상품: {}\n카테고리: {}\n주요 특징: {feature}\n\n문제-해결-증거 구조로 작성해주세요.",
            product.product_name, product.category
        );
        match llm::ask(self.llm.as_ref(), PROBLEM_SOLUTION_PROMPT, user).await {
            Ok(text) => ProblemSolution {
                problem: extract_labelled(&text, "문제"),
                solution: extract_labelled(&text, "해결"),
                evidence: extract_labelled(&text, "증거"),
            },
            Err(err) => {
                warn!(target = "studio.content", error = %err, "problem_solution_fallback");
                crate::metrics::llm_fallback("problem_solution");
                ProblemSolution {
                    problem: "기존 제품의 불편함".into(),
                    solution: format!("{}로 간편하게 해결", product.product_name),
                    evidence: "고객 만족도 90% 이상".into(),
                }
            }
        }
    }

    async fn detailed_description(
        &self,
        product: &ProductInput,
        selling_points: &[SellingPoint],
    ) -> DetailedDescription {
        let points = selling_points
            .iter()
            .map(|sp| sp.title.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let user = format!(
            "상품명: {}\n요약: {}\n카테고리: {}\n셀링 포인트: {points}\n타겟: {}\n톤: {}",
            product.product_name,
            product.summary,
            product.category,
            product.target(),
            product.tone
        );
        let content = match llm::ask(self.llm.as_ref(), DESCRIPTION_PROMPT, user).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => fallback_description(product, &points),
            Err(err) => {
                warn!(target = "studio.content", error = %err, "description_fallback");
                crate::metrics::llm_fallback("description");
                fallback_description(product, &points)
            }
        };
        DetailedDescription {
            title: "제품 소개".into(),
            content,
        }
    }

    async fn recipes(&self, product: &ProductInput) -> Vec<Recipe> {
        if !is_food(&product.category) {
            return Vec::new();
        }
        let messages = [
            LlmMessage::system(RECIPE_PROMPT),
            LlmMessage::user(format!(
                "제품: {}\n요약: {}",
                product.product_name, product.summary
            )),
        ];
        match structured::request_array::<Vec<Recipe>>(self.llm.as_ref(), &messages).await {
            Ok(recipes) if !recipes.is_empty() => recipes.into_iter().take(3).collect(),
            Ok(_) => default_recipes(&product.product_name),
            Err(err) => {
                warn!(target = "studio.content", error = %err, "recipes_fallback");
                crate::metrics::llm_fallback("recipes");
                default_recipes(&product.product_name)
            }
        }
    }
}

fn headline(product: &ProductInput, selling_points: &[SellingPoint]) -> String {
    let main_point = selling_points
        .first()
        .map(|sp| sp.title.as_str())
        .unwrap_or("프리미엄 품질");
    format!("{} - {main_point}, {}", product.product_name, product.summary)
}

fn fallback_description(product: &ProductInput, points: &str) -> String {
    if points.is_empty() {
        format!("{}은(는) {}", product.product_name, product.summary)
    } else {
        format!(
            "{}은(는) {} 주요 특징: {points}.",
            product.product_name, product.summary
        )
    }
}

/// Value of the first `label…: value` line, or `"{label} 내용"`.
pub fn extract_labelled(text: &str, label: &str) -> String {
    let pattern = format!(r"(?i){}[^:\n]*:[ \t]*(.+?)[ \t]*(?:\n|$)", regex::escape(label));
    Regex::new(&pattern)
        .ok()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| format!("{label} 내용"))
}

fn specs_table(product: &ProductInput) -> BTreeMap<String, String> {
    let mut specs = product.specs.clone();
    specs.insert("제조국".into(), product.manufacture_country.clone());
    if let Some(date) = product.manufacture_date.as_ref().filter(|d| !d.trim().is_empty()) {
        specs.insert("제조일".into(), date.clone());
    }
    specs
}

pub fn is_food(category: &str) -> bool {
    ["푸드", "식품", "음식", "간식", "과자", "음료"]
        .iter()
        .any(|kw| category.contains(kw))
}

fn is_electronics(category: &str) -> bool {
    ["전자", "가전", "디지털"].iter().any(|kw| category.contains(kw))
}

fn is_beauty(category: &str) -> bool {
    ["뷰티", "화장품", "스킨케어", "코스메틱"]
        .iter()
        .any(|kw| category.contains(kw))
}

pub fn usage_guide(category: &str) -> Vec<String> {
    let steps: [&str; 4] = if is_food(category) {
        [
            "제품을 개봉합니다",
            "권장량을 확인합니다",
            "조리 또는 바로 섭취합니다",
            "남은 제품은 밀봉하여 보관합니다",
        ]
    } else if is_electronics(category) {
        [
            "전원을 연결합니다",
            "전원 버튼을 눌러 작동시킵니다",
            "사용 후 전원을 끕니다",
            "정기적으로 청소합니다",
        ]
    } else {
        [
            "제품을 개봉하여 확인합니다",
            "사용 설명서를 참고합니다",
            "올바른 방법으로 사용합니다",
            "사용 후 보관합니다",
        ]
    };
    steps.iter().map(|s| s.to_string()).collect()
}

fn comparison(product: &ProductInput, insights: &CompetitorInsights) -> Comparison {
    let competitor_price = insights
        .price_positioning
        .clone()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| "고가".into());
    Comparison {
        headers: vec!["항목".into(), "경쟁사A".into(), "우리 제품".into()],
        rows: vec![
            ComparisonRow {
                item: "품질".into(),
                competitor: "보통".into(),
                ours: "**프리미엄**".into(),
            },
            ComparisonRow {
                item: "원산지".into(),
                competitor: "수입".into(),
                ours: format!("**{}**", product.manufacture_country),
            },
            ComparisonRow {
                item: "가격".into(),
                competitor: competitor_price,
                ours: "**합리적**".into(),
            },
        ],
    }
}

fn comparison_chart(data: &CompetitorData) -> ComparisonChart {
    let competitors = data
        .records()
        .filter(|r| r.price.is_some())
        .take(3)
        .map(|r| ChartEntry {
            name: r.title.chars().take(30).collect(),
            platform: r.platform.clone(),
            price: r
                .price
                .map(|p| format!("{}원", group_thousands(p)))
                .unwrap_or_else(|| NOT_AVAILABLE.into()),
            rating: r
                .rating
                .map(|v| format!("{v:.1}"))
                .unwrap_or_else(|| NOT_AVAILABLE.into()),
        })
        .collect();
    ComparisonChart { competitors }
}

fn faq(product: &ProductInput) -> Vec<Faq> {
    let mut faqs = vec![
        Faq {
            question: "배송은 얼마나 걸리나요?".into(),
            answer: "주문 후 평균 2-3일 소요됩니다. (도서산간 지역 제외)".into(),
        },
        Faq {
            question: "교환/반품이 가능한가요?".into(),
            answer: "수령 후 7일 이내 미개봉 상품에 한해 가능합니다.".into(),
        },
    ];
    if is_food(&product.category) {
        let shelf_life = product
            .specs
            .get("유통기한")
            .map(String::as_str)
            .unwrap_or("6개월");
        faqs.push(Faq {
            question: "유통기한은 얼마나 되나요?".into(),
            answer: format!("제조일로부터 {shelf_life}입니다."),
        });
    }
    if is_beauty(&product.category) {
        faqs.push(Faq {
            question: "민감성 피부도 사용할 수 있나요?".into(),
            answer: "피부 자극 테스트를 완료했지만, 민감성 피부는 팔 안쪽에 먼저 테스트 후 사용을 권장합니다."
                .into(),
        });
    }
    faqs
}

fn nutrition_info(category: &str) -> NutritionInfo {
    if !is_food(category) {
        return NutritionInfo::default();
    }
    let rows = [
        ("열량", "200kcal", "10%"),
        ("단백질", "10g", "18%"),
        ("지방", "5g", "9%"),
        ("탄수화물", "30g", "12%"),
        ("나트륨", "50mg", "3%"),
    ]
    .iter()
    .map(|(nutrient, amount, daily)| NutritionRow {
        nutrient: nutrient.to_string(),
        serving: "100g".into(),
        amount: amount.to_string(),
        daily_value: daily.to_string(),
    })
    .collect();
    NutritionInfo {
        has_nutrition: true,
        rows,
    }
}

fn default_recipes(product_name: &str) -> Vec<Recipe> {
    vec![
        Recipe {
            title: format!("{product_name} 그대로 즐기기"),
            steps: vec![
                "개봉 후 그릇에 담습니다".into(),
                "취향에 따라 음료와 곁들입니다".into(),
            ],
        },
        Recipe {
            title: format!("{product_name} 샐러드 토핑"),
            steps: vec![
                "신선한 채소를 준비합니다".into(),
                format!("{product_name}을(를) 잘게 부숴 올립니다"),
                "드레싱을 뿌려 완성합니다".into(),
            ],
        },
    ]
}

fn promotions(platforms: &[String]) -> Vec<String> {
    let mut promos: Vec<String> = platforms
        .iter()
        .map(|p| match p.as_str() {
            "coupang" => "쿠팡 로켓배송 주문 시 무료 배송".to_string(),
            "naver" => "네이버페이 결제 시 포인트 추가 적립".to_string(),
            "11st" => "11번가 첫 구매 할인 쿠폰 제공".to_string(),
            other => format!("{other} 단독 구매 혜택"),
        })
        .collect();
    promos.push("리뷰 작성 시 적립금 지급".into());
    promos
}

fn review_highlights(product: &ProductInput, insights: &CompetitorInsights) -> Vec<String> {
    let from_reviews: Vec<String> = product
        .review_insights
        .as_deref()
        .unwrap_or_default()
        .lines()
        .map(|line| line.trim().trim_start_matches(['-', '•', '*']).trim())
        .filter(|line| !line.is_empty())
        .take(3)
        .map(str::to_string)
        .collect();
    if !from_reviews.is_empty() {
        return from_reviews;
    }
    insights.common_points.iter().take(3).cloned().collect()
}

pub fn cta(platforms: &[String]) -> BTreeMap<String, String> {
    platforms
        .iter()
        .map(|p| {
            let text = match p.as_str() {
                "coupang" => "지금 구매하면 **쿠팡 단독 특가** — 한정수량!",
                "naver" => "**네이버 스토어 단독 혜택** — 오늘만 할인!",
                _ => DEFAULT_CTA,
            };
            (p.clone(), text.to_string())
        })
        .collect()
}

fn platform_notes(
    sections: &ContentSections,
    platforms: &[String],
) -> BTreeMap<String, PlatformNote> {
    platforms
        .iter()
        .map(|p| {
            let note = match p.as_str() {
                "coupang" => PlatformNote {
                    title_length: Some(150),
                    summary_position: Some("top".into()),
                    keyword_density: None,
                    cta: sections.cta_for("coupang").to_string(),
                },
                "naver" => PlatformNote {
                    title_length: Some(100),
                    summary_position: Some("top".into()),
                    keyword_density: Some("high".into()),
                    cta: sections.cta_for("naver").to_string(),
                },
                _ => PlatformNote {
                    cta: "지금 구매하세요!".into(),
                    ..Default::default()
                },
            };
            (p.clone(), note)
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("empty edit path")]
    EmptyPath,
    #[error("cannot descend into `{0}`")]
    NotAContainer(String),
    #[error("array index out of range at `{0}`")]
    IndexOutOfRange(String),
    #[error("edited sections no longer valid: {0}")]
    Invalid(String),
}

/// Applies `{"path": value}` edits. Dotted paths walk nested objects,
/// creating missing ones; numeric segments index into arrays.
pub fn apply_edits(
    sections: &ContentSections,
    edits: &Map<String, Value>,
) -> Result<ContentSections, EditError> {
    let mut doc =
        serde_json::to_value(sections).map_err(|err| EditError::Invalid(err.to_string()))?;
    for (path, value) in edits {
        set_path(&mut doc, path, value.clone())?;
    }
    serde_json::from_value(doc).map_err(|err| EditError::Invalid(err.to_string()))
}

fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<(), EditError> {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return Err(EditError::EmptyPath);
    };

    let mut cursor = doc;
    for segment in parents {
        cursor = match cursor {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index: usize = segment
                    .parse()
                    .map_err(|_| EditError::NotAContainer(path.to_string()))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| EditError::IndexOutOfRange(path.to_string()))?
            }
            _ => return Err(EditError::NotAContainer(path.to_string())),
        };
    }

    match cursor {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index: usize = last
                .parse()
                .map_err(|_| EditError::NotAContainer(path.to_string()))?;
            let slot = items
                .get_mut(index)
                .ok_or_else(|| EditError::IndexOutOfRange(path.to_string()))?;
            *slot = value;
            Ok(())
        }
        _ => Err(EditError::NotAContainer(path.to_string())),
    }
}
