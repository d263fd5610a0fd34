use crate::insights::string_list;
use crate::llm::{ChatModel, LlmMessage, structured};
use crate::llm::structured::StructuredOutputError;
use crate::models::{ProductInfo, ProductInput};
use crate::search::CompetitorData;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

const MIN_PRICE: u64 = 100;
const MAX_PRICE: u64 = 10_000_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Swot {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub opportunities: Vec<String>,
    pub threats: Vec<String>,
}

impl Swot {
    pub const KEYS: [&'static str; 4] = ["strengths", "weaknesses", "opportunities", "threats"];

    fn slot_mut(&mut self, key: &str) -> Option<&mut Vec<String>> {
        match key {
            "strengths" => Some(&mut self.strengths),
            "weaknesses" => Some(&mut self.weaknesses),
            "opportunities" => Some(&mut self.opportunities),
            "threats" => Some(&mut self.threats),
            _ => None,
        }
    }

    fn from_json(value: &Value) -> Self {
        Self {
            strengths: list_for(value, "strengths"),
            weaknesses: list_for(value, "weaknesses"),
            opportunities: list_for(value, "opportunities"),
            threats: list_for(value, "threats"),
        }
    }

    fn fill_empty(&mut self, product_name: &str) {
        let name = non_empty_or(product_name, "상품");
        for key in Self::KEYS {
            if let Some(slot) = self.slot_mut(key) {
                if slot.is_empty() {
                    slot.push(format!("{name}의 {key} 분석 진행 중"));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreeC {
    pub company: Vec<String>,
    pub customer: Vec<String>,
    pub competitor: Vec<String>,
}

impl ThreeC {
    pub const KEYS: [&'static str; 3] = ["company", "customer", "competitor"];

    fn from_json(value: &Value) -> Self {
        Self {
            company: list_for(value, "company"),
            customer: list_for(value, "customer"),
            competitor: list_for(value, "competitor"),
        }
    }

    fn fill_empty(&mut self) {
        for (key, slot) in [
            ("company", &mut self.company),
            ("customer", &mut self.customer),
            ("competitor", &mut self.competitor),
        ] {
            if slot.is_empty() {
                slot.push(format!("{key} 분석 항목 보완 필요"));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: u64,
    pub product: String,
    pub url: String,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAnalysis {
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub avg_price: Option<u64>,
    pub price_range: String,
    pub lowest_product: Option<PricePoint>,
    pub all_prices: Vec<PricePoint>,
}

impl PriceAnalysis {
    fn unknown() -> Self {
        Self {
            min_price: None,
            max_price: None,
            avg_price: None,
            price_range: "가격 정보 없음".into(),
            lowest_product: None,
            all_prices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategicAnalysis {
    pub swot: Swot,
    pub three_c: ThreeC,
    pub price_analysis: PriceAnalysis,
    pub insights: Vec<String>,
    pub competitor_count: usize,
}

/// The product facts both analysis prompts need.
#[derive(Debug, Clone, Default)]
pub struct AnalysisSubject {
    pub product_name: String,
    pub category: String,
    pub keywords: Vec<String>,
    pub target: String,
}

impl From<&ProductInput> for AnalysisSubject {
    fn from(input: &ProductInput) -> Self {
        Self {
            product_name: input.product_name.clone(),
            category: input.category.clone(),
            keywords: input.keywords.clone(),
            target: input.target().to_string(),
        }
    }
}

impl From<&ProductInfo> for AnalysisSubject {
    fn from(info: &ProductInfo) -> Self {
        Self {
            product_name: info.product_name.clone(),
            category: info.category.clone(),
            keywords: info.keywords.clone(),
            target: info.target_customer.clone(),
        }
    }
}

const SWOT_PROMPT: &str = r#"당신은 마케팅 전략 전문가입니다.
제공된 자사 상품과 경쟁사 정보를 바탕으로 SWOT 분석을 수행하세요.

**중요**:
- "데이터 없음", "분석 불가", "정보 부족" 같은 표현은 절대 사용하지 마세요
- 제공된 정보가 적더라도, 상품명, 카테고리, 경쟁사 정보를 종합하여 반드시 구체적인 분석을 해주세요
- 경쟁사 데이터가 없더라도 해당 카테고리의 일반적인 시장 상황을 고려하여 분석하세요

SWOT 분석 항목:
1. Strengths (강점): 자사 상품의 경쟁 우위 요소 (상품명, 키워드에서 유추)
2. Weaknesses (약점): 개선이 필요한 부분 (경쟁사 대비 부족한 점)
3. Opportunities (기회): 시장에서 활용 가능한 기회 (카테고리 트렌드 반영)
4. Threats (위협): 경쟁사나 시장 환경의 위협 요소

각 항목당 반드시 3-5개씩 구체적으로 작성하고, JSON 형식으로 답변하세요.

예시:
{
  "strengths": ["고품질 소재 사용으로 내구성 우수", "합리적인 가격대로 가성비 뛰어남"],
  "weaknesses": ["브랜드 인지도가 경쟁사 대비 낮음", "고객 리뷰 수가 적음"],
  "opportunities": ["온라인 쇼핑 트렌드 증가", "SNS 마케팅을 통한 인지도 확대 가능"],
  "threats": ["대형 브랜드의 시장 지배력", "유사 제품의 가격 경쟁 심화"]
}"#;

const THREE_C_PROMPT: &str = r#"당신은 비즈니스 전략 전문가입니다.
3C 분석 프레임워크를 사용하여 분석하세요.

**중요**:
- "데이터 없음", "분석 불가", "정보 부족" 같은 표현은 절대 사용하지 마세요
- 제공된 정보를 종합하여 반드시 실용적인 분석을 제공하세요

3C 분석 항목:
1. Company (자사): 자사의 강점, 자원, 역량, 제품 특성
2. Customer (고객): 타겟 고객의 니즈, 페인 포인트, 구매 동기, 선호도
3. Competitor (경쟁사): 주요 경쟁사의 전략, 강점, 약점, 시장 포지셔닝

각 항목당 반드시 3-5개씩 구체적으로 작성하고, JSON 형식으로 답변하세요.
키: "company", "customer", "competitor""#;

pub struct StrategicAnalyzer {
    llm: Arc<dyn ChatModel>,
}

impl StrategicAnalyzer {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    pub async fn analyze(
        &self,
        subject: &AnalysisSubject,
        data: &CompetitorData,
    ) -> StrategicAnalysis {
        let competitor_texts = competitor_texts(data);

        let mut swot = match self.request(SWOT_PROMPT, swot_user_prompt(subject, &competitor_texts)).await {
            Ok(value) => Swot::from_json(&value),
            Err(err) => {
                warn!(target = "studio.analysis", error = %err, "swot_fallback");
                crate::metrics::llm_fallback("swot");
                fallback_swot(subject, &err)
            }
        };
        swot.fill_empty(&subject.product_name);

        let mut three_c = match self.request(THREE_C_PROMPT, three_c_user_prompt(subject, &competitor_texts)).await {
            Ok(value) => ThreeC::from_json(&value),
            Err(err) => {
                warn!(target = "studio.analysis", error = %err, "three_c_fallback");
                crate::metrics::llm_fallback("three_c");
                fallback_three_c(subject, &err)
            }
        };
        three_c.fill_empty();

        let price_analysis = analyze_prices(data);
        let insights = key_insights(&swot, &three_c, &price_analysis);
        let competitor_count = data.success_count();

        info!(
            target = "studio.analysis",
            product = %subject.product_name,
            competitors = competitor_count,
            "strategic_analysis_complete"
        );

        StrategicAnalysis {
            swot,
            three_c,
            price_analysis,
            insights,
            competitor_count,
        }
    }

    async fn request(&self, system: &str, user: String) -> Result<Value, StructuredOutputError> {
        let messages = [LlmMessage::system(system), LlmMessage::user(user)];
        structured::request_object::<Value>(self.llm.as_ref(), &messages).await
    }
}

fn competitor_texts(data: &CompetitorData) -> Vec<String> {
    data.records()
        .take(15)
        .map(|r| {
            format!(
                "제품명: {}\nURL: {}\n설명: {}\n플랫폼: {}",
                r.title, r.url, r.snippet, r.platform
            )
        })
        .collect()
}

fn competitor_block(texts: &[String], empty_note: &str) -> String {
    if texts.is_empty() {
        empty_note.to_string()
    } else {
        texts.iter().take(10).cloned().collect::<Vec<_>>().join("\n\n")
    }
}

fn swot_user_prompt(subject: &AnalysisSubject, texts: &[String]) -> String {
    format!(
        "자사 상품 정보:\n- 상품명: {}\n- 카테고리: {}\n- 키워드: {}\n- 타겟: {}\n\n경쟁사 상품 정보 ({}개):\n{}\n\n위 정보를 종합적으로 분석하여 SWOT 분석을 수행해주세요.\n**중요: 각 항목당 반드시 3-5개의 구체적이고 실용적인 내용을 작성하세요. \"데이터 없음\" 같은 표현 절대 금지.**",
        subject.product_name,
        subject.category,
        subject.keywords.join(", "),
        subject.target,
        texts.len(),
        competitor_block(
            texts,
            "경쟁사 데이터가 적습니다. 해당 카테고리의 일반적인 시장 상황을 고려하여 분석해주세요."
        ),
    )
}

fn three_c_user_prompt(subject: &AnalysisSubject, texts: &[String]) -> String {
    format!(
        "자사 상품 정보:\n- 상품명: {}\n- 카테고리: {}\n- 타겟: {}\n\n경쟁사 상품 정보 ({}개):\n{}\n\n위 정보를 종합적으로 분석하여 3C 분석을 수행해주세요.\n**중요: 각 항목당 반드시 3-5개의 구체적이고 실용적인 내용을 작성하세요.**",
        subject.product_name,
        subject.category,
        subject.target,
        texts.len(),
        competitor_block(
            texts,
            "경쟁사 데이터가 제한적입니다. 해당 카테고리의 일반적인 시장 상황을 고려하여 분석해주세요."
        ),
    )
}

/// Unparseable answers and provider outages get different templated
/// wording; both are non-empty for every key.
fn fallback_swot(subject: &AnalysisSubject, err: &StructuredOutputError) -> Swot {
    let name = &subject.product_name;
    let category = &subject.category;
    if matches!(err, StructuredOutputError::Llm(_)) {
        let name = non_empty_or(name, "상품");
        let category = non_empty_or(category, "카테고리");
        return Swot {
            strengths: vec![
                format!("{name}의 특화된 제품 컨셉"),
                format!("{category} 시장 내 차별화된 가치 제안"),
                "타겟 고객 니즈에 부합하는 제품 설계".into(),
            ],
            weaknesses: vec![
                "시장 내 브랜드 인지도 강화 필요".into(),
                "디지털 마케팅 역량 확대 필요".into(),
                "고객 피드백 데이터 축적 필요".into(),
            ],
            opportunities: vec![
                format!("{category} 시장의 성장 잠재력"),
                "온라인 플랫폼 활용 확대 기회".into(),
                "타겟층 맞춤 콘텐츠 마케팅 가능성".into(),
            ],
            threats: vec![
                "기존 강자 브랜드와의 경쟁".into(),
                "신규 진입자 증가로 인한 경쟁 심화".into(),
                "시장 트렌드 변화 대응 필요".into(),
            ],
        };
    }
    Swot {
        strengths: vec![
            format!("{name}의 차별화된 제품 특성"),
            format!("{category} 시장에서의 경쟁력 있는 가격"),
            "타겟 고객층에 맞는 제품 포지셔닝".into(),
        ],
        weaknesses: vec![
            "브랜드 인지도 확대 필요".into(),
            "온라인 마케팅 채널 강화 필요".into(),
            "고객 리뷰 및 평점 축적 필요".into(),
        ],
        opportunities: vec![
            format!("{category} 시장의 지속적인 성장세"),
            "온라인 쇼핑 증가 트렌드".into(),
            "소셜 미디어를 통한 바이럴 마케팅 가능성".into(),
        ],
        threats: vec![
            "대형 브랜드의 시장 지배력".into(),
            "가격 경쟁 심화".into(),
            "소비자 선호도의 빠른 변화".into(),
        ],
    }
}

fn fallback_three_c(subject: &AnalysisSubject, err: &StructuredOutputError) -> ThreeC {
    if matches!(err, StructuredOutputError::Llm(_)) {
        let name = non_empty_or(&subject.product_name, "상품");
        let category = non_empty_or(&subject.category, "카테고리");
        let target = non_empty_or(&subject.target, "타겟 고객");
        return ThreeC {
            company: vec![
                format!("{name}만의 독특한 가치 제안"),
                "효율적인 제품 개발 및 공급 체계".into(),
                "고객 중심의 서비스 제공".into(),
            ],
            customer: vec![
                format!("{target}의 품질 중시 구매 성향"),
                "합리적 가격대 선호".into(),
                "온라인 쇼핑 편의성 추구".into(),
            ],
            competitor: vec![
                format!("{category} 시장 선도 브랜드의 강력한 입지"),
                "다양한 제품 라인업과 마케팅 역량".into(),
                "고객 데이터 기반 맞춤형 전략".into(),
            ],
        };
    }
    ThreeC {
        company: vec![
            format!("{}의 차별화된 제품 컨셉", subject.product_name),
            format!("{} 시장 경험과 노하우", subject.category),
            "빠른 시장 대응 능력과 유연성".into(),
        ],
        customer: vec![
            format!("{}의 실용성 중심 구매 패턴", subject.target),
            "가성비와 품질을 동시에 추구하는 소비 성향".into(),
            "온라인 리뷰와 평점을 중시하는 의사결정 과정".into(),
        ],
        competitor: vec![
            format!("{} 시장 내 주요 브랜드의 높은 시장 점유율", subject.category),
            "대형 유통 채널을 통한 광범위한 유통망 확보".into(),
            "브랜드 인지도 기반의 고객 충성도".into(),
        ],
    }
}

/// Looks a key up as written, then capitalised, so `"Strengths"` answers
/// are accepted too.
fn list_for(value: &Value, key: &str) -> Vec<String> {
    let mut capitalised = key.to_string();
    if let Some(first) = capitalised.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    string_list(value.get(key).or_else(|| value.get(&capitalised)))
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() { default } else { value }
}

static PRICE_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"(\d{1,3}(?:,\d{3})+)원").expect("grouped won"),
        Regex::new(r"(\d{4,})원").expect("plain won"),
        Regex::new(r"(\d{1,3}(?:,\d{3})+)\s*won").expect("grouped won latin"),
    ]
});

/// Every plausible won amount in `text`, in pattern order.
pub fn extract_prices(text: &str) -> Vec<u64> {
    PRICE_PATTERNS
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().replace(',', "").parse::<u64>().ok())
        .filter(|price| (MIN_PRICE..=MAX_PRICE).contains(price))
        .collect()
}

pub fn analyze_prices(data: &CompetitorData) -> PriceAnalysis {
    let points: Vec<PricePoint> = data
        .records()
        .flat_map(|r| {
            extract_prices(&format!("{} {}", r.title, r.snippet))
                .into_iter()
                .map(move |price| PricePoint {
                    price,
                    product: r.title.clone(),
                    url: r.url.clone(),
                    platform: r.platform.clone(),
                })
        })
        .collect();

    let (Some(min), Some(max)) = (
        points.iter().map(|p| p.price).min(),
        points.iter().map(|p| p.price).max(),
    ) else {
        return PriceAnalysis::unknown();
    };

    let total: u64 = points.iter().map(|p| p.price).sum();
    let avg = (total as f64 / points.len() as f64).round() as u64;
    let lowest_product = points.iter().find(|p| p.price == min).cloned();
    let mut ranked = points;
    ranked.sort_by_key(|p| p.price);
    ranked.truncate(10);

    PriceAnalysis {
        min_price: Some(min),
        max_price: Some(max),
        avg_price: Some(avg),
        price_range: format!("{}원 ~ {}원", group_thousands(min), group_thousands(max)),
        lowest_product,
        all_prices: ranked,
    }
}

pub fn key_insights(swot: &Swot, three_c: &ThreeC, price: &PriceAnalysis) -> Vec<String> {
    let mut insights = Vec::new();
    if let Some(first) = swot.strengths.first() {
        insights.push(format!("💪 핵심 강점: {first}"));
    }
    if let Some(first) = swot.opportunities.first() {
        insights.push(format!("🎯 시장 기회: {first}"));
    }
    if let (Some(min), Some(avg)) = (price.min_price, price.avg_price) {
        insights.push(format!(
            "💰 경쟁 가격대: {} (평균 {}원)",
            price.price_range,
            group_thousands(avg)
        ));
        if let Some(lowest) = &price.lowest_product {
            insights.push(format!(
                "🏷️ 최저가: {} - {}원",
                lowest.product,
                group_thousands(min)
            ));
        }
    }
    if let Some(first) = three_c.customer.first() {
        insights.push(format!("👥 고객 니즈: {first}"));
    }
    insights
}

/// Replaces SWOT lists by key. Unknown keys are ignored; the updated keys
/// are returned in the order they were applied.
pub fn update_swot(
    analysis: &mut StrategicAnalysis,
    updates: &BTreeMap<String, Vec<String>>,
) -> Vec<String> {
    let mut applied = Vec::new();
    for (key, items) in updates {
        match analysis.swot.slot_mut(key) {
            Some(slot) => {
                *slot = items.clone();
                applied.push(key.clone());
            }
            None => {
                warn!(target = "studio.analysis", key = %key, "unknown_swot_key_ignored");
            }
        }
    }
    analysis.insights = key_insights(&analysis.swot, &analysis.three_c, &analysis.price_analysis);
    applied
}

pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::search::CompetitorRecord;

    fn subject() -> AnalysisSubject {
        AnalysisSubject {
            product_name: "수분 크림".into(),
            category: "스킨케어".into(),
            keywords: vec!["보습".into()],
            target: "30대 여성".into(),
        }
    }

    fn priced_data() -> CompetitorData {
        CompetitorData::from_records(vec![
            CompetitorRecord::new("coupang", "A 크림 25,000원", "https://www.coupang.com/vp/products/1", ""),
            CompetitorRecord::new("naver", "B 크림", "https://smartstore.naver.com/b/products/2", "특가 12900원"),
            CompetitorRecord::new("naver", "C 크림", "https://smartstore.naver.com/c/products/3", "정가 30,000 won"),
        ])
    }

    #[test]
    fn extracts_prices_in_range() {
        assert_eq!(extract_prices("12,900원 / 15000원"), vec![12_900, 15_000]);
        assert_eq!(extract_prices("1,234,567 won"), vec![1_234_567]);
        assert!(extract_prices("99,999,999원").is_empty());
        assert!(extract_prices("가격 문의").is_empty());
    }

    #[test]
    fn price_statistics() {
        let price = analyze_prices(&priced_data());
        assert_eq!(price.min_price, Some(12_900));
        assert_eq!(price.max_price, Some(30_000));
        assert_eq!(price.avg_price, Some(22_633));
        assert_eq!(price.price_range, "12,900원 ~ 30,000원");
        assert_eq!(price.lowest_product.map(|p| p.product), Some("B 크림".to_string()));
        let ranked: Vec<u64> = price.all_prices.iter().map(|p| p.price).collect();
        assert_eq!(ranked, vec![12_900, 25_000, 30_000]);
    }

    #[test]
    fn no_prices_reports_unknown() {
        let price = analyze_prices(&CompetitorData::empty());
        assert_eq!(price.price_range, "가격 정보 없음");
        assert!(price.all_prices.is_empty());
    }

    #[tokio::test]
    async fn non_json_answers_fall_back_with_all_keys_non_empty() {
        let llm = Arc::new(ScriptedModel::replying(&[
            "죄송합니다",
            "분석 결과를 드릴 수 없습니다",
            "여전히 텍스트",
            "마지막 텍스트",
        ]));
        let analyzer = StrategicAnalyzer::new(llm.clone());
        let analysis = analyzer.analyze(&subject(), &CompetitorData::empty()).await;

        assert_eq!(llm.calls(), 4);
        let swot = serde_json::to_value(&analysis.swot).expect("swot");
        for key in Swot::KEYS {
            assert!(!swot[key].as_array().expect(key).is_empty(), "{key} empty");
        }
        assert_eq!(swot.as_object().map(|o| o.len()), Some(4));
        let three_c = serde_json::to_value(&analysis.three_c).expect("3c");
        for key in ThreeC::KEYS {
            assert!(!three_c[key].as_array().expect(key).is_empty(), "{key} empty");
        }
        assert_eq!(three_c.as_object().map(|o| o.len()), Some(3));
        assert_eq!(analysis.swot.strengths[0], "수분 크림의 차별화된 제품 특성");
    }

    #[tokio::test]
    async fn outage_uses_outage_template() {
        let analyzer = StrategicAnalyzer::new(Arc::new(ScriptedModel::failing()));
        let analysis = analyzer.analyze(&subject(), &CompetitorData::empty()).await;
        assert_eq!(analysis.swot.strengths[0], "수분 크림의 특화된 제품 컨셉");
        assert_eq!(analysis.three_c.customer[0], "30대 여성의 품질 중시 구매 성향");
    }

    #[tokio::test]
    async fn partial_answer_gets_placeholders() {
        let llm = Arc::new(ScriptedModel::replying(&[
            r#"{"Strengths": ["보습력"], "threats": []}"#,
            r#"{"company": ["연구소 보유"]}"#,
        ]));
        let analyzer = StrategicAnalyzer::new(llm);
        let analysis = analyzer.analyze(&subject(), &priced_data()).await;
        assert_eq!(analysis.swot.strengths, vec!["보습력"]);
        assert_eq!(analysis.swot.threats, vec!["수분 크림의 threats 분석 진행 중"]);
        assert_eq!(analysis.three_c.customer, vec!["customer 분석 항목 보완 필요"]);
        assert_eq!(analysis.competitor_count, 3);
        assert!(analysis.insights.iter().any(|i| i.contains("최저가: B 크림 - 12,900원")));
    }

    #[test]
    fn swot_updates_replace_lists() {
        let mut analysis = StrategicAnalysis {
            swot: Swot {
                strengths: vec!["old".into()],
                ..Default::default()
            },
            three_c: ThreeC::default(),
            price_analysis: PriceAnalysis::unknown(),
            insights: Vec::new(),
            competitor_count: 0,
        };
        let updates = BTreeMap::from([
            ("strengths".to_string(), vec!["new".to_string()]),
            ("bogus".to_string(), vec!["x".to_string()]),
        ]);
        let applied = update_swot(&mut analysis, &updates);
        assert_eq!(applied, vec!["strengths"]);
        assert_eq!(analysis.swot.strengths, vec!["new"]);
        assert_eq!(analysis.insights[0], "💪 핵심 강점: new");
    }

    #[test]
    fn groups_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(12_900), "12,900");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }
}
