use crate::analysis::{AnalysisSubject, StrategicAnalysis, group_thousands};
use crate::content::{ChartEntry, Comparison, ContentSections, NutritionRow, Recipe};
use crate::images::{GeneratedImage, image_for};
use crate::models::ProductInput;
use minijinja::Environment;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;
use tracing::{debug, error};

const HERO_PLACEHOLDER: &str = "https://via.placeholder.com/860x1000";
const DETAIL_PLACEHOLDER: &str = "https://via.placeholder.com/428x428";
const MIN_GENERAL_COMPARISON_ROWS: usize = 3;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

static TEMPLATES: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    for (name, source) in [
        ("detail_esm.html", include_str!("templates/detail_esm.html")),
        ("detail_general.html", include_str!("templates/detail_general.html")),
        ("analysis.html", include_str!("templates/analysis.html")),
        ("page.html", include_str!("templates/page.html")),
    ] {
        if let Err(err) = env.add_template(name, source) {
            error!(target = "studio.render", template = name, error = %err, "template_load_failed");
        }
    }
    env
});

/// Visual skin of the detail page, chosen from category keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Skin {
    Beauty,
    Food,
    Clothing,
    Electronics,
    General,
}

const SKIN_KEYWORDS: [(Skin, &[&str]); 4] = [
    (
        Skin::Beauty,
        &["뷰티", "화장품", "스킨케어", "코스메틱", "크림", "세럼", "로션", "토너", "에센스", "마스크팩"],
    ),
    (
        Skin::Food,
        &["식품", "푸드", "음식", "간식", "과자", "음료", "감자칩", "커피"],
    ),
    (
        Skin::Clothing,
        &["의류", "패션", "옷", "셔츠", "바지", "원피스", "가방", "신발"],
    ),
    (
        Skin::Electronics,
        &["전자", "가전", "디지털", "에어프라이어", "청소기", "이어폰", "노트북"],
    ),
];

/// Category name is matched first, then the product name.
pub fn detect_category(category: &str, product_name: &str) -> Skin {
    let lookup = |text: &str| {
        let text = text.to_lowercase();
        SKIN_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| text.contains(kw)))
            .map(|(skin, _)| *skin)
    };
    lookup(category)
        .or_else(|| lookup(product_name))
        .unwrap_or(Skin::General)
}

impl Skin {
    pub fn name(self) -> &'static str {
        match self {
            Skin::Beauty => "beauty",
            Skin::Food => "food",
            Skin::Clothing => "clothing",
            Skin::Electronics => "electronics",
            Skin::General => "general",
        }
    }

    fn palette(self) -> (&'static str, &'static str) {
        match self {
            Skin::Beauty => ("#d9778b", "#fdf0f3"),
            Skin::Food => ("#d5723c", "#fff4e6"),
            Skin::Clothing => ("#111827", "#f3f4f6"),
            Skin::Electronics => ("#2563eb", "#eff6ff"),
            Skin::General => ("#667eea", "#f8f9fa"),
        }
    }

    fn section_order(self) -> &'static [&'static str] {
        match self {
            Skin::Food => &[
                "intro", "description", "ingredients", "nutrition", "details", "recipes",
                "comparison", "specs", "faq", "notice",
            ],
            Skin::Beauty => &[
                "intro", "description", "details", "reviews", "usage", "comparison", "specs",
                "faq", "notice",
            ],
            Skin::Clothing => &[
                "intro", "description", "details", "size", "comparison", "specs", "faq", "notice",
            ],
            Skin::Electronics | Skin::General => &[
                "intro", "description", "details", "usage", "comparison", "specs", "faq", "notice",
            ],
        }
    }

    fn detail_blocks(self) -> [(&'static str, &'static str); 5] {
        match self {
            Skin::Clothing => [
                ("소재 & 품질", "프리미엄 소재로 착용감이 우수합니다"),
                ("디자인", "세련되고 실용적인 디자인"),
                ("활용도", "다양한 스타일링 가능"),
                ("내구성", "꼼꼼한 마감 처리"),
                ("관리", "세탁 및 보관 방법"),
            ],
            Skin::Food => [
                ("맛과 식감", "신선하고 자연스러운 맛"),
                ("영양 성분", "균형 잡힌 영양 구성"),
                ("제조 공정", "위생적 제조 환경"),
                ("보관 방법", "신선도 유지 보관법"),
                ("섭취 방법", "간편하게 즐기기"),
            ],
            Skin::Beauty => [
                ("핵심 성분", "피부 고민에 맞춘 성분 배합"),
                ("텍스처", "산뜻하게 스며드는 사용감"),
                ("사용 효과", "꾸준히 사용할수록 느껴지는 변화"),
                ("피부 테스트", "피부 자극 테스트 완료"),
                ("사용 팁", "효과를 높이는 사용 순서"),
            ],
            Skin::Electronics | Skin::General => [
                ("핵심 성능", "강력하고 안정적인 성능"),
                ("디자인", "공간에 어울리는 디자인"),
                ("편의 기능", "직관적인 조작"),
                ("안전 설계", "과열 방지 안전 설계"),
                ("관리 방법", "간편한 세척과 관리"),
            ],
        }
    }

    fn notices(self) -> &'static [&'static str] {
        match self {
            Skin::Clothing => &[
                "개봉 후 교환/반품 제한 있음",
                "수작업 계측으로 1~3cm 오차 가능",
                "모니터 환경에 따른 색상 차이 있음",
            ],
            Skin::Food => &[
                "개봉 후 교환/반품 제한 있음",
                "유통기한 및 보관방법 확인 필수",
                "알레르기 정보 확인 권장",
            ],
            Skin::Beauty => &[
                "개봉 후 교환/반품 제한 있음",
                "피부 이상 시 사용을 중지하고 전문의와 상담",
                "직사광선을 피해 서늘한 곳에 보관",
            ],
            Skin::Electronics | Skin::General => &[
                "개봉 후 교환/반품 제한 있음",
                "제품 보증기간 1년 (소모품 제외)",
                "정격 전압 확인 후 사용",
            ],
        }
    }

    fn specs_title(self) -> &'static str {
        match self {
            Skin::Food => "식품 정보",
            Skin::Clothing => "소재 & 제품 사양",
            _ => "제품 사양",
        }
    }
}

#[derive(Serialize)]
struct SkinView {
    name: &'static str,
    primary: &'static str,
    accent: &'static str,
}

impl From<Skin> for SkinView {
    fn from(skin: Skin) -> Self {
        let (primary, accent) = skin.palette();
        Self {
            name: skin.name(),
            primary,
            accent,
        }
    }
}

#[derive(Serialize)]
struct DetailBlock {
    number: String,
    title: &'static str,
    description: &'static str,
    image: String,
    reverse: bool,
}

#[derive(Serialize)]
struct EsmView<'a> {
    skin: SkinView,
    order: &'static [&'static str],
    product_name: &'a str,
    summary: &'a str,
    hero_image: &'a str,
    usps: Vec<&'a str>,
    promotions: &'a [String],
    description: &'a str,
    details: Vec<DetailBlock>,
    nutrition: &'a [NutritionRow],
    recipes: &'a [Recipe],
    review_highlights: &'a [String],
    usage_guide: &'a [String],
    competitors: Vec<&'a ChartEntry>,
    specs_title: &'static str,
    specs: &'a BTreeMap<String, String>,
    faq: &'a [crate::content::Faq],
    notices: &'static [&'static str],
    cta: String,
}

#[derive(Serialize)]
struct GeneralView<'a> {
    skin: SkinView,
    product_name: &'a str,
    headline: &'a str,
    summary: &'a str,
    hero_image: &'a str,
    selling_points: &'a [crate::selling::SellingPoint],
    problem_solution: &'a crate::content::ProblemSolution,
    description: &'a str,
    specs: &'a BTreeMap<String, String>,
    usage_guide: &'a [String],
    comparison: Option<Comparison>,
    faq: &'a [crate::content::Faq],
    cta: String,
}

/// Renders the detail page. The four category skins use the marketplace
/// (ESM+) layout; everything else gets the general layout.
pub fn render_detail_html(
    sections: &ContentSections,
    images: &[GeneratedImage],
    product: &ProductInput,
) -> Result<String, RenderError> {
    let skin = detect_category(&product.category, &product.product_name);
    let hero_image = image_for(images, "main").unwrap_or(HERO_PLACEHOLDER);
    let cta = strip_bold(sections.cta_for(product.primary_platform()));
    debug!(target = "studio.render", skin = skin.name(), images = images.len(), "render_detail_html");

    if skin == Skin::General {
        let comparison = (sections.comparison.rows.len() >= MIN_GENERAL_COMPARISON_ROWS)
            .then(|| plain_comparison(&sections.comparison));
        let view = GeneralView {
            skin: skin.into(),
            product_name: &product.product_name,
            headline: &sections.headline,
            summary: &sections.summary,
            hero_image,
            selling_points: &sections.selling_points,
            problem_solution: &sections.problem_solution,
            description: &sections.detailed_description.content,
            specs: &sections.specs,
            usage_guide: &sections.usage_guide,
            comparison,
            faq: &sections.faq,
            cta,
        };
        return Ok(TEMPLATES.get_template("detail_general.html")?.render(&view)?);
    }

    let details = skin
        .detail_blocks()
        .into_iter()
        .enumerate()
        .map(|(idx, (title, description))| DetailBlock {
            number: format!("{:02}", idx + 1),
            title,
            description,
            image: image_for(images, &format!("detail{}", idx + 1))
                .unwrap_or(DETAIL_PLACEHOLDER)
                .to_string(),
            reverse: idx % 2 == 1,
        })
        .collect();
    let nutrition: &[NutritionRow] = if sections.nutrition_info.has_nutrition {
        &sections.nutrition_info.rows
    } else {
        &[]
    };
    let view = EsmView {
        skin: skin.into(),
        order: skin.section_order(),
        product_name: &product.product_name,
        summary: &sections.summary,
        hero_image,
        usps: sections
            .selling_points
            .iter()
            .take(3)
            .map(|sp| sp.title.as_str())
            .collect(),
        promotions: &sections.promotions,
        description: &sections.detailed_description.content,
        details,
        nutrition,
        recipes: &sections.recipes,
        review_highlights: &sections.review_highlights,
        usage_guide: &sections.usage_guide,
        competitors: sections
            .comparison_chart
            .competitors
            .iter()
            .filter(|c| c.is_complete())
            .collect(),
        specs_title: skin.specs_title(),
        specs: &sections.specs,
        faq: &sections.faq,
        notices: skin.notices(),
        cta,
    };
    Ok(TEMPLATES.get_template("detail_esm.html")?.render(&view)?)
}

fn plain_comparison(comparison: &Comparison) -> Comparison {
    let mut plain = comparison.clone();
    for row in &mut plain.rows {
        row.ours = strip_bold(&row.ours);
        row.competitor = strip_bold(&row.competitor);
    }
    plain
}

fn strip_bold(text: &str) -> String {
    text.replace("**", "")
}

pub fn render_markdown(
    sections: &ContentSections,
    images: &[GeneratedImage],
    product: &ProductInput,
) -> String {
    let mut md = String::new();
    let headline = if sections.headline.is_empty() {
        product.product_name.as_str()
    } else {
        sections.headline.as_str()
    };
    let _ = writeln!(md, "# {headline}");
    let _ = writeln!(
        md,
        "**한줄요약:** {} (제조국: {})",
        sections.summary, product.manufacture_country
    );
    md.push_str("\n---\n\n");

    md.push_str("## 핵심 셀링포인트\n");
    for (i, sp) in sections.selling_points.iter().enumerate() {
        let evidence = sp
            .evidence
            .as_deref()
            .filter(|e| !e.is_empty())
            .map(|e| format!(" — {e}"))
            .unwrap_or_default();
        let _ = writeln!(md, "{}. **{}**{evidence}", i + 1, sp.title);
        let _ = writeln!(md, "   {}\n", sp.description);
    }
    md.push_str("\n---\n\n");

    let ps = &sections.problem_solution;
    md.push_str("## 구매를 망설이는 고객님께\n");
    let _ = writeln!(md, "- 문제: {}", ps.problem);
    let _ = writeln!(md, "- 해결: {}", ps.solution);
    let _ = writeln!(md, "- 증거: {}", ps.evidence);
    md.push_str("\n---\n\n");

    if !sections.detailed_description.content.is_empty() {
        let _ = writeln!(md, "## {}", sections.detailed_description.title);
        let _ = writeln!(md, "{}", sections.detailed_description.content);
        md.push_str("\n---\n\n");
    }

    md.push_str("## 제품 상세정보\n");
    for (key, value) in &sections.specs {
        let _ = writeln!(md, "- {key}: {value}");
    }
    md.push_str("\n---\n\n");

    md.push_str("## 사용방법 (이미지 포함)\n");
    for (i, step) in sections.usage_guide.iter().enumerate() {
        let _ = writeln!(md, "{}. {step}", i + 1);
    }
    if let Some(usage) = image_for(images, "usage").or_else(|| image_for(images, "main")) {
        let _ = writeln!(md, "\n![사용 설명]({usage})");
    }
    md.push_str("\n---\n\n");

    let comparison = &sections.comparison;
    if !comparison.rows.is_empty() {
        md.push_str("## 경쟁사 비교\n");
        let _ = writeln!(md, "| {} |", comparison.headers.join(" | "));
        let _ = writeln!(md, "|{}", "---|".repeat(comparison.headers.len()));
        for row in &comparison.rows {
            let _ = writeln!(md, "| {} | {} | {} |", row.item, row.competitor, row.ours);
        }
        md.push_str("\n---\n\n");
    }

    md.push_str("## 자주 묻는 질문(FAQ)\n");
    for faq in &sections.faq {
        let _ = writeln!(md, "**Q: {}**", faq.question);
        let _ = writeln!(md, "A: {}\n", faq.answer);
    }
    md.push_str("\n---\n\n");

    md.push_str("## CTA\n");
    md.push_str(sections.cta_for(product.primary_platform()));
    md.push('\n');
    md
}

#[derive(Serialize)]
struct AnalysisBlock<'a> {
    key: &'static str,
    icon: &'static str,
    title: &'static str,
    label: &'static str,
    items: &'a [String],
}

#[derive(Serialize)]
struct PriceRow<'a> {
    product: &'a str,
    platform: &'a str,
    price: String,
}

#[derive(Serialize)]
struct AnalysisView<'a> {
    product_name: &'a str,
    category: &'a str,
    competitor_count: usize,
    insights: &'a [String],
    swot: Vec<AnalysisBlock<'a>>,
    three_c: Vec<AnalysisBlock<'a>>,
    prices: Vec<PriceRow<'a>>,
    min_price: String,
    avg_price: String,
    max_price: String,
}

fn won(value: Option<u64>) -> String {
    value
        .map(|v| format!("{}원", group_thousands(v)))
        .unwrap_or_else(|| "-".into())
}

pub fn render_analysis_html(
    analysis: &StrategicAnalysis,
    subject: &AnalysisSubject,
) -> Result<String, RenderError> {
    let swot = &analysis.swot;
    let three_c = &analysis.three_c;
    let price = &analysis.price_analysis;
    let view = AnalysisView {
        product_name: &subject.product_name,
        category: &subject.category,
        competitor_count: analysis.competitor_count,
        insights: &analysis.insights,
        swot: vec![
            AnalysisBlock { key: "strengths", icon: "💪", title: "Strengths", label: "강점", items: &swot.strengths },
            AnalysisBlock { key: "weaknesses", icon: "⚠️", title: "Weaknesses", label: "약점", items: &swot.weaknesses },
            AnalysisBlock { key: "opportunities", icon: "🎯", title: "Opportunities", label: "기회", items: &swot.opportunities },
            AnalysisBlock { key: "threats", icon: "🚨", title: "Threats", label: "위협", items: &swot.threats },
        ],
        three_c: vec![
            AnalysisBlock { key: "company", icon: "🏢", title: "Company", label: "자사", items: &three_c.company },
            AnalysisBlock { key: "customer", icon: "👥", title: "Customer", label: "고객", items: &three_c.customer },
            AnalysisBlock { key: "competitor", icon: "⚔️", title: "Competitor", label: "경쟁사", items: &three_c.competitor },
        ],
        prices: price
            .all_prices
            .iter()
            .take(5)
            .map(|p| PriceRow {
                product: &p.product,
                platform: &p.platform,
                price: format!("{}원", group_thousands(p.price)),
            })
            .collect(),
        min_price: won(price.min_price),
        avg_price: won(price.avg_price),
        max_price: won(price.max_price),
    };
    Ok(TEMPLATES.get_template("analysis.html")?.render(&view)?)
}

/// Wraps converted Markdown in a standalone page.
pub fn markdown_page(title: &str, markdown: &str) -> Result<String, RenderError> {
    let body = markdown_to_html(markdown);
    Ok(TEMPLATES
        .get_template("page.html")?
        .render(minijinja::context! { title => title, body => body })?)
}

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold pattern"));
static IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").expect("image pattern"));

/// Line-oriented Markdown subset: headings, bold, images, rules and
/// bullet lists. Text is escaped before any tag is inserted.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut html = String::new();
    let mut in_list = false;

    for raw in markdown.lines() {
        let line = raw.trim();
        let item = line.strip_prefix("- ").or_else(|| line.strip_prefix("* "));

        if in_list && item.is_none() {
            html.push_str("</ul>\n");
            in_list = false;
        }
        if let Some(item) = item {
            if !in_list {
                html.push_str("<ul>\n");
                in_list = true;
            }
            let _ = writeln!(html, "<li>{}</li>", inline(item));
            continue;
        }

        if line.is_empty() {
            continue;
        }
        if line == "---" {
            html.push_str("<hr>\n");
        } else if let Some(text) = line.strip_prefix("### ") {
            let _ = writeln!(html, "<h3>{}</h3>", inline(text));
        } else if let Some(text) = line.strip_prefix("## ") {
            let _ = writeln!(html, "<h2>{}</h2>", inline(text));
        } else if let Some(text) = line.strip_prefix("# ") {
            let _ = writeln!(html, "<h1>{}</h1>", inline(text));
        } else {
            let _ = writeln!(html, "<p>{}</p>", inline(line));
        }
    }
    if in_list {
        html.push_str("</ul>\n");
    }
    html
}

fn inline(text: &str) -> String {
    let escaped = escape_html(text);
    let with_images = IMAGE.replace_all(&escaped, r#"<img src="$2" alt="$1">"#);
    BOLD.replace_all(&with_images, "<strong>$1</strong>").into_owned()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{PriceAnalysis, PricePoint, Swot, ThreeC};
    use crate::content::ComparisonRow;
    use crate::models::sample_product;
    use crate::selling::SellingPoint;

    fn sections() -> ContentSections {
        let mut sections = ContentSections {
            headline: "바삭 감자칩 - 저칼로리".into(),
            summary: "담백한 감자칩".into(),
            selling_points: vec![SellingPoint {
                title: "저칼로리".into(),
                description: "튀기지 않았어요".into(),
                evidence: Some("100g당 200kcal".into()),
            }],
            ..Default::default()
        };
        sections.specs.insert("제조국".into(), "대한민국".into());
        sections.cta.insert("coupang".into(), "지금 구매하면 **쿠팡 단독 특가** — 한정수량!".into());
        sections
    }

    fn complete_entry() -> ChartEntry {
        ChartEntry {
            name: "경쟁 감자칩".into(),
            platform: "coupang".into(),
            price: "12,900원".into(),
            rating: "4.5".into(),
        }
    }

    #[test]
    fn category_detection() {
        assert_eq!(detect_category("스킨케어", "수분 앰플"), Skin::Beauty);
        assert_eq!(detect_category("생활용품", "수분 크림 50ml"), Skin::Beauty);
        assert_eq!(detect_category("식품", "에어프라이어 감자칩"), Skin::Food);
        assert_eq!(detect_category("문구", "볼펜 세트"), Skin::General);
        assert_eq!(detect_category("", ""), Skin::General);
    }

    #[test]
    fn esm_comparison_needs_one_complete_competitor() {
        let product = sample_product();
        let mut s = sections();
        s.comparison_chart.competitors = vec![ChartEntry {
            rating: "N/A".into(),
            ..complete_entry()
        }];
        let html = render_detail_html(&s, &[], &product).expect("render");
        assert!(!html.contains("경쟁 상품 비교"));

        s.comparison_chart.competitors.push(complete_entry());
        let html = render_detail_html(&s, &[], &product).expect("render");
        assert!(html.contains("경쟁 상품 비교"));
        assert_eq!(html.matches("경쟁 감자칩").count(), 1);
    }

    #[test]
    fn general_comparison_needs_three_rows() {
        let mut product = sample_product();
        product.category = "문구".into();
        product.product_name = "볼펜 세트".into();
        let mut s = sections();
        let row = |item: &str| ComparisonRow {
            item: item.into(),
            competitor: "보통".into(),
            ours: "**우수**".into(),
        };
        s.comparison.headers = vec!["항목".into(), "경쟁사A".into(), "우리 제품".into()];
        s.comparison.rows = vec![row("품질"), row("가격")];
        let html = render_detail_html(&s, &[], &product).expect("render");
        assert!(!html.contains("경쟁사 비교"));

        s.comparison.rows.push(row("원산지"));
        let html = render_detail_html(&s, &[], &product).expect("render");
        assert!(html.contains("경쟁사 비교"));
        assert!(html.contains("<td>우수</td>"));
    }

    #[test]
    fn interpolated_values_are_escaped() {
        let mut product = sample_product();
        product.product_name = "<script>alert(1)</script>".into();
        let html = render_detail_html(&sections(), &[], &product).expect("render");
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("쿠팡 단독 특가"));
        assert!(!html.contains("**쿠팡"));
    }

    #[test]
    fn food_skin_orders_nutrition_before_details() {
        let mut s = sections();
        s.nutrition_info.has_nutrition = true;
        s.nutrition_info.rows = vec![NutritionRow {
            nutrient: "열량".into(),
            serving: "100g".into(),
            amount: "200kcal".into(),
            daily_value: "10%".into(),
        }];
        let html = render_detail_html(&s, &[], &sample_product()).expect("render");
        let nutrition = html.find("영양성분표").expect("nutrition section");
        let details = html.find("제품 디테일 포인트").expect("details section");
        assert!(nutrition < details);
        assert!(html.contains("01. 맛과 식감"));
        assert!(html.contains("식품 정보"));
    }

    #[test]
    fn detail_blocks_take_images_by_shot() {
        let images = vec![
            GeneratedImage { shot: "main".into(), url: "main.png".into() },
            GeneratedImage { shot: "detail2".into(), url: "detail2.png".into() },
            GeneratedImage { shot: "usage".into(), url: "usage.png".into() },
        ];
        let html = render_detail_html(&sections(), &images, &sample_product()).expect("render");
        assert!(html.contains(r#"src="main.png""#));
        let placeholder = html.find("428x428").expect("detail1 placeholder");
        let second = html.find(r#"src="detail2.png""#).expect("detail2 image");
        assert!(placeholder < second);
        assert!(!html.contains("usage.png"));

        let md = render_markdown(&sections(), &images, &sample_product());
        assert!(md.contains("![사용 설명](usage.png)"));
    }

    #[test]
    fn markdown_contains_exporter_sections() {
        let md = render_markdown(&sections(), &[], &sample_product());
        assert!(md.starts_with("# 바삭 감자칩 - 저칼로리\n"));
        assert!(md.contains("**한줄요약:** 담백한 감자칩 (제조국: 대한민국)"));
        assert!(md.contains("1. **저칼로리** — 100g당 200kcal"));
        assert!(md.contains("- 제조국: 대한민국"));
        assert!(md.trim_end().ends_with("지금 구매하면 **쿠팡 단독 특가** — 한정수량!"));
    }

    #[test]
    fn markdown_heading_bold_and_list() {
        let html = markdown_to_html("## Title\n**bold** text\n- one\n- two\n* three\n\nafter");
        assert!(html.contains("<h2>Title</h2>"));
        assert!(html.contains("<strong>bold</strong> text"));
        assert_eq!(html.matches("<ul>").count(), 1);
        assert_eq!(html.matches("<li>").count(), 3);
        assert!(html.contains("<p>after</p>"));
    }

    #[test]
    fn markdown_escapes_before_tagging() {
        let html = markdown_to_html("<b>hi</b> & **x**");
        assert_eq!(html.trim(), "<p>&lt;b&gt;hi&lt;/b&gt; &amp; <strong>x</strong></p>");
    }

    #[test]
    fn analysis_report_lists_prices() {
        let analysis = StrategicAnalysis {
            swot: Swot {
                strengths: vec!["담백한 맛".into()],
                ..Default::default()
            },
            three_c: ThreeC::default(),
            price_analysis: PriceAnalysis {
                min_price: Some(9_900),
                max_price: Some(15_900),
                avg_price: Some(12_900),
                price_range: "9,900원 ~ 15,900원".into(),
                lowest_product: None,
                all_prices: vec![PricePoint {
                    price: 9_900,
                    product: "감자칩 A".into(),
                    url: "https://www.coupang.com/vp/products/1".into(),
                    platform: "coupang".into(),
                }],
            },
            insights: vec!["💪 핵심 강점: 담백한 맛".into()],
            competitor_count: 1,
        };
        let subject = AnalysisSubject::from(&sample_product());
        let html = render_analysis_html(&analysis, &subject).expect("render");
        assert!(html.contains("SWOT + 3C 분석 - 바삭 감자칩"));
        assert!(html.contains("9,900원"));
        assert!(html.contains("최저가"));
        assert!(html.contains("데이터 없음"));
    }
}
