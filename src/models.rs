use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const SUMMARY_MAX_CHARS: usize = 30;

/// What the seller submits for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInput {
    pub product_name: String,
    pub summary: String,
    pub category: String,
    pub manufacture_country: String,
    #[serde(default)]
    pub manufacture_date: Option<String>,
    #[serde(default)]
    pub specs: BTreeMap<String, String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub target_customer: Option<String>,
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub image_options: ImageOptions,
    #[serde(default)]
    pub competitor_links: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub allow_web_search: bool,
    /// Strategy output carried over from an earlier SWOT step of the same session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swot_insights: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_insights: Option<String>,
}

impl ProductInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.product_name.trim().is_empty() {
            return Err("product_name must not be empty".into());
        }
        if self.summary.chars().count() > SUMMARY_MAX_CHARS {
            return Err(format!(
                "summary must be at most {SUMMARY_MAX_CHARS} characters"
            ));
        }
        if self.platforms.iter().all(|p| p.trim().is_empty()) {
            return Err("at least one platform is required".into());
        }
        Ok(())
    }

    pub fn primary_platform(&self) -> &str {
        self.platforms
            .first()
            .map(String::as_str)
            .unwrap_or("coupang")
    }

    pub fn target(&self) -> &str {
        self.target_customer.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOptions {
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_shots")]
    pub shots: Vec<String>,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            style: default_style(),
            shots: default_shots(),
        }
    }
}

/// Loose product description kept on a session; every field is optional so
/// the unified flow can fill it in over several requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub target_customer: String,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacture_country: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub specs: BTreeMap<String, String>,
}

impl ProductInfo {
    /// Overlays every non-empty field of `other` onto `self`.
    pub fn merge(&mut self, other: ProductInfo) {
        if !other.product_name.trim().is_empty() {
            self.product_name = other.product_name;
        }
        if !other.category.trim().is_empty() {
            self.category = other.category;
        }
        if !other.keywords.is_empty() {
            self.keywords = other.keywords;
        }
        if !other.target_customer.trim().is_empty() {
            self.target_customer = other.target_customer;
        }
        if !other.platforms.is_empty() {
            self.platforms = other.platforms;
        }
        if other.summary.is_some() {
            self.summary = other.summary;
        }
        if other.manufacture_country.is_some() {
            self.manufacture_country = other.manufacture_country;
        }
        self.specs.extend(other.specs);
    }

    /// Builds a full generation input, filling the fields the unified flow
    /// never asks for.
    pub fn to_product_input(&self) -> ProductInput {
        let summary = self
            .summary
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.product_name.clone());
        ProductInput {
            product_name: self.product_name.clone(),
            summary: summary.chars().take(SUMMARY_MAX_CHARS).collect(),
            category: self.category.clone(),
            manufacture_country: self
                .manufacture_country
                .clone()
                .unwrap_or_else(|| "국내".into()),
            manufacture_date: None,
            specs: self.specs.clone(),
            keywords: self.keywords.clone(),
            target_customer: Some(self.target_customer.clone()).filter(|t| !t.is_empty()),
            tone: default_tone(),
            platforms: if self.platforms.is_empty() {
                default_platforms()
            } else {
                self.platforms.clone()
            },
            image_options: ImageOptions::default(),
            competitor_links: None,
            allow_web_search: true,
            swot_insights: None,
            review_insights: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub generated_at: DateTime<Utc>,
    pub platform: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailPageResponse {
    pub project_id: String,
    pub markdown_url: String,
    pub html_url: String,
    pub analysis_url: String,
    pub images: Vec<String>,
    pub meta: ProjectMeta,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_tone() -> String {
    "친근한".into()
}

fn default_platforms() -> Vec<String> {
    vec!["coupang".into(), "naver".into()]
}

fn default_style() -> String {
    "real".into()
}

fn default_shots() -> Vec<String> {
    vec!["main".into(), "usage".into(), "infographic".into()]
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
pub(crate) fn sample_product() -> ProductInput {
    ProductInput {
        product_name: "바삭 감자칩".into(),
        summary: "에어프라이어로 굽는 담백한 감자칩".into(),
        category: "식품".into(),
        manufacture_country: "대한민국".into(),
        manufacture_date: None,
        specs: BTreeMap::from([
            ("중량".to_string(), "120g".to_string()),
            ("유통기한".to_string(), "9개월".to_string()),
        ]),
        keywords: vec!["저칼로리".into(), "간식".into()],
        target_customer: Some("다이어트 중인 직장인".into()),
        tone: default_tone(),
        platforms: vec!["coupang".into()],
        image_options: ImageOptions::default(),
        competitor_links: None,
        allow_web_search: false,
        swot_insights: None,
        review_insights: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_input_defaults_apply() {
        let input: ProductInput = serde_json::from_value(serde_json::json!({
            "product_name": "수분 크림",
            "summary": "촉촉한 하루",
            "category": "스킨케어",
            "manufacture_country": "대한민국",
        }))
        .expect("deserialize");
        assert_eq!(input.tone, "친근한");
        assert_eq!(input.platforms, vec!["coupang", "naver"]);
        assert_eq!(input.image_options.style, "real");
        assert!(input.allow_web_search);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn summary_over_limit_is_rejected() {
        let mut input = sample_product();
        input.summary = "가".repeat(SUMMARY_MAX_CHARS + 1);
        assert!(input.validate().is_err());
        input.summary = "가".repeat(SUMMARY_MAX_CHARS);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn product_info_merge_keeps_existing_fields() {
        let mut info = ProductInfo {
            product_name: "감자칩".into(),
            category: "식품".into(),
            keywords: vec!["간식".into()],
            ..Default::default()
        };
        info.merge(ProductInfo {
            target_customer: "학생".into(),
            ..Default::default()
        });
        assert_eq!(info.product_name, "감자칩");
        assert_eq!(info.keywords, vec!["간식"]);
        assert_eq!(info.target_customer, "학생");

        let input = info.to_product_input();
        assert_eq!(input.summary, "감자칩");
        assert_eq!(input.manufacture_country, "국내");
        assert_eq!(input.platforms, vec!["coupang", "naver"]);
    }
}
