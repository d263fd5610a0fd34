use crate::http::build_client;
use crate::llm::{ChatModel, LlmMessage, structured};
use crate::models::ProductInfo;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

const MAX_PROMPT_CHARS: usize = 4_000;
const MAX_NAME_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid base64 payload: {0}")]
    Decode(String),
    #[error("unsupported document: {0}")]
    Unsupported(String),
    #[error("extraction service error: {0}")]
    Http(String),
    #[error("document contains no text")]
    Empty,
}

#[derive(Deserialize)]
struct ExtractResponse {
    text: String,
}

/// Turns uploaded files into plain text. Text formats are decoded locally;
/// PDFs go to an external extraction service when one is configured.
pub struct DocumentExtractor {
    http: Client,
    service_url: Option<String>,
}

impl DocumentExtractor {
    pub fn new(service_url: Option<String>) -> Self {
        Self {
            http: build_client(),
            service_url: service_url.filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("DOCUMENT_EXTRACT_URL").ok())
    }

    pub async fn extract(&self, file_name: &str, content_base64: &str) -> Result<String, ExtractError> {
        let payload = content_base64
            .split_once("base64,")
            .map(|(_, data)| data)
            .unwrap_or(content_base64)
            .trim();
        let bytes = BASE64
            .decode(payload.as_bytes())
            .map_err(|err| ExtractError::Decode(err.to_string()))?;

        let text = if is_pdf(file_name, &bytes) {
            self.extract_pdf(file_name, bytes).await?
        } else {
            String::from_utf8(bytes)
                .map_err(|_| ExtractError::Unsupported(format!("{file_name} is not UTF-8 text")))?
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ExtractError::Empty);
        }
        debug!(target = "studio.documents", file = file_name, chars = text.chars().count(), "document_extracted");
        Ok(text)
    }

    async fn extract_pdf(&self, file_name: &str, bytes: Vec<u8>) -> Result<String, ExtractError> {
        let Some(url) = self.service_url.as_deref() else {
            return Err(ExtractError::Unsupported(format!(
                "{file_name}: PDF extraction service not configured"
            )));
        };
        let resp = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes)
            .send()
            .await
            .map_err(|err| ExtractError::Http(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(ExtractError::Http(format!("status {}", resp.status())));
        }
        let raw = resp
            .text()
            .await
            .map_err(|err| ExtractError::Http(err.to_string()))?;
        Ok(serde_json::from_str::<ExtractResponse>(&raw)
            .map(|r| r.text)
            .unwrap_or(raw))
    }
}

fn is_pdf(file_name: &str, bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF") || file_name.to_ascii_lowercase().ends_with(".pdf")
}

const PARSE_PROMPT: &str = r#"다음 문서에서 상품 정보를 추출하세요.
JSON 형식으로만 답변하세요:
{"product_name": "", "category": "", "keywords": [], "target_customer": "", "summary": "", "manufacture_country": "", "specs": {}}
알 수 없는 항목은 빈 값으로 두세요."#;

/// Pulls product fields out of an uploaded document. JSON uploads are read
/// directly; other text goes through the model, and when that fails the first
/// line becomes the product name.
pub async fn parse_product_info(llm: &dyn ChatModel, text: &str) -> ProductInfo {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return product_info_from_json(&value);
    }

    let excerpt: String = text.chars().take(MAX_PROMPT_CHARS).collect();
    let messages = [LlmMessage::system(PARSE_PROMPT), LlmMessage::user(excerpt)];
    match structured::request_object::<Value>(llm, &messages).await {
        Ok(value) => {
            let info = product_info_from_json(&value);
            if !info.product_name.trim().is_empty() {
                return info;
            }
            warn!(target = "studio.documents", "parsed_product_without_name");
        }
        Err(err) => {
            warn!(target = "studio.documents", error = %err, "product_parse_fallback");
            crate::metrics::llm_fallback("document_parse");
        }
    }
    ProductInfo {
        product_name: text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .chars()
            .take(MAX_NAME_CHARS)
            .collect(),
        ..Default::default()
    }
}

/// Accepts both the canonical field names and the short aliases older
/// uploads used (`name`, `target`, comma-separated keywords).
pub fn product_info_from_json(value: &Value) -> ProductInfo {
    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| value.get(*k).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };
    let list = |key: &str| match value.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(joined)) => joined
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    };
    let optional = |key: &str| Some(text(&[key])).filter(|s| !s.is_empty());
    let specs = value
        .get("specs")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| match v {
                    Value::String(s) if !s.is_empty() => Some((k.clone(), s.clone())),
                    Value::Number(n) => Some((k.clone(), n.to_string())),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    ProductInfo {
        product_name: text(&["product_name", "name"]),
        category: text(&["category"]),
        keywords: list("keywords"),
        target_customer: text(&["target_customer", "target"]),
        platforms: list("platforms"),
        summary: optional("summary"),
        manufacture_country: optional("manufacture_country"),
        specs,
    }
}
