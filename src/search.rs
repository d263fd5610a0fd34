use crate::analysis::extract_prices;
use crate::http::build_client;
use crate::reviews::{Review, extract_reviews};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use serde_with::skip_serializing_none;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

const MIN_PLAUSIBLE_PRICE: u64 = 1_000;
const RAW_CONTENT_KEEP_CHARS: usize = 2_000;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_depth")]
    pub search_depth: String,
    #[serde(default)]
    pub days: Option<u32>,
    #[serde(default)]
    pub include_raw_content: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            search_depth: default_depth(),
            days: None,
            include_raw_content: false,
        }
    }
}

/// Upper bound on hits requested per marketplace.
pub const MAX_RESULTS_LIMIT: usize = 50;

pub fn clamp_max_results(max_results: usize) -> usize {
    max_results.clamp(1, MAX_RESULTS_LIMIT)
}

impl SearchOptions {
    pub fn with_max_results(max_results: usize) -> Self {
        Self {
            max_results: clamp_max_results(max_results),
            ..Default::default()
        }
    }
}

fn default_max_results() -> usize {
    10
}

fn default_depth() -> String {
    "advanced".into()
}

/// One external search hit scoped to a marketplace.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorRecord {
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    pub score: Option<f64>,
    pub raw_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reviews: Vec<Review>,
    pub price: Option<u64>,
    pub rating: Option<f32>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl CompetitorRecord {
    pub fn new(platform: &str, title: &str, url: &str, snippet: &str) -> Self {
        let price = extract_prices(&format!("{title} {snippet}")).first().copied();
        Self {
            platform: platform.to_string(),
            title: title.to_string(),
            url: url.to_string(),
            snippet: snippet.to_string(),
            score: None,
            raw_content: None,
            reviews: Vec::new(),
            price,
            rating: extract_rating(snippet),
            timestamp: Some(Utc::now()),
        }
    }
}

/// A marketplace that failed is kept in the result list as a marker so the
/// caller can see which platform dropped out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchHit {
    Failed { platform: String, error: String },
    Found(CompetitorRecord),
}

impl SearchHit {
    pub fn record(&self) -> Option<&CompetitorRecord> {
        match self {
            SearchHit::Found(record) => Some(record),
            SearchHit::Failed { .. } => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.record().map(|r| r.url.as_str())
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetitorData {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub search_engine: String,
    pub search_metadata: Option<Value>,
}

impl CompetitorData {
    /// The shape used when web search is switched off: no query, no results.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<CompetitorRecord>) -> Self {
        Self {
            results: records.into_iter().map(SearchHit::Found).collect(),
            ..Default::default()
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &CompetitorRecord> {
        self.results.iter().filter_map(SearchHit::record)
    }

    pub fn success_count(&self) -> usize {
        self.records().count()
    }

    pub fn reviews(&self) -> Vec<Review> {
        self.records()
            .flat_map(|r| r.reviews.iter().cloned())
            .collect()
    }
}

/// Hit as returned by a backend before it is attached to a marketplace.
#[derive(Debug, Clone, Default)]
pub struct RawHit {
    pub title: String,
    pub url: String,
    pub content: String,
    pub score: Option<f64>,
    pub raw_content: Option<String>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn query(
        &self,
        query: &str,
        domain: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RawHit>, SearchError>;
}

pub struct Marketplace;

impl Marketplace {
    pub fn domain(platform: &str) -> &str {
        match platform {
            "coupang" => "coupang.com",
            "naver" => "smartstore.naver.com",
            "11st" => "11st.co.kr",
            other => other,
        }
    }
}

#[derive(Clone)]
pub struct WebSearch {
    backend: Arc<dyn SearchBackend>,
}

impl WebSearch {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    pub fn from_env() -> Self {
        match std::env::var("TAVILY_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
        {
            Some(key) => {
                let base_url = std::env::var("TAVILY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.tavily.com".into());
                info!(target = "studio.search", "tavily_backend_enabled");
                Self::new(Arc::new(TavilyBackend::new(key, base_url)))
            }
            None => {
                warn!(
                    target = "studio.search",
                    "TAVILY_API_KEY not set; falling back to duckduckgo"
                );
                Self::new(Arc::new(DuckDuckGoBackend::new()))
            }
        }
    }

    pub fn engine(&self) -> &'static str {
        self.backend.name()
    }

    /// Queries every marketplace in order. Never fails: a marketplace error
    /// turns into a single `Failed` hit.
    pub async fn search(
        &self,
        query: &str,
        platforms: &[String],
        options: &SearchOptions,
    ) -> CompetitorData {
        let mut results = Vec::new();
        for platform in platforms {
            let domain = Marketplace::domain(platform);
            let platform_query = format!("{query} site:{domain}");
            match self.backend.query(&platform_query, domain, options).await {
                Ok(hits) => {
                    debug!(
                        target = "studio.search",
                        platform = %platform,
                        hits = hits.len(),
                        "marketplace_searched"
                    );
                    results.extend(
                        hits.into_iter()
                            .take(options.max_results)
                            .map(|hit| SearchHit::Found(to_record(platform, hit, options))),
                    );
                }
                Err(err) => {
                    warn!(
                        target = "studio.search",
                        platform = %platform,
                        error = %err,
                        "marketplace_search_failed"
                    );
                    results.push(SearchHit::Failed {
                        platform: platform.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        CompetitorData {
            query: query.to_string(),
            platforms: platforms.to_vec(),
            results,
            search_engine: self.backend.name().to_string(),
            search_metadata: None,
        }
    }

    /// Like `search`, but drops hits dated before the last `days` days.
    /// Hits without a timestamp are kept.
    pub async fn search_recent(
        &self,
        query: &str,
        platforms: &[String],
        days: u32,
        max_results: usize,
    ) -> CompetitorData {
        let options = SearchOptions {
            max_results: clamp_max_results(max_results),
            days: Some(days),
            ..Default::default()
        };
        let mut data = self.search(query, platforms, &options).await;
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        data.results
            .retain(|hit| hit.record().and_then(|r| r.timestamp).is_none_or(|ts| ts >= cutoff));
        data
    }

    /// Re-runs a search with a new query, fetching twice as many hits so the
    /// excluded URLs can be dropped without shrinking the result.
    pub async fn refine(
        &self,
        original_query: &str,
        refined_query: &str,
        platforms: &[String],
        exclude_urls: &[String],
        max_results: usize,
    ) -> CompetitorData {
        let max_results = clamp_max_results(max_results);
        let options = SearchOptions::with_max_results(max_results.saturating_mul(2));
        let mut data = self.search(refined_query, platforms, &options).await;
        data.results = data
            .results
            .into_iter()
            .filter(|hit| {
                hit.url()
                    .map(|url| !exclude_urls.iter().any(|ex| ex == url))
                    .unwrap_or(true)
            })
            .take(max_results)
            .collect();
        data.search_metadata = Some(json!({
            "original_query": original_query,
            "refined_query": refined_query,
            "excluded_count": exclude_urls.len(),
            "timestamp": Utc::now(),
            "total_results": data.results.len(),
        }));
        data
    }
}

fn to_record(platform: &str, hit: RawHit, options: &SearchOptions) -> CompetitorRecord {
    let mut record = CompetitorRecord::new(platform, &hit.title, &hit.url, &hit.content);
    record.score = hit.score;
    if options.include_raw_content {
        if let Some(raw) = hit.raw_content {
            record.reviews = extract_reviews(&raw, &hit.url);
            record.raw_content = Some(raw.chars().take(RAW_CONTENT_KEEP_CHARS).collect());
        }
    }
    record
}

static LISTING_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(/np/search|/search[/?]|[?&](q|query|keyword)=|/categor(y|ies)|/np/categories|/list[/?]|/best[/?]|/campaigns?/)")
        .expect("listing url pattern")
});

static PRICE_ONLY_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s\d,.원₩~\-]*$").expect("price-only title pattern"));

static LOOSE_PRICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:,\d{3})+|\d+)\s*원").expect("loose price pattern"));

static RATING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:평점|별점|rating)\s*:?\s*([0-5](?:\.\d)?)|([0-5]\.\d)\s*(?:/\s*5|점)")
        .expect("rating pattern")
});

/// Keeps only hits that look like a single product page. Failure markers
/// pass through untouched.
pub fn filter_product_pages(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    hits.into_iter()
        .filter(|hit| match hit {
            SearchHit::Failed { .. } => true,
            SearchHit::Found(record) => is_product_page(record),
        })
        .collect()
}

fn is_product_page(record: &CompetitorRecord) -> bool {
    if LISTING_URL.is_match(&record.url) {
        return false;
    }
    if PRICE_ONLY_TITLE.is_match(record.title.trim()) {
        return false;
    }
    let price = record.price.or_else(|| {
        let text = format!("{} {}", record.title, record.snippet);
        LOOSE_PRICE
            .captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().replace(',', "").parse::<u64>().ok())
    });
    !matches!(price, Some(p) if p < MIN_PLAUSIBLE_PRICE)
}

fn extract_rating(text: &str) -> Option<f32> {
    let caps = RATING.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

pub struct TavilyBackend {
    http: Client,
    api_key: String,
    base_url: String,
}

impl TavilyBackend {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            http: build_client(),
            api_key,
            base_url,
        }
    }
}

#[skip_serializing_none]
#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    include_domains: [&'a str; 1],
    include_raw_content: bool,
    days: Option<u32>,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    raw_content: Option<String>,
}

#[async_trait]
impl SearchBackend for TavilyBackend {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn query(
        &self,
        query: &str,
        domain: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RawHit>, SearchError> {
        let body = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results: options.max_results,
            search_depth: &options.search_depth,
            include_domains: [domain],
            include_raw_content: options.include_raw_content,
            days: options.days,
        };
        let base = self.base_url.trim_end_matches('/');
        let response = self
            .http
            .post(format!("{base}/search"))
            .json(&body)
            .send()
            .await
            .map_err(|err| SearchError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SearchError::Http(format!("HTTP {}", response.status())));
        }
        let payload: TavilyResponse = response
            .json()
            .await
            .map_err(|err| SearchError::InvalidResponse(err.to_string()))?;
        Ok(payload
            .results
            .into_iter()
            .map(|r| RawHit {
                title: r.title,
                url: r.url,
                content: r.content,
                score: r.score,
                raw_content: r.raw_content,
            })
            .collect())
    }
}

/// Scrapes the DuckDuckGo HTML endpoint. Used when no Tavily key is set.
pub struct DuckDuckGoBackend {
    http: Client,
}

impl DuckDuckGoBackend {
    pub fn new() -> Self {
        Self {
            http: build_client(),
        }
    }
}

impl Default for DuckDuckGoBackend {
    fn default() -> Self {
        Self::new()
    }
}

static DDG_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).expect("ddg link")
});
static DDG_SNIPPET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)class="result__snippet"[^>]*>(.*?)</a>"#).expect("ddg snippet")
});
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));

pub(crate) fn parse_duckduckgo_html(html: &str) -> Vec<RawHit> {
    let snippets: Vec<String> = DDG_SNIPPET
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| clean_html_text(m.as_str()))
        .collect();
    DDG_LINK
        .captures_iter(html)
        .enumerate()
        .filter_map(|(i, caps)| {
            let href = caps.get(1)?.as_str();
            let title = clean_html_text(caps.get(2)?.as_str());
            Some(RawHit {
                title,
                url: resolve_ddg_href(href),
                content: snippets.get(i).cloned().unwrap_or_default(),
                score: None,
                raw_content: None,
            })
        })
        .collect()
}

fn resolve_ddg_href(href: &str) -> String {
    let Some(start) = href.find("uddg=") else {
        return href.to_string();
    };
    let encoded = &href[start + 5..];
    let encoded = encoded.split('&').next().unwrap_or(encoded);
    urlencoding::decode(encoded)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| href.to_string())
}

fn clean_html_text(fragment: &str) -> String {
    TAGS.replace_all(fragment, "")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .trim()
        .to_string()
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn query(
        &self,
        query: &str,
        _domain: &str,
        _options: &SearchOptions,
    ) -> Result<Vec<RawHit>, SearchError> {
        let url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            urlencoding::encode(query)
        );
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| SearchError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SearchError::Http(format!("HTTP {}", response.status())));
        }
        let html = response
            .text()
            .await
            .map_err(|err| SearchError::InvalidResponse(err.to_string()))?;
        Ok(parse_duckduckgo_html(&html))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned hits per domain; domains without an entry fail.
    pub struct ScriptedSearch {
        pub by_domain: HashMap<String, Vec<RawHit>>,
        pub queries: Mutex<Vec<String>>,
    }

    impl ScriptedSearch {
        pub fn new(entries: Vec<(&str, Vec<RawHit>)>) -> Self {
            Self {
                by_domain: entries
                    .into_iter()
                    .map(|(d, hits)| (d.to_string(), hits))
                    .collect(),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn seen(&self) -> Vec<String> {
            self.queries.lock().map(|q| q.clone()).unwrap_or_default()
        }
    }

    pub fn hit(title: &str, url: &str, content: &str) -> RawHit {
        RawHit {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            score: Some(0.5),
            raw_content: None,
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedSearch {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn query(
            &self,
            query: &str,
            domain: &str,
            _options: &SearchOptions,
        ) -> Result<Vec<RawHit>, SearchError> {
            if let Ok(mut q) = self.queries.lock() {
                q.push(query.to_string());
            }
            self.by_domain
                .get(domain)
                .cloned()
                .ok_or_else(|| SearchError::Http(format!("no script for {domain}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ScriptedSearch, hit};
    use super::*;

    fn platforms(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn marketplace_domains() {
        assert_eq!(Marketplace::domain("coupang"), "coupang.com");
        assert_eq!(Marketplace::domain("naver"), "smartstore.naver.com");
        assert_eq!(Marketplace::domain("11st"), "11st.co.kr");
        assert_eq!(Marketplace::domain("gmarket.co.kr"), "gmarket.co.kr");
    }

    #[tokio::test]
    async fn failed_marketplace_becomes_marker() {
        let backend = Arc::new(ScriptedSearch::new(vec![(
            "coupang.com",
            vec![hit("감자칩 120g", "https://www.coupang.com/vp/products/1", "12,900원 무료배송")],
        )]));
        let search = WebSearch::new(backend.clone());
        let data = search
            .search("감자칩", &platforms(&["coupang", "naver"]), &SearchOptions::default())
            .await;

        assert_eq!(data.results.len(), 2);
        assert_eq!(data.success_count(), 1);
        assert!(matches!(
            &data.results[1],
            SearchHit::Failed { platform, .. } if platform == "naver"
        ));
        let record = data.results[0].record().expect("record");
        assert_eq!(record.price, Some(12_900));
        assert_eq!(
            backend.seen(),
            vec![
                "감자칩 site:coupang.com".to_string(),
                "감자칩 site:smartstore.naver.com".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn raw_content_yields_reviews() {
        let mut with_raw = hit("쿠팡 감자칩", "https://www.coupang.com/vp/products/2", "");
        with_raw.raw_content =
            Some(r#"<div class="review-content">정말 바삭하고 맛있어요 추천합니다</div>"#.into());
        let search = WebSearch::new(Arc::new(ScriptedSearch::new(vec![(
            "coupang.com",
            vec![with_raw],
        )])));
        let options = SearchOptions {
            include_raw_content: true,
            ..Default::default()
        };
        let data = search.search("감자칩", &platforms(&["coupang"]), &options).await;
        assert_eq!(data.reviews().len(), 1);
    }

    #[tokio::test]
    async fn recent_search_keeps_fresh_hits() {
        let search = WebSearch::new(Arc::new(ScriptedSearch::new(vec![(
            "coupang.com",
            vec![
                hit("감자칩 A", "https://www.coupang.com/vp/products/3", ""),
                hit("감자칩 B", "https://www.coupang.com/vp/products/4", ""),
            ],
        )])));
        let data = search
            .search_recent("감자칩", &platforms(&["coupang"]), 30, 1)
            .await;
        assert_eq!(data.success_count(), 1);
        assert_eq!(data.query, "감자칩");
    }

    #[test]
    fn product_page_filter() {
        let keep = SearchHit::Found(CompetitorRecord::new(
            "coupang",
            "바삭 감자칩 120g",
            "https://www.coupang.com/vp/products/1",
            "9,900원",
        ));
        let listing = SearchHit::Found(CompetitorRecord::new(
            "coupang",
            "감자칩 검색결과",
            "https://www.coupang.com/np/search?q=감자칩",
            "",
        ));
        let price_only = SearchHit::Found(CompetitorRecord::new(
            "naver",
            "12,900원",
            "https://smartstore.naver.com/a/products/1",
            "",
        ));
        let too_cheap = SearchHit::Found(CompetitorRecord::new(
            "naver",
            "감자칩 1봉",
            "https://smartstore.naver.com/a/products/2",
            "500원 특가",
        ));
        let failed = SearchHit::Failed {
            platform: "11st".into(),
            error: "timeout".into(),
        };

        let kept = filter_product_pages(vec![keep.clone(), listing, price_only, too_cheap, failed.clone()]);
        assert_eq!(kept, vec![keep, failed]);
    }

    #[tokio::test]
    async fn refine_excludes_and_truncates() {
        let hits = (1..=6)
            .map(|i| hit(&format!("상품 {i}"), &format!("https://www.coupang.com/vp/products/{i}"), ""))
            .collect();
        let search = WebSearch::new(Arc::new(ScriptedSearch::new(vec![("coupang.com", hits)])));
        let data = search
            .refine(
                "감자칩",
                "저염 감자칩",
                &platforms(&["coupang"]),
                &["https://www.coupang.com/vp/products/1".to_string()],
                3,
            )
            .await;
        let urls: Vec<_> = data.results.iter().filter_map(SearchHit::url).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.coupang.com/vp/products/2",
                "https://www.coupang.com/vp/products/3",
                "https://www.coupang.com/vp/products/4"
            ]
        );
        let meta = data.search_metadata.expect("metadata");
        assert_eq!(meta["excluded_count"], 1);
        assert_eq!(meta["refined_query"], "저염 감자칩");
    }

    #[tokio::test]
    async fn oversized_max_results_is_clamped() {
        let hits = (1..=3)
            .map(|i| hit(&format!("상품 {i}"), &format!("https://www.coupang.com/vp/products/{i}"), ""))
            .collect();
        let search = WebSearch::new(Arc::new(ScriptedSearch::new(vec![("coupang.com", hits)])));
        let data = search
            .refine("감자칩", "저염 감자칩", &platforms(&["coupang"]), &[], usize::MAX)
            .await;
        assert_eq!(data.results.len(), 3);
        assert_eq!(SearchOptions::with_max_results(usize::MAX).max_results, MAX_RESULTS_LIMIT);
        assert_eq!(clamp_max_results(0), 1);
    }

    #[test]
    fn empty_data_serializes_to_bare_results() {
        let value = serde_json::to_value(CompetitorData::empty()).expect("serialize");
        assert_eq!(value, json!({"results": []}));
    }

    #[test]
    fn failure_marker_round_trips() {
        let hits: Vec<SearchHit> = serde_json::from_value(json!([
            {"platform": "naver", "error": "timeout"},
            {"platform": "coupang", "title": "t", "url": "https://www.coupang.com/vp/products/1"}
        ]))
        .expect("parse");
        assert!(matches!(hits[0], SearchHit::Failed { .. }));
        assert!(matches!(hits[1], SearchHit::Found(_)));
    }

    #[test]
    fn parses_duckduckgo_results() {
        let html = r#"<a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.coupang.com%2Fvp%2Fproducts%2F7&amp;rut=x"><b>감자칩</b> 세트</a>
<a class="result__snippet" href="x">오리지널 <b>감자칩</b> 15,000원</a>"#;
        let hits = parse_duckduckgo_html(html);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "감자칩 세트");
        assert_eq!(hits[0].url, "https://www.coupang.com/vp/products/7");
        assert_eq!(hits[0].content, "오리지널 감자칩 15,000원");
    }
}
