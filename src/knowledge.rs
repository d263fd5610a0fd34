use crate::analysis::StrategicAnalysis;
use crate::export::write_atomic;
use crate::llm::Embedder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

const EXCERPT_CHARS: usize = 300;
pub const NO_CONTEXT: &str = "관련 상품 데이터 없음";

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("embedding error: {0}")]
    Embedding(#[from] crate::llm::LlmError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: Uuid,
    pub product_name: String,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

/// Past product pages and analyses kept in a single JSON file. Searched by
/// embedding similarity when an embedder is attached, by term overlap
/// otherwise.
pub struct KnowledgeStore {
    path: PathBuf,
    docs: RwLock<Vec<KnowledgeDocument>>,
    embedder: Option<Arc<dyn Embedder>>,
}

impl KnowledgeStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, KnowledgeError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let docs = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|err| {
                warn!(target = "studio.knowledge", path = %path.display(), error = %err, "knowledge_file_invalid");
                Vec::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        info!(target = "studio.knowledge", documents = docs.len(), "knowledge_store_opened");
        Ok(Self {
            path,
            docs: RwLock::new(docs),
            embedder: None,
        })
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Embeds every stored document that has no vector yet. Returns how many
    /// were filled in.
    pub async fn reindex(&self) -> Result<usize, KnowledgeError> {
        let Some(embedder) = &self.embedder else {
            return Ok(0);
        };
        let pending: Vec<(Uuid, String)> = self
            .docs
            .read()
            .await
            .iter()
            .filter(|doc| doc.embedding.is_empty())
            .map(|doc| (doc.id, embedding_text(&doc.product_name, &doc.content)))
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }
        let texts: Vec<String> = pending.iter().map(|(_, text)| text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        let filled: BTreeMap<Uuid, Vec<f32>> = pending
            .into_iter()
            .map(|(id, _)| id)
            .zip(vectors)
            .collect();

        let mut docs = self.docs.write().await;
        let mut next = docs.clone();
        let mut count = 0;
        for doc in next.iter_mut().filter(|doc| doc.embedding.is_empty()) {
            if let Some(vector) = filled.get(&doc.id) {
                doc.embedding = vector.clone();
                count += 1;
            }
        }
        self.persist(&next).await?;
        *docs = next;
        info!(target = "studio.knowledge", count, "knowledge_reindexed");
        Ok(count)
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    pub async fn add_product(
        &self,
        product_name: &str,
        content: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), KnowledgeError> {
        let embedding = self
            .embed_one(&embedding_text(product_name, content))
            .await
            .unwrap_or_default();
        let doc = KnowledgeDocument {
            id: Uuid::new_v4(),
            product_name: product_name.to_string(),
            content: content.to_string(),
            metadata,
            added_at: Utc::now(),
            embedding,
        };

        let mut docs = self.docs.write().await;
        let mut next = docs.clone();
        next.push(doc);
        self.persist(&next).await?;
        *docs = next;
        debug!(target = "studio.knowledge", product = product_name, "knowledge_document_added");
        Ok(())
    }

    pub async fn add_swot_analysis(
        &self,
        product_name: &str,
        analysis: &StrategicAnalysis,
        mut metadata: BTreeMap<String, String>,
    ) -> Result<(), KnowledgeError> {
        let swot = &analysis.swot;
        let content = [
            ("강점", &swot.strengths),
            ("약점", &swot.weaknesses),
            ("기회", &swot.opportunities),
            ("위협", &swot.threats),
        ]
        .iter()
        .map(|(label, items)| format!("{label}: {}", items.join(", ")))
        .chain(analysis.insights.iter().cloned())
        .collect::<Vec<_>>()
        .join("\n");
        metadata.insert("type".into(), "swot_analysis".into());
        self.add_product(product_name, &content, metadata).await
    }

    /// The `k` documents closest to `query`, best first. With a category
    /// only documents tagged with exactly that category are considered.
    /// Falls back to term overlap when no query vector can be had or no
    /// document carries one.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        category: Option<&str>,
    ) -> Vec<KnowledgeDocument> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        if let Some(query_vector) = self.embed_one(query.trim()).await {
            let docs = self.docs.read().await;
            if docs.iter().any(|doc| !doc.embedding.is_empty()) {
                let mut scored: Vec<(f32, &KnowledgeDocument)> = docs
                    .iter()
                    .filter(|doc| in_category(doc, category) && !doc.embedding.is_empty())
                    .map(|doc| (cosine_similarity(&query_vector, &doc.embedding), doc))
                    .filter(|(score, _)| *score > 0.0)
                    .collect();
                scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                return scored.into_iter().take(k).map(|(_, doc)| doc.clone()).collect();
            }
        }
        self.search_terms(query, k, category).await
    }

    async fn search_terms(
        &self,
        query: &str,
        k: usize,
        category: Option<&str>,
    ) -> Vec<KnowledgeDocument> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }
        let docs = self.docs.read().await;
        let mut scored: Vec<(usize, &KnowledgeDocument)> = docs
            .iter()
            .filter(|doc| in_category(doc, category))
            .filter_map(|doc| {
                let haystack = format!("{} {}", doc.product_name, doc.content).to_lowercase();
                let score = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                (score > 0).then_some((score, doc))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(k).map(|(_, doc)| doc.clone()).collect()
    }

    pub async fn context_for_product(&self, product_name: &str, category: Option<&str>) -> String {
        let category = category.filter(|c| !c.trim().is_empty());
        let query = format!("{product_name} {}", category.unwrap_or_default());
        let docs = self.search(&query, 3, category).await;
        if docs.is_empty() {
            return NO_CONTEXT.to_string();
        }
        docs.iter()
            .enumerate()
            .map(|(i, doc)| {
                let excerpt: String = doc.content.chars().take(EXCERPT_CHARS).collect();
                format!(
                    "## 유사 상품 {}\n상품명: {}\n내용: {excerpt}...\n",
                    i + 1,
                    doc.product_name
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn load_samples(&self) -> Result<usize, KnowledgeError> {
        let samples = sample_documents();
        let count = samples.len();
        for (name, category, platform, content) in samples {
            let metadata = BTreeMap::from([
                ("category".to_string(), category.to_string()),
                ("platform".to_string(), platform.to_string()),
            ]);
            self.add_product(name, content, metadata).await?;
        }
        info!(target = "studio.knowledge", count, "knowledge_samples_loaded");
        Ok(count)
    }

    pub async fn clear(&self) -> Result<(), KnowledgeError> {
        let mut docs = self.docs.write().await;
        self.persist(&[]).await?;
        docs.clear();
        warn!(target = "studio.knowledge", "knowledge_store_cleared");
        Ok(())
    }

    async fn persist(&self, docs: &[KnowledgeDocument]) -> Result<(), KnowledgeError> {
        let body = serde_json::to_vec_pretty(docs)?;
        write_atomic(&self.path, &body).await?;
        Ok(())
    }

    async fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(&[text.to_string()]).await {
            Ok(vectors) => vectors.into_iter().next().filter(|v| !v.is_empty()),
            Err(err) => {
                warn!(target = "studio.knowledge", error = %err, "embedding_failed");
                None
            }
        }
    }
}

fn embedding_text(product_name: &str, content: &str) -> String {
    format!("{product_name}\n{content}")
}

fn in_category(doc: &KnowledgeDocument, category: Option<&str>) -> bool {
    category.is_none_or(|c| doc.metadata.get("category").map(String::as_str) == Some(c))
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn sample_documents() -> Vec<(&'static str, &'static str, &'static str, &'static str)> {
    vec![
        (
            "제디터 정육 스테이크용 한우 (300g)",
            "푸드",
            "쿠팡",
            "제디터 정육의 스테이크용 한우는 최상급 한우만을 선별하여 가공한 제품으로 품질과 맛을 보증합니다. \
청결한 시스템에서 가공·포장되어 별다른 손질 없이 바로 조리할 수 있습니다. 1등급 이상 한우만을 엄선하였습니다.

Check Point:
- 최상의 품질: 믿음직한 1+ 한우만을 엄선하였습니다
- 최선의 맛과 육질: 부드러운 육질과 풍부한 식감
- 풍부한 영양소: 단백질, 철분, 아미노산

사용부위: 안심
원산지: 국내산
등급: 1+",
        ),
        (
            "제디터 키즈 레깅스",
            "패션",
            "네이버",
            "편한데 예쁘기까지? 엄마도 아이도 만족해요!

신축성 좋은 제디터 키즈 레깅스는 만 2세부터 7세까지 사이즈가 준비되어 있습니다.

Point 1: 움직임 많은 아이에게 딱 맞는 신축성
Point 2: 어느 상황에나 입힐 수 있는 다양한 컬러
Point 3: 안심 항균 소재

4가지 색상: 멜란지 그레이, 스카이 블루, 라이트 퍼플, 핫핑크",
        ),
    ]
}
