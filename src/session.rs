use crate::analysis::StrategicAnalysis;
use crate::content::ContentSections;
use crate::export::write_atomic;
use crate::models::{ChatTurn, ProductInfo, ProductInput};
use crate::search::CompetitorData;
use crate::workflow::DetailPageResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Progress of a project through the unified flow. Steps only move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Init,
    Swot,
    Detail,
    Chat,
}

impl Step {
    pub fn next(self) -> &'static str {
        match self {
            Step::Init => "swot",
            Step::Swot => "detail",
            Step::Detail | Step::Chat => "chat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub product_info: ProductInfo,
    #[serde(default)]
    pub swot_result: Option<StrategicAnalysis>,
    #[serde(default)]
    pub competitor_data: Option<CompetitorData>,
    #[serde(default)]
    pub review_insights: Option<String>,
    #[serde(default)]
    pub detail_page_result: Option<DetailPageResult>,
    /// The input the last detail page was generated from; re-rendering after
    /// a content edit reuses it.
    #[serde(default)]
    pub detail_input: Option<ProductInput>,
    #[serde(default)]
    pub content_sections: Option<ContentSections>,
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
    #[serde(default)]
    pub current_step: Step,
    #[serde(default)]
    pub completed_steps: Vec<Step>,
}

impl Default for ProjectSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectSession {
    pub fn new() -> Self {
        let now = Utc::now();
        let hex = Uuid::new_v4().simple().to_string();
        Self {
            session_id: format!("proj_{}", &hex[..8]),
            created_at: now,
            updated_at: now,
            product_info: ProductInfo::default(),
            swot_result: None,
            competitor_data: None,
            review_insights: None,
            detail_page_result: None,
            detail_input: None,
            content_sections: None,
            chat_history: Vec::new(),
            current_step: Step::Init,
            completed_steps: Vec::new(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Records `step` as completed; `current_step` never moves backwards.
    fn advance(&mut self, step: Step) {
        if step > self.current_step {
            self.current_step = step;
        }
        if !self.completed_steps.contains(&step) {
            self.completed_steps.push(step);
        }
    }

    pub fn update_product_info(&mut self, info: ProductInfo) {
        self.product_info.merge(info);
        self.touch();
    }

    pub fn set_swot_result(&mut self, analysis: StrategicAnalysis, data: CompetitorData) {
        self.swot_result = Some(analysis);
        self.competitor_data = Some(data);
        self.advance(Step::Swot);
        self.touch();
    }

    pub fn set_review_insights(&mut self, insights: String) {
        self.review_insights = Some(insights);
        self.touch();
    }

    pub fn set_detail_page_result(&mut self, result: DetailPageResult, input: ProductInput) {
        self.content_sections = Some(result.content_sections.clone());
        self.detail_page_result = Some(result);
        self.detail_input = Some(input);
        self.advance(Step::Detail);
        self.touch();
    }

    /// Replaces the edited sections on both the session and its last result.
    pub fn set_content_sections(&mut self, sections: ContentSections) {
        if let Some(result) = self.detail_page_result.as_mut() {
            result.content_sections = sections.clone();
        }
        self.content_sections = Some(sections);
        self.touch();
    }

    pub fn add_chat_message(&mut self, role: &str, content: &str) {
        self.chat_history.push(ChatTurn {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Some(Utc::now()),
        });
        self.advance(Step::Chat);
        self.touch();
    }

    /// Plain-text project summary handed to the chatbot.
    pub fn context_for_chat(&self) -> String {
        let info = &self.product_info;
        let mut parts = vec![format!("상품명: {}", info.product_name)];
        if !info.category.is_empty() {
            parts.push(format!("카테고리: {}", info.category));
        }
        if !info.keywords.is_empty() {
            parts.push(format!("키워드: {}", info.keywords.join(", ")));
        }
        if let Some(analysis) = &self.swot_result {
            parts.push("\n[SWOT 분석 완료]".into());
            let strengths: Vec<&str> = analysis
                .swot
                .strengths
                .iter()
                .take(3)
                .map(String::as_str)
                .collect();
            parts.push(format!("강점: {}", strengths.join(", ")));
        }
        if let Some(insights) = &self.review_insights {
            parts.push("\n[리뷰 인사이트]".into());
            parts.push(insights.clone());
        }
        parts.join("\n")
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid session file: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Sessions cached in memory and persisted as one JSON file each.
/// Read-modify-write cycles on one session are serialized by a per-session
/// lock; different sessions proceed independently.
pub struct SessionStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, ProjectSession>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!(target = "studio.session", dir = %dir.display(), "session_store_opened");
        Ok(Self {
            dir,
            cache: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn create(&self) -> Result<ProjectSession, SessionError> {
        let session = ProjectSession::new();
        self.persist(&session).await?;
        self.cache
            .lock()
            .await
            .insert(session.session_id.clone(), session.clone());
        info!(target = "studio.session", session_id = %session.session_id, "session_created");
        Ok(session)
    }

    /// Cache first, then disk. Unknown, malformed or unreadable ids yield `None`.
    pub async fn get(&self, id: &str) -> Option<ProjectSession> {
        if let Some(session) = self.cache.lock().await.get(id) {
            return Some(session.clone());
        }
        let session = self.load(id).await?;
        self.cache
            .lock()
            .await
            .insert(id.to_string(), session.clone());
        Some(session)
    }

    /// Applies `f` to the stored session under its lock and persists the result.
    pub async fn update<F, R>(&self, id: &str, f: F) -> Result<(ProjectSession, R), SessionError>
    where
        F: FnOnce(&mut ProjectSession) -> R,
    {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut session = self
            .get(id)
            .await
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let out = f(&mut session);
        self.persist(&session).await?;
        self.cache
            .lock()
            .await
            .insert(id.to_string(), session.clone());
        debug!(target = "studio.session", session_id = id, step = ?session.current_step, "session_updated");
        Ok((session, out))
    }

    /// Returns whether anything was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, SessionError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let cached = self.cache.lock().await.remove(id).is_some();
        let on_disk = match self.path_for(id) {
            Some(path) => match tokio::fs::remove_file(&path).await {
                Ok(()) => true,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
                Err(err) => return Err(err.into()),
            },
            None => false,
        };
        self.locks.lock().await.remove(id);
        if cached || on_disk {
            info!(target = "studio.session", session_id = id, "session_deleted");
        }
        Ok(cached || on_disk)
    }

    /// Every session on disk, newest first.
    pub async fn list(&self) -> Result<Vec<ProjectSession>, SessionError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = self.get(&id).await {
                sessions.push(session);
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    fn path_for(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| self.dir.join(format!("{id}.json")))
    }

    async fn load(&self, id: &str) -> Option<ProjectSession> {
        let path = self.path_for(id)?;
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(target = "studio.session", session_id = id, error = %err, "session_read_failed");
                }
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(target = "studio.session", session_id = id, error = %err, "session_file_invalid");
                None
            }
        }
    }

    async fn persist(&self, session: &ProjectSession) -> Result<(), SessionError> {
        let path = self
            .path_for(&session.session_id)
            .ok_or_else(|| SessionError::NotFound(session.session_id.clone()))?;
        let body = serde_json::to_vec_pretty(session)?;
        write_atomic(&path, &body).await?;
        Ok(())
    }
}
