mod analysis;
mod chat;
mod content;
mod documents;
mod export;
mod http;
mod images;
mod insights;
mod jobs;
mod knowledge;
mod llm;
mod metrics;
mod models;
mod render;
mod reviews;
mod search;
mod selling;
mod session;
mod workflow;

use analysis::{AnalysisSubject, StrategicAnalysis, StrategicAnalyzer};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use content::apply_edits;
use documents::{DocumentExtractor, ExtractError};
use export::{DocumentKind, Exporter};
use images::{ImageConfig, ImageGenerator};
use jobs::{JobInfo, JobQueue, JobState};
use knowledge::{KnowledgeDocument, KnowledgeStore, NO_CONTEXT};
use llm::{ChatModel, LlmClient, LlmConfig};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, ChatTurn, DetailPageResponse, ProductInfo, ProductInput};
use reviews::ReviewAnalyzer;
use search::{
    CompetitorData, SearchHit, SearchOptions, WebSearch, clamp_max_results, filter_product_pages,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use session::{ProjectSession, SessionError, SessionStore, Step};
use std::{collections::BTreeMap, net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use workflow::{PipelineError, PipelineErrorKind, Workflow};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "studio.api", "server crashed: {err}");
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let projects_dir = env_path("PROJECTS_DIR", "projects");
    tokio::fs::create_dir_all(&projects_dir).await?;

    let client = Arc::new(LlmClient::new(LlmConfig::from_env()));
    if client.is_configured() {
        info!(target = "studio.llm", model = client.model(), "llm_configured");
    } else {
        warn!(target = "studio.llm", "OPENAI_API_KEY not set; every section falls back to defaults");
    }
    let llm: Arc<dyn ChatModel> = client.clone();
    let search = WebSearch::from_env();
    let sessions = Arc::new(SessionStore::open(env_path("SESSIONS_DIR", "sessions")).await?);
    let mut knowledge = KnowledgeStore::open(env_path("KNOWLEDGE_PATH", "data/knowledge.json")).await?;
    if client.is_configured() {
        knowledge = knowledge.with_embedder(client.clone());
        if let Err(err) = knowledge.reindex().await {
            warn!(target = "studio.knowledge", error = %err, "knowledge_reindex_failed");
        }
    }
    let knowledge = Arc::new(knowledge);
    if env_flag("KNOWLEDGE_SEED") && knowledge.is_empty().await {
        knowledge.load_samples().await?;
    }

    let workflow = Workflow::new(
        llm.clone(),
        search.clone(),
        ImageGenerator::new(ImageConfig::from_env(), &projects_dir),
        &projects_dir,
    )
    .with_knowledge(knowledge.clone());
    let (jobs, _worker) = JobQueue::spawn(workflow.clone());

    let prometheus_handle = PrometheusBuilder::new().install_recorder()?;

    let state = AppState {
        workflow,
        jobs,
        sessions,
        knowledge,
        extractor: Arc::new(DocumentExtractor::from_env()),
        llm,
        search,
        projects_dir,
        openapi: Arc::new(load_openapi()),
        prometheus_handle: Some(prometheus_handle),
    };

    let app = router(state).layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env()));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "studio.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    workflow: Workflow,
    jobs: JobQueue,
    sessions: Arc<SessionStore>,
    knowledge: Arc<KnowledgeStore>,
    extractor: Arc<DocumentExtractor>,
    llm: Arc<dyn ChatModel>,
    search: WebSearch,
    projects_dir: PathBuf,
    openapi: Arc<Value>,
    prometheus_handle: Option<PrometheusHandle>,
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let swot = Router::new()
        .route("/search", post(swot_search))
        .route("/analyze", post(swot_analyze))
        .route("/refine-search", post(swot_refine_search))
        .route("/summarize", post(swot_summarize));

    let unified = Router::new()
        .route("/start", post(unified_start))
        .route("/execute-swot", post(unified_execute_swot))
        .route("/execute-detail", post(unified_execute_detail))
        .route("/session/{id}", get(get_session).delete(delete_session))
        .route("/sessions", get(list_sessions))
        .route("/update-markdown", post(update_markdown))
        .route("/update-content", post(update_content))
        .route("/update-swot", post(update_swot))
        .route("/upload-document", post(upload_document));

    let chatbot = Router::new()
        .route("/chat", post(chatbot_chat))
        .route("/quick-action", post(chatbot_quick_action))
        .route("/suggestions", get(chatbot_suggestions));

    let knowledge = Router::new()
        .route("/", axum::routing::delete(knowledge_clear))
        .route("/search", get(knowledge_search))
        .route("/samples", post(knowledge_samples));

    let api = Router::new()
        .route("/generate/detailpage", post(generate_detail_page))
        .route("/jobs/detailpage", post(enqueue_detail_page))
        .route("/project/{id}/status", get(project_status))
        .route("/projects", get(list_projects))
        .nest("/swot", swot)
        .nest("/unified", unified)
        .nest("/chatbot", chatbot)
        .nest("/knowledge", knowledge);

    let projects = ServeDir::new(&state.projects_dir);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .nest("/api", api)
        .nest_service("/projects", projects)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn load_openapi() -> Value {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}))
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "E-commerce Detail Page Generator API",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/docs",
    }))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "detail-studio",
        "timestamp": Utc::now(),
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    if let Ok(key) = std::env::var("OPENAPI_KEY") {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return Err(AppError::Unauthorized);
        }
    }
    Ok(Json((*state.openapi).clone()))
}

async fn swagger_ui() -> Response {
    let html = r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Detail Studio API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#;
    axum::response::Html(html).into_response()
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    let body = state
        .prometheus_handle
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

// -------- Detail page generation --------

/// Run the full generation workflow for one product.
///
/// - Method: `POST`
/// - Path: `/api/generate/detailpage`
/// - Body: `ProductInput`
/// - Response: `DetailPageResponse` (file URLs + per-stage transcript)
async fn generate_detail_page(
    State(state): State<AppState>,
    Json(product): Json<ProductInput>,
) -> Result<Json<DetailPageResponse>, AppError> {
    metrics::inc_requests("/api/generate/detailpage");
    let project_id = Workflow::new_project_id();
    let platform = product.platforms.join(",");
    let result = run_tracked(&state, &project_id, product).await?;
    Ok(Json(result.response(&platform)))
}

/// Runs the workflow inline while keeping the job table current.
async fn run_tracked(
    state: &AppState,
    project_id: &str,
    product: ProductInput,
) -> Result<workflow::DetailPageResult, PipelineError> {
    let name = product.product_name.clone();
    let platform = product.primary_platform().to_string();
    state.jobs.record(project_id, &name, JobState::Running).await;
    info!(target = "studio.api", project_id, product = %name, "detail_generation_invoked");

    match state.workflow.generate(project_id, product).await {
        Ok(result) => {
            state
                .jobs
                .record(
                    project_id,
                    &name,
                    JobState::Completed {
                        result: result.response(&platform),
                    },
                )
                .await;
            Ok(result)
        }
        Err(err) => {
            state
                .jobs
                .record(project_id, &name, JobState::failed(&err))
                .await;
            Err(err)
        }
    }
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    project_id: String,
    status: &'static str,
}

async fn enqueue_detail_page(
    State(state): State<AppState>,
    Json(product): Json<ProductInput>,
) -> Result<(StatusCode, Json<EnqueueResponse>), AppError> {
    metrics::inc_requests("/api/jobs/detailpage");
    product
        .validate()
        .map_err(|msg| PipelineError::invalid_input("collect_input", msg))?;
    let project_id = Workflow::new_project_id();
    state.jobs.enqueue(&project_id, product).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            project_id,
            status: "queued",
        }),
    ))
}

async fn project_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobInfo>, AppError> {
    state
        .jobs
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| PipelineError::not_found("projects", "Project not found").into())
}

async fn list_projects(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "projects": state.jobs.list().await }))
}

// -------- SWOT-only endpoints --------

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_platforms")]
    platforms: Vec<String>,
    #[serde(default = "default_max_results")]
    max_results: usize,
    #[serde(default)]
    date_range: Option<String>,
    #[serde(default)]
    days: Option<u32>,
}

async fn swot_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<CompetitorData>, AppError> {
    metrics::inc_requests("/api/swot/search");
    if req.query.trim().is_empty() {
        return Err(PipelineError::invalid_input("swot_search", "query must not be empty").into());
    }
    let mut data = match req.days {
        Some(days) => {
            state
                .search
                .search_recent(&req.query, &req.platforms, days, clamp_max_results(req.max_results))
                .await
        }
        None => {
            let options = SearchOptions::with_max_results(req.max_results);
            state.search.search(&req.query, &req.platforms, &options).await
        }
    };
    data.results = filter_product_pages(std::mem::take(&mut data.results));
    data.search_metadata = Some(json!({
        "query": req.query,
        "platforms": req.platforms,
        "date_range": req.date_range,
        "timestamp": Utc::now(),
        "total_results": data.results.len(),
    }));
    Ok(Json(data))
}

#[derive(Debug, Deserialize)]
struct AnalysisRequest {
    product_name: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    target: String,
    #[serde(default)]
    search_results: Option<Vec<SearchHit>>,
}

#[derive(Debug, Serialize)]
struct AnalysisResponse {
    analysis: StrategicAnalysis,
    html_url: String,
    project_id: String,
    search_results_count: usize,
}

async fn swot_analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalysisRequest>,
) -> Result<Json<AnalysisResponse>, AppError> {
    metrics::inc_requests("/api/swot/analyze");
    if req.product_name.trim().is_empty() {
        return Err(
            PipelineError::invalid_input("swot_analyze", "product_name must not be empty").into(),
        );
    }
    let data = match req.search_results {
        Some(results) if !results.is_empty() => CompetitorData {
            results,
            ..Default::default()
        },
        _ => {
            let query = format!("{} {}", req.product_name, req.category);
            let mut data = state
                .search
                .search(
                    query.trim(),
                    &default_platforms(),
                    &SearchOptions::with_max_results(15),
                )
                .await;
            data.results = filter_product_pages(std::mem::take(&mut data.results));
            data
        }
    };

    let subject = AnalysisSubject {
        product_name: req.product_name,
        category: req.category,
        keywords: req.keywords,
        target: req.target,
    };
    let analysis = StrategicAnalyzer::new(state.llm.clone())
        .analyze(&subject, &data)
        .await;

    let project_id = format!("swot_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    let html_url = Exporter::new(&state.projects_dir, &project_id)
        .export_analysis(&analysis, &subject)
        .await
        .map_err(|err| PipelineError::internal("swot_analyze", err.to_string()))?;
    remember_analysis(&state, &subject, &analysis).await;

    Ok(Json(AnalysisResponse {
        search_results_count: data.results.len(),
        analysis,
        html_url,
        project_id,
    }))
}

#[derive(Debug, Deserialize)]
struct RefineSearchRequest {
    original_query: String,
    refined_query: String,
    #[serde(default = "default_platforms")]
    platforms: Vec<String>,
    #[serde(default)]
    exclude_urls: Vec<String>,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

async fn swot_refine_search(
    State(state): State<AppState>,
    Json(req): Json<RefineSearchRequest>,
) -> Result<Json<CompetitorData>, AppError> {
    metrics::inc_requests("/api/swot/refine-search");
    if req.refined_query.trim().is_empty() {
        return Err(
            PipelineError::invalid_input("swot_refine", "refined_query must not be empty").into(),
        );
    }
    let data = state
        .search
        .refine(
            &req.original_query,
            &req.refined_query,
            &req.platforms,
            &req.exclude_urls,
            clamp_max_results(req.max_results),
        )
        .await;
    Ok(Json(data))
}

#[derive(Debug, Deserialize)]
struct SummarizeRequest {
    url: String,
    #[serde(default)]
    content: Option<String>,
}

async fn swot_summarize(
    State(state): State<AppState>,
    Json(req): Json<SummarizeRequest>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/swot/summarize");
    let summary = chat::summarize_document(state.llm.as_ref(), &req.url, req.content.as_deref())
        .await
        .map_err(|err| PipelineError::internal("summarize", err.to_string()))?;
    Ok(Json(json!({
        "url": req.url,
        "summary": summary,
        "timestamp": Utc::now(),
    })))
}

/// Stores a finished analysis so later chats and generations can find it.
async fn remember_analysis(state: &AppState, subject: &AnalysisSubject, analysis: &StrategicAnalysis) {
    let metadata = BTreeMap::from([("category".to_string(), subject.category.clone())]);
    if let Err(err) = state
        .knowledge
        .add_swot_analysis(&subject.product_name, analysis, metadata)
        .await
    {
        warn!(target = "studio.knowledge", error = %err, "knowledge_store_failed");
    }
}

// -------- Unified multi-step flow --------

#[derive(Debug, Deserialize)]
struct UnifiedStartRequest {
    product_name: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    target_customer: String,
    #[serde(default = "default_platforms")]
    platforms: Vec<String>,
}

async fn unified_start(
    State(state): State<AppState>,
    Json(req): Json<UnifiedStartRequest>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/unified/start");
    if req.product_name.trim().is_empty() {
        return Err(PipelineError::invalid_input("start", "product_name must not be empty").into());
    }
    let info = ProductInfo {
        product_name: req.product_name,
        category: req.category,
        keywords: req.keywords,
        target_customer: req.target_customer,
        platforms: req.platforms,
        ..Default::default()
    };
    let created = state.sessions.create().await.map_err(session_error("start"))?;
    let (session, _) = state
        .sessions
        .update(&created.session_id, |s| s.update_product_info(info))
        .await
        .map_err(session_error("start"))?;

    Ok(Json(json!({
        "session_id": session.session_id,
        "message": format!("✅ 세션이 생성되었습니다! ({})", session.session_id),
        "next_step": session.current_step.next(),
        "product_info": session.product_info,
    })))
}

#[derive(Debug, Deserialize)]
struct SwotExecuteRequest {
    session_id: String,
    #[serde(default = "default_depth")]
    search_depth: String,
    #[serde(default)]
    days: Option<u32>,
    #[serde(default = "default_true")]
    include_reviews: bool,
}

async fn unified_execute_swot(
    State(state): State<AppState>,
    Json(req): Json<SwotExecuteRequest>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/unified/execute-swot");
    let session = load_session(&state, &req.session_id, "execute_swot").await?;
    let info = session.product_info.clone();

    let query = format!("{} {}", info.product_name, info.category);
    let platforms = if info.platforms.is_empty() {
        default_platforms()
    } else {
        info.platforms.clone()
    };
    let options = SearchOptions {
        max_results: 15,
        search_depth: req.search_depth,
        days: req.days,
        include_raw_content: req.include_reviews,
    };
    let mut data = state.search.search(query.trim(), &platforms, &options).await;
    data.results = filter_product_pages(std::mem::take(&mut data.results));

    let subject = AnalysisSubject::from(&info);
    let analysis = StrategicAnalyzer::new(state.llm.clone())
        .analyze(&subject, &data)
        .await;

    let review_insights = if req.include_reviews {
        let reviews = data.reviews();
        if reviews.is_empty() {
            None
        } else {
            let analyzer = ReviewAnalyzer::new(state.llm.clone());
            let review_analysis = analyzer.analyze(&reviews, &info.product_name).await;
            Some(analyzer.marketing_insights(&review_analysis, &info).await)
        }
    } else {
        None
    };

    let html_url = Exporter::new(&state.projects_dir, &session.session_id)
        .export_analysis(&analysis, &subject)
        .await
        .map_err(|err| PipelineError::internal("execute_swot", err.to_string()))?;

    let (session, _) = state
        .sessions
        .update(&session.session_id, |s| {
            s.set_swot_result(analysis.clone(), data.clone());
            if let Some(insights) = review_insights.clone() {
                s.set_review_insights(insights);
            }
        })
        .await
        .map_err(session_error("execute_swot"))?;
    remember_analysis(&state, &subject, &analysis).await;

    Ok(Json(json!({
        "session_id": session.session_id,
        "analysis_result": analysis,
        "html_url": html_url,
        "competitor_count": analysis.competitor_count,
        "review_insights": review_insights,
        "next_step": session.current_step.next(),
    })))
}

#[derive(Debug, Deserialize)]
struct DetailExecuteRequest {
    session_id: String,
    #[serde(default = "default_platform")]
    platform: String,
    #[serde(default = "default_tone")]
    tone: String,
    #[serde(default = "default_image_style")]
    image_style: String,
}

async fn unified_execute_detail(
    State(state): State<AppState>,
    Json(req): Json<DetailExecuteRequest>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/unified/execute-detail");
    let session = load_session(&state, &req.session_id, "execute_detail").await?;
    let input = detail_input_for(&session, &req);

    let result = run_tracked(&state, &session.session_id, input.clone()).await?;
    let (session, _) = state
        .sessions
        .update(&session.session_id, |s| {
            s.set_detail_page_result(result.clone(), input)
        })
        .await
        .map_err(session_error("execute_detail"))?;

    Ok(Json(json!({
        "session_id": session.session_id,
        "markdown_url": result.markdown_url,
        "html_url": result.html_url,
        "analysis_url": result.analysis_url,
        "images": images::image_urls(&result.images),
        "next_step": session.current_step.next(),
    })))
}

/// Generation input for a session: stored product facts, the top SWOT
/// strengths as extra keywords, and any carried analysis.
fn detail_input_for(session: &ProjectSession, req: &DetailExecuteRequest) -> ProductInput {
    let mut input = session.product_info.to_product_input();
    if let Some(analysis) = &session.swot_result {
        for strength in analysis.swot.strengths.iter().take(3) {
            if !input.keywords.contains(strength) {
                input.keywords.push(strength.clone());
            }
        }
        input.swot_insights = serde_json::to_value(analysis).ok();
    }
    input.review_insights = session.review_insights.clone();
    input.platforms = vec![req.platform.clone()];
    input.tone = req.tone.clone();
    input.image_options.style = req.image_style.clone();
    input
}

#[derive(Debug, Serialize)]
struct SessionView {
    session_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    current_step: Step,
    completed_steps: Vec<Step>,
    product_info: ProductInfo,
    has_swot: bool,
    has_detail: bool,
    chat_count: usize,
}

impl From<ProjectSession> for SessionView {
    fn from(session: ProjectSession) -> Self {
        Self {
            has_swot: session.swot_result.is_some(),
            has_detail: session.detail_page_result.is_some(),
            chat_count: session.chat_history.len(),
            session_id: session.session_id,
            created_at: session.created_at,
            updated_at: session.updated_at,
            current_step: session.current_step,
            completed_steps: session.completed_steps,
            product_info: session.product_info,
        }
    }
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let session = load_session(&state, &id, "session").await?;
    Ok(Json(session.into()))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/unified/session");
    let removed = state
        .sessions
        .delete(&id)
        .await
        .map_err(session_error("session"))?;
    if !removed {
        return Err(PipelineError::not_found("session", "세션을 찾을 수 없습니다").into());
    }
    Ok(Json(json!({ "message": format!("세션 {id}가 삭제되었습니다") })))
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let sessions: Vec<SessionView> = state
        .sessions
        .list()
        .await
        .map_err(session_error("sessions"))?
        .into_iter()
        .map(SessionView::from)
        .collect();
    Ok(Json(json!({
        "total": sessions.len(),
        "sessions": sessions,
    })))
}

#[derive(Debug, Deserialize)]
struct UpdateMarkdownRequest {
    session_id: String,
    markdown_content: String,
    #[serde(default = "default_document_kind")]
    step: DocumentKind,
}

async fn update_markdown(
    State(state): State<AppState>,
    Json(req): Json<UpdateMarkdownRequest>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/unified/update-markdown");
    if req.markdown_content.trim().is_empty() {
        return Err(
            PipelineError::invalid_input("update_markdown", "markdown_content must not be empty")
                .into(),
        );
    }
    let session = load_session(&state, &req.session_id, "update_markdown").await?;
    let urls = Exporter::new(&state.projects_dir, &session.session_id)
        .republish_markdown(&req.markdown_content, req.step)
        .await
        .map_err(|err| PipelineError::internal("update_markdown", err.to_string()))?;
    Ok(Json(json!({
        "session_id": session.session_id,
        "markdown_url": urls.markdown_url,
        "html_url": urls.html_url,
        "message": "✅ 수정 내용이 저장되었습니다",
    })))
}

#[derive(Debug, Deserialize)]
struct UpdateContentRequest {
    session_id: String,
    edits: Map<String, Value>,
}

async fn update_content(
    State(state): State<AppState>,
    Json(req): Json<UpdateContentRequest>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/unified/update-content");
    let session = load_session(&state, &req.session_id, "update_content").await?;
    let (Some(sections), Some(input)) = (&session.content_sections, &session.detail_input) else {
        return Err(
            PipelineError::invalid_input("update_content", "상세페이지가 아직 생성되지 않았습니다")
                .into(),
        );
    };
    let updated = apply_edits(sections, &req.edits)
        .map_err(|err| PipelineError::invalid_input("update_content", err.to_string()))?;
    let images = session
        .detail_page_result
        .as_ref()
        .map(|r| r.images.clone())
        .unwrap_or_default();

    let urls = Exporter::new(&state.projects_dir, &session.session_id)
        .export_detail(&updated, &images, input)
        .await
        .map_err(|err| PipelineError::internal("update_content", err.to_string()))?;
    state
        .sessions
        .update(&session.session_id, |s| s.set_content_sections(updated))
        .await
        .map_err(session_error("update_content"))?;

    Ok(Json(json!({
        "session_id": session.session_id,
        "updated_fields": req.edits.keys().collect::<Vec<_>>(),
        "markdown_url": urls.markdown_url,
        "html_url": urls.html_url,
    })))
}

#[derive(Debug, Deserialize)]
struct UpdateSwotRequest {
    session_id: String,
    swot_updates: BTreeMap<String, Vec<String>>,
}

async fn update_swot(
    State(state): State<AppState>,
    Json(req): Json<UpdateSwotRequest>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/unified/update-swot");
    let (session, updated) = state
        .sessions
        .update(&req.session_id, |s| {
            let current = s.swot_result.as_mut()?;
            let keys = analysis::update_swot(current, &req.swot_updates);
            Some((current.clone(), keys))
        })
        .await
        .map_err(session_error("update_swot"))?;
    let Some((analysis, keys)) = updated else {
        return Err(
            PipelineError::invalid_input("update_swot", "SWOT 분석 결과가 없습니다").into(),
        );
    };

    let html_url = Exporter::new(&state.projects_dir, &session.session_id)
        .export_analysis(&analysis, &AnalysisSubject::from(&session.product_info))
        .await
        .map_err(|err| PipelineError::internal("update_swot", err.to_string()))?;

    Ok(Json(json!({
        "session_id": session.session_id,
        "updated_keys": keys,
        "analysis_result": analysis,
        "html_url": html_url,
    })))
}

#[derive(Debug, Deserialize)]
struct UploadDocumentRequest {
    #[serde(default)]
    session_id: Option<String>,
    file_name: String,
    content_base64: String,
}

async fn upload_document(
    State(state): State<AppState>,
    Json(req): Json<UploadDocumentRequest>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/unified/upload-document");
    let text = state
        .extractor
        .extract(&req.file_name, &req.content_base64)
        .await
        .map_err(|err| match err {
            ExtractError::Http(_) => PipelineError::internal("upload_document", err.to_string()),
            _ => PipelineError::invalid_input("upload_document", err.to_string()),
        })?;
    let info = documents::parse_product_info(state.llm.as_ref(), &text).await;

    let session_id = match req.session_id {
        Some(id) => id,
        None => {
            state
                .sessions
                .create()
                .await
                .map_err(session_error("upload_document"))?
                .session_id
        }
    };
    let (session, _) = state
        .sessions
        .update(&session_id, |s| s.update_product_info(info))
        .await
        .map_err(session_error("upload_document"))?;

    Ok(Json(json!({
        "session_id": session.session_id,
        "file_name": req.file_name,
        "extracted_chars": text.chars().count(),
        "product_info": session.product_info,
        "next_step": session.current_step.next(),
    })))
}

// -------- Chatbot --------

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    conversation_history: Vec<ChatTurn>,
    #[serde(default)]
    session_context: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

async fn chatbot_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/chatbot/chat");
    if req.message.trim().is_empty() {
        return Err(PipelineError::invalid_input("chat", "message must not be empty").into());
    }

    let session = match &req.session_id {
        Some(id) => Some(load_session(&state, id, "chat").await?),
        None => None,
    };
    let (context, history) = match &session {
        Some(s) => {
            let history = if req.conversation_history.is_empty() {
                s.chat_history.clone()
            } else {
                req.conversation_history.clone()
            };
            (Some(s.context_for_chat()), history)
        }
        None => (req.session_context.clone(), req.conversation_history.clone()),
    };
    let knowledge = match &session {
        Some(s) => {
            let category = Some(s.product_info.category.as_str()).filter(|c| !c.is_empty());
            let context = state
                .knowledge
                .context_for_product(&s.product_info.product_name, category)
                .await;
            Some(context).filter(|c| c != NO_CONTEXT)
        }
        None => None,
    };

    let messages = chat::build_messages(&req.message, &history, context.as_deref(), knowledge.as_deref());
    let reply = chat::reply(state.llm.as_ref(), &messages)
        .await
        .map_err(|err| PipelineError::internal("chat", err.to_string()))?;

    if let Some(s) = &session {
        state
            .sessions
            .update(&s.session_id, |s| {
                s.add_chat_message("user", &req.message);
                s.add_chat_message("assistant", &reply.response);
            })
            .await
            .map_err(session_error("chat"))?;
    }

    Ok(Json(json!({
        "response": reply.response,
        "quick_actions": reply.quick_actions,
        "timestamp": Utc::now(),
    })))
}

#[derive(Debug, Deserialize)]
struct QuickActionRequest {
    action: String,
    #[serde(default)]
    product_info: Value,
}

async fn chatbot_quick_action(
    State(state): State<AppState>,
    Json(req): Json<QuickActionRequest>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/chatbot/quick-action");
    let action: chat::QuickAction = req
        .action
        .parse()
        .map_err(|msg: String| PipelineError::invalid_input("quick_action", msg))?;
    let result = chat::quick_action(state.llm.as_ref(), action, &req.product_info)
        .await
        .map_err(|err| PipelineError::internal("quick_action", err.to_string()))?;
    Ok(Json(json!({
        "action": req.action,
        "result": result,
        "timestamp": Utc::now(),
    })))
}

#[derive(Debug, Deserialize)]
struct SuggestionsQuery {
    product_name: String,
    #[serde(default)]
    category: String,
}

async fn chatbot_suggestions(
    State(state): State<AppState>,
    Query(query): Query<SuggestionsQuery>,
) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/chatbot/suggestions");
    let suggestions = chat::suggestions(state.llm.as_ref(), &query.product_name, &query.category)
        .await
        .map_err(|err| PipelineError::internal("suggestions", err.to_string()))?;
    Ok(Json(json!({
        "suggestions": suggestions,
        "product_name": query.product_name,
        "category": query.category,
        "timestamp": Utc::now(),
    })))
}

// -------- Knowledge store --------

#[derive(Debug, Deserialize)]
struct KnowledgeQuery {
    q: String,
    #[serde(default = "default_knowledge_k")]
    k: usize,
    #[serde(default)]
    category: Option<String>,
}

async fn knowledge_search(
    State(state): State<AppState>,
    Query(query): Query<KnowledgeQuery>,
) -> Json<Vec<KnowledgeDocument>> {
    metrics::inc_requests("/api/knowledge/search");
    Json(
        state
            .knowledge
            .search(&query.q, query.k, query.category.as_deref())
            .await,
    )
}

async fn knowledge_samples(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    metrics::inc_requests("/api/knowledge/samples");
    let added = state
        .knowledge
        .load_samples()
        .await
        .map_err(|err| PipelineError::internal("knowledge", err.to_string()))?;
    Ok(Json(json!({
        "added": added,
        "total": state.knowledge.len().await,
    })))
}

async fn knowledge_clear(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    metrics::inc_requests("/api/knowledge");
    state
        .knowledge
        .clear()
        .await
        .map_err(|err| PipelineError::internal("knowledge", err.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

// -------- Helpers --------

async fn load_session(
    state: &AppState,
    id: &str,
    stage: &'static str,
) -> Result<ProjectSession, PipelineError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| PipelineError::not_found(stage, "세션을 찾을 수 없습니다"))
}

fn session_error(stage: &'static str) -> impl Fn(SessionError) -> PipelineError {
    move |err| match err {
        SessionError::NotFound(_) => PipelineError::not_found(stage, "세션을 찾을 수 없습니다"),
        other => PipelineError::internal(stage, other.to_string()),
    }
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
    Unauthorized,
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::NotFound => StatusCode::NOT_FOUND,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!(target = "studio.api", stage = err.stage(), error = err.detail(), "request_failed");
                }
                let payload = ApiError {
                    error: err.stage().to_string(),
                    detail: Some(err.detail().to_string()),
                };
                (status, Json(payload)).into_response()
            }
            AppError::Unauthorized => {
                let payload = ApiError {
                    error: "docs".into(),
                    detail: Some("unauthorized".into()),
                };
                (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(8 * 1024 * 1024)
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
        .into()
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn default_platforms() -> Vec<String> {
    vec!["coupang".into(), "naver".into()]
}

fn default_platform() -> String {
    "coupang".into()
}

fn default_tone() -> String {
    "친근한".into()
}

fn default_image_style() -> String {
    "real".into()
}

fn default_depth() -> String {
    "advanced".into()
}

fn default_max_results() -> usize {
    10
}

fn default_knowledge_k() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_document_kind() -> DocumentKind {
    DocumentKind::Detail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::search::testing::ScriptedSearch;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_state(dir: &TempDir, llm: Arc<dyn ChatModel>) -> AppState {
        let projects_dir = dir.path().join("projects");
        let search = WebSearch::new(Arc::new(ScriptedSearch::new(vec![])));
        let knowledge = Arc::new(
            KnowledgeStore::open(dir.path().join("knowledge.json"))
                .await
                .expect("knowledge"),
        );
        let workflow = Workflow::new(
            llm.clone(),
            search.clone(),
            ImageGenerator::new(ImageConfig::disabled(), &projects_dir),
            &projects_dir,
        )
        .with_knowledge(knowledge.clone());
        let (jobs, _worker) = JobQueue::spawn(workflow.clone());
        AppState {
            workflow,
            jobs,
            sessions: Arc::new(
                SessionStore::open(dir.path().join("sessions"))
                    .await
                    .expect("sessions"),
            ),
            knowledge,
            extractor: Arc::new(DocumentExtractor::new(None)),
            llm,
            search,
            projects_dir,
            openapi: Arc::new(load_openapi()),
            prometheus_handle: None,
        }
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let dir = TempDir::new().expect("tempdir");
        let app = router(test_state(&dir, Arc::new(ScriptedModel::failing())).await);
        let (status, body) = send(app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn invalid_product_input_is_a_bad_request() {
        let dir = TempDir::new().expect("tempdir");
        let app = router(test_state(&dir, Arc::new(ScriptedModel::failing())).await);
        let (status, body) = send(
            app,
            "POST",
            "/api/generate/detailpage",
            Some(json!({
                "product_name": "",
                "summary": "요약",
                "category": "식품",
                "manufacture_country": "대한민국",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "collect_input");
    }

    #[tokio::test]
    async fn generate_detail_page_returns_urls_and_tracks_project() {
        let dir = TempDir::new().expect("tempdir");
        let state = test_state(&dir, Arc::new(ScriptedModel::failing())).await;
        let app = router(state.clone());
        let (status, body) = send(
            app,
            "POST",
            "/api/generate/detailpage",
            Some(json!({
                "product_name": "수분 크림",
                "summary": "촉촉한 하루",
                "category": "스킨케어",
                "manufacture_country": "대한민국",
                "platforms": ["coupang"],
                "allow_web_search": false,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stages"].as_array().map(Vec::len), Some(11));
        assert_eq!(body["meta"]["status"], "completed");
        let id = body["project_id"].as_str().expect("project id").to_string();

        let (status, body) =
            send(router(state), "GET", &format!("/api/project/{id}/status"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "completed");
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let app = router(test_state(&dir, Arc::new(ScriptedModel::failing())).await);
        let (status, body) = send(app, "GET", "/api/unified/session/proj_missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "session");
    }

    #[tokio::test]
    async fn unified_start_creates_a_session() {
        let dir = TempDir::new().expect("tempdir");
        let state = test_state(&dir, Arc::new(ScriptedModel::failing())).await;
        let (status, body) = send(
            router(state.clone()),
            "POST",
            "/api/unified/start",
            Some(json!({ "product_name": "바삭 감자칩", "category": "식품" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["next_step"], "swot");
        let id = body["session_id"].as_str().expect("session id").to_string();

        let (status, body) =
            send(router(state.clone()), "GET", &format!("/api/unified/session/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_step"], "init");
        assert_eq!(body["product_info"]["product_name"], "바삭 감자칩");
        assert_eq!(body["has_swot"], false);

        let (status, body) = send(router(state), "GET", "/api/unified/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn unified_flow_runs_swot_then_detail() {
        let dir = TempDir::new().expect("tempdir");
        let state = test_state(&dir, Arc::new(ScriptedModel::failing())).await;
        let (_, body) = send(
            router(state.clone()),
            "POST",
            "/api/unified/start",
            Some(json!({ "product_name": "수분 크림", "category": "스킨케어", "platforms": ["coupang"] })),
        )
        .await;
        let id = body["session_id"].as_str().expect("session id").to_string();

        let (status, body) = send(
            router(state.clone()),
            "POST",
            "/api/unified/execute-swot",
            Some(json!({ "session_id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["next_step"], "detail");
        assert_eq!(body["competitor_count"], 0);

        let (status, body) = send(
            router(state.clone()),
            "POST",
            "/api/unified/execute-detail",
            Some(json!({ "session_id": id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["next_step"], "chat");

        let session = state.sessions.get(&id).await.expect("session");
        assert_eq!(session.current_step, Step::Detail);
        assert_eq!(session.completed_steps, vec![Step::Swot, Step::Detail]);
        assert!(session.content_sections.is_some());
        assert!(dir.path().join("projects").join(&id).join("detail.html").exists());

        let (status, body) = send(
            router(state.clone()),
            "POST",
            "/api/unified/update-content",
            Some(json!({ "session_id": id, "edits": { "headline": "새 헤드라인" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated_fields"], json!(["headline"]));
        let session = state.sessions.get(&id).await.expect("session");
        assert_eq!(
            session.content_sections.map(|c| c.headline),
            Some("새 헤드라인".to_string())
        );
    }

    #[tokio::test]
    async fn update_swot_without_analysis_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let state = test_state(&dir, Arc::new(ScriptedModel::failing())).await;
        let session = state.sessions.create().await.expect("create");
        let (status, body) = send(
            router(state),
            "POST",
            "/api/unified/update-swot",
            Some(json!({
                "session_id": session.session_id,
                "swot_updates": { "strengths": ["가성비"] },
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "update_swot");
    }

    #[tokio::test]
    async fn unknown_quick_action_is_a_bad_request() {
        let dir = TempDir::new().expect("tempdir");
        let app = router(test_state(&dir, Arc::new(ScriptedModel::failing())).await);
        let (status, body) = send(
            app,
            "POST",
            "/api/chatbot/quick-action",
            Some(json!({ "action": "write_poem", "product_info": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "quick_action");
    }

    #[tokio::test]
    async fn chat_with_session_records_both_turns() {
        let dir = TempDir::new().expect("tempdir");
        let llm = Arc::new(ScriptedModel::replying(&[
            "상세페이지를 만들기 전에 키워드를 정리해 보세요.",
        ]));
        let state = test_state(&dir, llm).await;
        let session = state.sessions.create().await.expect("create");

        let (status, body) = send(
            router(state.clone()),
            "POST",
            "/api/chatbot/chat",
            Some(json!({ "message": "어떻게 시작할까요?", "session_id": session.session_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quick_actions"], json!(["generate_page", "suggest_keywords"]));

        let stored = state
            .sessions
            .get(&session.session_id)
            .await
            .expect("session");
        let roles: Vec<&str> = stored.chat_history.iter().map(|t| t.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant"]);
        assert_eq!(stored.current_step, Step::Chat);
    }

    #[tokio::test]
    async fn upload_text_document_creates_session_from_json() {
        use base64::Engine as _;
        let dir = TempDir::new().expect("tempdir");
        let state = test_state(&dir, Arc::new(ScriptedModel::failing())).await;
        let raw = json!({ "product_name": "유기농 녹차", "category": "식품" }).to_string();
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);

        let (status, body) = send(
            router(state),
            "POST",
            "/api/unified/upload-document",
            Some(json!({ "file_name": "product.json", "content_base64": encoded })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["product_info"]["product_name"], "유기농 녹차");
        assert_eq!(body["next_step"], "swot");
    }
}
