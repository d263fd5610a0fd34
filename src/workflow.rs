use crate::content::ContentSections;
use crate::images::{GeneratedImage, ImageGenerator, image_urls};
use crate::knowledge::KnowledgeStore;
use crate::llm::ChatModel;
use crate::models::{DetailPageResponse, ProductInput, ProjectMeta, StageReport};
use crate::search::WebSearch;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{future::Future, path::PathBuf, sync::Arc, time::Instant};
use tracing::info;

/// Stage names in execution order.
pub const STAGES: [&str; 11] = [
    "collect_input",
    "load_knowledge",
    "search_competitors",
    "analyze_competitors",
    "strategic_analysis",
    "visualize_analysis",
    "generate_selling_points",
    "assemble_content",
    "build_image_prompts",
    "generate_images",
    "export",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailPageResult {
    pub project_id: String,
    pub markdown_url: String,
    pub html_url: String,
    pub analysis_url: String,
    pub images: Vec<GeneratedImage>,
    pub content_sections: ContentSections,
    pub stages: Vec<StageReport>,
}

impl DetailPageResult {
    pub fn response(&self, platform: &str) -> DetailPageResponse {
        DetailPageResponse {
            project_id: self.project_id.clone(),
            markdown_url: self.markdown_url.clone(),
            html_url: self.html_url.clone(),
            analysis_url: self.analysis_url.clone(),
            images: image_urls(&self.images),
            meta: ProjectMeta {
                generated_at: Utc::now(),
                platform: platform.to_string(),
                status: "completed".into(),
            },
            stages: self.stages.clone(),
        }
    }
}

/// Sequences the generation stages for one product. Cheap to clone; every
/// collaborator is shared.
#[derive(Clone)]
pub struct Workflow {
    llm: Arc<dyn ChatModel>,
    search: WebSearch,
    knowledge: Option<Arc<KnowledgeStore>>,
    images: Arc<ImageGenerator>,
    projects_dir: PathBuf,
}

impl Workflow {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        search: WebSearch,
        images: ImageGenerator,
        projects_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            llm,
            search,
            knowledge: None,
            images: Arc::new(images),
            projects_dir: projects_dir.into(),
        }
    }

    pub fn with_knowledge(mut self, knowledge: Arc<KnowledgeStore>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn new_project_id() -> String {
        format!("proj_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
    }

    pub async fn generate(
        &self,
        project_id: &str,
        product: ProductInput,
    ) -> Result<DetailPageResult, PipelineError> {
        let mut reports = Vec::with_capacity(STAGES.len());
        info!(
            target = "studio.workflow",
            project_id,
            product = %product.product_name,
            "workflow_started"
        );

        capture_stage("collect_input", &mut reports, stages::collect_input(&product)).await?;

        let knowledge = capture_stage(
            "load_knowledge",
            &mut reports,
            stages::load_knowledge(self.knowledge.as_deref(), &product),
        )
        .await?;

        let competitor_data = capture_stage(
            "search_competitors",
            &mut reports,
            stages::search_competitors(&self.search, &product),
        )
        .await?;

        let insights = capture_stage(
            "analyze_competitors",
            &mut reports,
            stages::analyze_competitors(
                self.llm.as_ref(),
                &competitor_data,
                &product,
                knowledge.as_deref(),
            ),
        )
        .await?;

        let analysis = capture_stage(
            "strategic_analysis",
            &mut reports,
            stages::strategic_analysis(self.llm.clone(), &product, &competitor_data),
        )
        .await?;

        let analysis_url = capture_stage(
            "visualize_analysis",
            &mut reports,
            stages::visualize_analysis(&self.projects_dir, project_id, &analysis, &product),
        )
        .await?;

        let selling_points = capture_stage(
            "generate_selling_points",
            &mut reports,
            stages::generate_selling_points(self.llm.as_ref(), &product, &insights),
        )
        .await?;

        let sections = capture_stage(
            "assemble_content",
            &mut reports,
            stages::assemble_content(
                self.llm.clone(),
                &product,
                &selling_points,
                &insights,
                &competitor_data,
            ),
        )
        .await?;

        let prompts = capture_stage(
            "build_image_prompts",
            &mut reports,
            stages::build_image_prompts(&product, &selling_points),
        )
        .await?;

        let images = capture_stage(
            "generate_images",
            &mut reports,
            stages::generate_images(&self.images, project_id, &prompts),
        )
        .await?;

        let urls = capture_stage(
            "export",
            &mut reports,
            stages::export(&self.projects_dir, project_id, &sections, &images, &product),
        )
        .await?;

        info!(
            target = "studio.workflow",
            project_id,
            stages = reports.len(),
            "workflow_completed"
        );

        Ok(DetailPageResult {
            project_id: project_id.to_string(),
            markdown_url: urls.markdown_url,
            html_url: urls.html_url,
            analysis_url,
            images,
            content_sections: sections,
            stages: reports,
        })
    }
}

async fn capture_stage<T, Fut>(
    name: &'static str,
    reports: &mut Vec<StageReport>,
    fut: Fut,
) -> Result<T, PipelineError>
where
    Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
{
    let started = Instant::now();
    let outcome = fut.await?;
    let elapsed_ms = started.elapsed().as_millis();
    crate::metrics::stage_elapsed(name, elapsed_ms);
    reports.push(StageReport::new(name, elapsed_ms, outcome.output));
    Ok(outcome.value)
}

#[derive(Debug)]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    NotFound,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::NotFound,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

impl std::error::Error for PipelineError {}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

pub mod stages {
    use super::{PipelineError, StageOutcome};
    use crate::analysis::{AnalysisSubject, StrategicAnalysis, StrategicAnalyzer};
    use crate::content::{ContentAssembler, ContentSections};
    use crate::export::{DetailUrls, Exporter};
    use crate::images::{self, GeneratedImage, ImageGenerator, ImagePrompt};
    use crate::insights::{self, CompetitorInsights};
    use crate::knowledge::{KnowledgeStore, NO_CONTEXT};
    use crate::llm::ChatModel;
    use crate::models::ProductInput;
    use crate::search::{
        CompetitorData, CompetitorRecord, SearchHit, SearchOptions, WebSearch,
        filter_product_pages,
    };
    use crate::selling::{self, SellingPoint};
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use tracing::{debug, warn};

    const COMPETITORS_PER_PLATFORM: usize = 5;

    pub async fn collect_input(
        product: &ProductInput,
    ) -> Result<StageOutcome<()>, PipelineError> {
        product
            .validate()
            .map_err(|msg| PipelineError::invalid_input("collect_input", msg))?;
        Ok(StageOutcome::new(
            (),
            json!({
                "product_name": product.product_name,
                "category": product.category,
                "platforms": product.platforms,
                "allow_web_search": product.allow_web_search,
                "has_swot_insights": product.swot_insights.is_some(),
            }),
        ))
    }

    /// Related documents from earlier runs, if a store is attached and has
    /// anything relevant.
    pub async fn load_knowledge(
        store: Option<&KnowledgeStore>,
        product: &ProductInput,
    ) -> Result<StageOutcome<Option<String>>, PipelineError> {
        let Some(store) = store else {
            return Ok(StageOutcome::new(None, json!({ "enabled": false })));
        };
        let category = Some(product.category.as_str()).filter(|c| !c.is_empty());
        let context = store
            .context_for_product(&product.product_name, category)
            .await;
        let context = Some(context).filter(|c| c != NO_CONTEXT);
        Ok(StageOutcome::new(
            context.clone(),
            json!({
                "enabled": true,
                "found": context.is_some(),
                "chars": context.as_ref().map(|c| c.chars().count()).unwrap_or(0),
            }),
        ))
    }

    pub async fn search_competitors(
        search: &WebSearch,
        product: &ProductInput,
    ) -> Result<StageOutcome<CompetitorData>, PipelineError> {
        if !product.allow_web_search {
            debug!(target = "studio.workflow", "web_search_disabled");
            return Ok(StageOutcome::new(
                CompetitorData::empty(),
                json!({ "skipped": true, "results": 0 }),
            ));
        }

        let query = format!("{} {}", product.product_name, product.category)
            .trim()
            .to_string();
        let options = SearchOptions {
            max_results: COMPETITORS_PER_PLATFORM,
            include_raw_content: true,
            ..Default::default()
        };
        let mut data = search.search(&query, &product.platforms, &options).await;
        data.results = filter_product_pages(std::mem::take(&mut data.results));

        if let Some(links) = &product.competitor_links {
            data.results.extend(
                links
                    .iter()
                    .filter(|link| !link.trim().is_empty())
                    .map(|link| SearchHit::Found(CompetitorRecord::new("direct", link, link, ""))),
            );
        }

        let failed = data.results.len() - data.success_count();
        Ok(StageOutcome::new(
            data.clone(),
            json!({
                "query": query,
                "engine": data.search_engine,
                "results": data.success_count(),
                "failed_platforms": failed,
            }),
        ))
    }

    pub async fn analyze_competitors(
        llm: &dyn ChatModel,
        data: &CompetitorData,
        product: &ProductInput,
        knowledge: Option<&str>,
    ) -> Result<StageOutcome<CompetitorInsights>, PipelineError> {
        let mut insights = if data.success_count() == 0 {
            CompetitorInsights::no_data()
        } else {
            insights::summarize(llm, data).await
        };
        if let Some(review) = product.review_insights.as_deref().filter(|r| !r.trim().is_empty()) {
            insights.summary = format!("{}\n\n[리뷰 인사이트]\n{review}", insights.summary);
        }
        if let Some(context) = knowledge {
            insights.summary = format!("{}\n\n[참고 상품 데이터]\n{context}", insights.summary);
        }
        let output = serde_json::to_value(&insights).unwrap_or_default();
        Ok(StageOutcome::new(insights, output))
    }

    /// Reuses an analysis carried over from a session when it parses;
    /// otherwise asks the analyzer.
    pub async fn strategic_analysis(
        llm: Arc<dyn ChatModel>,
        product: &ProductInput,
        data: &CompetitorData,
    ) -> Result<StageOutcome<StrategicAnalysis>, PipelineError> {
        let carried = product
            .swot_insights
            .as_ref()
            .and_then(|value| serde_json::from_value::<StrategicAnalysis>(value.clone()).ok());
        let (analysis, source) = match carried {
            Some(analysis) => (analysis, "session"),
            None => {
                let subject = AnalysisSubject::from(product);
                (StrategicAnalyzer::new(llm).analyze(&subject, data).await, "generated")
            }
        };
        Ok(StageOutcome::new(
            analysis.clone(),
            json!({
                "source": source,
                "competitor_count": analysis.competitor_count,
                "price_range": analysis.price_analysis.price_range,
                "insights": analysis.insights,
            }),
        ))
    }

    pub async fn visualize_analysis(
        projects_dir: &Path,
        project_id: &str,
        analysis: &StrategicAnalysis,
        product: &ProductInput,
    ) -> Result<StageOutcome<String>, PipelineError> {
        let url = Exporter::new(projects_dir, project_id)
            .export_analysis(analysis, &AnalysisSubject::from(product))
            .await
            .map_err(|err| PipelineError::internal("visualize_analysis", err.to_string()))?;
        Ok(StageOutcome::new(url.clone(), json!({ "analysis_url": url })))
    }

    pub async fn generate_selling_points(
        llm: &dyn ChatModel,
        product: &ProductInput,
        insights: &CompetitorInsights,
    ) -> Result<StageOutcome<Vec<SellingPoint>>, PipelineError> {
        let points = selling::generate(llm, product, insights).await;
        let titles: Vec<&str> = points.iter().map(|p| p.title.as_str()).collect();
        let output = json!({ "count": points.len(), "titles": titles });
        Ok(StageOutcome::new(points, output))
    }

    pub async fn assemble_content(
        llm: Arc<dyn ChatModel>,
        product: &ProductInput,
        selling_points: &[SellingPoint],
        insights: &CompetitorInsights,
        data: &CompetitorData,
    ) -> Result<StageOutcome<ContentSections>, PipelineError> {
        let sections = ContentAssembler::new(llm)
            .assemble(product, selling_points, insights, data)
            .await;
        let output = json!({
            "headline": sections.headline,
            "faq": sections.faq.len(),
            "comparison_rows": sections.comparison.rows.len(),
            "has_nutrition": sections.nutrition_info.has_nutrition,
            "recipes": sections.recipes.len(),
        });
        Ok(StageOutcome::new(sections, output))
    }

    pub async fn build_image_prompts(
        product: &ProductInput,
        selling_points: &[SellingPoint],
    ) -> Result<StageOutcome<Vec<ImagePrompt>>, PipelineError> {
        let prompts = images::build_image_prompts(
            &product.product_name,
            selling_points,
            &product.image_options.style,
            &product.image_options.shots,
        );
        let output = serde_json::to_value(&prompts).unwrap_or_default();
        Ok(StageOutcome::new(prompts, output))
    }

    pub async fn generate_images(
        generator: &ImageGenerator,
        project_id: &str,
        prompts: &[ImagePrompt],
    ) -> Result<StageOutcome<Vec<GeneratedImage>>, PipelineError> {
        let images = generator.generate_all(project_id, prompts).await;
        if generator.is_enabled() && images.len() < prompts.len() {
            warn!(
                target = "studio.workflow",
                project_id,
                requested = prompts.len(),
                generated = images.len(),
                "images_partially_generated"
            );
        }
        let output = json!({ "enabled": generator.is_enabled(), "images": images });
        Ok(StageOutcome::new(images, output))
    }

    pub async fn export(
        projects_dir: &Path,
        project_id: &str,
        sections: &ContentSections,
        images: &[GeneratedImage],
        product: &ProductInput,
    ) -> Result<StageOutcome<DetailUrls>, PipelineError> {
        let urls = Exporter::new(projects_dir, project_id)
            .export_detail(sections, images, product)
            .await
            .map_err(|err| PipelineError::internal("export", err.to_string()))?;
        let output = json!({
            "markdown_url": urls.markdown_url,
            "html_url": urls.html_url,
        });
        Ok(StageOutcome::new(urls, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisSubject, StrategicAnalyzer};
    use crate::images::ImageConfig;
    use crate::llm::testing::ScriptedModel;
    use crate::models::sample_product;
    use crate::search::{CompetitorData, testing::ScriptedSearch};
    use tempfile::TempDir;

    fn workflow(dir: &TempDir, backend: Arc<ScriptedSearch>) -> Workflow {
        Workflow::new(
            Arc::new(ScriptedModel::failing()),
            WebSearch::new(backend),
            ImageGenerator::new(ImageConfig::disabled(), dir.path()),
            dir.path(),
        )
    }

    #[tokio::test]
    async fn disabled_web_search_yields_empty_competitor_data() {
        let backend = Arc::new(ScriptedSearch::new(vec![]));
        let search = WebSearch::new(backend.clone());
        for category in ["식품", "스킨케어", "가전"] {
            let mut product = sample_product();
            product.category = category.into();
            product.allow_web_search = false;
            let out = stages::search_competitors(&search, &product)
                .await
                .expect("search stage");
            assert_eq!(out.value, CompetitorData::empty());
        }
        assert!(backend.seen().is_empty());
    }

    #[tokio::test]
    async fn generate_runs_every_stage_and_writes_files() {
        let dir = TempDir::new().expect("tempdir");
        let flow = workflow(&dir, Arc::new(ScriptedSearch::new(vec![])));

        let result = flow
            .generate("proj_test", sample_product())
            .await
            .expect("generate");

        let names: Vec<&str> = result.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, STAGES.to_vec());
        assert_eq!(result.html_url, "/projects/proj_test/detail.html");
        assert_eq!(result.markdown_url, "/projects/proj_test/detail.md");
        assert_eq!(result.analysis_url, "/projects/proj_test/analysis.html");
        assert!(result.images.is_empty());
        assert!(!result.content_sections.headline.is_empty());
        for file in ["detail.md", "detail.html", "analysis.html"] {
            assert!(dir.path().join("proj_test").join(file).exists(), "{file}");
        }
    }

    #[tokio::test]
    async fn invalid_input_stops_at_collect_input() {
        let dir = TempDir::new().expect("tempdir");
        let flow = workflow(&dir, Arc::new(ScriptedSearch::new(vec![])));
        let mut product = sample_product();
        product.product_name = "  ".into();

        let err = flow
            .generate("proj_bad", product)
            .await
            .expect_err("should reject");
        assert_eq!(err.stage(), "collect_input");
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
        assert!(!dir.path().join("proj_bad").exists());
    }

    #[tokio::test]
    async fn carried_analysis_skips_the_model() {
        let product = sample_product();
        let analysis = StrategicAnalyzer::new(Arc::new(ScriptedModel::failing()))
            .analyze(&AnalysisSubject::from(&product), &CompetitorData::empty())
            .await;
        let mut carried = product.clone();
        carried.swot_insights = serde_json::to_value(&analysis).ok();

        let llm = Arc::new(ScriptedModel::failing());
        let out = stages::strategic_analysis(llm.clone(), &carried, &CompetitorData::empty())
            .await
            .expect("analysis stage");
        assert_eq!(out.value, analysis);
        assert_eq!(out.output["source"], "session");
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn review_insights_are_folded_into_competitor_summary() {
        let mut product = sample_product();
        product.review_insights = Some("배송 만족도가 높음".into());
        let llm = ScriptedModel::failing();
        let out = stages::analyze_competitors(&llm, &CompetitorData::empty(), &product, None)
            .await
            .expect("insights stage");
        assert!(out.value.summary.contains("배송 만족도가 높음"));
        assert_eq!(llm.calls(), 0);
    }
}
