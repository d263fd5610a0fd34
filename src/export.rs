use crate::analysis::{AnalysisSubject, StrategicAnalysis};
use crate::content::ContentSections;
use crate::images::GeneratedImage;
use crate::models::ProductInput;
use crate::render::{self, RenderError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailUrls {
    pub markdown_url: String,
    pub html_url: String,
}

/// Which document an edited Markdown body replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Detail,
    #[serde(alias = "swot")]
    Analysis,
}

impl DocumentKind {
    fn stem(self) -> &'static str {
        match self {
            DocumentKind::Detail => "detail",
            DocumentKind::Analysis => "analysis",
        }
    }
}

/// Writes the generated files of one project under `{projects_dir}/{id}`.
pub struct Exporter {
    dir: PathBuf,
    project_id: String,
}

impl Exporter {
    pub fn new(projects_dir: impl AsRef<Path>, project_id: &str) -> Self {
        Self {
            dir: projects_dir.as_ref().join(project_id),
            project_id: project_id.to_string(),
        }
    }

    pub fn url(&self, file: &str) -> String {
        format!("/projects/{}/{file}", self.project_id)
    }

    pub async fn export_detail(
        &self,
        sections: &ContentSections,
        images: &[GeneratedImage],
        product: &ProductInput,
    ) -> Result<DetailUrls, ExportError> {
        let markdown = render::render_markdown(sections, images, product);
        let html = render::render_detail_html(sections, images, product)?;
        self.write("detail.md", &markdown).await?;
        self.write("detail.html", &html).await?;
        info!(target = "studio.export", project_id = %self.project_id, "detail_exported");
        Ok(DetailUrls {
            markdown_url: self.url("detail.md"),
            html_url: self.url("detail.html"),
        })
    }

    pub async fn export_analysis(
        &self,
        analysis: &StrategicAnalysis,
        subject: &AnalysisSubject,
    ) -> Result<String, ExportError> {
        let html = render::render_analysis_html(analysis, subject)?;
        self.write("analysis.html", &html).await?;
        info!(target = "studio.export", project_id = %self.project_id, "analysis_exported");
        Ok(self.url("analysis.html"))
    }

    /// Stores an edited Markdown body and regenerates its HTML page.
    pub async fn republish_markdown(
        &self,
        markdown: &str,
        kind: DocumentKind,
    ) -> Result<DetailUrls, ExportError> {
        let stem = kind.stem();
        let title = markdown
            .lines()
            .find_map(|line| line.trim().strip_prefix("# "))
            .unwrap_or(stem);
        let html = render::markdown_page(title, markdown)?;
        let md_name = format!("{stem}.md");
        let html_name = format!("{stem}.html");
        self.write(&md_name, markdown).await?;
        self.write(&html_name, &html).await?;
        info!(target = "studio.export", project_id = %self.project_id, document = stem, "markdown_republished");
        Ok(DetailUrls {
            markdown_url: self.url(&md_name),
            html_url: self.url(&html_name),
        })
    }

    async fn write(&self, name: &str, contents: &str) -> Result<(), ExportError> {
        write_atomic(&self.dir.join(name), contents.as_bytes()).await?;
        Ok(())
    }
}

/// Writes to a sibling temp file and renames it over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));
    if let Err(err) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err);
    }
    tokio::fs::rename(&tmp, path).await
}
