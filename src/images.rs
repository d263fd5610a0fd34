use crate::http::build_client;
use crate::selling::SellingPoint;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const DETAIL_SHOTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePrompt {
    #[serde(rename = "type")]
    pub kind: String,
    pub prompt: String,
    pub size: String,
}

/// Prompt for one shot type and style. `detail1`..`detail5` use the detail
/// table; anything unknown falls back to a studio main shot.
pub fn create_prompt(product_name: &str, shot_type: &str, style: &str) -> String {
    let shot = if shot_type.starts_with("detail") {
        "detail"
    } else {
        shot_type
    };
    let p = product_name;
    match (shot, style) {
        ("main", "lifestyle") => format!(
            "Authentic lifestyle photograph of {p} on modern kitchen counter with natural morning light through window, real wooden table texture, subtle imperfections, shot with natural grain, candid style, not overly polished"
        ),
        ("main", "illustration") => format!(
            "Simple line drawing of {p}, hand-drawn style with slight imperfections, minimal colors, sketch-like quality"
        ),
        ("usage", "real") => format!(
            "Documentary-style photograph of hands naturally holding and using {p}, real skin texture visible, natural home environment with lived-in details, soft window light, shot with 50mm lens, photojournalistic style, authentic moment"
        ),
        ("usage", "lifestyle") => format!(
            "Candid photograph of {p} being used in real daily life scenario, natural imperfect lighting, slight motion blur, genuine moment captured, real people in comfortable clothing, warm and relatable atmosphere"
        ),
        ("usage", "illustration") => "Step-by-step usage diagram with simple hand-drawn icons, minimal color palette, clear but not overly polished".to_string(),
        ("infographic", "real") => format!(
            "Clean comparison chart for {p}, simple typography, real product photos (not 3D renders), professional but not overly designed, white background, clear hierarchy"
        ),
        ("infographic", "lifestyle") => format!(
            "Before-and-after comparison showing {p} in use, real photography, natural settings, documentary style"
        ),
        ("infographic", "illustration") => "Simple infographic with hand-drawn elements, minimal colors, information-focused design".to_string(),
        ("detail", "real") => format!(
            "Macro photograph of {p} showing real material texture, natural lighting reveals authentic surface details, shot with macro lens, photorealistic grain, no artificial enhancements, true-to-life colors"
        ),
        ("detail", "lifestyle") => format!(
            "Close-up detail shot of {p} in natural use context, shallow depth of field, real environment in background, authentic worn-in look if applicable"
        ),
        ("detail", "illustration") => format!(
            "Technical line drawing showing {p} details, engineering-drawing style, minimal shading"
        ),
        _ => format!(
            "Professional product photography of {p}, clean white studio background, soft diffused lighting from 45-degree angle, minimal shadows, photorealistic, sharp focus, shot with Canon EOS R5, 85mm lens, f/2.8, commercial catalog style, no artificial effects"
        ),
    }
}

pub fn selling_point_prompt(
    product_name: &str,
    title: &str,
    description: &str,
    style: &str,
) -> String {
    let base_style = match style {
        "lifestyle" => {
            "Authentic lifestyle photograph, natural environment, candid style, warm atmosphere"
        }
        "illustration" => "Simple illustration, hand-drawn style, minimal colors, clean design",
        _ => {
            "Professional product photography, clean background, soft lighting, photorealistic, sharp focus"
        }
    };
    format!(
        "{base_style}. Show {product_name} demonstrating '{title}': {description}. Visual composition that clearly illustrates this specific feature."
    )
}

/// One generated image and the shot it was made for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub shot: String,
    pub url: String,
}

/// URL of the image generated for `shot`, if that shot succeeded.
pub fn image_for<'a>(images: &'a [GeneratedImage], shot: &str) -> Option<&'a str> {
    images
        .iter()
        .find(|img| img.shot == shot)
        .map(|img| img.url.as_str())
}

pub fn image_urls(images: &[GeneratedImage]) -> Vec<String> {
    images.iter().map(|img| img.url.clone()).collect()
}

/// The main shot and five detail shots the page layout needs, followed by
/// any other requested shot (`usage`, `infographic`, ...). The first five
/// selling points drive the detail prompts when they carry a title and
/// description.
pub fn build_image_prompts(
    product_name: &str,
    selling_points: &[SellingPoint],
    style: &str,
    shots: &[String],
) -> Vec<ImagePrompt> {
    let mut prompts = Vec::with_capacity(DETAIL_SHOTS + 1 + shots.len());
    prompts.push(ImagePrompt {
        kind: "main".into(),
        prompt: create_prompt(product_name, "main", style),
        size: "1000x1000".into(),
    });
    for idx in 1..=DETAIL_SHOTS {
        let kind = format!("detail{idx}");
        let prompt = match selling_points.get(idx - 1) {
            Some(sp) if !sp.title.trim().is_empty() && !sp.description.trim().is_empty() => {
                selling_point_prompt(product_name, &sp.title, &sp.description, style)
            }
            _ => create_prompt(product_name, &kind, style),
        };
        prompts.push(ImagePrompt {
            kind,
            prompt,
            size: "800x800".into(),
        });
    }
    for shot in shots {
        let shot = shot.trim();
        if shot.is_empty() || shot.starts_with("detail") || prompts.iter().any(|p| p.kind == shot) {
            continue;
        }
        prompts.push(ImagePrompt {
            kind: shot.to_string(),
            prompt: create_prompt(product_name, shot, style),
            size: "800x800".into(),
        });
    }
    prompts
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image generation disabled")]
    Disabled,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl ImageConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("IMAGE_GENERATION_ENABLED")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            model: std::env::var("OPENAI_IMAGE_MODEL").unwrap_or_else(|_| "dall-e-3".into()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            model: "dall-e-3".into(),
        }
    }
}

#[derive(Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<ApiImage>,
}

#[derive(Deserialize)]
struct ApiImage {
    url: Option<String>,
    b64_json: Option<String>,
}

pub struct ImageGenerator {
    http: Client,
    config: ImageConfig,
    projects_dir: PathBuf,
}

impl ImageGenerator {
    pub fn new(config: ImageConfig, projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: build_client(),
            config,
            projects_dir: projects_dir.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.api_key.is_some()
    }

    /// Generates every prompt in order; failed shots are left out.
    pub async fn generate_all(
        &self,
        project_id: &str,
        prompts: &[ImagePrompt],
    ) -> Vec<GeneratedImage> {
        if !self.is_enabled() {
            info!(
                target = "studio.images",
                project_id,
                prompts = prompts.len(),
                "image_generation_skipped"
            );
            return Vec::new();
        }
        let mut images = Vec::new();
        for prompt in prompts {
            match self.generate(project_id, prompt).await {
                Ok(url) => images.push(GeneratedImage {
                    shot: prompt.kind.clone(),
                    url,
                }),
                Err(err) => {
                    warn!(
                        target = "studio.images",
                        project_id,
                        shot = %prompt.kind,
                        error = %err,
                        "image_generation_failed"
                    );
                }
            }
        }
        images
    }

    pub async fn generate(&self, project_id: &str, prompt: &ImagePrompt) -> Result<String, ImageError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|_| self.config.enabled)
            .ok_or(ImageError::Disabled)?;
        let url = format!(
            "{}/images/generations",
            self.config.base_url.trim_end_matches('/')
        );
        let resp = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(&json!({
                "model": self.config.model,
                "prompt": prompt.prompt,
                "size": "1024x1024",
                "quality": "standard",
                "n": 1,
            }))
            .send()
            .await
            .map_err(|err| ImageError::Http(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(ImageError::Http(format!("status {}", resp.status())));
        }
        let body: GenerationResponse = resp
            .json()
            .await
            .map_err(|err| ImageError::InvalidResponse(err.to_string()))?;
        let image = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ImageError::InvalidResponse("no image returned".into()))?;

        let bytes = match (image.b64_json, image.url) {
            (Some(encoded), _) => BASE64
                .decode(encoded.as_bytes())
                .map_err(|err| ImageError::InvalidResponse(err.to_string()))?,
            (None, Some(url)) => self
                .http
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|err| ImageError::Http(err.to_string()))?
                .bytes()
                .await
                .map_err(|err| ImageError::Http(err.to_string()))?
                .to_vec(),
            (None, None) => {
                return Err(ImageError::InvalidResponse("image has no payload".into()));
            }
        };

        let file_name = image_file_name(&prompt.kind);
        let dir = self.projects_dir.join(project_id).join("images");
        write_image(&dir, &file_name, &bytes).await?;
        info!(target = "studio.images", project_id, file = %file_name, "image_saved");
        Ok(format!("/projects/{project_id}/images/{file_name}"))
    }
}

fn image_file_name(kind: &str) -> String {
    format!("{kind}_{}.png", Utc::now().format("%Y%m%d_%H%M%S"))
}

async fn write_image(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<(), ImageError> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(file_name), bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(title: &str, description: &str) -> SellingPoint {
        SellingPoint {
            title: title.into(),
            description: description.into(),
            evidence: None,
        }
    }

    #[test]
    fn detail_shots_use_detail_table() {
        let prompt = create_prompt("감자칩", "detail3", "real");
        assert!(prompt.starts_with("Macro photograph of 감자칩"));
        let unknown = create_prompt("감자칩", "banner", "watercolor");
        assert!(unknown.starts_with("Professional product photography of 감자칩"));
    }

    fn shots(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn always_five_detail_prompts() {
        let prompts = build_image_prompts(
            "감자칩",
            &[point("저칼로리", "튀기지 않음"), point("", "설명만")],
            "lifestyle",
            &[],
        );
        assert_eq!(prompts.len(), 6);
        assert_eq!(prompts[0].kind, "main");
        assert_eq!(prompts[0].size, "1000x1000");
        assert!(prompts[1].prompt.contains("demonstrating '저칼로리'"));
        assert!(prompts[2].prompt.starts_with("Close-up detail shot"));
        assert_eq!(prompts[5].kind, "detail5");
        assert!(prompts[1..].iter().all(|p| p.size == "800x800"));
    }

    #[tokio::test]
    async fn disabled_generator_returns_nothing() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let generator = ImageGenerator::new(ImageConfig::disabled(), dir.path());
        let prompts = build_image_prompts("감자칩", &[], "real", &[]);
        assert!(generator.generate_all("p1", &prompts).await.is_empty());
        assert!(matches!(
            generator.generate("p1", &prompts[0]).await,
            Err(ImageError::Disabled)
        ));
    }

    #[test]
    fn requested_shots_are_appended_once() {
        let prompts = build_image_prompts(
            "감자칩",
            &[],
            "real",
            &shots(&["main", "usage", "infographic", "detail2", "usage", " "]),
        );
        let kinds: Vec<&str> = prompts.iter().map(|p| p.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["main", "detail1", "detail2", "detail3", "detail4", "detail5", "usage", "infographic"]
        );
        assert!(prompts[6].prompt.starts_with("Documentary-style photograph"));
    }

    #[test]
    fn images_are_looked_up_by_shot() {
        let images = vec![
            GeneratedImage { shot: "main".into(), url: "/projects/p/images/main.png".into() },
            GeneratedImage { shot: "detail3".into(), url: "/projects/p/images/d3.png".into() },
        ];
        assert_eq!(image_for(&images, "detail3"), Some("/projects/p/images/d3.png"));
        assert_eq!(image_for(&images, "detail1"), None);
        assert_eq!(image_urls(&images).len(), 2);
    }
}
