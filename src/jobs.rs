use crate::{
    models::{DetailPageResponse, ProductInput},
    workflow::{PipelineError, Workflow},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{info, warn};

/// Bounded queue of generation runs with a single worker. Synchronous runs
/// report into the same status table so `/api/projects` sees both.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    statuses: Arc<Mutex<HashMap<String, JobEntry>>>,
}

struct Job {
    project_id: String,
    product: ProductInput,
}

#[derive(Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed {
        result: DetailPageResponse,
    },
    Failed {
        error: String,
        stage: Option<String>,
    },
}

#[derive(Clone)]
struct JobEntry {
    product_name: String,
    updated_at: DateTime<Utc>,
    state: JobState,
}

#[derive(Clone, Serialize)]
pub struct JobInfo {
    pub project_id: String,
    pub product_name: String,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: JobState,
}

impl JobQueue {
    pub fn spawn(workflow: Workflow) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(queue_capacity_from_env());
        let queue = Self {
            tx,
            statuses: Arc::new(Mutex::new(HashMap::new())),
        };
        let worker = queue.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let platform = job.product.primary_platform().to_string();
                worker
                    .record(&job.project_id, &job.product.product_name, JobState::Running)
                    .await;
                info!(target = "studio.jobs", project_id = %job.project_id, "job_started");

                let state = match workflow.generate(&job.project_id, job.product.clone()).await {
                    Ok(result) => JobState::Completed {
                        result: result.response(&platform),
                    },
                    Err(err) => {
                        warn!(
                            target = "studio.jobs",
                            project_id = %job.project_id,
                            stage = err.stage(),
                            error = err.detail(),
                            "job_failed"
                        );
                        JobState::failed(&err)
                    }
                };
                worker
                    .record(&job.project_id, &job.product.product_name, state)
                    .await;
            }
        });

        (queue, handle)
    }

    pub async fn enqueue(
        &self,
        project_id: &str,
        product: ProductInput,
    ) -> Result<(), PipelineError> {
        self.record(project_id, &product.product_name, JobState::Queued)
            .await;
        let job = Job {
            project_id: project_id.to_string(),
            product,
        };
        self.tx
            .send(job)
            .await
            .map_err(|_| PipelineError::internal("enqueue", "worker not available"))
    }

    pub async fn record(&self, project_id: &str, product_name: &str, state: JobState) {
        let mut guard = self.statuses.lock().await;
        guard.insert(
            project_id.to_string(),
            JobEntry {
                product_name: product_name.to_string(),
                updated_at: Utc::now(),
                state,
            },
        );
    }

    pub async fn get(&self, project_id: &str) -> Option<JobInfo> {
        let guard = self.statuses.lock().await;
        guard
            .get(project_id)
            .map(|entry| entry.info(project_id))
    }

    /// Every known project, most recently updated first.
    pub async fn list(&self) -> Vec<JobInfo> {
        let guard = self.statuses.lock().await;
        let mut all: Vec<JobInfo> = guard
            .iter()
            .map(|(id, entry)| entry.info(id))
            .collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all
    }
}

impl JobState {
    pub fn failed(err: &PipelineError) -> Self {
        Self::Failed {
            error: err.detail().to_string(),
            stage: Some(err.stage().to_string()),
        }
    }
}

impl JobEntry {
    fn info(&self, project_id: &str) -> JobInfo {
        JobInfo {
            project_id: project_id.to_string(),
            product_name: self.product_name.clone(),
            updated_at: self.updated_at,
            state: self.state.clone(),
        }
    }
}

fn queue_capacity_from_env() -> usize {
    std::env::var("QUEUE_CAPACITY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{ImageConfig, ImageGenerator};
    use crate::llm::testing::ScriptedModel;
    use crate::models::sample_product;
    use crate::search::{WebSearch, testing::ScriptedSearch};
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn queued_job_runs_to_completion() {
        let dir = TempDir::new().expect("tempdir");
        let workflow = Workflow::new(
            Arc::new(ScriptedModel::failing()),
            WebSearch::new(Arc::new(ScriptedSearch::new(vec![]))),
            ImageGenerator::new(ImageConfig::disabled(), dir.path()),
            dir.path(),
        );
        let (queue, _worker) = JobQueue::spawn(workflow);

        queue
            .enqueue("proj_job", sample_product())
            .await
            .expect("enqueue");

        let mut finished = None;
        for _ in 0..200 {
            if let Some(info) = queue.get("proj_job").await {
                if matches!(info.state, JobState::Completed { .. } | JobState::Failed { .. }) {
                    finished = Some(info);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let info = finished.expect("job finished");
        match info.state {
            JobState::Completed { result } => {
                assert_eq!(result.project_id, "proj_job");
                assert_eq!(result.meta.platform, "coupang");
            }
            _ => panic!("job should complete"),
        }
        assert_eq!(info.product_name, "바삭 감자칩");
    }

    #[tokio::test]
    async fn list_orders_newest_first() {
        let dir = TempDir::new().expect("tempdir");
        let workflow = Workflow::new(
            Arc::new(ScriptedModel::failing()),
            WebSearch::new(Arc::new(ScriptedSearch::new(vec![]))),
            ImageGenerator::new(ImageConfig::disabled(), dir.path()),
            dir.path(),
        );
        let (queue, _worker) = JobQueue::spawn(workflow);
        queue.record("proj_a", "A", JobState::Running).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        queue
            .record(
                "proj_b",
                "B",
                JobState::failed(&PipelineError::internal("export", "disk full")),
            )
            .await;

        let all = queue.list().await;
        let ids: Vec<&str> = all.iter().map(|j| j.project_id.as_str()).collect();
        assert_eq!(ids, vec!["proj_b", "proj_a"]);
        let json = serde_json::to_value(&all[0]).expect("serialize");
        assert_eq!(json["state"], "failed");
        assert_eq!(json["stage"], "export");
    }
}
