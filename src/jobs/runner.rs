//! Drives one analysis job from `queue` to a terminal state.

use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::store::{JobStore, TaskUpdate};
use crate::export::{ExportError, ReportExporter};
use crate::metrics::{self, MetricsRecord};
use crate::youtube::{ChannelResolver, StatsFetcher, YouTubeError};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    YouTube(#[from] YouTubeError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

pub struct AnalysisRunner {
    jobs: Arc<JobStore>,
    resolver: Arc<dyn ChannelResolver>,
    fetcher: Arc<dyn StatsFetcher>,
    exporter: Arc<dyn ReportExporter>,
}

impl AnalysisRunner {
    pub fn new(
        jobs: Arc<JobStore>,
        resolver: Arc<dyn ChannelResolver>,
        fetcher: Arc<dyn StatsFetcher>,
        exporter: Arc<dyn ReportExporter>,
    ) -> Self {
        Self {
            jobs,
            resolver,
            fetcher,
            exporter,
        }
    }

    /// Run the job in the background.
    ///
    /// Nothing cancels a spawned run and there is no cap on how many run at once.
    pub fn spawn(
        self: &Arc<Self>,
        job_id: String,
        urls: Vec<String>,
        user: String,
        task_number: u32,
    ) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner.run(&job_id, &urls, &user, task_number).await;
        })
    }

    /// Process every URL in order, then export; the first error fails the task.
    ///
    /// Unknown jobs and jobs that already left `queue` are skipped without any work.
    pub async fn run(&self, job_id: &str, urls: &[String], user: &str, task_number: u32) {
        if !self.jobs.update_task(job_id, TaskUpdate::Working).await {
            tracing::warn!(job_id, task_number, "Job is unknown or already started, skipping run");
            return;
        }
        tracing::info!(job_id, user, task_number, urls = urls.len(), "Job started");

        let update = match self.analyze(urls, user, task_number).await {
            Ok(sheet_url) => {
                tracing::info!(job_id, task_number, %sheet_url, "Job complete");
                TaskUpdate::Done { sheet_url }
            }
            Err(e) => {
                tracing::warn!(job_id, task_number, error = %e, "Job failed");
                TaskUpdate::Failed {
                    error: e.to_string(),
                }
            }
        };
        self.jobs.update_task(job_id, update).await;
    }

    async fn analyze(
        &self,
        urls: &[String],
        user: &str,
        task_number: u32,
    ) -> Result<String, AnalysisError> {
        let mut records: Vec<MetricsRecord> = Vec::with_capacity(urls.len());
        for url in urls {
            let channel_id = self.resolver.resolve(url).await?;
            let stats = self.fetcher.fetch(&channel_id).await?;
            tracing::debug!(%url, %channel_id, channel = %stats.channel_name, "Fetched channel stats");
            records.push(metrics::compute(&stats));
        }

        Ok(self.exporter.export(&records, user, task_number).await?)
    }
}
