use std::sync::Arc;

use anyhow::{Context, Result};
use autofix_agent::{FixGenerator, FixRequest, pipeline::open_fix_pull_request};
use autofix_core::{config::Config, models::ParsedError};
use autofix_github::GitHubProvider;
use autofix_sentry::WebhookEnvelope;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default queue capacity. Jobs beyond this are dropped, not blocked on.
pub const QUEUE_CAPACITY: usize = 100;

/// The unit of queued work: the raw webhook envelope plus its derived
/// canonical record. One dispatch attempt, no retry, no persistence.
#[derive(Debug, Clone)]
pub struct Job {
    pub envelope: WebhookEnvelope,
    pub error: ParsedError,
}

/// Producer side of the bounded job channel.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Non-blocking enqueue. When the queue is full the job is dropped and
    /// the drop is logged; the caller still acknowledges the webhook.
    pub fn enqueue(&self, job: Job) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!("Job queue full, dropping webhook for issue {}", job.error.issue_id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::error!(
                    "Job queue closed, dropping webhook for issue {}",
                    job.error.issue_id
                );
                false
            }
        }
    }
}

/// Shared context for the dispatcher and its per-job pipeline runs.
#[derive(Clone)]
pub struct JobContext {
    pub config: Arc<Config>,
    pub generator: Arc<dyn FixGenerator>,
}

/// Consume jobs one at a time until cancelled.
///
/// Cancellation is observed only between jobs: a job already mid-flight
/// finishes or aborts on its own error paths. A failed job is logged and
/// never stalls the loop.
pub async fn run_dispatcher(
    mut rx: mpsc::Receiver<Job>,
    ctx: JobContext,
    cancel: CancellationToken,
) {
    tracing::info!("Job dispatcher started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job dispatcher shutting down");
                break;
            }
            job = rx.recv() => {
                let Some(job) = job else {
                    tracing::info!("Job queue closed, dispatcher stopping");
                    break;
                };
                process_job(&ctx, job).await;
            }
        }
    }
}

/// Handle a single job end to end. Errors terminate this job only.
pub async fn process_job(ctx: &JobContext, job: Job) {
    let error = &job.error;
    tracing::info!(
        "Processing job for issue {} (project {}, action {})",
        error.issue_id,
        error.project_slug,
        job.envelope.action
    );
    let Some(mapping) = ctx.config.repo_mapping(&error.project_slug) else {
        tracing::info!("No repo mapping for project {}, skipping", error.project_slug);
        return;
    };
    let result: Result<()> = async {
        let request = FixRequest {
            issue_id: error.issue_id.clone(),
            title: error.title.clone(),
            error_type: error.error_type.clone(),
            error_message: error.error_message.clone(),
            level: error.level.clone(),
            platform: error.platform.clone(),
            culprit: error.culprit.clone(),
            permalink: error.permalink.clone(),
            stacktrace: error.frames.clone(),
            repo_url: mapping.repo_url(),
            repo_token: ctx.config.github.token.clone(),
        };
        let fix = ctx.generator.generate_fix(&request).await.context("Fix generation failed")?;
        let provider =
            GitHubProvider::new(&ctx.config.github.token, &mapping.owner, &mapping.repo)?;
        let pr = open_fix_pull_request(&provider, error, &fix)
            .await
            .context("Failed to create pull request")?;
        tracing::info!("Created PR for issue {}: {}", error.issue_id, pr.html_url);
        Ok(())
    }
    .await;
    if let Err(e) = result {
        tracing::error!("Pipeline failed for issue {}: {:?}", error.issue_id, e);
    }
}
