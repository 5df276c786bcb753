// ABOUTME: Aggregates per-job status records into one snapshot for the whole cluster
// ABOUTME: Retries on malformed task listings and bounds concurrent per-job builds

use anyhow::Result;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Duration;

use super::correlate::correlate;
use super::gateway::ReplicationGateway;
use super::models::{ActiveTask, ActiveTaskListing, ReplicationJobConfig, StatusSnapshot};
use super::status::StatusBuilder;
use crate::error::MonitorError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOptions {
    /// Job ids to report. `None` reports every job.
    pub filter: Option<Vec<String>>,
    /// Omit external database references from the output.
    pub sanitize: bool,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Upper bound on per-job builds in flight at once.
    pub concurrency: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            filter: None,
            sanitize: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl AggregateOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(MonitorError::Configuration("max_attempts must be at least 1".into()).into());
        }
        if self.concurrency == 0 {
            return Err(MonitorError::Configuration("concurrency must be at least 1".into()).into());
        }
        Ok(())
    }
}

/// Builds a status record for every correlated job.
///
/// Fails on the first job whose status cannot be built; no partial
/// snapshot is returned.
pub async fn aggregate<G>(gateway: &G, options: &AggregateOptions) -> Result<StatusSnapshot>
where
    G: ReplicationGateway + ?Sized,
{
    options.validate()?;

    let (configs, tasks) = fetch_consistent(gateway, options).await?;
    // owned per-job inputs keep the fan-out future free of local borrows
    let jobs: Vec<(String, Option<ActiveTask>, Option<ReplicationJobConfig>)> =
        correlate(&tasks, &configs, options.filter.as_deref())
            .into_iter()
            .map(|pair| (pair.id.to_string(), pair.task.cloned(), pair.config.cloned()))
            .collect();

    tracing::debug!(
        jobs = jobs.len(),
        configs = configs.len(),
        tasks = tasks.len(),
        "Building replication status"
    );

    let sanitize = options.sanitize;
    let snapshot: StatusSnapshot = stream::iter(jobs)
        .map(move |(id, task, config)| async move {
            let builder = StatusBuilder::new(gateway, sanitize);
            match builder.build(task.as_ref(), config.as_ref()).await {
                Ok(record) => Ok((id, record)),
                Err(e) => Err(MonitorError::JobBuild {
                    job_id: id,
                    message: format!("{:#}", e),
                }),
            }
        })
        .buffer_unordered(options.concurrency)
        .try_collect()
        .await?;

    Ok(snapshot)
}

/// Reads configs and tasks until the task listing is well formed.
///
/// The delay is only slept between attempts, so `k` malformed listings
/// followed by a good one cost `k * retry_delay`.
async fn fetch_consistent<G>(
    gateway: &G,
    options: &AggregateOptions,
) -> Result<(Vec<ReplicationJobConfig>, Vec<ActiveTask>)>
where
    G: ReplicationGateway + ?Sized,
{
    let mut last_detail = String::new();

    for attempt in 1..=options.max_attempts {
        let (configs, listing) = tokio::try_join!(
            gateway.list_replication_configs(),
            gateway.list_active_tasks()
        )?;

        match listing {
            ActiveTaskListing::Tasks(tasks) => return Ok((configs, tasks)),
            ActiveTaskListing::Malformed(detail) => {
                tracing::warn!(
                    attempt,
                    max_attempts = options.max_attempts,
                    "Active task listing was malformed: {}",
                    detail
                );
                last_detail = detail;
                if attempt < options.max_attempts {
                    tokio::time::sleep(options.retry_delay).await;
                }
            }
        }
    }

    Err(MonitorError::UpstreamInconsistency {
        attempts: options.max_attempts,
        detail: last_detail,
    }
    .into())
}
