// ABOUTME: In-memory gateway used by the engine's unit tests
// ABOUTME: Can serve malformed task listings, slow reads and failures on demand

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::gateway::ReplicationGateway;
use super::models::{ActiveTask, ActiveTaskListing, DatabaseMetrics, ReplicationJobConfig};

pub fn metrics(name: &str, docs: u64, disk: u64, data: u64, seq: u64) -> DatabaseMetrics {
    DatabaseMetrics {
        name: name.to_string(),
        uri: None,
        doc_count: docs,
        doc_del_count: 0,
        update_seq: seq,
        disk_size: disk,
        data_size: data,
        committed_update_seq: seq,
        instance_start_time: None,
    }
}

pub fn replication_task(id: &str, checkpointed: u64) -> ActiveTask {
    ActiveTask {
        task_type: "replication".to_string(),
        doc_id: Some(id.to_string()),
        continuous: true,
        started_on: Some(1_700_000_000),
        updated_on: Some(1_700_000_060),
        checkpointed_source_seq: Some(checkpointed),
        ..Default::default()
    }
}

pub fn job_config(id: &str, source: &str, target: &str) -> ReplicationJobConfig {
    ReplicationJobConfig {
        id: id.to_string(),
        source: source.to_string(),
        target: target.to_string(),
        continuous: true,
        state: Some("triggered".to_string()),
        state_time: None,
    }
}

#[derive(Default)]
pub struct FakeGateway {
    configs: Vec<ReplicationJobConfig>,
    tasks: Vec<ActiveTask>,
    databases: HashMap<String, DatabaseMetrics>,
    malformed_listings: AtomicUsize,
    read_delay: Option<Duration>,
    pub config_calls: AtomicUsize,
    pub task_calls: AtomicUsize,
    pub metric_reads: AtomicUsize,
    in_flight_sources: AtomicUsize,
    pub max_in_flight_sources: AtomicUsize,
    failing_lists: Mutex<usize>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ReplicationJobConfig) -> Self {
        self.configs.push(config);
        self
    }

    pub fn with_task(mut self, task: ActiveTask) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_database(mut self, reference: &str, metrics: DatabaseMetrics) -> Self {
        self.databases.insert(reference.to_string(), metrics);
        self
    }

    /// The next `count` task listings come back malformed.
    pub fn with_malformed_listings(self, count: usize) -> Self {
        self.malformed_listings.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// The next `count` config listings fail outright.
    pub fn fail_next_lists(&self, count: usize) {
        *self.failing_lists.lock().unwrap() = count;
    }

    pub fn task_calls(&self) -> usize {
        self.task_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplicationGateway for FakeGateway {
    async fn list_replication_configs(&self) -> Result<Vec<ReplicationJobConfig>> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failing = self.failing_lists.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(anyhow!("cluster unreachable"));
            }
        }
        Ok(self.configs.clone())
    }

    async fn list_active_tasks(&self) -> Result<ActiveTaskListing> {
        self.task_calls.fetch_add(1, Ordering::SeqCst);
        let malformed = self
            .malformed_listings
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if malformed {
            return Ok(ActiveTaskListing::Malformed(
                "{\"error\":\"unknown_error\"}".to_string(),
            ));
        }
        Ok(ActiveTaskListing::Tasks(self.tasks.clone()))
    }

    async fn read_database_metrics(&self, reference: &str) -> Result<DatabaseMetrics> {
        self.metric_reads.fetch_add(1, Ordering::SeqCst);
        let is_source = reference.starts_with("src");
        if is_source {
            let now = self.in_flight_sources.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight_sources.fetch_max(now, Ordering::SeqCst);
        }
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        if is_source {
            self.in_flight_sources.fetch_sub(1, Ordering::SeqCst);
        }
        self.databases
            .get(reference)
            .cloned()
            .ok_or_else(|| anyhow!("Database {} not found", reference))
    }
}
