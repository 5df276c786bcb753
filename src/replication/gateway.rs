// ABOUTME: Narrow interface the status engine uses to read facts from the cluster
// ABOUTME: Also resolves database references into bare names or external URLs

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Url;

use super::models::{ActiveTaskListing, DatabaseMetrics, ReplicationJobConfig};

/// Source of raw replication facts. Every call may fail independently.
#[async_trait]
pub trait ReplicationGateway: Send + Sync {
    /// Configured jobs, excluding design documents.
    async fn list_replication_configs(&self) -> Result<Vec<ReplicationJobConfig>>;

    /// Live tasks. An empty cluster yields `Tasks(vec![])`, never `Malformed`.
    async fn list_active_tasks(&self) -> Result<ActiveTaskListing>;

    async fn read_database_metrics(&self, reference: &str) -> Result<DatabaseMetrics>;
}

/// A database reference as written in a replication document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseRef {
    /// Bare name, resolved against the cluster root.
    Local(String),
    /// Fully-qualified reference to a database anywhere. `raw` is the
    /// reference exactly as written; `url` is its parsed form.
    Remote { url: Url, raw: String },
}

impl DatabaseRef {
    /// Anything with a scheme is remote. Bare names never parse as URLs
    /// because they have no `scheme:` prefix.
    pub fn parse(reference: &str) -> Self {
        match Url::parse(reference) {
            Ok(url) if url.has_host() => DatabaseRef::Remote {
                url,
                raw: reference.to_string(),
            },
            _ => DatabaseRef::Local(reference.to_string()),
        }
    }

    /// Bare database name: the reference itself, or the URL's last path segment.
    pub fn name(&self) -> String {
        match self {
            DatabaseRef::Local(name) => name.clone(),
            DatabaseRef::Remote { url, .. } => {
                let path = url.path().trim_matches('/');
                let last = path.rsplit('/').next().unwrap_or(path);
                decode_segment(last)
            }
        }
    }

    /// The external reference to report, if any, unchanged from the document.
    pub fn uri(&self) -> Option<String> {
        match self {
            DatabaseRef::Local(_) => None,
            DatabaseRef::Remote { raw, .. } => Some(raw.clone()),
        }
    }
}

// CouchDB names may contain '/', which is sent as %2F in a single segment.
fn decode_segment(segment: &str) -> String {
    segment.replace("%2F", "/").replace("%2f", "/")
}
