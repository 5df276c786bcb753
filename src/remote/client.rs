// ABOUTME: HTTP client for reading replication facts from a CouchDB cluster
// ABOUTME: Implements the replication gateway over reqwest

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::models::{parse_active_tasks, AllDocsResponse, DbInfo};
use crate::error::MonitorError;
use crate::replication::gateway::{DatabaseRef, ReplicationGateway};
use crate::replication::models::{ActiveTaskListing, DatabaseMetrics, ReplicationJobConfig};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub timeout: Duration,
    /// Skip TLS certificate verification, for clusters with self-signed certs.
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }
}

pub struct CouchClient {
    client: Client,
    root: Url,
}

impl CouchClient {
    pub fn new(root: &str, options: &ClientOptions) -> Result<Self> {
        let root = root.trim();
        if root.is_empty() {
            return Err(MonitorError::Configuration(
                "a cluster URL is required (e.g. http://localhost:5984)".to_string(),
            )
            .into());
        }

        let root = Url::parse(root).map_err(|e| {
            MonitorError::Configuration(format!("invalid cluster URL {}: {}", root, e))
        })?;
        if root.cannot_be_a_base() {
            return Err(MonitorError::Configuration(format!(
                "cluster URL {} cannot be used as a base",
                redact(&root)
            ))
            .into());
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, root })
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Appends `segments` to the root, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.root.clone();
        url.path_segments_mut()
            .map_err(|_| {
                MonitorError::Configuration(format!(
                    "cluster URL {} cannot be used as a base",
                    redact(&self.root)
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&str, &str)]) -> Result<T> {
        let shown = redact(&url);
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| MonitorError::Connection(format!("Failed to reach {}: {}", shown, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::Connection(format!(
                "GET {} failed with status {}: {}",
                shown, status, body
            ))
            .into());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", shown))
    }
}

#[async_trait]
impl ReplicationGateway for CouchClient {
    async fn list_replication_configs(&self) -> Result<Vec<ReplicationJobConfig>> {
        let url = self.endpoint(&["_replicator", "_all_docs"])?;
        let docs: AllDocsResponse = self.get_json(url, &[("include_docs", "true")]).await?;
        Ok(docs.into_configs())
    }

    async fn list_active_tasks(&self) -> Result<ActiveTaskListing> {
        let url = self.endpoint(&["_active_tasks"])?;
        let shown = redact(&url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MonitorError::Connection(format!("Failed to reach {}: {}", shown, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response from {}", shown))?;
        // auth and routing failures do not go away on retry
        if status.is_client_error() {
            return Err(MonitorError::Connection(format!(
                "GET {} failed with status {}: {}",
                shown, status, body
            ))
            .into());
        }
        // a server error document here is a transient state
        if !status.is_success() {
            tracing::debug!(%status, "Active task listing returned an error status");
        }
        Ok(parse_active_tasks(&body))
    }

    async fn read_database_metrics(&self, reference: &str) -> Result<DatabaseMetrics> {
        let db = DatabaseRef::parse(reference);
        let url = match &db {
            DatabaseRef::Local(name) => self.endpoint(&[name.as_str()])?,
            DatabaseRef::Remote { url, .. } => url.clone(),
        };
        let info: DbInfo = self.get_json(url, &[]).await?;
        Ok(info.into_metrics(&db))
    }
}

/// The URL without its password, for logs and error messages.
pub fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    if shown.password().is_some() {
        let _ = shown.set_password(Some("*****"));
    }
    shown.to_string()
}
