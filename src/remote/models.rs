// ABOUTME: Wire-level documents returned by the CouchDB HTTP API
// ABOUTME: Tolerates 1.x and 2.x response shapes and converts into engine types

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

use crate::replication::gateway::DatabaseRef;
use crate::replication::models::{
    ActiveTask, ActiveTaskListing, DatabaseMetrics, ReplicationJobConfig,
};

pub const DESIGN_PREFIX: &str = "_design";

#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    pub doc: Option<ReplicatorDoc>,
}

/// A document in the `_replicator` database.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicatorDoc {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_reference")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_reference")]
    pub target: Option<String>,
    #[serde(default)]
    pub continuous: bool,
    #[serde(rename = "_replication_state", default)]
    pub replication_state: Option<String>,
    #[serde(rename = "_replication_state_time", default, deserialize_with = "state_time")]
    pub replication_state_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActiveTaskDoc {
    #[serde(rename = "type", default)]
    pub task_type: String,
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_reference")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_reference")]
    pub target: Option<String>,
    #[serde(default)]
    pub continuous: bool,
    #[serde(default, deserialize_with = "sequence")]
    pub started_on: Option<u64>,
    #[serde(default, deserialize_with = "sequence")]
    pub updated_on: Option<u64>,
    #[serde(default, deserialize_with = "sequence")]
    pub checkpointed_source_seq: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DbSizes {
    #[serde(default)]
    pub file: Option<u64>,
    #[serde(default)]
    pub active: Option<u64>,
}

/// Response of `GET /{db}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DbInfo {
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub doc_del_count: u64,
    #[serde(default, deserialize_with = "sequence")]
    pub update_seq: Option<u64>,
    #[serde(default)]
    pub disk_size: Option<u64>,
    #[serde(default)]
    pub data_size: Option<u64>,
    #[serde(default)]
    pub sizes: Option<DbSizes>,
    #[serde(default, deserialize_with = "sequence")]
    pub committed_update_seq: Option<u64>,
    #[serde(default, deserialize_with = "sequence")]
    pub instance_start_time: Option<u64>,
}

impl AllDocsResponse {
    /// Replication configs, skipping design documents and deleted rows.
    pub fn into_configs(self) -> Vec<ReplicationJobConfig> {
        self.rows
            .into_iter()
            .filter(|row| !row.id.starts_with(DESIGN_PREFIX))
            .filter_map(|row| row.doc)
            .filter_map(ReplicatorDoc::into_config)
            .collect()
    }
}

impl ReplicatorDoc {
    pub fn into_config(self) -> Option<ReplicationJobConfig> {
        match (self.source, self.target) {
            (Some(source), Some(target)) => Some(ReplicationJobConfig {
                id: self.id,
                source,
                target,
                continuous: self.continuous,
                state: self.replication_state,
                state_time: self.replication_state_time,
            }),
            _ => {
                tracing::warn!(doc = %self.id, "Replicator document has no source or target, ignoring");
                None
            }
        }
    }
}

impl From<ActiveTaskDoc> for ActiveTask {
    fn from(doc: ActiveTaskDoc) -> Self {
        ActiveTask {
            task_type: doc.task_type,
            doc_id: doc.doc_id,
            source: doc.source,
            target: doc.target,
            continuous: doc.continuous,
            started_on: doc.started_on,
            updated_on: doc.updated_on,
            checkpointed_source_seq: doc.checkpointed_source_seq,
        }
    }
}

impl DbInfo {
    pub fn into_metrics(self, reference: &DatabaseRef) -> DatabaseMetrics {
        let sizes = self.sizes.unwrap_or_default();
        let update_seq = self.update_seq.unwrap_or(0);
        DatabaseMetrics {
            name: reference.name(),
            uri: reference.uri(),
            doc_count: self.doc_count,
            doc_del_count: self.doc_del_count,
            update_seq,
            disk_size: self.disk_size.or(sizes.file).unwrap_or(0),
            data_size: self.data_size.or(sizes.active).unwrap_or(0),
            committed_update_seq: self.committed_update_seq.unwrap_or(update_seq),
            instance_start_time: self.instance_start_time,
        }
    }
}

/// Interprets a `_active_tasks` body. Anything but a JSON array of tasks
/// is reported as malformed so the caller can retry.
pub fn parse_active_tasks(body: &str) -> ActiveTaskListing {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => return ActiveTaskListing::Malformed(format!("not JSON: {}", e)),
    };

    if !value.is_array() {
        return ActiveTaskListing::Malformed(truncate(&value.to_string(), 200));
    }

    match serde_json::from_value::<Vec<ActiveTaskDoc>>(value) {
        Ok(docs) => ActiveTaskListing::Tasks(docs.into_iter().map(ActiveTask::from).collect()),
        Err(e) => ActiveTaskListing::Malformed(format!("unexpected task entry: {}", e)),
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(serde_json::Number),
    Text(String),
    Other(serde_json::Value),
}

/// Sequences may be integers (1.x) or opaque strings with a numeric
/// prefix (2.x, e.g. `"12-g1AAAA"`). Timestamps may be either too.
fn sequence<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Option::<NumberOrText>::deserialize(deserializer)? {
        Some(NumberOrText::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Some(NumberOrText::Text(s)) => leading_integer(&s),
        Some(NumberOrText::Other(_)) | None => None,
    })
}

fn leading_integer(text: &str) -> Option<u64> {
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// `_replication_state_time` is epoch seconds in older releases and an
/// RFC 3339 string in newer ones.
fn state_time<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Option::<NumberOrText>::deserialize(deserializer)? {
        Some(NumberOrText::Number(n)) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Some(NumberOrText::Text(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .ok(),
        Some(NumberOrText::Other(_)) | None => None,
    })
}

/// References are strings, or `{"url": ...}` objects in newer releases.
fn lenient_reference<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Object(map)) => map
            .get("url")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        _ => None,
    })
}
