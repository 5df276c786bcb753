// ABOUTME: Domain types for replication jobs, live tasks and merged status records
// ABOUTME: StatusRecord serializes to the JSON shape consumers of the monitor expect

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A replication job as configured in the `_replicator` database.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationJobConfig {
    pub id: String,
    pub source: String,
    pub target: String,
    pub continuous: bool,
    pub state: Option<String>,
    pub state_time: Option<DateTime<Utc>>,
}

/// One entry from the cluster's live task list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActiveTask {
    pub task_type: String,
    pub doc_id: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub continuous: bool,
    /// Seconds since the epoch, as reported by the cluster.
    pub started_on: Option<u64>,
    pub updated_on: Option<u64>,
    pub checkpointed_source_seq: Option<u64>,
}

impl ActiveTask {
    pub fn is_replication(&self) -> bool {
        self.task_type == "replication"
    }
}

/// Result of listing active tasks. `Malformed` means the cluster answered
/// with something other than a task array, which happens transiently.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveTaskListing {
    Tasks(Vec<ActiveTask>),
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMetrics {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub doc_count: u64,
    pub doc_del_count: u64,
    pub update_seq: u64,
    pub disk_size: u64,
    pub data_size: u64,
    pub committed_update_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_start_time: Option<u64>,
}

/// A 0-100 scaled ratio rounded to two decimals, or undefined when the
/// denominator is zero or the numerator is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Percentage(Option<f64>);

impl Percentage {
    pub const UNDEFINED: Percentage = Percentage(None);

    pub fn ratio(numerator: Option<u64>, denominator: u64) -> Self {
        match numerator {
            Some(n) if denominator != 0 => Self::from_value(n as f64 / denominator as f64 * 100.0),
            _ => Self::UNDEFINED,
        }
    }

    pub fn from_value(value: f64) -> Self {
        if value.is_finite() {
            Percentage(Some(round2(value)))
        } else {
            Self::UNDEFINED
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.0
    }

    pub fn is_defined(&self) -> bool {
        self.0.is_some()
    }

    /// `later - earlier`, re-rounded. Undefined if either side is.
    pub fn delta(later: Percentage, earlier: Percentage) -> Self {
        match (later.0, earlier.0) {
            (Some(l), Some(e)) => Self::from_value(l - e),
            _ => Self::UNDEFINED,
        }
    }
}

fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // avoid "-0.00"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{:.2}", v),
            None => write!(f, "undefined"),
        }
    }
}

impl Serialize for Percentage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(v) => serializer.serialize_str(&format!("{:.2}", v)),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Percentage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(f64),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(Percentage::UNDEFINED),
            Some(Raw::Number(v)) => Ok(Percentage::from_value(v)),
            Some(Raw::Text(s)) => match s.as_str() {
                "NaN" | "Infinity" | "-Infinity" | "undefined" => Ok(Percentage::UNDEFINED),
                other => other
                    .parse::<f64>()
                    .map(Percentage::from_value)
                    .map_err(|_| de::Error::custom(format!("invalid percentage: {}", other))),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub docs: Percentage,
    pub disk_size: Percentage,
    pub data_size: Percentage,
    pub update_seq: Percentage,
}

/// Which of the two upstream facts existed for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Presence {
    pub task: bool,
    pub config: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub id: String,
    pub continuous: bool,
    /// Milliseconds since the epoch.
    pub started_on: Option<u64>,
    pub updated_on: Option<u64>,
    pub state: Option<String>,
    pub state_time: Option<i64>,
    pub checkpointed_source_seq: Option<u64>,
    pub source: DatabaseMetrics,
    pub target: DatabaseMetrics,
    pub remaining: i64,
    pub progress: Progress,
    #[serde(default)]
    pub presence: Presence,
}

pub type StatusSnapshot = BTreeMap<String, StatusRecord>;
