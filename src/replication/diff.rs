// ABOUTME: Field-wise numeric deltas between two status records or snapshots
// ABOUTME: Progress deltas are taken on rounded percentages and re-rounded

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::models::{DatabaseMetrics, Percentage, Progress, StatusRecord, StatusSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsDiff {
    pub doc_count: i64,
    pub doc_del_count: i64,
    pub update_seq: i64,
    pub disk_size: i64,
    pub data_size: i64,
    pub committed_update_seq: i64,
    pub instance_start_time: Option<i64>,
}

/// `later - earlier` for every numeric leaf of a `StatusRecord`. Optional
/// leaves are absent when either side lacks them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub started_on: Option<i64>,
    pub updated_on: Option<i64>,
    pub state_time: Option<i64>,
    pub checkpointed_source_seq: Option<i64>,
    pub source: MetricsDiff,
    pub target: MetricsDiff,
    pub remaining: i64,
    pub progress: Progress,
}

impl DiffRecord {
    /// True when nothing numeric moved between the two observations.
    pub fn is_unchanged(&self) -> bool {
        let zero = |v: Option<i64>| v.unwrap_or(0) == 0;
        let progress_zero = |p: Percentage| p.value().map_or(true, |v| v == 0.0);
        zero(self.started_on)
            && zero(self.updated_on)
            && zero(self.state_time)
            && zero(self.checkpointed_source_seq)
            && self.remaining == 0
            && self.source.is_unchanged()
            && self.target.is_unchanged()
            && progress_zero(self.progress.docs)
            && progress_zero(self.progress.disk_size)
            && progress_zero(self.progress.data_size)
            && progress_zero(self.progress.update_seq)
    }
}

impl MetricsDiff {
    fn is_unchanged(&self) -> bool {
        self.doc_count == 0
            && self.doc_del_count == 0
            && self.update_seq == 0
            && self.disk_size == 0
            && self.data_size == 0
            && self.committed_update_seq == 0
            && self.instance_start_time.unwrap_or(0) == 0
    }
}

fn sub(later: u64, earlier: u64) -> i64 {
    (later as i64).wrapping_sub(earlier as i64)
}

fn sub_opt<T: Copy + Into<i128>>(later: Option<T>, earlier: Option<T>) -> Option<i64> {
    match (later, earlier) {
        (Some(l), Some(e)) => Some((l.into() - e.into()) as i64),
        _ => None,
    }
}

fn diff_metrics(earlier: &DatabaseMetrics, later: &DatabaseMetrics) -> MetricsDiff {
    MetricsDiff {
        doc_count: sub(later.doc_count, earlier.doc_count),
        doc_del_count: sub(later.doc_del_count, earlier.doc_del_count),
        update_seq: sub(later.update_seq, earlier.update_seq),
        disk_size: sub(later.disk_size, earlier.disk_size),
        data_size: sub(later.data_size, earlier.data_size),
        committed_update_seq: sub(later.committed_update_seq, earlier.committed_update_seq),
        instance_start_time: sub_opt(later.instance_start_time, earlier.instance_start_time),
    }
}

pub fn diff(earlier: &StatusRecord, later: &StatusRecord) -> DiffRecord {
    DiffRecord {
        started_on: sub_opt(later.started_on, earlier.started_on),
        updated_on: sub_opt(later.updated_on, earlier.updated_on),
        state_time: sub_opt(later.state_time, earlier.state_time),
        checkpointed_source_seq: sub_opt(
            later.checkpointed_source_seq,
            earlier.checkpointed_source_seq,
        ),
        source: diff_metrics(&earlier.source, &later.source),
        target: diff_metrics(&earlier.target, &later.target),
        remaining: later.remaining.wrapping_sub(earlier.remaining),
        progress: Progress {
            docs: Percentage::delta(later.progress.docs, earlier.progress.docs),
            disk_size: Percentage::delta(later.progress.disk_size, earlier.progress.disk_size),
            data_size: Percentage::delta(later.progress.data_size, earlier.progress.data_size),
            update_seq: Percentage::delta(later.progress.update_seq, earlier.progress.update_seq),
        },
    }
}

/// Diffs the jobs present in both snapshots. Jobs that appeared or vanished
/// in between are left out.
pub fn diff_snapshot(
    earlier: &StatusSnapshot,
    later: &StatusSnapshot,
) -> BTreeMap<String, DiffRecord> {
    later
        .iter()
        .filter_map(|(id, l)| earlier.get(id).map(|e| (id.clone(), diff(e, l))))
        .collect()
}
