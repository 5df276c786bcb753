// ABOUTME: Replication status engine module
// ABOUTME: Correlates jobs with live tasks, aggregates status, diffs and watches it

pub mod aggregate;
pub mod correlate;
pub mod diff;
pub mod gateway;
pub mod models;
pub mod status;
pub mod watch;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::{aggregate, AggregateOptions};
pub use correlate::{correlate, JobPair};
pub use diff::{diff, diff_snapshot, DiffRecord, MetricsDiff};
pub use gateway::{DatabaseRef, ReplicationGateway};
pub use models::{
    ActiveTask, ActiveTaskListing, DatabaseMetrics, Percentage, Presence, Progress,
    ReplicationJobConfig, StatusRecord, StatusSnapshot,
};
pub use status::StatusBuilder;
pub use watch::{watch, OverlapPolicy, WatchEvent, WatchHandler, WatchOptions, Watcher};
