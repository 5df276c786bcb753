// ABOUTME: Library root for the CouchDB replication status monitor
// ABOUTME: Re-exports the status engine, HTTP gateway and configuration

pub mod config;
pub mod error;
pub mod remote;
pub mod replication;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use remote::client::{ClientOptions, CouchClient};
pub use replication::{
    aggregate, diff, diff_snapshot, watch, AggregateOptions, DiffRecord, OverlapPolicy,
    ReplicationGateway, StatusRecord, StatusSnapshot, WatchEvent, WatchOptions, Watcher,
};
