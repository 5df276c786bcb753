// ABOUTME: CouchDB HTTP access for the replication status monitor
// ABOUTME: Wire models plus a reqwest-based gateway implementation

pub mod client;
pub mod models;
