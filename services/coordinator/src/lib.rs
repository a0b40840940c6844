//! NiFi convergence coordinator.
//!
//! Reconciles a declared configuration document (registries, parameter
//! contexts, projects and their environments, users, groups and access
//! policies) against the live state of one or more NiFi clusters.
//!
//! ## Architecture
//!
//! ```text
//! Watcher ──> Coordinator ──> Cluster (one per declared cluster)
//!                   │              └── NifiClient ──> ClusterConnection
//!                   └── sync::* reconcilers, in dependency order
//! ```
//!
//! ## Modules
//!
//! - `api`: typed remote payloads
//! - `client`: cluster connection capability, HTTP and mock implementations
//! - `cluster`: per-cluster state resolved during a run
//! - `config`: desired-state document
//! - `coordinator`: per-cluster orchestration and run reports
//! - `sync`: one reconciler per resource type
//! - `watcher`: poll loop that re-runs on change

pub mod api;
pub mod client;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod sync;
pub mod watcher;

pub use client::{ClusterConnection, Connector, HttpConnector, MockCluster, NifiClient};
pub use config::{ConfigError, Configuration};
pub use coordinator::{ClusterReport, Coordinator, RunReport};
pub use watcher::{WatchSettings, Watcher};
