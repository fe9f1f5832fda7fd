//! Shipyard - build log pipeline and preview proxy
//!
//! Backend of a git build-and-preview platform: a deployment registry, a
//! consumer that moves build log lines from a partitioned queue into a log
//! store and out to live viewers, and a reverse proxy that serves each
//! project's built artifacts on its own subdomain.

pub mod api;
pub mod config;
pub mod hub;
pub mod ingest;
pub mod proxy;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod utils;
