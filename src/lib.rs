//! WeChat gateway bridge - message ingestion and chunked media retrieval
//!
//! Bridges a WeChat REST gateway's webhook push to a downstream messaging
//! target:
//! - webhook ingress with immediate acknowledgement
//! - bounded, time-windowed message deduplication
//! - a bounded hand-off queue feeding one serial processing worker
//! - classification/normalization of heterogeneous payload shapes
//! - attachment retrieval via a CDN fast path or segmented chunk download
//!
//! # Architecture
//!
//! ```text
//! gateway push ──► ingress (axum) ──► dedup ──► queue ──► classifier
//!                      │ ack                                  │
//!                      ▼                                      ▼
//!                  200 {"success":true}           identity / side effects /
//!                                                   chunked media fetch
//! ```

pub mod api;
pub mod classify;
pub mod config;
pub mod daemon;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod media;
pub mod notify;
pub mod processor;
pub mod store;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
