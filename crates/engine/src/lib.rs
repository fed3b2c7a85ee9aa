//! KubePocket engine service
//!
//! Wires the [`engine_lib`] cycles to a Kubernetes cluster and serves the
//! derived results over HTTP.

pub mod api;
pub mod config;
pub mod exporter;
pub mod platform;
