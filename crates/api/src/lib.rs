//! Cost optimizer HTTP service
//!
//! Exposes account analysis, stored report lookup, health and Prometheus
//! metrics over HTTP.

pub mod api;
pub mod config;
