//! Kubegraph monitor: configuration and HTTP surface of the `kubegraph` binary

pub mod api;
pub mod config;
