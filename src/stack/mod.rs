//! The web health monitoring stack
//!
//! Turns [`StackSettings`] into a [`ResourceGraph`](crate::graph::ResourceGraph)
//! holding the poll and persistence functions, their schedule, the results
//! table, the alarm topic and one availability/latency alarm pair per
//! monitored endpoint.

pub mod config;
pub mod web_health;

pub use config::{ConfigError, StackSettings};
pub use web_health::{build_web_health_stack, EndpointAlarms, WebHealthStack};

use crate::graph::GraphError;

#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}
