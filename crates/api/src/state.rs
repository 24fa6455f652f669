use std::sync::Arc;

use stampline_pipeline::WorkflowEngine;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the engine and config are behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: stampline_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Workflow engine; every mutating endpoint goes through it.
    pub engine: WorkflowEngine,
}
