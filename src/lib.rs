pub mod azdo;
pub mod config;
pub mod connection;
pub mod error;
pub mod format;
pub mod ipc;

use std::sync::Arc;

use config::DaemonConfig;
use connection::ConnectionManager;

/// Shared application state passed to every RPC handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    /// Single-slot session holder for the Azure DevOps connection.
    pub connections: Arc<ConnectionManager>,
    pub started_at: std::time::Instant,
}
