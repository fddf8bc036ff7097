//! Single-slot session lifecycle for the Azure DevOps connection.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::azdo::{Connector, WorkTracker};
use crate::error::PluginError;

const CONNECTED_MESSAGE: &str = "Connected to Azure DevOps successfully!";

/// An established, validated connection. Cheap to clone; reads go through
/// the tracker handle without holding the manager's lock.
#[derive(Clone)]
pub struct Session {
    pub endpoint: String,
    pub tracker: Arc<dyn WorkTracker>,
}

/// Holds at most one live [`Session`].
///
/// `connect` is idempotent-replacing: a successful call overwrites any
/// prior session without explicit teardown. A failed call leaves the
/// prior session intact — the new tracker is built and validated before
/// the slot is ever locked, so replacement is atomic-on-success only.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    session: Mutex<Option<Session>>,
}

impl ConnectionManager {
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            session: Mutex::new(None),
        }
    }

    /// Establishes (or replaces) the session. Returns the confirmation
    /// text on success.
    pub async fn connect(
        &self,
        endpoint: &str,
        credential: &str,
    ) -> Result<String, PluginError> {
        let tracker = self.connector.connect(endpoint, credential).await?;
        let mut slot = self.session.lock().await;
        let replaced = slot.is_some();
        *slot = Some(Session {
            endpoint: endpoint.to_string(),
            tracker,
        });
        info!(endpoint = %endpoint, replaced, "session established");
        Ok(CONNECTED_MESSAGE.to_string())
    }

    /// Session guard used by every read operation. Never touches the
    /// network.
    pub async fn require(&self) -> Result<Session, PluginError> {
        self.session
            .lock()
            .await
            .clone()
            .ok_or(PluginError::NotConnected)
    }

    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }
}
