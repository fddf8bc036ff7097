//! Azure DevOps service boundary.
//!
//! The daemon consumes the service through the [`WorkTracker`] trait so
//! handlers and tests never depend on the REST transport directly.
//! [`rest::RestConnector`] is the production implementation.

pub mod models;
pub mod rest;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PluginError;
use models::{TeamProject, WorkItem};

/// Read interface of an authenticated Azure DevOps session.
#[async_trait]
pub trait WorkTracker: Send + Sync {
    /// All projects visible to the session, in service order.
    async fn list_projects(&self) -> Result<Vec<TeamProject>, PluginError>;

    /// Work item ids in `project`, most-recently-changed first.
    async fn query_work_item_ids(&self, project: &str) -> Result<Vec<u64>, PluginError>;

    /// Full records for a non-empty id list.
    async fn work_items(&self, ids: &[u64]) -> Result<Vec<WorkItem>, PluginError>;
}

/// Builds an authenticated [`WorkTracker`] from an organization URL and a
/// personal access token. Construction must validate the credential
/// eagerly: a returned `Ok` means the session is usable.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        organization_url: &str,
        token: &str,
    ) -> Result<Arc<dyn WorkTracker>, PluginError>;
}
