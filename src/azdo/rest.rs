//! reqwest-backed [`WorkTracker`] against the Azure DevOps REST API.
//!
//! Authentication is a personal access token sent as HTTP Basic with an
//! empty username. `RestConnector::connect` validates the credential
//! eagerly with a `GET _apis/connectiondata` call, so a bad token or
//! unreachable organization fails the connect RPC instead of the first
//! query.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::models::{TeamProject, WorkItem};
use super::{Connector, WorkTracker};
use crate::error::PluginError;

const API_VERSION: &str = "7.1";

/// The service refuses batch reads above 200 ids; the WIQL query is
/// capped to the same number so one fetch always suffices.
const MAX_BATCH_IDS: usize = 200;

/// Fixed query for the work item listing. The project is bound through
/// the `@project` macro (scoped by the request URL), never interpolated
/// into the query text.
const WORK_ITEM_QUERY: &str = "SELECT [System.Id] FROM WorkItems \
     WHERE [System.TeamProject] = @project \
     ORDER BY [System.ChangedDate] DESC";

const WORK_ITEM_FIELDS: &str = "System.Id,System.Title,System.State,System.AssignedTo";

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ValueList<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WiqlResult {
    #[serde(default)]
    work_items: Vec<WorkItemRef>,
}

#[derive(Deserialize)]
struct WorkItemRef {
    id: u64,
}

// ─── Connector ───────────────────────────────────────────────────────────────

/// Production [`Connector`]: builds a [`RestClient`] and validates it.
pub struct RestConnector {
    timeout: Duration,
}

impl RestConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Connector for RestConnector {
    async fn connect(
        &self,
        organization_url: &str,
        token: &str,
    ) -> Result<Arc<dyn WorkTracker>, PluginError> {
        let base = Url::parse(organization_url)
            .map_err(|e| PluginError::Connect(format!("invalid organization URL: {e}")))?;
        if !base.has_host() {
            return Err(PluginError::Connect(
                "invalid organization URL: missing host".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| PluginError::Connect(e.to_string()))?;

        let client = RestClient {
            http,
            base,
            token: token.to_string(),
        };
        client.validate().await?;
        Ok(Arc::new(client))
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    token: String,
}

impl RestClient {
    /// Eager credential check. `connectiondata` is the cheapest
    /// authenticated endpoint the service offers.
    async fn validate(&self) -> Result<(), PluginError> {
        let url = self.api_url(&["_apis", "connectiondata"], &[])
            .map_err(|e| PluginError::Connect(e.to_string()))?;
        self.get(url)
            .await
            .map_err(|e| PluginError::Connect(e.to_string()))?;
        Ok(())
    }

    /// Builds `{base}/{segments...}?{query...}&api-version=...`, percent-
    /// encoding each path segment.
    fn api_url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, UrlError> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| UrlError)?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("api-version", API_VERSION);
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, reqwest::Error> {
        self.http
            .get(url)
            .basic_auth("", Some(&self.token))
            .send()
            .await?
            .error_for_status()
    }
}

#[derive(Debug)]
struct UrlError;

impl std::fmt::Display for UrlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("organization URL cannot carry path segments")
    }
}

fn service_err(e: impl std::fmt::Display) -> PluginError {
    PluginError::Service(e.to_string())
}

#[async_trait]
impl WorkTracker for RestClient {
    async fn list_projects(&self) -> Result<Vec<TeamProject>, PluginError> {
        let url = self.api_url(&["_apis", "projects"], &[]).map_err(service_err)?;
        debug!(%url, "listing projects");
        let body: ValueList<TeamProject> = self
            .get(url)
            .await
            .map_err(service_err)?
            .json()
            .await
            .map_err(service_err)?;
        Ok(body.value)
    }

    async fn query_work_item_ids(&self, project: &str) -> Result<Vec<u64>, PluginError> {
        let top = MAX_BATCH_IDS.to_string();
        let url = self
            .api_url(&[project, "_apis", "wit", "wiql"], &[("$top", top.as_str())])
            .map_err(service_err)?;
        debug!(%url, "running work item query");
        let result: WiqlResult = self
            .http
            .post(url)
            .basic_auth("", Some(&self.token))
            .json(&serde_json::json!({ "query": WORK_ITEM_QUERY }))
            .send()
            .await
            .map_err(service_err)?
            .error_for_status()
            .map_err(service_err)?
            .json()
            .await
            .map_err(service_err)?;
        Ok(result.work_items.into_iter().map(|r| r.id).collect())
    }

    async fn work_items(&self, ids: &[u64]) -> Result<Vec<WorkItem>, PluginError> {
        let mut items = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_BATCH_IDS) {
            let id_list = chunk
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let url = self
                .api_url(
                    &["_apis", "wit", "workitems"],
                    &[("ids", id_list.as_str()), ("fields", WORK_ITEM_FIELDS)],
                )
                .map_err(service_err)?;
            let body: ValueList<WorkItem> = self
                .get(url)
                .await
                .map_err(service_err)?
                .json()
                .await
                .map_err(service_err)?;
            items.extend(body.value);
        }
        Ok(items)
    }
}
