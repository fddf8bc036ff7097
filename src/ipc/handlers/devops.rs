//! The three Azure DevOps operations exposed over RPC.
//!
//! Arguments arrive as positional JSON-RPC params; results are the
//! rendered text payloads from [`crate::format`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::PluginError;
use crate::format;
use crate::AppContext;

fn positional<T: DeserializeOwned>(params: Value) -> Result<T, PluginError> {
    serde_json::from_value(params).map_err(|e| PluginError::InvalidParams(e.to_string()))
}

pub async fn connect(params: Value, ctx: &AppContext) -> Result<Value, PluginError> {
    let (endpoint, credential): (String, String) = positional(params)?;
    let confirmation = ctx.connections.connect(&endpoint, &credential).await?;
    Ok(Value::String(confirmation))
}

pub async fn list_projects(_params: Value, ctx: &AppContext) -> Result<Value, PluginError> {
    let session = ctx.connections.require().await?;
    let projects = session.tracker.list_projects().await?;
    debug!(count = projects.len(), "projects listed");
    Ok(Value::String(format::render_projects(&projects)))
}

pub async fn list_work_items(params: Value, ctx: &AppContext) -> Result<Value, PluginError> {
    let (project,): (String,) = positional(params)?;
    let session = ctx.connections.require().await?;

    let ids = session.tracker.query_work_item_ids(&project).await?;
    if ids.is_empty() {
        // Skip the batch fetch entirely on an empty query result.
        return Ok(Value::String(format::render_work_items(&[])));
    }

    let items = session.tracker.work_items(&ids).await?;
    debug!(project = %project, count = items.len(), "work items fetched");
    Ok(Value::String(format::render_work_items(&items)))
}
