//! The slice of the Azure DevOps data model this daemon consumes.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkItem {
    pub id: u64,
    #[serde(default)]
    pub fields: WorkItemFields,
}

/// Work item fields arrive keyed by their reference names
/// (`System.Title` etc.); anything else the service sends is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkItemFields {
    #[serde(rename = "System.Title", default)]
    pub title: String,
    #[serde(rename = "System.State", default)]
    pub state: String,
    #[serde(rename = "System.AssignedTo", default)]
    pub assigned_to: Option<IdentityRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    pub display_name: String,
}
