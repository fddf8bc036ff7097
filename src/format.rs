//! Terminal rendering of service results.
//!
//! Pure functions; every RPC success payload comes from here.

use std::fmt::Write as _;

use crate::azdo::models::{TeamProject, WorkItem};

const NO_PROJECTS: &str = "No projects found.";
const NO_WORK_ITEMS: &str = "No work items found.";

/// Visual marker for a work item state. Total over all inputs: the two
/// known states get distinct markers, every other string (including
/// empty) falls into the default bucket.
pub fn state_marker(state: &str) -> &'static str {
    match state {
        "Active" => "●",
        "Closed" => "✔",
        _ => "○",
    }
}

pub fn render_projects(projects: &[TeamProject]) -> String {
    if projects.is_empty() {
        return NO_PROJECTS.to_string();
    }
    let mut out = String::from("Azure DevOps Projects:\n======================\n");
    for project in projects {
        let _ = writeln!(out, "- {} ({})", project.name, project.id);
        if let Some(description) = project.description.as_deref() {
            if !description.is_empty() {
                let _ = writeln!(out, "  {description}");
            }
        }
    }
    out
}

pub fn render_work_items(items: &[WorkItem]) -> String {
    if items.is_empty() {
        return NO_WORK_ITEMS.to_string();
    }
    let mut out = String::from("Work Items:\n===========\n");
    for item in items {
        let fields = &item.fields;
        let _ = write!(
            out,
            "{} #{} - {} [{}]",
            state_marker(&fields.state),
            item.id,
            fields.title,
            fields.state
        );
        if let Some(assignee) = &fields.assigned_to {
            let _ = write!(out, " ({})", assignee.display_name);
        }
        out.push('\n');
    }
    out
}
