//! Event-based workflow triggering.
//!
//! Agent and file events fan out to work items in matching workflows.
//! Trigger handling degrades gracefully: errors are logged, the caller's
//! operation never fails because a workflow misfired.

use super::models::*;
use super::storage::WorkflowStore;
use crate::errors::{CoreError, CoreResult};

/// Handle an agent event (e.g. `agent.apply.success`): create a work item in
/// every enabled, non-template, visible workflow with a matching
/// `on_agent_event` trigger. Returns the created work item ids.
pub fn handle_agent_event(
    store: &WorkflowStore,
    event: &serde_json::Value,
    user_id: &str,
    team_id: Option<&str>,
) -> Vec<String> {
    let Some(event_type) = event.get("type").and_then(|t| t.as_str()) else {
        eprintln!("⚠️ handle_agent_event called with invalid event (no type)");
        return Vec::new();
    };

    match fan_out(store, user_id, team_id, event, |trigger| {
        matches!(trigger,
            WorkflowTrigger::OnAgentEvent { event_type: wanted, enabled: true }
                if wanted == event_type)
    }, "agent_event", event_type)
    {
        Ok(ids) => ids,
        Err(e) => {
            eprintln!("⚠️ Error handling agent event {event_type}: {e}");
            Vec::new()
        }
    }
}

/// Handle a file event: trigger workflows whose `on_file_pattern` matches
/// the path (substring match; pluggable for glob/regex later).
pub fn handle_file_event(
    store: &WorkflowStore,
    event: &serde_json::Value,
    user_id: &str,
    team_id: Option<&str>,
) -> Vec<String> {
    let Some(event_type) = event.get("type").and_then(|t| t.as_str()) else {
        eprintln!("⚠️ handle_file_event called with invalid event (no type)");
        return Vec::new();
    };
    let file_path = event
        .get("file_path")
        .and_then(|p| p.as_str())
        .unwrap_or("");

    match fan_out(store, user_id, team_id, event, |trigger| {
        matches!(trigger,
            WorkflowTrigger::OnFilePattern { pattern, enabled: true }
                if file_path.contains(pattern.as_str()))
    }, "file_pattern", event_type)
    {
        Ok(ids) => ids,
        Err(e) => {
            eprintln!("⚠️ Error handling file event for {file_path}: {e}");
            Vec::new()
        }
    }
}

fn fan_out(
    store: &WorkflowStore,
    user_id: &str,
    team_id: Option<&str>,
    event: &serde_json::Value,
    matches: impl Fn(&WorkflowTrigger) -> bool,
    triggered_by: &str,
    event_type: &str,
) -> CoreResult<Vec<String>> {
    let workflows = store.list_workflows(user_id, team_id, None, true, None)?;

    let mut created = Vec::new();
    for workflow in workflows {
        // Templates are reference copies, never instantiated.
        if workflow.is_template {
            continue;
        }
        if !workflow.triggers.iter().any(&matches) {
            continue;
        }
        let Some(initial_stage) = workflow.stages.first() else {
            eprintln!("⚠️ Workflow {} has no stages, skipping", workflow.name);
            continue;
        };

        let mut item = WorkItem::new(&workflow, initial_stage, user_id);
        item.data.insert("triggered_by".into(), triggered_by.into());
        item.data.insert("event_type".into(), event_type.into());
        item.data.insert("event".into(), event.clone());

        store.save_work_item(&item, user_id, team_id)?;
        created.push(item.id);
    }

    Ok(created)
}

/// Manually create a work item in a workflow, when the workflow permits it.
pub fn create_manual_work_item(
    store: &WorkflowStore,
    workflow_id: &str,
    user_id: &str,
    team_id: Option<&str>,
    data: serde_json::Map<String, serde_json::Value>,
) -> CoreResult<WorkItem> {
    let workflow = store
        .get_workflow(workflow_id, user_id, team_id)?
        .ok_or(CoreError::NotFound)?;
    if workflow.is_template {
        return Err(CoreError::Invalid(format!(
            "workflow {workflow_id} is a template and cannot be instantiated"
        )));
    }
    if !workflow.allow_manual_creation {
        return Err(CoreError::AccessDenied);
    }
    let initial_stage = workflow
        .stages
        .first()
        .ok_or_else(|| CoreError::Invalid(format!("workflow {workflow_id} has no stages")))?;

    let mut item = WorkItem::new(&workflow, initial_stage, user_id);
    item.data = data;
    item.data.insert("triggered_by".into(), "manual".into());

    store.save_work_item(&item, user_id, team_id)?;
    Ok(item)
}
