use crate::common::test_env;
use crate::workflows::basic_workflow;
use team_mesh::workflow::{WorkflowTrigger, Visibility, WorkItemPriority, WorkItemStatus, triggers};

#[test]
fn test_agent_event_creates_work_item() {
    let env = test_env();
    let core = env.core();

    let mut wf = basic_workflow("w1", "u1");
    wf.triggers = vec![WorkflowTrigger::OnAgentEvent {
        event_type: "agent.apply.success".to_string(),
        enabled: true,
    }];
    core.workflows.save_workflow(&wf, "u1", None).unwrap();

    let event = serde_json::json!({
        "type": "agent.apply.success",
        "files": ["src/main.rs"],
        "summary": "Implemented feature X"
    });
    let created = triggers::handle_agent_event(&core.workflows, &event, "u1", None);
    assert_eq!(created.len(), 1);

    let item = core
        .workflows
        .get_work_item(&created[0], "u1", false)
        .unwrap()
        .unwrap();
    assert_eq!(item.workflow_id, "w1");
    assert_eq!(item.current_stage_id, "intake");
    assert_eq!(item.status, WorkItemStatus::Pending);
    assert_eq!(item.priority, WorkItemPriority::Normal);
    assert_eq!(item.data["triggered_by"], "agent_event");
    assert_eq!(item.data["event_type"], "agent.apply.success");
    assert_eq!(item.data["event"]["summary"], "Implemented feature X");
}

#[test]
fn test_non_matching_event_type_ignored() {
    let env = test_env();
    let core = env.core();

    let mut wf = basic_workflow("w1", "u1");
    wf.triggers = vec![WorkflowTrigger::OnAgentEvent {
        event_type: "agent.apply.success".to_string(),
        enabled: true,
    }];
    core.workflows.save_workflow(&wf, "u1", None).unwrap();

    let event = serde_json::json!({"type": "agent.plan.complete"});
    let created = triggers::handle_agent_event(&core.workflows, &event, "u1", None);
    assert!(created.is_empty());
}

#[test]
fn test_disabled_trigger_and_template_skipped() {
    let env = test_env();
    let core = env.core();

    let mut disabled = basic_workflow("w1", "u1");
    disabled.triggers = vec![WorkflowTrigger::OnAgentEvent {
        event_type: "agent.apply.success".to_string(),
        enabled: false,
    }];
    core.workflows.save_workflow(&disabled, "u1", None).unwrap();

    let mut template = basic_workflow("w2", "u1");
    template.is_template = true;
    template.triggers = vec![WorkflowTrigger::OnAgentEvent {
        event_type: "agent.apply.success".to_string(),
        enabled: true,
    }];
    core.workflows.save_workflow(&template, "u1", None).unwrap();

    let event = serde_json::json!({"type": "agent.apply.success"});
    let created = triggers::handle_agent_event(&core.workflows, &event, "u1", None);
    assert!(created.is_empty());
}

#[test]
fn test_invalid_event_degrades_gracefully() {
    let env = test_env();
    let core = env.core();

    let created =
        triggers::handle_agent_event(&core.workflows, &serde_json::json!({}), "u1", None);
    assert!(created.is_empty());
}

#[test]
fn test_file_pattern_substring_match() {
    let env = test_env();
    let core = env.core();

    let mut wf = basic_workflow("w1", "u1");
    wf.triggers = vec![WorkflowTrigger::OnFilePattern {
        pattern: "reports/".to_string(),
        enabled: true,
    }];
    core.workflows.save_workflow(&wf, "u1", None).unwrap();

    let hit = serde_json::json!({
        "type": "file.created",
        "file_path": "/vault/reports/q3.xlsx"
    });
    let created = triggers::handle_file_event(&core.workflows, &hit, "u1", None);
    assert_eq!(created.len(), 1);
    let item = core
        .workflows
        .get_work_item(&created[0], "u1", false)
        .unwrap()
        .unwrap();
    assert_eq!(item.data["triggered_by"], "file_pattern");

    let miss = serde_json::json!({
        "type": "file.created",
        "file_path": "/vault/images/logo.png"
    });
    let created = triggers::handle_file_event(&core.workflows, &miss, "u1", None);
    assert!(created.is_empty());
}

#[test]
fn test_team_scoped_trigger_fires_for_team_workflows() {
    let env = test_env();
    let core = env.core();

    let mut wf = basic_workflow("w1", "u1");
    wf.visibility = Visibility::Team;
    wf.owner_team_id = Some("T1".to_string());
    wf.triggers = vec![WorkflowTrigger::OnAgentEvent {
        event_type: "agent.apply.success".to_string(),
        enabled: true,
    }];
    core.workflows.save_workflow(&wf, "u1", Some("T1")).unwrap();

    let event = serde_json::json!({"type": "agent.apply.success"});

    // A teammate's event reaches the team workflow.
    let created = triggers::handle_agent_event(&core.workflows, &event, "u2", Some("T1"));
    assert_eq!(created.len(), 1);

    // Outside the team nothing fires.
    let created = triggers::handle_agent_event(&core.workflows, &event, "u2", Some("T2"));
    assert!(created.is_empty());
}
