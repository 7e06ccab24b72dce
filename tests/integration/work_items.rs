use crate::common::test_env;
use crate::workflows::{basic_workflow, stage};
use team_mesh::errors::CoreError;
use team_mesh::workflow::{
    WorkItem, WorkItemAttachment, WorkItemStatus, WorkflowStore, triggers,
};

fn seeded_item(store: &WorkflowStore, workflow_id: &str, user_id: &str) -> WorkItem {
    let wf = basic_workflow(workflow_id, user_id);
    store.save_workflow(&wf, user_id, None).unwrap();
    let item = WorkItem::new(&wf, &wf.stages[0], user_id);
    store.save_work_item(&item, user_id, None).unwrap();
    item
}

#[test]
fn test_save_and_get_work_item() {
    let env = test_env();
    let core = env.core();

    let item = seeded_item(&core.workflows, "w1", "u1");

    let loaded = core
        .workflows
        .get_work_item(&item.id, "u1", false)
        .unwrap()
        .unwrap();
    assert_eq!(loaded.workflow_id, "w1");
    assert_eq!(loaded.current_stage_id, "intake");
    assert_eq!(loaded.status, WorkItemStatus::Pending);
    assert!(loaded.history.is_empty(), "not hydrated");

    // User isolation on reads.
    assert!(core.workflows.get_work_item(&item.id, "u2", false).unwrap().is_none());
}

#[test]
fn test_advance_appends_history_and_duration() {
    let env = test_env();
    let core = env.core();

    let item = seeded_item(&core.workflows, "w1", "u1");

    let advanced = core
        .workflows
        .advance_work_item(&item.id, "u1", "review", Some("u1"), Some("looks ready"))
        .unwrap();
    assert_eq!(advanced.current_stage_id, "review");
    assert_eq!(advanced.current_stage_name, "Review");
    assert_eq!(advanced.history.len(), 1);
    let first = &advanced.history[0];
    assert_eq!(first.from_stage_id.as_deref(), Some("intake"));
    assert_eq!(first.to_stage_id, "review");
    assert_eq!(first.notes.as_deref(), Some("looks ready"));
    // First transition has nothing to measure against.
    assert!(first.duration_seconds.is_none());

    // Second transition measures from the first.
    let advanced = core
        .workflows
        .advance_work_item(&item.id, "u1", "intake", Some("u1"), None)
        .unwrap();
    assert_eq!(advanced.history.len(), 2);
    assert!(advanced.history[1].duration_seconds.is_some());

    // History is append-only and persisted.
    let hydrated = core
        .workflows
        .get_work_item(&item.id, "u1", true)
        .unwrap()
        .unwrap();
    assert_eq!(hydrated.history.len(), 2);
}

#[test]
fn test_advance_rejects_foreign_stage() {
    let env = test_env();
    let core = env.core();

    let item = seeded_item(&core.workflows, "w1", "u1");
    let err = core
        .workflows
        .advance_work_item(&item.id, "u1", "not-a-stage", None, None)
        .unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)));
}

#[test]
fn test_attachments_roundtrip() {
    let env = test_env();
    let core = env.core();

    let mut item = seeded_item(&core.workflows, "w1", "u1");
    item.attachments.push(WorkItemAttachment {
        id: "att1".to_string(),
        filename: "scan.pdf".to_string(),
        file_path: "/vault/scan.pdf".to_string(),
        file_size: 2048,
        mime_type: "application/pdf".to_string(),
        uploaded_by: "u1".to_string(),
        uploaded_at: chrono::Utc::now().to_rfc3339(),
    });
    core.workflows.save_work_item(&item, "u1", None).unwrap();

    let hydrated = core
        .workflows
        .get_work_item(&item.id, "u1", true)
        .unwrap()
        .unwrap();
    assert_eq!(hydrated.attachments.len(), 1);
    assert_eq!(hydrated.attachments[0].filename, "scan.pdf");

    // Re-saving does not duplicate the attachment.
    core.workflows.save_work_item(&item, "u1", None).unwrap();
    let hydrated = core
        .workflows
        .get_work_item(&item.id, "u1", true)
        .unwrap()
        .unwrap();
    assert_eq!(hydrated.attachments.len(), 1);
}

#[test]
fn test_status_and_claim() {
    let env = test_env();
    let core = env.core();

    let item = seeded_item(&core.workflows, "w1", "u1");

    core.workflows
        .set_work_item_status(&item.id, "u1", WorkItemStatus::Active)
        .unwrap();
    core.workflows.claim_work_item(&item.id, "u1", "worker-7").unwrap();

    let loaded = core
        .workflows
        .get_work_item(&item.id, "u1", false)
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, WorkItemStatus::Active);
    assert_eq!(loaded.assigned_to.as_deref(), Some("worker-7"));
    assert!(loaded.claimed_at.is_some());
    assert!(loaded.completed_at.is_none());

    core.workflows
        .set_work_item_status(&item.id, "u1", WorkItemStatus::Completed)
        .unwrap();
    let loaded = core
        .workflows
        .get_work_item(&item.id, "u1", false)
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, WorkItemStatus::Completed);
    assert!(loaded.completed_at.is_some());
}

#[test]
fn test_list_work_items_filters() {
    let env = test_env();
    let core = env.core();

    let wf = basic_workflow("w1", "u1");
    core.workflows.save_workflow(&wf, "u1", None).unwrap();
    for i in 0..3 {
        let mut item = WorkItem::new(&wf, &wf.stages[0], "u1");
        item.id = format!("item{i}");
        if i == 0 {
            item.status = WorkItemStatus::Completed;
        }
        if i == 1 {
            item.assigned_to = Some("worker-1".to_string());
        }
        core.workflows.save_work_item(&item, "u1", None).unwrap();
    }

    let all = core
        .workflows
        .list_work_items("u1", Some("w1"), None, None, 50)
        .unwrap();
    assert_eq!(all.len(), 3);

    let completed = core
        .workflows
        .list_work_items("u1", None, Some(WorkItemStatus::Completed), None, 50)
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, "item0");

    let assigned = core
        .workflows
        .list_work_items("u1", None, None, Some("worker-1"), 50)
        .unwrap();
    assert_eq!(assigned.len(), 1);

    let limited = core
        .workflows
        .list_work_items("u1", None, None, None, 2)
        .unwrap();
    assert_eq!(limited.len(), 2);

    // Other users see nothing.
    assert!(core.workflows.list_work_items("u2", None, None, None, 50).unwrap().is_empty());
}

#[test]
fn test_overdue_sweep() {
    let env = test_env();
    let core = env.core();

    let wf = basic_workflow("w1", "u1");
    core.workflows.save_workflow(&wf, "u1", None).unwrap();

    let mut overdue = WorkItem::new(&wf, &wf.stages[0], "u1");
    overdue.sla_due_at = Some((chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339());
    core.workflows.save_work_item(&overdue, "u1", None).unwrap();

    let mut on_time = WorkItem::new(&wf, &wf.stages[0], "u1");
    on_time.sla_due_at = Some((chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339());
    core.workflows.save_work_item(&on_time, "u1", None).unwrap();

    assert_eq!(core.workflows.mark_overdue_items().unwrap(), 1);
    let loaded = core
        .workflows
        .get_work_item(&overdue.id, "u1", false)
        .unwrap()
        .unwrap();
    assert!(loaded.is_overdue);
}

#[test]
fn test_manual_creation_rules() {
    let env = test_env();
    let core = env.core();

    let mut wf = basic_workflow("w1", "u1");
    wf.allow_manual_creation = false;
    core.workflows.save_workflow(&wf, "u1", None).unwrap();

    let err = triggers::create_manual_work_item(
        &core.workflows,
        "w1",
        "u1",
        None,
        serde_json::Map::new(),
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::AccessDenied));

    let mut wf2 = basic_workflow("w2", "u1");
    wf2.stages = vec![stage("only", "Only")];
    core.workflows.save_workflow(&wf2, "u1", None).unwrap();

    let item = triggers::create_manual_work_item(
        &core.workflows,
        "w2",
        "u1",
        None,
        serde_json::Map::new(),
    )
    .unwrap();
    assert_eq!(item.current_stage_id, "only");
    assert_eq!(item.data["triggered_by"], "manual");

    // Templates are never instantiated.
    let mut template = basic_workflow("w3", "u1");
    template.is_template = true;
    core.workflows.save_workflow(&template, "u1", None).unwrap();
    let err = triggers::create_manual_work_item(
        &core.workflows,
        "w3",
        "u1",
        None,
        serde_json::Map::new(),
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)));
}
