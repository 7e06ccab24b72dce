use crate::common::{principal, test_env};
use team_mesh::errors::CoreError;
use team_mesh::models::Role;

#[test]
fn test_queue_crud() {
    let env = test_env();
    let core = env.core();

    core.workflows
        .create_queue("q1", "Intake", Some("incoming work"), Some("T1"), "u1")
        .unwrap();

    let queue = core.workflows.get_queue("q1").unwrap().unwrap();
    assert_eq!(queue.name, "Intake");
    assert_eq!(queue.team_id.as_deref(), Some("T1"));

    let listed = core.workflows.list_queues(Some("T1")).unwrap();
    assert_eq!(listed.len(), 1);

    assert!(core.workflows.delete_queue("q1").unwrap());
    assert!(core.workflows.get_queue("q1").unwrap().is_none());
    assert!(!core.workflows.delete_queue("q1").unwrap());
}

#[test]
fn test_queue_access_with_no_grants_falls_back() {
    let env = test_env();
    let core = env.core();

    core.workflows
        .create_queue("q1", "Intake", None, None, "creator")
        .unwrap();

    let (ok, reason) = core
        .workflows
        .check_queue_access("q1", &principal("creator", Role::Member, None), "read")
        .unwrap();
    assert!(ok);
    assert_eq!(reason, "queue creator");

    let (ok, _) = core
        .workflows
        .check_queue_access("q1", &principal("boss", Role::Admin, None), "write")
        .unwrap();
    assert!(ok);

    let (ok, reason) = core
        .workflows
        .check_queue_access("q1", &principal("random", Role::Member, None), "read")
        .unwrap();
    assert!(!ok);
    assert!(reason.contains("no read grant"));
}

#[test]
fn test_queue_grant_matching() {
    let env = test_env();
    let core = env.core();

    core.workflows
        .create_queue("q1", "Intake", None, Some("T1"), "creator")
        .unwrap();
    core.workflows
        .grant_queue_access("q1", "read", "user", "alice", "creator")
        .unwrap();
    core.workflows
        .grant_queue_access("q1", "write", "role", "admin", "creator")
        .unwrap();
    core.workflows
        .grant_queue_access("q1", "execute", "team", "T1", "creator")
        .unwrap();

    // user grant
    let (ok, reason) = core
        .workflows
        .check_queue_access("q1", &principal("alice", Role::Member, None), "read")
        .unwrap();
    assert!(ok);
    assert!(reason.contains("user grant"));

    let (ok, _) = core
        .workflows
        .check_queue_access("q1", &principal("bob", Role::Member, None), "read")
        .unwrap();
    assert!(!ok, "explicit grants exclude non-matching users");

    // role grant
    let (ok, _) = core
        .workflows
        .check_queue_access("q1", &principal("bob", Role::Admin, None), "write")
        .unwrap();
    assert!(ok);

    // team grant
    let (ok, _) = core
        .workflows
        .check_queue_access("q1", &principal("carol", Role::Member, Some("T1")), "execute")
        .unwrap();
    assert!(ok);
    let (ok, _) = core
        .workflows
        .check_queue_access("q1", &principal("carol", Role::Member, Some("T2")), "execute")
        .unwrap();
    assert!(!ok);
}

#[test]
fn test_queue_access_unknown_queue_and_types() {
    let env = test_env();
    let core = env.core();

    let (ok, reason) = core
        .workflows
        .check_queue_access("ghost", &principal("u", Role::Member, None), "read")
        .unwrap();
    assert!(!ok);
    assert!(reason.contains("not found"));

    let err = core
        .workflows
        .check_queue_access("ghost", &principal("u", Role::Member, None), "fly")
        .unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)));

    core.workflows
        .create_queue("q1", "Intake", None, None, "creator")
        .unwrap();
    let err = core
        .workflows
        .grant_queue_access("q1", "read", "galaxy", "x", "creator")
        .unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)));
}

#[test]
fn test_queue_revoke() {
    let env = test_env();
    let core = env.core();

    core.workflows
        .create_queue("q1", "Intake", None, None, "creator")
        .unwrap();
    core.workflows
        .grant_queue_access("q1", "read", "user", "alice", "creator")
        .unwrap();

    assert!(core
        .workflows
        .revoke_queue_access("q1", "read", "user", "alice")
        .unwrap());

    let (ok, _) = core
        .workflows
        .check_queue_access("q1", &principal("alice", Role::Member, None), "read")
        .unwrap();
    // Back to the fallback rule; alice is neither creator nor admin.
    assert!(!ok);

    assert_eq!(core.workflows.queue_grants("q1").unwrap().len(), 0);
}
