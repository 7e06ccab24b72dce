use crate::common::{count_where, test_env};

#[test]
fn test_founder_rights_lifecycle() {
    let env = test_env();
    let core = env.core();
    let app_db = env.app_db();

    // Grant → active.
    let record = core
        .permissions
        .grant_god_rights("u1", "out-of-band-key", Some("root"), Some("oncall break-glass"))
        .unwrap();
    assert!(record.is_active);
    let created_at = record.created_at.clone();
    assert!(core.permissions.check_god_rights("u1").unwrap());

    // Revoke → inactive, row preserved.
    assert!(core.permissions.revoke_god_rights("u1", "root").unwrap());
    assert!(!core.permissions.check_god_rights("u1").unwrap());
    let record = core.permissions.get_god_rights_record("u1").unwrap().unwrap();
    assert!(!record.is_active);
    assert!(record.revoked_at.is_some());
    assert_eq!(record.created_at, created_at);

    // Reactivate → active again, exactly one row, created_at preserved.
    assert!(core.permissions.reactivate_god_rights("u1", "root").unwrap());
    assert!(core.permissions.check_god_rights("u1").unwrap());
    let record = core.permissions.get_god_rights_record("u1").unwrap().unwrap();
    assert!(record.is_active);
    assert_eq!(record.created_at, created_at);
    assert_eq!(
        count_where(&app_db, "SELECT COUNT(*) FROM god_rights_auth WHERE user_id = ?1", "u1"),
        1
    );
}

#[test]
fn test_revoke_and_reactivate_edge_cases() {
    let env = test_env();
    let core = env.core();

    // Nothing to revoke.
    assert!(!core.permissions.revoke_god_rights("ghost", "root").unwrap());
    // Nothing to reactivate.
    assert!(!core.permissions.reactivate_god_rights("ghost", "root").unwrap());

    core.permissions
        .grant_god_rights("u1", "key", None, None)
        .unwrap();
    // Reactivating an already-active record is a no-op.
    assert!(!core.permissions.reactivate_god_rights("u1", "root").unwrap());
}

#[test]
fn test_auth_key_verification() {
    let env = test_env();
    let core = env.core();

    core.permissions
        .grant_god_rights("u1", "correct horse battery staple", None, None)
        .unwrap();

    assert!(core
        .permissions
        .verify_god_rights_key("u1", "correct horse battery staple")
        .unwrap());
    assert!(!core.permissions.verify_god_rights_key("u1", "wrong").unwrap());

    // Revoked records never verify.
    core.permissions.revoke_god_rights("u1", "root").unwrap();
    assert!(!core
        .permissions
        .verify_god_rights_key("u1", "correct horse battery staple")
        .unwrap());
}

#[test]
fn test_listings_active_only_or_full() {
    let env = test_env();
    let core = env.core();

    core.permissions.grant_god_rights("u1", "k1", None, None).unwrap();
    core.permissions.grant_god_rights("u2", "k2", None, None).unwrap();
    core.permissions.revoke_god_rights("u2", "root").unwrap();

    let active = core.permissions.list_god_rights(false).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].user_id, "u1");

    let all = core.permissions.list_god_rights(true).unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn test_regrant_after_revoke_keeps_single_row() {
    let env = test_env();
    let core = env.core();

    let first = core.permissions.grant_god_rights("u1", "k1", None, None).unwrap();
    core.permissions.revoke_god_rights("u1", "root").unwrap();

    // Granting again (new key) reactivates the same record.
    let second = core.permissions.grant_god_rights("u1", "k2", None, None).unwrap();
    assert!(second.is_active);
    assert_eq!(second.created_at, first.created_at);
    assert!(core.permissions.verify_god_rights_key("u1", "k2").unwrap());
    assert!(!core.permissions.verify_god_rights_key("u1", "k1").unwrap());
}
