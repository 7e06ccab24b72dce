use crate::common::test_env;
use team_mesh::errors::CoreError;
use team_mesh::models::Role;
use team_mesh::teams::TeamMembership;
use team_mesh::teams::promotions::TempPromotionStatus;

fn past() -> String {
    (chrono::Utc::now() - chrono::Duration::minutes(1)).to_rfc3339()
}

fn future() -> String {
    (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339()
}

#[test]
fn test_delayed_promotion_applies_when_due() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();
    core.teams.add_member("T1", "u2", "member", None).unwrap();

    let promotion = core
        .teams
        .schedule_promotion("T1", "u2", "admin", &past(), "founder")
        .unwrap();
    assert_eq!(promotion.from_role, "member");
    assert!(!promotion.executed);

    let applied = core.teams.run_due_promotions().unwrap();
    assert_eq!(applied, 1);
    assert_eq!(core.teams.member_role("T1", "u2").as_deref(), Some("admin"));

    // Executed rows are done: a second sweep is a no-op and the pending
    // slot is free again.
    assert_eq!(core.teams.run_due_promotions().unwrap(), 0);
    assert!(core.teams.pending_promotion("T1", "u2").unwrap().is_none());
}

#[test]
fn test_future_promotion_not_applied_early() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();
    core.teams.add_member("T1", "u2", "member", None).unwrap();

    core.teams
        .schedule_promotion("T1", "u2", "admin", &future(), "founder")
        .unwrap();
    assert_eq!(core.teams.run_due_promotions().unwrap(), 0);
    assert_eq!(core.teams.member_role("T1", "u2").as_deref(), Some("member"));
    assert!(core.teams.pending_promotion("T1", "u2").unwrap().is_some());
}

#[test]
fn test_only_one_pending_promotion_per_member() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();
    core.teams.add_member("T1", "u2", "member", None).unwrap();

    core.teams
        .schedule_promotion("T1", "u2", "admin", &future(), "founder")
        .unwrap();
    let err = core
        .teams
        .schedule_promotion("T1", "u2", "super_admin", &future(), "founder")
        .unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)));
}

#[test]
fn test_promotion_for_non_member_rejected() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();

    let err = core
        .teams
        .schedule_promotion("T1", "stranger", "admin", &future(), "founder")
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound));
}

#[test]
fn test_temp_promotion_picks_most_senior_admin() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();
    core.teams.add_member("T1", "senior", "admin", None).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));
    core.teams.add_member("T1", "junior", "admin", None).unwrap();

    let promotion = core.teams.begin_temp_promotion("T1", "senior").unwrap();
    assert_eq!(promotion.promoted_admin_id, "senior");
    assert_eq!(promotion.original_super_admin_id, "founder");
    assert_eq!(promotion.status, TempPromotionStatus::Active);
    assert_eq!(
        core.teams.member_role("T1", "senior").as_deref(),
        Some("super_admin")
    );
}

#[test]
fn test_at_most_one_active_temp_promotion() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();
    core.teams.add_member("T1", "a1", "admin", None).unwrap();
    core.teams.add_member("T1", "a2", "admin", None).unwrap();

    core.teams.begin_temp_promotion("T1", "a1").unwrap();
    let err = core.teams.begin_temp_promotion("T1", "a2").unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)));
}

#[test]
fn test_temp_promotion_approve_only_by_original() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();
    core.teams.add_member("T1", "a1", "admin", None).unwrap();
    core.teams.begin_temp_promotion("T1", "a1").unwrap();

    let err = core.teams.approve_temp_promotion("T1", "a1").unwrap_err();
    assert!(matches!(err, CoreError::AccessDenied));

    let approved = core.teams.approve_temp_promotion("T1", "founder").unwrap();
    assert_eq!(approved.status, TempPromotionStatus::Approved);
    assert!(approved.resolved_at.is_some());
    // Elevation stands once approved.
    assert_eq!(
        core.teams.member_role("T1", "a1").as_deref(),
        Some("super_admin")
    );
    assert!(core.teams.active_temp_promotion("T1").unwrap().is_none());
}

#[test]
fn test_temp_promotion_revert_restores_admin() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();
    core.teams.add_member("T1", "a1", "admin", None).unwrap();
    core.teams.begin_temp_promotion("T1", "a1").unwrap();

    let reverted = core.teams.revert_temp_promotion("T1", "founder").unwrap();
    assert_eq!(reverted.status, TempPromotionStatus::Reverted);
    assert_eq!(core.teams.member_role("T1", "a1").as_deref(), Some("admin"));

    // The slot is free for a future break-glass.
    assert!(core.teams.active_temp_promotion("T1").unwrap().is_none());
    core.teams.begin_temp_promotion("T1", "a1").unwrap();
}

#[test]
fn test_temp_promotion_requires_an_admin() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();

    let err = core.teams.begin_temp_promotion("T1", "founder").unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)));
}
