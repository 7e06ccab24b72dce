use crate::common::test_env;
use team_mesh::models::Role;
use team_mesh::teams::TeamMembership;

#[test]
fn test_create_user_and_get() {
    let env = test_env();
    let core = env.core();

    let user = core.teams.create_user("u1", "alice", Role::Member).unwrap();
    assert!(user.is_active);
    assert_eq!(user.failed_login_attempts, 0);

    let fetched = core.teams.get_user("u1").unwrap().unwrap();
    assert_eq!(fetched.username, "alice");
    assert_eq!(fetched.role, Role::Member);

    assert!(core.teams.get_user("ghost").unwrap().is_none());
}

#[test]
fn test_duplicate_username_rejected() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("u1", "alice", Role::Member).unwrap();
    assert!(core.teams.create_user("u2", "alice", Role::Member).is_err());
}

#[test]
fn test_role_change_is_audited() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("u1", "alice", Role::Member).unwrap();
    core.teams.set_user_role("root", "u1", Role::Admin).unwrap();

    let user = core.teams.get_user("u1").unwrap().unwrap();
    assert_eq!(user.role, Role::Admin);

    let trail = core.audit.for_resource("user", "u1").unwrap();
    assert!(trail.iter().any(|r| r.action == "user.role_changed"));
}

#[test]
fn test_create_team_creator_is_super_admin() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "Team One", "founder").unwrap();

    assert_eq!(
        core.teams.member_role("T1", "founder").as_deref(),
        Some("super_admin")
    );

    let team = core.teams.get_team("T1").unwrap().unwrap();
    assert_eq!(team.name, "Team One");
}

#[test]
fn test_membership_add_remove() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "Team One", "founder").unwrap();
    core.teams.add_member("T1", "u2", "member", Some("analyst")).unwrap();

    assert_eq!(core.teams.member_role("T1", "u2").as_deref(), Some("member"));
    assert!(core.teams.member_role("T1", "stranger").is_none());
    assert!(core.teams.member_role("T2", "u2").is_none());

    let members = core.teams.team_members("T1").unwrap();
    assert_eq!(members.len(), 2);

    assert!(core.teams.remove_member("T1", "u2").unwrap());
    assert!(core.teams.member_role("T1", "u2").is_none());
    assert!(!core.teams.remove_member("T1", "u2").unwrap());
}

#[test]
fn test_readding_member_preserves_joined_at() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "Team One", "founder").unwrap();
    core.teams.add_member("T1", "u2", "member", None).unwrap();
    let before = core.teams.team_members("T1").unwrap();
    let joined_at = before
        .iter()
        .find(|m| m.user_id == "u2")
        .unwrap()
        .joined_at
        .clone();

    core.teams.add_member("T1", "u2", "admin", None).unwrap();
    let after = core.teams.team_members("T1").unwrap();
    let member = after.iter().find(|m| m.user_id == "u2").unwrap();
    assert_eq!(member.role, "admin");
    assert_eq!(member.joined_at, joined_at);
}

#[test]
fn test_user_teams_listing() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("u1", "alice", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "u1").unwrap();
    core.teams.create_team("T2", "Two", "other").unwrap();
    core.teams.add_member("T2", "u1", "member", None).unwrap();

    let teams = core.teams.user_teams("u1").unwrap();
    assert_eq!(teams.len(), 2);
}

#[test]
fn test_failed_login_lockout() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("u1", "alice", Role::Member).unwrap();
    assert!(!core.teams.is_locked_out("alice").unwrap());

    for _ in 0..5 {
        core.teams.record_failed_login("alice").unwrap();
    }
    assert!(core.teams.is_locked_out("alice").unwrap());
    assert_eq!(
        core.teams.get_user("u1").unwrap().unwrap().failed_login_attempts,
        5
    );

    core.teams.reset_failed_logins("alice").unwrap();
    assert!(!core.teams.is_locked_out("alice").unwrap());
}

#[test]
fn test_last_seen_touch() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("u1", "alice", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "u1").unwrap();
    core.teams.touch_member_last_seen("T1", "u1").unwrap();

    let members = core.teams.team_members("T1").unwrap();
    assert!(members[0].last_seen.is_some());
}
