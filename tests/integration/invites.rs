use crate::common::test_env;
use team_mesh::errors::CoreError;
use team_mesh::models::Role;
use team_mesh::teams::TeamMembership;

#[test]
fn test_invite_roundtrip() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();

    let invite = core.teams.create_invite("T1", "founder", Some(24)).unwrap();
    assert!(invite.code.starts_with("team_"));
    assert!(!invite.used);

    let team_id = core
        .teams
        .redeem_invite(&invite.code, "newcomer", "10.0.0.5")
        .unwrap();
    assert_eq!(team_id, "T1");
    assert_eq!(core.teams.member_role("T1", "newcomer").as_deref(), Some("member"));

    // Codes are single-use.
    let err = core
        .teams
        .redeem_invite(&invite.code, "another", "10.0.0.6")
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound));
}

#[test]
fn test_invite_for_missing_team_rejected() {
    let env = test_env();
    let core = env.core();
    assert!(matches!(
        core.teams.create_invite("nope", "x", None).unwrap_err(),
        CoreError::NotFound
    ));
}

#[test]
fn test_new_invite_invalidates_older_active_code() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();

    let first = core.teams.create_invite("T1", "founder", None).unwrap();
    let second = core.teams.create_invite("T1", "founder", None).unwrap();

    let active = core.teams.active_invite("T1").unwrap().unwrap();
    assert_eq!(active.code, second.code);

    let err = core
        .teams
        .redeem_invite(&first.code, "late", "10.0.0.5")
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound));
}

#[test]
fn test_expired_invite_rejected() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();

    // Negative expiry: already past.
    let invite = core.teams.create_invite("T1", "founder", Some(-1)).unwrap();
    let err = core
        .teams
        .redeem_invite(&invite.code, "late", "10.0.0.5")
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound));
}

#[test]
fn test_invite_rate_limit_after_five_failures() {
    let env = test_env();
    let core = env.core();

    core.teams.create_user("founder", "founder", Role::Member).unwrap();
    core.teams.create_team("T1", "One", "founder").unwrap();
    let invite = core.teams.create_invite("T1", "founder", None).unwrap();

    // The same guess hammered from one IP: five failures land in the
    // attempts table for that (code, ip).
    let guess = invite.code.replace("team_", "tmae_");
    for _ in 0..5 {
        let err = core
            .teams
            .redeem_invite(&guess, "guesser", "10.9.9.9")
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    // From then on that (code, ip) is throttled before the code is even
    // looked up, so the outcome no longer depends on correctness.
    let err = core
        .teams
        .redeem_invite(&guess, "guesser", "10.9.9.9")
        .unwrap_err();
    assert!(matches!(err, CoreError::RateLimited(_)));

    // A different IP guessing the same string still gets the honest answer.
    let err = core
        .teams
        .redeem_invite(&guess, "other", "10.1.1.1")
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound));

    // And the real code from a clean IP still works.
    let team_id = core
        .teams
        .redeem_invite(&invite.code, "honest", "10.2.2.2")
        .unwrap();
    assert_eq!(team_id, "T1");
}
