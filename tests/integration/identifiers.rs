use crate::common::{create_team_notes, make_op, note_content, op_data, test_env};
use std::sync::Arc;
use team_mesh::crypto::TeamKeyring;
use team_mesh::errors::CoreError;
use team_mesh::ident::{quote_identifier, validate_column, validate_identifier};
use team_mesh::models::OpKind;

#[test]
fn test_valid_identifiers_pass() {
    for name in ["users", "chat_messages", "_private", "Table9", "a"] {
        assert!(validate_identifier(name).is_ok(), "{name} should pass");
    }
}

#[test]
fn test_adversarial_identifiers_rejected() {
    let payloads = [
        "",
        "users; DROP TABLE users",
        "users--",
        "users/*comment*/",
        "users)",
        "us ers",
        "9users",
        "users\"",
        "users'",
        "users\n",
        // Unicode homoglyph: Cyrillic е in "usеrs"
        "us\u{0435}rs",
        "таблица",
    ];
    for payload in payloads {
        let err = validate_identifier(payload).unwrap_err();
        assert!(
            matches!(err, CoreError::InvalidIdentifier(_)),
            "{payload:?} should be rejected"
        );
    }
}

#[test]
fn test_column_rule_is_stricter() {
    assert!(validate_column("user_id").is_ok());
    assert!(validate_column("col9").is_ok());
    assert!(validate_column("col = 1; --").is_err());
    assert!(validate_column("").is_err());
    assert!(validate_column("col\u{0435}").is_err());
}

#[test]
fn test_quote_identifier_escapes() {
    assert_eq!(quote_identifier("users").unwrap(), "\"users\"");
    // Anything needing escape fails validation first.
    assert!(quote_identifier("we\"ird").is_err());
}

#[test]
fn test_malicious_column_in_peer_op_dropped() {
    let env = test_env();
    let (engine, data) = env.sync_engine("node", "aaaa000000000000", Arc::new(TeamKeyring::new()));
    create_team_notes(&data);

    let op = make_op(
        "team_notes",
        OpKind::Insert,
        "n1",
        Some(op_data(&[
            ("id", "n1".into()),
            ("content) VALUES ('x'); DROP TABLE team_notes; --", "boom".into()),
        ])),
        "2024-03-01T10:00:00Z",
        "bbbb000000000000",
        1,
    );

    // The op is dropped, the table survives, the batch call returns.
    engine.apply_operations(&[op], None).unwrap();
    assert_eq!(note_content(&data, "n1"), None);
    assert_eq!(crate::common::count_all(&data, "team_notes"), 0);
}

#[test]
fn test_malicious_table_in_peer_update_dropped() {
    let env = test_env();
    let (engine, data) = env.sync_engine("node", "aaaa000000000000", Arc::new(TeamKeyring::new()));
    create_team_notes(&data);

    let op = make_op(
        "team_notes; DELETE FROM team_notes; --",
        OpKind::Update,
        "1",
        Some(op_data(&[("content", "x".into())])),
        "2024-03-01T10:00:00Z",
        "bbbb000000000000",
        1,
    );
    engine.apply_operations(&[op], None).unwrap();
    assert_eq!(crate::common::count_all(&data, "team_notes"), 0);
}
