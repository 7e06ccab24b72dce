use crate::common::{count_where, principal, test_env};
use team_mesh::models::{ConversationEvent, Role};

fn event(content: &str, model: Option<&str>) -> ConversationEvent {
    ConversationEvent {
        timestamp: chrono::Utc::now().to_rfc3339(),
        role: "user".to_string(),
        content: content.to_string(),
        model: model.map(String::from),
        tokens: Some(7),
        files: None,
    }
}

#[test]
fn test_add_and_get_message_roundtrip() {
    let env = test_env();
    let core = env.core();

    core.chat.create_session("s1", "A", "m", "u1", None).unwrap();
    let sent = event("hello there, this is a message", Some("m"));
    core.chat.add_message("s1", &sent).unwrap();

    let messages = core.chat.get_messages("s1", None).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, sent.role);
    assert_eq!(messages[0].content, sent.content);
    assert_eq!(messages[0].model, sent.model);
    assert_eq!(messages[0].tokens, sent.tokens);
    assert_eq!(messages[0].timestamp, sent.timestamp);
}

#[test]
fn test_message_inherits_session_tenant() {
    let env = test_env();
    let core = env.core();
    let chat_db = core.chat.db().clone();

    core.chat
        .create_session("s1", "Team", "m", "owner", Some("T9"))
        .unwrap();
    core.chat
        .add_message("s1", &event("tenant identifiers come from the session", None))
        .unwrap();

    let rows = chat_db
        .read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT user_id, team_id FROM chat_messages WHERE session_id = ?1",
                    ["s1"],
                    |r| {
                        Ok((
                            r.get::<_, Option<String>>(0)?,
                            r.get::<_, Option<String>>(1)?,
                        ))
                    },
                )
                .unwrap())
        })
        .unwrap();
    assert_eq!(rows.0.as_deref(), Some("owner"));
    assert_eq!(rows.1.as_deref(), Some("T9"));
}

#[test]
fn test_embedding_boundary_at_twenty_chars() {
    let env = test_env();
    let core = env.core();
    let chat_db = core.chat.db().clone();

    core.chat.create_session("s1", "A", "m", "u1", None).unwrap();

    // Exactly 20 chars: no embedding precomputed.
    core.chat
        .add_message("s1", &event("12345678901234567890", None))
        .unwrap();
    assert_eq!(
        count_where(
            &chat_db,
            "SELECT COUNT(*) FROM message_embeddings WHERE session_id = ?1",
            "s1"
        ),
        0
    );

    // 21 chars: embedding precomputed.
    core.chat
        .add_message("s1", &event("123456789012345678901", None))
        .unwrap();
    assert_eq!(
        count_where(
            &chat_db,
            "SELECT COUNT(*) FROM message_embeddings WHERE session_id = ?1",
            "s1"
        ),
        1
    );
}

#[test]
fn test_session_counters_and_models_used_union() {
    let env = test_env();
    let core = env.core();
    let me = principal("u1", Role::Member, None);

    core.chat.create_session("s1", "A", "alpha", "u1", None).unwrap();
    core.chat.add_message("s1", &event("first", Some("beta"))).unwrap();
    core.chat.add_message("s1", &event("second", Some("alpha"))).unwrap();
    core.chat.add_message("s1", &event("third", Some("beta"))).unwrap();

    let session = core.chat.get_session("s1", &me).unwrap().unwrap();
    assert_eq!(session.message_count, 3);
    // Comma-joined, sorted, de-duplicated.
    assert_eq!(session.models_used, vec!["alpha".to_string(), "beta".to_string()]);
}

#[test]
fn test_recent_messages_pagination_chronological() {
    let env = test_env();
    let core = env.core();

    core.chat.create_session("s1", "A", "m", "u1", None).unwrap();
    for i in 0..5 {
        let mut ev = event(&format!("message number {i}"), None);
        // Distinct timestamps so ordering is unambiguous.
        ev.timestamp = format!("2024-01-01T00:00:0{i}Z");
        core.chat.add_message("s1", &ev).unwrap();
    }

    // First page: the 2 most recent, in chronological order within the page.
    let page = core.chat.get_recent_messages("s1", 2, 0).unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].content, "message number 3");
    assert_eq!(page[1].content, "message number 4");

    // Second page: the two before those.
    let page = core.chat.get_recent_messages("s1", 2, 2).unwrap();
    assert_eq!(page[0].content, "message number 1");
    assert_eq!(page[1].content, "message number 2");

    assert_eq!(core.chat.count_messages("s1").unwrap(), 5);
}

#[test]
fn test_get_messages_limit() {
    let env = test_env();
    let core = env.core();

    core.chat.create_session("s1", "A", "m", "u1", None).unwrap();
    for i in 0..4 {
        core.chat.add_message("s1", &event(&format!("m{i}"), None)).unwrap();
    }

    let limited = core.chat.get_messages("s1", Some(2)).unwrap();
    assert_eq!(limited.len(), 2);

    let all = core.chat.get_messages("s1", None).unwrap();
    assert_eq!(all.len(), 4);
}

#[test]
fn test_message_files_payload_roundtrip() {
    let env = test_env();
    let core = env.core();

    core.chat.create_session("s1", "A", "m", "u1", None).unwrap();
    let mut ev = event("a message carrying file references", None);
    ev.files = Some(serde_json::json!([{"name": "report.pdf", "size": 1024}]));
    core.chat.add_message("s1", &ev).unwrap();

    let messages = core.chat.get_messages("s1", None).unwrap();
    let files = messages[0].files.as_ref().expect("files survive");
    assert_eq!(files[0]["name"], "report.pdf");
}
