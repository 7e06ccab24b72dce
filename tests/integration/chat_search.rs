use crate::common::{CountingEmbedder, test_env};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use team_mesh::models::ConversationEvent;

fn event(content: &str) -> ConversationEvent {
    ConversationEvent {
        timestamp: chrono::Utc::now().to_rfc3339(),
        role: "user".to_string(),
        content: content.to_string(),
        model: Some("local".to_string()),
        tokens: None,
        files: None,
    }
}

#[test]
fn test_semantic_search_finds_matching_message() {
    let env = test_env();
    let core = env.core();

    core.chat.create_session("S1", "Greek", "m", "u1", None).unwrap();
    core.chat.add_message("S1", &event("Alpha beta gamma delta")).unwrap();
    core.chat.add_message("S1", &event("Epsilon zeta eta theta")).unwrap();
    core.chat.add_message("S1", &event("Iota kappa lambda mu")).unwrap();

    let hits = core
        .chat
        .search_messages_semantic("gamma", 2, Some("u1"), None)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.starts_with("Alpha"));
    assert_eq!(hits[0].session_id, "S1");
    assert_eq!(hits[0].session_title, "Greek");
    assert!(hits[0].similarity > 0.3);
}

#[test]
fn test_semantic_search_second_call_is_cache_hit() {
    let env = test_env();
    let calls = Arc::new(AtomicUsize::new(0));
    let core = env.core_with_embedder(Arc::new(CountingEmbedder { calls: calls.clone() }));

    core.chat.create_session("S1", "Greek", "m", "u1", None).unwrap();
    core.chat.add_message("S1", &event("Alpha beta gamma delta")).unwrap();

    core.chat
        .search_messages_semantic("gamma", 2, Some("u1"), None)
        .unwrap();
    let after_first = calls.load(Ordering::SeqCst);

    let hits = core
        .chat
        .search_messages_semantic("gamma", 2, Some("u1"), None)
        .unwrap();
    assert_eq!(hits.len(), 1);
    // Cache hit: no embedding computed at all on the second call.
    assert_eq!(calls.load(Ordering::SeqCst), after_first);
}

#[test]
fn test_semantic_search_respects_team_scope() {
    let env = test_env();
    let core = env.core();

    core.chat
        .create_session("ST", "Team", "m", "u1", Some("T1"))
        .unwrap();
    core.chat
        .add_message("ST", &event("quarterly revenue projections report"))
        .unwrap();

    core.chat.create_session("SP", "Personal", "m", "u1", None).unwrap();
    core.chat
        .add_message("SP", &event("personal grocery list for saturday"))
        .unwrap();

    let team_hits = core
        .chat
        .search_messages_semantic("revenue projections", 10, Some("u1"), Some("T1"))
        .unwrap();
    assert_eq!(team_hits.len(), 1);
    assert_eq!(team_hits[0].session_id, "ST");

    // The personal scope never sees team messages.
    let personal_hits = core
        .chat
        .search_messages_semantic("revenue projections", 10, Some("u1"), None)
        .unwrap();
    assert!(personal_hits.is_empty());
}

#[test]
fn test_semantic_search_different_users_isolated() {
    let env = test_env();
    let core = env.core();

    core.chat.create_session("S1", "Mine", "m", "u1", None).unwrap();
    core.chat
        .add_message("S1", &event("deployment checklist for the release"))
        .unwrap();

    let other = core
        .chat
        .search_messages_semantic("deployment checklist", 10, Some("u2"), None)
        .unwrap();
    assert!(other.is_empty());
}

#[test]
fn test_semantic_search_result_content_truncated() {
    let env = test_env();
    let core = env.core();

    core.chat.create_session("S1", "Long", "m", "u1", None).unwrap();
    let long = "needle ".repeat(40);
    core.chat.add_message("S1", &event(&long)).unwrap();

    let hits = core
        .chat
        .search_messages_semantic("needle", 5, Some("u1"), None)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content.chars().count(), 200);
}
