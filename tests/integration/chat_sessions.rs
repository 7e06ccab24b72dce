use crate::common::{principal, test_env};
use team_mesh::models::Role;

#[test]
fn test_create_and_get_session() {
    let env = test_env();
    let core = env.core();

    core.chat
        .create_session("s1", "My session", "gpt-local", "u1", None)
        .unwrap();

    let session = core
        .chat
        .get_session("s1", &principal("u1", Role::Member, None))
        .unwrap()
        .expect("owner sees own session");
    assert_eq!(session.id, "s1");
    assert_eq!(session.title, "My session");
    assert_eq!(session.model, "gpt-local");
    assert_eq!(session.message_count, 0);
    assert_eq!(session.models_used, vec!["gpt-local".to_string()]);
    assert!(!session.archived);
}

#[test]
fn test_get_session_hidden_from_other_users() {
    let env = test_env();
    let core = env.core();

    core.chat
        .create_session("s1", "Private", "m", "u1", None)
        .unwrap();

    let hidden = core
        .chat
        .get_session("s1", &principal("u2", Role::Member, None))
        .unwrap();
    assert!(hidden.is_none());
}

#[test]
fn test_team_session_visible_to_team_context_only() {
    let env = test_env();
    let core = env.core();

    core.chat
        .create_session("s1", "Team chat", "m", "u1", Some("T1"))
        .unwrap();

    // Any principal in T1 context sees it, even a different user.
    let session = core
        .chat
        .get_session("s1", &principal("u3", Role::Member, Some("T1")))
        .unwrap();
    assert!(session.is_some());

    // Another team's context does not.
    let session = core
        .chat
        .get_session("s1", &principal("u1", Role::Member, Some("T2")))
        .unwrap();
    assert!(session.is_none());

    // Personal context of the creator does not see the team session either.
    let session = core
        .chat
        .get_session("s1", &principal("u1", Role::Member, None))
        .unwrap();
    assert!(session.is_none());
}

#[test]
fn test_god_rights_bypasses_owner_filter_on_get() {
    let env = test_env();
    let core = env.core();

    core.chat
        .create_session("s1", "Private", "m", "u1", None)
        .unwrap();

    let session = core
        .chat
        .get_session("s1", &principal("admin", Role::GodRights, None))
        .unwrap();
    assert!(session.is_some());
}

#[test]
fn test_list_sessions_is_scoped_for_everyone() {
    let env = test_env();
    let core = env.core();

    core.chat.create_session("s1", "A", "m", "u1", None).unwrap();
    core.chat.create_session("s2", "B", "m", "u2", None).unwrap();
    core.chat
        .create_session("s3", "C", "m", "u1", Some("T1"))
        .unwrap();

    let mine = core
        .chat
        .list_sessions(&principal("u1", Role::Member, None))
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, "s1");

    // The regular listing does not honor role escalation.
    let god_view = core
        .chat
        .list_sessions(&principal("u3", Role::GodRights, None))
        .unwrap();
    assert!(god_view.is_empty());

    let team_view = core
        .chat
        .list_sessions(&principal("u2", Role::Member, Some("T1")))
        .unwrap();
    assert_eq!(team_view.len(), 1);
    assert_eq!(team_view[0].id, "s3");
}

#[test]
fn test_admin_listings_require_god_rights() {
    let env = test_env();
    let core = env.core();

    core.chat.create_session("s1", "A", "m", "u1", None).unwrap();
    core.chat.create_session("s2", "B", "m", "u2", None).unwrap();

    let all = core
        .chat
        .list_all_sessions_admin(&principal("root", Role::GodRights, None))
        .unwrap();
    assert_eq!(all.len(), 2);

    let one_user = core
        .chat
        .list_user_sessions_admin(&principal("root", Role::GodRights, None), "u2")
        .unwrap();
    assert_eq!(one_user.len(), 1);
    assert_eq!(one_user[0].user_id, "u2");

    assert!(
        core.chat
            .list_all_sessions_admin(&principal("u1", Role::Admin, None))
            .is_err()
    );
    assert!(
        core.chat
            .list_user_sessions_admin(&principal("u1", Role::SuperAdmin, None), "u2")
            .is_err()
    );
}

#[test]
fn test_delete_session_requires_ownership() {
    let env = test_env();
    let core = env.core();

    core.chat.create_session("s1", "A", "m", "u1", None).unwrap();

    let denied = core
        .chat
        .delete_session("s1", &principal("u2", Role::Member, None))
        .unwrap();
    assert!(!denied);
    assert!(
        core.chat
            .get_session("s1", &principal("u1", Role::Member, None))
            .unwrap()
            .is_some()
    );

    let deleted = core
        .chat
        .delete_session("s1", &principal("u1", Role::Member, None))
        .unwrap();
    assert!(deleted);
    assert!(
        core.chat
            .get_session("s1", &principal("u1", Role::Member, None))
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_delete_session_cascades() {
    let env = test_env();
    let core = env.core();
    let chat_db = core.chat.db().clone();

    core.chat.create_session("s1", "A", "m", "u1", None).unwrap();
    core.chat
        .add_message(
            "s1",
            &team_mesh::models::ConversationEvent {
                timestamp: chrono::Utc::now().to_rfc3339(),
                role: "user".to_string(),
                content: "a long enough message to get an embedding".to_string(),
                model: Some("m".to_string()),
                tokens: Some(10),
                files: None,
            },
        )
        .unwrap();
    core.chat.update_summary("s1", None).unwrap();
    core.chat
        .store_document_chunks(
            "s1",
            &[team_mesh::models::DocumentChunk {
                file_id: "f1".to_string(),
                filename: "notes.md".to_string(),
                chunk_index: 0,
                total_chunks: 1,
                content: "chunk".to_string(),
                embedding: vec![1.0, 0.0],
            }],
        )
        .unwrap();

    core.chat
        .delete_session("s1", &principal("u1", Role::Member, None))
        .unwrap();

    for table in [
        "chat_messages",
        "conversation_summaries",
        "document_chunks",
        "message_embeddings",
    ] {
        let count = crate::common::count_where(
            &chat_db,
            &format!("SELECT COUNT(*) FROM {table} WHERE session_id = ?1"),
            "s1",
        );
        assert_eq!(count, 0, "{table} should be empty after cascade");
    }
}

#[test]
fn test_delete_missing_session_returns_false() {
    let env = test_env();
    let core = env.core();
    let deleted = core
        .chat
        .delete_session("ghost", &principal("u1", Role::GodRights, None))
        .unwrap();
    assert!(!deleted);
}

#[test]
fn test_title_model_prefs_and_archive() {
    let env = test_env();
    let core = env.core();
    let me = principal("u1", Role::Member, None);

    core.chat.create_session("s1", "A", "m", "u1", None).unwrap();

    core.chat
        .update_session_title("s1", "Generated title", true)
        .unwrap();
    let session = core.chat.get_session("s1", &me).unwrap().unwrap();
    assert_eq!(session.title, "Generated title");

    core.chat.update_session_model("s1", "m2").unwrap();
    let session = core.chat.get_session("s1", &me).unwrap().unwrap();
    assert_eq!(session.model, "m2");

    // Default preferences before any explicit selection
    let prefs = core.chat.get_model_preferences("missing").unwrap();
    assert_eq!(prefs.selected_mode, "intelligent");
    assert!(prefs.selected_model_id.is_none());

    core.chat
        .update_model_preferences("s1", "manual", Some("m3"))
        .unwrap();
    let prefs = core.chat.get_model_preferences("s1").unwrap();
    assert_eq!(prefs.selected_mode, "manual");
    assert_eq!(prefs.selected_model_id.as_deref(), Some("m3"));

    core.chat.set_session_archived("s1", true).unwrap();
    let session = core.chat.get_session("s1", &me).unwrap().unwrap();
    assert!(session.archived);
}
