use rusqlite::Connection;

/// Create chat memory tables and run additive migrations. Idempotent.
pub fn setup_chat_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_sessions (
            id TEXT PRIMARY KEY,
            title TEXT,
            created_at TEXT,
            updated_at TEXT,
            default_model TEXT,
            message_count INTEGER DEFAULT 0,
            models_used TEXT,
            summary TEXT,
            auto_titled INTEGER DEFAULT 0,
            user_id TEXT,
            team_id TEXT
        );

        CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT,
            timestamp TEXT,
            role TEXT,
            content TEXT,
            model TEXT,
            tokens INTEGER,
            files_json TEXT,
            user_id TEXT,
            team_id TEXT,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id)
        );

        CREATE TABLE IF NOT EXISTS conversation_summaries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT,
            created_at TEXT,
            updated_at TEXT,
            summary TEXT,
            events_json TEXT,
            models_used TEXT,
            user_id TEXT,
            team_id TEXT,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id)
        );

        CREATE TABLE IF NOT EXISTS document_chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT,
            file_id TEXT,
            filename TEXT,
            chunk_index INTEGER,
            total_chunks INTEGER,
            content TEXT,
            embedding_json TEXT,
            created_at TEXT,
            user_id TEXT,
            team_id TEXT,
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id)
        );

        CREATE TABLE IF NOT EXISTS message_embeddings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id INTEGER,
            session_id TEXT,
            embedding_json TEXT,
            created_at TEXT,
            team_id TEXT,
            FOREIGN KEY (message_id) REFERENCES chat_messages(id),
            FOREIGN KEY (session_id) REFERENCES chat_sessions(id)
        );",
    )?;

    // Additive migrations for databases created before these columns existed
    // (.ok() ignores "duplicate column" errors). Order is stable: additions
    // only, never renames or drops.
    conn.execute_batch("ALTER TABLE chat_sessions ADD COLUMN archived INTEGER DEFAULT 0;")
        .ok();
    conn.execute_batch("ALTER TABLE chat_sessions ADD COLUMN selected_mode TEXT DEFAULT 'intelligent';")
        .ok();
    conn.execute_batch("ALTER TABLE chat_sessions ADD COLUMN selected_model_id TEXT;")
        .ok();
    conn.execute_batch("ALTER TABLE chat_messages ADD COLUMN team_id TEXT;")
        .ok();
    conn.execute_batch("ALTER TABLE conversation_summaries ADD COLUMN team_id TEXT;")
        .ok();
    conn.execute_batch("ALTER TABLE document_chunks ADD COLUMN team_id TEXT;")
        .ok();
    conn.execute_batch("ALTER TABLE message_embeddings ADD COLUMN team_id TEXT;")
        .ok();

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_messages_session ON chat_messages(session_id);
        CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON chat_messages(timestamp);
        CREATE INDEX IF NOT EXISTS idx_summary_session ON conversation_summaries(session_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_session ON document_chunks(session_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_file ON document_chunks(file_id);
        CREATE INDEX IF NOT EXISTS idx_embeddings_session ON message_embeddings(session_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_user ON chat_sessions(user_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_team ON chat_sessions(team_id);
        CREATE INDEX IF NOT EXISTS idx_messages_user ON chat_messages(user_id);
        CREATE INDEX IF NOT EXISTS idx_messages_team ON chat_messages(team_id);
        CREATE INDEX IF NOT EXISTS idx_summaries_team ON conversation_summaries(team_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_team ON document_chunks(team_id);
        CREATE INDEX IF NOT EXISTS idx_embeddings_team ON message_embeddings(team_id);",
    )?;

    Ok(())
}
