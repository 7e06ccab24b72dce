//! Allowlist of tables eligible for P2P replication.
//!
//! Only these tables can be modified by incoming sync operations. Anything
//! else is rejected with `NotSyncable` before any SQL is constructed, which
//! is the primary defense against malicious peer payloads.

pub const SYNCABLE_TABLES: &[&str] = &[
    // Chat and messages
    "chat_sessions",
    "chat_messages",
    "chat_context",
    // Vault and files
    "vault_files",
    "vault_folders",
    "vault_metadata",
    // Workflows
    "workflows",
    "work_items",
    // Team collaboration
    "team_notes",
    "team_documents",
    "shared_queries",
    // Query history
    "query_history",
];

pub fn is_syncable(table: &str) -> bool {
    SYNCABLE_TABLES.contains(&table)
}
