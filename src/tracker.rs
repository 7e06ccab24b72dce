use crate::models::OpKind;

/// Hook for recording local mutations of syncable tables.
///
/// The sync engine implements this; stores call it after their own durable
/// write succeeds. Implementations must not fail the caller: tracking
/// problems are logged and swallowed on the implementor's side.
pub trait OpTracker: Send + Sync {
    fn track(
        &self,
        table: &str,
        op: OpKind,
        row_id: &str,
        data: Option<&serde_json::Map<String, serde_json::Value>>,
        team_id: Option<&str>,
    );
}
