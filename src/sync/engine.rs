//! CRDT-style sync engine: operation tracking, peer exchange, and
//! Last-Write-Wins conflict resolution with a deterministic tiebreak.

use super::store;
use super::tables::is_syncable;
use super::transport::PeerTransport;
use crate::crypto::TeamKeyring;
use crate::db::Db;
use crate::discovery::PeerDirectory;
use crate::errors::{CoreError, CoreResult};
use crate::ident::{quote_identifier, validate_column};
use crate::models::{
    OpKind, PeerState, PeerStatus, Principal, SyncExchange, SyncOperation, SyncStats,
};
use crate::teams::TeamMembership;
use crate::tracker::OpTracker;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct SyncEngine {
    data_db: Db,
    sync_db: Db,
    local_peer_id: String,
    local_version: Mutex<i64>,
    pending: Mutex<Vec<SyncOperation>>,
    states: Mutex<HashMap<String, PeerState>>,
    keyring: Arc<TeamKeyring>,
    membership: Option<Arc<dyn TeamMembership>>,
}

impl SyncEngine {
    /// Open the engine: initialize sync metadata tables, replay unsynced
    /// operations from the previous run, and restore the vector clock to the
    /// highest version seen.
    pub fn new(
        data_db: Db,
        sync_db: Db,
        local_peer_id: &str,
        keyring: Arc<TeamKeyring>,
    ) -> CoreResult<Self> {
        {
            let conn = sync_db.write();
            store::setup_sync_schema(&conn)?;
        }

        let pending = store::load_pending_operations(&sync_db, local_peer_id)?;
        let local_version = pending.iter().map(|op| op.version).max().unwrap_or(0);
        if !pending.is_empty() {
            eprintln!(
                "📥 Loaded {} pending sync operations from previous session",
                pending.len()
            );
        }

        let mut states = HashMap::new();
        for state in store::load_peer_states(&sync_db)? {
            states.insert(state.peer_id.clone(), state);
        }

        Ok(SyncEngine {
            data_db,
            sync_db,
            local_peer_id: local_peer_id.to_string(),
            local_version: Mutex::new(local_version),
            pending: Mutex::new(pending),
            states: Mutex::new(states),
            keyring,
            membership: None,
        })
    }

    /// Wire the team membership source used when applying team-scoped
    /// operations with a principal in context.
    pub fn with_membership(mut self, membership: Arc<dyn TeamMembership>) -> Self {
        self.membership = Some(membership);
        self
    }

    pub fn local_peer_id(&self) -> &str {
        &self.local_peer_id
    }

    pub fn local_version(&self) -> i64 {
        *self.local_version.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Record a local mutation of a syncable table for replication.
    ///
    /// Increments the local vector-clock component, signs team-scoped
    /// payloads, and persists the operation with `synced = 0`. The local
    /// write is also entered into version tracking: without that, a row
    /// independently written on two peers would reach both sides with no
    /// recorded competitor and skip Last-Write-Wins entirely, swapping
    /// content instead of converging.
    pub fn track_operation(
        &self,
        table: &str,
        operation: OpKind,
        row_id: &str,
        data: Option<serde_json::Map<String, serde_json::Value>>,
        team_id: Option<&str>,
    ) -> CoreResult<SyncOperation> {
        if !is_syncable(table) {
            return Err(CoreError::NotSyncable(table.to_string()));
        }

        let version = {
            let mut local_version = self.local_version.lock().unwrap_or_else(|e| e.into_inner());
            *local_version += 1;
            *local_version
        };

        let mut op = SyncOperation {
            op_id: uuid::Uuid::new_v4().to_string(),
            table_name: table.to_string(),
            operation,
            row_id: row_id.to_string(),
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
            peer_id: self.local_peer_id.clone(),
            version,
            team_id: team_id.map(String::from),
            signature: String::new(),
        };

        if let Some(team_id) = team_id {
            op.signature = self.keyring.sign(&op.canonical_payload()?, team_id);
        }

        store::save_operation(&self.sync_db, &op)?;
        store::update_version_tracking(&self.sync_db, &op)?;
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(op.clone());

        Ok(op)
    }

    /// Synchronize with one peer: send our delta, receive theirs, apply it,
    /// and update peer state. Only an idle (or previously errored) peer may
    /// begin a new exchange.
    pub async fn sync_with_peer(
        &self,
        transport: &dyn PeerTransport,
        directory: &dyn PeerDirectory,
        peer_id: &str,
        tables: Option<&[String]>,
    ) -> CoreResult<PeerState> {
        {
            let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            let state = states
                .entry(peer_id.to_string())
                .or_insert_with(|| PeerState::new(peer_id));
            if state.status == PeerStatus::Syncing {
                return Err(CoreError::RateLimited(format!(
                    "exchange already in flight with peer {peer_id}"
                )));
            }
            state.status = PeerStatus::Syncing;
        }

        match self.exchange_inner(transport, directory, peer_id, tables).await {
            Ok(state) => Ok(state),
            Err(e) => {
                let state = {
                    let mut states = self.states.lock().unwrap_or_else(|e2| e2.into_inner());
                    let state = states
                        .entry(peer_id.to_string())
                        .or_insert_with(|| PeerState::new(peer_id));
                    state.status = PeerStatus::Error;
                    state.clone()
                };
                store::save_peer_state(&self.sync_db, &state).ok();
                eprintln!("❌ Sync failed with {peer_id}: {e}");
                Err(e)
            }
        }
    }

    async fn exchange_inner(
        &self,
        transport: &dyn PeerTransport,
        directory: &dyn PeerDirectory,
        peer_id: &str,
        tables: Option<&[String]>,
    ) -> CoreResult<PeerState> {
        let peer = directory
            .get_peer_by_id(peer_id)
            .ok_or_else(|| CoreError::PeerUnreachable(format!("peer {peer_id} not in directory")))?;

        let last_sync = store::get_peer_last_sync(&self.sync_db, peer_id)?;
        let ops_to_send = store::get_operations_since(
            &self.sync_db,
            &self.local_peer_id,
            last_sync.as_deref(),
            tables,
        )?;

        let request = SyncExchange {
            sender_peer_id: self.local_peer_id.clone(),
            operations: ops_to_send.clone(),
        };
        let response = transport.exchange(&peer, &request).await?;

        // Delivery succeeded: the sent window never goes out again.
        let sent_ids: Vec<String> = ops_to_send.iter().map(|op| op.op_id.clone()).collect();
        store::mark_operations_synced(&self.sync_db, &sent_ids)?;
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.retain(|op| !sent_ids.contains(&op.op_id));
        }

        let conflicts = self.apply_operations(&response.operations, None)?;

        let state = {
            let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            let state = states
                .entry(peer_id.to_string())
                .or_insert_with(|| PeerState::new(peer_id));
            state.operations_sent += ops_to_send.len() as i64;
            state.operations_received += response.operations.len() as i64;
            state.conflicts_resolved += conflicts as i64;
            state.last_sync = Some(chrono::Utc::now().to_rfc3339());
            state.status = PeerStatus::Idle;
            state.clone()
        };
        store::save_peer_state(&self.sync_db, &state)?;

        Ok(state)
    }

    /// Responder half of the wire protocol: apply the sender's operations and
    /// return our delta for them. The HTTP layer deserializes the request
    /// body into `SyncExchange` and hands it here.
    pub fn handle_exchange(
        &self,
        request: &SyncExchange,
        principal: Option<&Principal>,
    ) -> CoreResult<SyncExchange> {
        let sender = &request.sender_peer_id;
        let conflicts = self.apply_operations(&request.operations, principal)?;

        let last_sync = store::get_peer_last_sync(&self.sync_db, sender)?;
        let delta = store::get_operations_since(
            &self.sync_db,
            &self.local_peer_id,
            last_sync.as_deref(),
            None,
        )?;

        let sent_ids: Vec<String> = delta.iter().map(|op| op.op_id.clone()).collect();
        store::mark_operations_synced(&self.sync_db, &sent_ids)?;
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.retain(|op| !sent_ids.contains(&op.op_id));
        }

        let state = {
            let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            let state = states
                .entry(sender.clone())
                .or_insert_with(|| PeerState::new(sender));
            state.operations_sent += delta.len() as i64;
            state.operations_received += request.operations.len() as i64;
            state.conflicts_resolved += conflicts as i64;
            state.last_sync = Some(chrono::Utc::now().to_rfc3339());
            state.status = PeerStatus::Idle;
            state.clone()
        };
        store::save_peer_state(&self.sync_db, &state)?;

        Ok(SyncExchange {
            sender_peer_id: self.local_peer_id.clone(),
            operations: delta,
        })
    }

    /// Apply operations received from a peer. Returns the number of conflicts
    /// resolved. Per-operation failures are logged and skipped so the rest of
    /// the batch still applies.
    pub fn apply_operations(
        &self,
        operations: &[SyncOperation],
        principal: Option<&Principal>,
    ) -> CoreResult<u64> {
        let mut conflicts = 0u64;
        for op in operations {
            match self.apply_one(op, principal) {
                Ok(true) => conflicts += 1,
                Ok(false) => {}
                Err(e) => {
                    eprintln!("⛔ Failed to apply operation {}: {e}", op.op_id);
                }
            }
        }
        Ok(conflicts)
    }

    /// Apply a single operation. Returns true when a conflict was resolved in
    /// its favor. Signature and membership rejections drop the op silently
    /// (warning only) and report no conflict.
    fn apply_one(&self, op: &SyncOperation, principal: Option<&Principal>) -> CoreResult<bool> {
        if let Some(team_id) = &op.team_id {
            let payload = op.canonical_payload()?;
            if !self.keyring.verify(&payload, &op.signature, team_id) {
                eprintln!(
                    "🚫 Rejected operation {}: invalid team signature for team {team_id}",
                    op.op_id
                );
                return Ok(false);
            }
            if let Some(principal) = principal
                && let Some(membership) = &self.membership
                && membership.member_role(team_id, &principal.user_id).is_none()
            {
                eprintln!(
                    "🚫 Rejected operation {}: user {} not in team {team_id}",
                    op.op_id, principal.user_id
                );
                return Ok(false);
            }
        }

        let in_conflict = store::has_version_conflict(
            &self.sync_db,
            &op.table_name,
            &op.row_id,
            &op.peer_id,
        )?;

        let mut resolved_conflict = false;
        if in_conflict {
            if self.should_apply(op)? {
                self.execute_operation(op)?;
                resolved_conflict = true;
            }
        } else {
            self.execute_operation(op)?;
        }

        store::update_version_tracking(&self.sync_db, op)?;
        Ok(resolved_conflict)
    }

    /// Last-Write-Wins: newer timestamp wins; on an exact tie the
    /// lexicographically larger peer id wins against ours.
    fn should_apply(&self, op: &SyncOperation) -> CoreResult<bool> {
        let Some((_, existing_timestamp)) =
            store::latest_tracked_version(&self.sync_db, &op.table_name, &op.row_id)?
        else {
            return Ok(true);
        };

        if op.timestamp > existing_timestamp {
            return Ok(true);
        }
        if op.timestamp == existing_timestamp {
            return Ok(op.peer_id > self.local_peer_id);
        }
        Ok(false)
    }

    /// Execute one operation against the data database. Table names must be
    /// in the allowlist and column names must pass validation before any SQL
    /// is assembled; values are always bound as parameters.
    fn execute_operation(&self, op: &SyncOperation) -> CoreResult<()> {
        if !is_syncable(&op.table_name) {
            return Err(CoreError::NotSyncable(op.table_name.clone()));
        }
        let safe_table = quote_identifier(&op.table_name)?;

        let conn = self.data_db.write();
        match op.operation {
            OpKind::Insert => {
                let data = op
                    .data
                    .as_ref()
                    .ok_or_else(|| CoreError::Config(format!("insert {} without data", op.op_id)))?;
                let mut safe_columns = Vec::with_capacity(data.len());
                let mut values = Vec::with_capacity(data.len());
                for (column, value) in data {
                    validate_column(column)?;
                    safe_columns.push(quote_identifier(column)?);
                    values.push(json_to_sql(value));
                }
                let placeholders: Vec<String> =
                    (1..=values.len()).map(|i| format!("?{i}")).collect();
                conn.execute(
                    &format!(
                        "INSERT OR REPLACE INTO {safe_table} ({}) VALUES ({})",
                        safe_columns.join(","),
                        placeholders.join(",")
                    ),
                    rusqlite::params_from_iter(values),
                )?;
            }
            OpKind::Update => {
                let data = op
                    .data
                    .as_ref()
                    .ok_or_else(|| CoreError::Config(format!("update {} without data", op.op_id)))?;
                let mut set_parts = Vec::with_capacity(data.len());
                let mut values = Vec::with_capacity(data.len() + 1);
                for (column, value) in data {
                    validate_column(column)?;
                    set_parts.push(format!("{} = ?{}", quote_identifier(column)?, values.len() + 1));
                    values.push(json_to_sql(value));
                }
                values.push(rusqlite::types::Value::Text(op.row_id.clone()));
                conn.execute(
                    &format!(
                        "UPDATE {safe_table} SET {} WHERE rowid = ?{}",
                        set_parts.join(","),
                        values.len()
                    ),
                    rusqlite::params_from_iter(values),
                )?;
            }
            OpKind::Delete => {
                conn.execute(
                    &format!("DELETE FROM {safe_table} WHERE rowid = ?1"),
                    rusqlite::params![op.row_id],
                )?;
            }
        }
        Ok(())
    }

    pub fn get_sync_state(&self, peer_id: &str) -> Option<PeerState> {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.get(peer_id).cloned()
    }

    pub fn all_sync_states(&self) -> Vec<PeerState> {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.values().cloned().collect()
    }

    pub fn get_stats(&self) -> SyncStats {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        SyncStats {
            local_peer_id: self.local_peer_id.clone(),
            local_version: self.local_version(),
            synced_peers: states.len(),
            pending_operations: self.pending_count(),
            total_operations_sent: states.values().map(|s| s.operations_sent).sum(),
            total_operations_received: states.values().map(|s| s.operations_received).sum(),
            total_conflicts_resolved: states.values().map(|s| s.conflicts_resolved).sum(),
        }
    }
}

/// Stores call this after their own durable write; failures here must not
/// fail the caller, so they are logged and swallowed.
impl OpTracker for SyncEngine {
    fn track(
        &self,
        table: &str,
        op: OpKind,
        row_id: &str,
        data: Option<&serde_json::Map<String, serde_json::Value>>,
        team_id: Option<&str>,
    ) {
        if let Err(e) = self.track_operation(table, op, row_id, data.cloned(), team_id) {
            eprintln!("⚠️ Failed to track {} on {table}:{row_id}: {e}", op.as_str());
        }
    }
}

fn json_to_sql(value: &serde_json::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value;
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Integer(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}
