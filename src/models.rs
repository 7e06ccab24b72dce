use serde::{Deserialize, Serialize};

// --- Principals & roles ---

/// Global user role, stored as text. Ordering matters: later variants carry
/// strictly more authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
    SuperAdmin,
    GodRights,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
            Role::GodRights => "god_rights",
        }
    }

    /// Parse a stored role string. Unknown values degrade to `member`.
    pub fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            "super_admin" => Role::SuperAdmin,
            "god_rights" => Role::GodRights,
            _ => Role::Member,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin | Role::GodRights)
    }
}

/// An authenticated caller, resolved by the external auth layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

impl Principal {
    pub fn new(user_id: &str, role: Role, team_id: Option<&str>) -> Self {
        Principal {
            user_id: user_id.to_string(),
            role,
            team_id: team_id.map(String::from),
        }
    }
}

// --- Chat ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub model: String,
    pub message_count: i64,
    pub models_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    pub archived: bool,
}

/// A single conversation event (message) within a session.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConversationEvent {
    pub timestamp: String,
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelPreferences {
    pub selected_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_model_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub summary: String,
    pub models_used: Vec<String>,
}

/// Input tuple for bulk document-chunk storage.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DocumentChunk {
    pub file_id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChunkMatch {
    pub id: i64,
    pub file_id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub content: String,
    pub similarity: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchHit {
    pub session_id: String,
    pub session_title: String,
    pub role: String,
    pub content: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub similarity: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelUsage {
    pub model: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatAnalytics {
    pub total_sessions: i64,
    pub total_messages: i64,
    pub total_tokens: i64,
    pub model_usage: Vec<ModelUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionAnalytics {
    pub session_id: String,
    pub message_count: i64,
    pub total_tokens: i64,
    pub models_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

// --- Sync ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Insert => "insert",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<OpKind> {
        match s {
            "insert" => Some(OpKind::Insert),
            "update" => Some(OpKind::Update),
            "delete" => Some(OpKind::Delete),
            _ => None,
        }
    }
}

/// A single replicated operation. The vector clock is `(peer_id, version)`;
/// `version` is strictly monotonic per peer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SyncOperation {
    pub op_id: String,
    pub table_name: String,
    pub operation: OpKind,
    pub row_id: String,
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    pub timestamp: String,
    pub peer_id: String,
    pub version: i64,
    pub team_id: Option<String>,
    #[serde(default)]
    pub signature: String,
}

/// Canonical payload signed for team-scoped operations. Field order is the
/// wire contract: serde serializes struct fields in declaration order, so the
/// signed JSON always carries these keys in exactly this sequence.
#[derive(Serialize)]
struct SignedPayload<'a> {
    op_id: &'a str,
    table_name: &'a str,
    operation: OpKind,
    row_id: &'a str,
    data: &'a Option<serde_json::Map<String, serde_json::Value>>,
    timestamp: &'a str,
    peer_id: &'a str,
    version: i64,
    team_id: &'a Option<String>,
}

impl SyncOperation {
    /// The canonical JSON string covered by the team signature (signature
    /// field excluded).
    pub fn canonical_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&SignedPayload {
            op_id: &self.op_id,
            table_name: &self.table_name,
            operation: self.operation,
            row_id: &self.row_id,
            data: &self.data,
            timestamp: &self.timestamp,
            peer_id: &self.peer_id,
            version: self.version,
            team_id: &self.team_id,
        })
    }
}

/// Wire body for `POST /api/v1/mesh/sync/exchange`, both directions.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncExchange {
    pub sender_peer_id: String,
    pub operations: Vec<SyncOperation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Idle,
    Syncing,
    Error,
}

impl PeerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerStatus::Idle => "idle",
            PeerStatus::Syncing => "syncing",
            PeerStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> PeerStatus {
        match s {
            "syncing" => PeerStatus::Syncing,
            "error" => PeerStatus::Error,
            _ => PeerStatus::Idle,
        }
    }
}

/// Synchronization state with one remote peer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeerState {
    pub peer_id: String,
    pub last_sync: Option<String>,
    pub operations_sent: i64,
    pub operations_received: i64,
    pub conflicts_resolved: i64,
    pub status: PeerStatus,
}

impl PeerState {
    pub fn new(peer_id: &str) -> Self {
        PeerState {
            peer_id: peer_id.to_string(),
            last_sync: None,
            operations_sent: 0,
            operations_received: 0,
            conflicts_resolved: 0,
            status: PeerStatus::Idle,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncStats {
    pub local_peer_id: String,
    pub local_version: i64,
    pub synced_peers: usize,
    pub pending_operations: usize,
    pub total_operations_sent: i64,
    pub total_operations_received: i64,
    pub total_conflicts_resolved: i64,
}

// --- Audit ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditRecord {
    pub id: i64,
    pub action: String,
    pub actor_user_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    pub created_at: String,
}
