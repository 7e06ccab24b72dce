//! Workflow and work-item data model.
//!
//! Stages and triggers serialize as JSON arrays for storage and come back as
//! typed values on read. Triggers are tagged variants; unknown trigger kinds
//! in stored data fail deserialization loudly rather than silently matching.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
    Local,
    Team,
}

impl WorkflowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::Local => "local",
            WorkflowType::Team => "team",
        }
    }

    pub fn parse(s: &str) -> WorkflowType {
        match s {
            "local" => WorkflowType::Local,
            _ => WorkflowType::Team,
        }
    }
}

/// Who can see a workflow. Authoritative for access control;
/// `workflow_type` is only a categorization label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Personal,
    Team,
    Global,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Personal => "personal",
            Visibility::Team => "team",
            Visibility::Global => "global",
        }
    }

    /// Legacy rows with no visibility are treated as personal.
    pub fn parse(s: Option<&str>) -> Visibility {
        match s {
            Some("team") => Visibility::Team,
            Some("global") => Visibility::Global,
            _ => Visibility::Personal,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Stage {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_hours: Option<i64>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "trigger_type", rename_all = "snake_case")]
pub enum WorkflowTrigger {
    OnAgentEvent {
        event_type: String,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    OnFilePattern {
        pattern: String,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    Manual {
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
}

impl WorkflowTrigger {
    pub fn enabled(&self) -> bool {
        match self {
            WorkflowTrigger::OnAgentEvent { enabled, .. } => *enabled,
            WorkflowTrigger::OnFilePattern { enabled, .. } => *enabled,
            WorkflowTrigger::Manual { enabled } => *enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkItemStatus {
    Pending,
    Active,
    Blocked,
    Completed,
    Cancelled,
}

impl WorkItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemStatus::Pending => "pending",
            WorkItemStatus::Active => "active",
            WorkItemStatus::Blocked => "blocked",
            WorkItemStatus::Completed => "completed",
            WorkItemStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> WorkItemStatus {
        match s {
            "active" => WorkItemStatus::Active,
            "blocked" => WorkItemStatus::Blocked,
            "completed" => WorkItemStatus::Completed,
            "cancelled" => WorkItemStatus::Cancelled,
            _ => WorkItemStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkItemPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl WorkItemPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemPriority::Low => "low",
            WorkItemPriority::Normal => "normal",
            WorkItemPriority::High => "high",
            WorkItemPriority::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> WorkItemPriority {
        match s {
            "low" => WorkItemPriority::Low,
            "high" => WorkItemPriority::High,
            "urgent" => WorkItemPriority::Urgent,
            _ => WorkItemPriority::Normal,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub workflow_type: WorkflowType,
    pub stages: Vec<Stage>,
    pub triggers: Vec<WorkflowTrigger>,
    pub enabled: bool,
    pub allow_manual_creation: bool,
    pub require_approval_to_start: bool,
    pub is_template: bool,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_team_id: Option<String>,
    pub visibility: Visibility,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Workflow {
    /// A minimal workflow with one stage and no triggers; callers fill in
    /// the rest.
    pub fn new(id: &str, name: &str, created_by: &str, stages: Vec<Stage>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Workflow {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            icon: None,
            category: None,
            workflow_type: WorkflowType::Team,
            stages,
            triggers: Vec::new(),
            enabled: true,
            allow_manual_creation: true,
            require_approval_to_start: false,
            is_template: false,
            created_by: created_by.to_string(),
            owner_team_id: None,
            visibility: Visibility::Personal,
            created_at: now.clone(),
            updated_at: now,
            version: 1,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageTransition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_stage_id: Option<String>,
    pub to_stage_id: String,
    pub transitioned_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitioned_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkItemAttachment {
    pub id: String,
    pub filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_by: String,
    pub uploaded_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkItem {
    pub id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub current_stage_id: String,
    pub current_stage_name: String,
    pub status: WorkItemStatus,
    pub priority: WorkItemPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<String>,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_due_at: Option<String>,
    pub is_overdue: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub history: Vec<StageTransition>,
    #[serde(default)]
    pub attachments: Vec<WorkItemAttachment>,
}

impl WorkItem {
    /// A fresh work item parked at a workflow's first stage.
    pub fn new(workflow: &Workflow, stage: &Stage, created_by: &str) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        WorkItem {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            current_stage_id: stage.id.clone(),
            current_stage_name: stage.name.clone(),
            status: WorkItemStatus::Pending,
            priority: WorkItemPriority::Normal,
            assigned_to: None,
            claimed_at: None,
            data: serde_json::Map::new(),
            created_by: created_by.to_string(),
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
            sla_due_at: None,
            is_overdue: false,
            tags: Vec::new(),
            reference_number: None,
            history: Vec::new(),
            attachments: Vec::new(),
        }
    }
}
