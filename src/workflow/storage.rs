//! Workflow and work-item persistence over `workflows.db`.

use super::models::*;
use crate::db::Db;
use crate::errors::{CoreError, CoreResult};
use crate::models::OpKind;
use crate::tracker::OpTracker;
use rusqlite::{Row, params};
use std::sync::Arc;

/// Starred workflows are capped per user per workflow type.
const MAX_STARRED_PER_TYPE: i64 = 5;

pub struct WorkflowStore {
    pub(crate) db: Db,
    pub(crate) tracker: Option<Arc<dyn OpTracker>>,
}

impl WorkflowStore {
    pub fn new(db: Db) -> CoreResult<Self> {
        {
            let conn = db.write();
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS workflows (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    description TEXT,
                    icon TEXT,
                    category TEXT,
                    workflow_type TEXT DEFAULT 'team',
                    stages TEXT NOT NULL,
                    triggers TEXT NOT NULL,
                    enabled INTEGER DEFAULT 1,
                    allow_manual_creation INTEGER DEFAULT 1,
                    require_approval_to_start INTEGER DEFAULT 0,
                    is_template INTEGER DEFAULT 0,
                    created_by TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    version INTEGER DEFAULT 1,
                    tags TEXT,
                    user_id TEXT,
                    team_id TEXT
                );

                CREATE TABLE IF NOT EXISTS work_items (
                    id TEXT PRIMARY KEY,
                    workflow_id TEXT NOT NULL,
                    workflow_name TEXT NOT NULL,
                    current_stage_id TEXT NOT NULL,
                    current_stage_name TEXT NOT NULL,
                    status TEXT NOT NULL,
                    priority TEXT NOT NULL,
                    assigned_to TEXT,
                    claimed_at TEXT,
                    data TEXT NOT NULL,
                    created_by TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    completed_at TEXT,
                    sla_due_at TEXT,
                    is_overdue INTEGER DEFAULT 0,
                    tags TEXT,
                    reference_number TEXT,
                    user_id TEXT,
                    team_id TEXT,
                    FOREIGN KEY (workflow_id) REFERENCES workflows(id)
                );

                CREATE TABLE IF NOT EXISTS stage_transitions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    work_item_id TEXT NOT NULL,
                    from_stage_id TEXT,
                    to_stage_id TEXT,
                    transitioned_at TEXT NOT NULL,
                    transitioned_by TEXT,
                    notes TEXT,
                    duration_seconds INTEGER,
                    user_id TEXT,
                    team_id TEXT,
                    FOREIGN KEY (work_item_id) REFERENCES work_items(id)
                );

                CREATE TABLE IF NOT EXISTS attachments (
                    id TEXT PRIMARY KEY,
                    work_item_id TEXT NOT NULL,
                    filename TEXT NOT NULL,
                    file_path TEXT NOT NULL,
                    file_size INTEGER NOT NULL,
                    mime_type TEXT NOT NULL,
                    uploaded_by TEXT NOT NULL,
                    uploaded_at TEXT NOT NULL,
                    user_id TEXT,
                    team_id TEXT,
                    FOREIGN KEY (work_item_id) REFERENCES work_items(id)
                );

                CREATE TABLE IF NOT EXISTS starred_workflows (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    workflow_id TEXT NOT NULL,
                    starred_at TEXT NOT NULL,
                    UNIQUE(user_id, workflow_id),
                    FOREIGN KEY (workflow_id) REFERENCES workflows(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_work_items_workflow ON work_items(workflow_id);
                CREATE INDEX IF NOT EXISTS idx_work_items_status ON work_items(status);
                CREATE INDEX IF NOT EXISTS idx_work_items_assigned ON work_items(assigned_to);
                CREATE INDEX IF NOT EXISTS idx_work_items_overdue ON work_items(is_overdue);
                CREATE INDEX IF NOT EXISTS idx_workflows_user ON workflows(user_id);
                CREATE INDEX IF NOT EXISTS idx_work_items_user ON work_items(user_id);
                CREATE INDEX IF NOT EXISTS idx_transitions_work_item ON stage_transitions(work_item_id);
                CREATE INDEX IF NOT EXISTS idx_starred_user ON starred_workflows(user_id);",
            )?;

            // Multi-tenant hardening columns for databases that predate them.
            conn.execute_batch("ALTER TABLE workflows ADD COLUMN owner_team_id TEXT;")
                .ok();
            conn.execute_batch("ALTER TABLE workflows ADD COLUMN visibility TEXT DEFAULT 'personal';")
                .ok();

            conn.execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_workflows_team ON workflows(team_id);
                CREATE INDEX IF NOT EXISTS idx_work_items_team ON work_items(team_id);
                CREATE INDEX IF NOT EXISTS idx_workflows_template ON workflows(is_template);",
            )?;
        }
        Ok(WorkflowStore { db, tracker: None })
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn OpTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    // --- Workflow CRUD ---

    pub fn save_workflow(&self, workflow: &Workflow, user_id: &str, team_id: Option<&str>) -> CoreResult<()> {
        let stages_json = serde_json::to_string(&workflow.stages)?;
        let triggers_json = serde_json::to_string(&workflow.triggers)?;
        let tags_json = serde_json::to_string(&workflow.tags)?;
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT OR REPLACE INTO workflows
                 (id, name, description, icon, category, workflow_type, stages, triggers, enabled,
                  allow_manual_creation, require_approval_to_start, is_template, created_by,
                  created_at, updated_at, version, tags, user_id, team_id, owner_team_id, visibility)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
                params![
                    workflow.id,
                    workflow.name,
                    workflow.description,
                    workflow.icon,
                    workflow.category,
                    workflow.workflow_type.as_str(),
                    stages_json,
                    triggers_json,
                    workflow.enabled as i64,
                    workflow.allow_manual_creation as i64,
                    workflow.require_approval_to_start as i64,
                    workflow.is_template as i64,
                    workflow.created_by,
                    workflow.created_at,
                    workflow.updated_at,
                    workflow.version,
                    tags_json,
                    user_id,
                    team_id,
                    workflow.owner_team_id,
                    workflow.visibility.as_str()
                ],
            )?;
        }

        if let Some(tracker) = &self.tracker {
            let mut data = serde_json::Map::new();
            data.insert("id".into(), workflow.id.clone().into());
            data.insert("name".into(), workflow.name.clone().into());
            data.insert("workflow_type".into(), workflow.workflow_type.as_str().into());
            data.insert("stages".into(), stages_json.into());
            data.insert("triggers".into(), triggers_json.into());
            data.insert("enabled".into(), (workflow.enabled as i64).into());
            data.insert("is_template".into(), (workflow.is_template as i64).into());
            data.insert("created_by".into(), workflow.created_by.clone().into());
            data.insert("created_at".into(), workflow.created_at.clone().into());
            data.insert("updated_at".into(), workflow.updated_at.clone().into());
            data.insert("version".into(), workflow.version.into());
            data.insert("user_id".into(), user_id.into());
            data.insert("team_id".into(), team_id.into());
            data.insert("owner_team_id".into(), workflow.owner_team_id.clone().into());
            data.insert("visibility".into(), workflow.visibility.as_str().into());
            tracker.track("workflows", OpKind::Insert, &workflow.id, Some(&data), team_id);
        }

        Ok(())
    }

    /// Fetch a workflow under the requester's visibility. Personal: owner
    /// only. Team: matching team only. Global: everyone. Hidden and missing
    /// are indistinguishable.
    pub fn get_workflow(
        &self,
        workflow_id: &str,
        user_id: &str,
        team_id: Option<&str>,
    ) -> CoreResult<Option<Workflow>> {
        let workflow = self.db.read(|conn| {
            let row = conn.query_row(
                &format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = ?1"),
                params![workflow_id],
                row_to_workflow,
            );
            match row {
                Ok(workflow) => Ok(Some(workflow?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })?;

        let Some(workflow) = workflow else {
            return Ok(None);
        };

        let visible = match workflow.visibility {
            Visibility::Personal => workflow.created_by == user_id,
            Visibility::Team => {
                workflow.owner_team_id.is_some() && workflow.owner_team_id.as_deref() == team_id
            }
            Visibility::Global => true,
        };

        Ok(if visible { Some(workflow) } else { None })
    }

    /// List workflows visible to the user: their personal ones, their team's
    /// team-visible ones, and global ones.
    pub fn list_workflows(
        &self,
        user_id: &str,
        team_id: Option<&str>,
        category: Option<&str>,
        enabled_only: bool,
        workflow_type: Option<WorkflowType>,
    ) -> CoreResult<Vec<Workflow>> {
        self.db.read(|conn| {
            let mut sql;
            let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(team_id) = team_id {
                sql = format!(
                    "SELECT {WORKFLOW_COLUMNS} FROM workflows
                     WHERE ((created_by = ?1 AND (visibility = 'personal' OR visibility IS NULL))
                         OR (owner_team_id = ?2 AND visibility = 'team')
                         OR visibility = 'global')"
                );
                values.push(Box::new(user_id.to_string()));
                values.push(Box::new(team_id.to_string()));
            } else {
                sql = format!(
                    "SELECT {WORKFLOW_COLUMNS} FROM workflows
                     WHERE ((created_by = ?1 AND (visibility = 'personal' OR visibility IS NULL))
                         OR visibility = 'global')"
                );
                values.push(Box::new(user_id.to_string()));
            }

            if let Some(category) = category {
                values.push(Box::new(category.to_string()));
                sql.push_str(&format!(" AND category = ?{}", values.len()));
            }
            if enabled_only {
                sql.push_str(" AND enabled = 1");
            }
            if let Some(workflow_type) = workflow_type {
                values.push(Box::new(workflow_type.as_str().to_string()));
                sql.push_str(&format!(" AND workflow_type = ?{}", values.len()));
            }
            sql.push_str(" ORDER BY created_at DESC");

            let mut stmt = conn.prepare(&sql)?;
            let params_refs: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(|v| v.as_ref()).collect();
            let rows = stmt.query_map(params_refs.as_slice(), row_to_workflow)?;
            let mut workflows = Vec::new();
            for row in rows {
                workflows.push(row??);
            }
            Ok(workflows)
        })
    }

    /// Soft delete: the workflow is disabled, never removed, so existing work
    /// items keep their definition.
    pub fn delete_workflow(&self, workflow_id: &str, user_id: &str) -> CoreResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = {
            let conn = self.db.write();
            conn.execute(
                "UPDATE workflows SET enabled = 0, updated_at = ?1 WHERE id = ?2 AND user_id = ?3",
                params![now, workflow_id, user_id],
            )?
        };
        Ok(changed > 0)
    }

    // --- Work item CRUD ---

    /// Composite save: upsert the row, append any new stage transitions
    /// (history is append-only), and upsert attachments.
    pub fn save_work_item(&self, item: &WorkItem, user_id: &str, team_id: Option<&str>) -> CoreResult<()> {
        let data_json = serde_json::to_string(&item.data)?;
        let tags_json = serde_json::to_string(&item.tags)?;
        {
            let mut conn = self.db.write();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO work_items
                 (id, workflow_id, workflow_name, current_stage_id, current_stage_name,
                  status, priority, assigned_to, claimed_at, data, created_by,
                  created_at, updated_at, completed_at, sla_due_at, is_overdue,
                  tags, reference_number, user_id, team_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                params![
                    item.id,
                    item.workflow_id,
                    item.workflow_name,
                    item.current_stage_id,
                    item.current_stage_name,
                    item.status.as_str(),
                    item.priority.as_str(),
                    item.assigned_to,
                    item.claimed_at,
                    data_json,
                    item.created_by,
                    item.created_at,
                    item.updated_at,
                    item.completed_at,
                    item.sla_due_at,
                    item.is_overdue as i64,
                    tags_json,
                    item.reference_number,
                    user_id,
                    team_id
                ],
            )?;

            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM stage_transitions WHERE work_item_id = ?1",
                params![item.id],
                |r| r.get(0),
            )?;
            for transition in item.history.iter().skip(existing as usize) {
                tx.execute(
                    "INSERT INTO stage_transitions
                     (work_item_id, from_stage_id, to_stage_id, transitioned_at, transitioned_by, notes, duration_seconds, user_id, team_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        item.id,
                        transition.from_stage_id,
                        transition.to_stage_id,
                        transition.transitioned_at,
                        transition.transitioned_by,
                        transition.notes,
                        transition.duration_seconds,
                        user_id,
                        team_id
                    ],
                )?;
            }

            for attachment in &item.attachments {
                tx.execute(
                    "INSERT OR REPLACE INTO attachments
                     (id, work_item_id, filename, file_path, file_size, mime_type, uploaded_by, uploaded_at, user_id, team_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        attachment.id,
                        item.id,
                        attachment.filename,
                        attachment.file_path,
                        attachment.file_size,
                        attachment.mime_type,
                        attachment.uploaded_by,
                        attachment.uploaded_at,
                        user_id,
                        team_id
                    ],
                )?;
            }

            tx.commit()?;
        }

        if let Some(tracker) = &self.tracker {
            let mut data = serde_json::Map::new();
            data.insert("id".into(), item.id.clone().into());
            data.insert("workflow_id".into(), item.workflow_id.clone().into());
            data.insert("workflow_name".into(), item.workflow_name.clone().into());
            data.insert("current_stage_id".into(), item.current_stage_id.clone().into());
            data.insert("current_stage_name".into(), item.current_stage_name.clone().into());
            data.insert("status".into(), item.status.as_str().into());
            data.insert("priority".into(), item.priority.as_str().into());
            data.insert("data".into(), data_json.into());
            data.insert("created_by".into(), item.created_by.clone().into());
            data.insert("created_at".into(), item.created_at.clone().into());
            data.insert("updated_at".into(), item.updated_at.clone().into());
            data.insert("user_id".into(), user_id.into());
            data.insert("team_id".into(), team_id.into());
            tracker.track("work_items", OpKind::Insert, &item.id, Some(&data), team_id);
        }

        Ok(())
    }

    /// Load a work item. `hydrate` pulls history and attachments with two
    /// additional scoped queries; skip it when only the row matters.
    pub fn get_work_item(&self, work_item_id: &str, user_id: &str, hydrate: bool) -> CoreResult<Option<WorkItem>> {
        let item = self.db.read(|conn| {
            let row = conn.query_row(
                &format!("SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE id = ?1 AND user_id = ?2"),
                params![work_item_id, user_id],
                row_to_work_item,
            );
            match row {
                Ok(item) => Ok(Some(item?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })?;

        let Some(mut item) = item else {
            return Ok(None);
        };

        if hydrate {
            item.history = self.db.read(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT from_stage_id, to_stage_id, transitioned_at, transitioned_by, notes, duration_seconds
                     FROM stage_transitions WHERE work_item_id = ?1 ORDER BY transitioned_at ASC, id ASC",
                )?;
                let rows = stmt.query_map(params![work_item_id], |r| {
                    Ok(StageTransition {
                        from_stage_id: r.get(0)?,
                        to_stage_id: r.get(1)?,
                        transitioned_at: r.get(2)?,
                        transitioned_by: r.get(3)?,
                        notes: r.get(4)?,
                        duration_seconds: r.get(5)?,
                    })
                })?;
                let mut history = Vec::new();
                for row in rows {
                    history.push(row?);
                }
                Ok(history)
            })?;

            item.attachments = self.db.read(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, filename, file_path, file_size, mime_type, uploaded_by, uploaded_at
                     FROM attachments WHERE work_item_id = ?1 ORDER BY uploaded_at ASC",
                )?;
                let rows = stmt.query_map(params![work_item_id], |r| {
                    Ok(WorkItemAttachment {
                        id: r.get(0)?,
                        filename: r.get(1)?,
                        file_path: r.get(2)?,
                        file_size: r.get(3)?,
                        mime_type: r.get(4)?,
                        uploaded_by: r.get(5)?,
                        uploaded_at: r.get(6)?,
                    })
                })?;
                let mut attachments = Vec::new();
                for row in rows {
                    attachments.push(row?);
                }
                Ok(attachments)
            })?;
        }

        Ok(Some(item))
    }

    pub fn list_work_items(
        &self,
        user_id: &str,
        workflow_id: Option<&str>,
        status: Option<WorkItemStatus>,
        assigned_to: Option<&str>,
        limit: i64,
    ) -> CoreResult<Vec<WorkItem>> {
        self.db.read(|conn| {
            let mut sql = format!("SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE user_id = ?1");
            let mut values: Vec<Box<dyn rusqlite::types::ToSql>> =
                vec![Box::new(user_id.to_string())];

            if let Some(workflow_id) = workflow_id {
                values.push(Box::new(workflow_id.to_string()));
                sql.push_str(&format!(" AND workflow_id = ?{}", values.len()));
            }
            if let Some(status) = status {
                values.push(Box::new(status.as_str().to_string()));
                sql.push_str(&format!(" AND status = ?{}", values.len()));
            }
            if let Some(assigned_to) = assigned_to {
                values.push(Box::new(assigned_to.to_string()));
                sql.push_str(&format!(" AND assigned_to = ?{}", values.len()));
            }
            values.push(Box::new(limit));
            sql.push_str(&format!(" ORDER BY created_at DESC LIMIT ?{}", values.len()));

            let mut stmt = conn.prepare(&sql)?;
            let params_refs: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(|v| v.as_ref()).collect();
            let rows = stmt.query_map(params_refs.as_slice(), row_to_work_item)?;
            let mut items = Vec::new();
            for row in rows {
                items.push(row??);
            }
            Ok(items)
        })
    }

    /// Move a work item to another stage of its workflow, appending the
    /// transition. Duration is the wall-clock delta from the previous
    /// transition, when one exists.
    pub fn advance_work_item(
        &self,
        work_item_id: &str,
        user_id: &str,
        to_stage_id: &str,
        transitioned_by: Option<&str>,
        notes: Option<&str>,
    ) -> CoreResult<WorkItem> {
        let mut item = self
            .get_work_item(work_item_id, user_id, true)?
            .ok_or(CoreError::NotFound)?;

        let workflow = self
            .get_workflow_unchecked(&item.workflow_id)?
            .ok_or(CoreError::NotFound)?;
        let stage = workflow
            .stages
            .iter()
            .find(|s| s.id == to_stage_id)
            .ok_or_else(|| {
                CoreError::Invalid(format!(
                    "stage {to_stage_id} is not part of workflow {}",
                    workflow.id
                ))
            })?;

        let now = chrono::Utc::now();
        let duration_seconds = item.history.last().and_then(|prev| {
            chrono::DateTime::parse_from_rfc3339(&prev.transitioned_at)
                .ok()
                .map(|prev_at| (now - prev_at.with_timezone(&chrono::Utc)).num_seconds())
        });

        item.history.push(StageTransition {
            from_stage_id: Some(item.current_stage_id.clone()),
            to_stage_id: to_stage_id.to_string(),
            transitioned_at: now.to_rfc3339(),
            transitioned_by: transitioned_by.map(String::from),
            notes: notes.map(String::from),
            duration_seconds,
        });
        item.current_stage_id = stage.id.clone();
        item.current_stage_name = stage.name.clone();
        item.updated_at = now.to_rfc3339();

        let team_id = item_team_id(&self.db, work_item_id)?;
        self.save_work_item(&item, user_id, team_id.as_deref())?;
        Ok(item)
    }

    pub fn set_work_item_status(
        &self,
        work_item_id: &str,
        user_id: &str,
        status: WorkItemStatus,
    ) -> CoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let completed_at = matches!(status, WorkItemStatus::Completed).then(|| now.clone());
        let changed = {
            let conn = self.db.write();
            conn.execute(
                "UPDATE work_items SET status = ?1, updated_at = ?2,
                        completed_at = COALESCE(?3, completed_at)
                 WHERE id = ?4 AND user_id = ?5",
                params![status.as_str(), now, completed_at, work_item_id, user_id],
            )?
        };
        if changed == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    pub fn claim_work_item(&self, work_item_id: &str, user_id: &str, assignee: &str) -> CoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = {
            let conn = self.db.write();
            conn.execute(
                "UPDATE work_items SET assigned_to = ?1, claimed_at = ?2, updated_at = ?2
                 WHERE id = ?3 AND user_id = ?4",
                params![assignee, now, work_item_id, user_id],
            )?
        };
        if changed == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    /// Flag items whose SLA deadline has passed. Returns the number flagged.
    pub fn mark_overdue_items(&self) -> CoreResult<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.write();
        let changed = conn.execute(
            "UPDATE work_items SET is_overdue = 1
             WHERE is_overdue = 0 AND sla_due_at IS NOT NULL AND sla_due_at < ?1
               AND status NOT IN ('completed', 'cancelled')",
            params![now],
        )?;
        Ok(changed)
    }

    // --- Starring ---

    /// Star a workflow for a user. Capped per workflow type; returns false
    /// when the cap is hit or the workflow is unknown.
    pub fn star_workflow(&self, workflow_id: &str, user_id: &str) -> CoreResult<bool> {
        let workflow_type: Option<String> = self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT workflow_type FROM workflows WHERE id = ?1",
                params![workflow_id],
                |r| r.get(0),
            );
            match row {
                Ok(t) => Ok(Some(t)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })?;
        let Some(workflow_type) = workflow_type else {
            return Ok(false);
        };

        let starred: i64 = self.db.read(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM starred_workflows sw
                 JOIN workflows w ON sw.workflow_id = w.id
                 WHERE sw.user_id = ?1 AND w.workflow_type = ?2",
                params![user_id, workflow_type],
                |r| r.get(0),
            )?;
            Ok(count)
        })?;
        if starred >= MAX_STARRED_PER_TYPE {
            return Ok(false);
        }

        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.write();
        conn.execute(
            "INSERT OR IGNORE INTO starred_workflows (user_id, workflow_id, starred_at) VALUES (?1, ?2, ?3)",
            params![user_id, workflow_id, now],
        )?;
        Ok(true)
    }

    pub fn unstar_workflow(&self, workflow_id: &str, user_id: &str) -> CoreResult<()> {
        let conn = self.db.write();
        conn.execute(
            "DELETE FROM starred_workflows WHERE user_id = ?1 AND workflow_id = ?2",
            params![user_id, workflow_id],
        )?;
        Ok(())
    }

    pub fn get_starred_workflows(&self, user_id: &str, workflow_type: Option<WorkflowType>) -> CoreResult<Vec<String>> {
        self.db.read(|conn| {
            let mut ids = Vec::new();
            if let Some(workflow_type) = workflow_type {
                let mut stmt = conn.prepare(
                    "SELECT sw.workflow_id FROM starred_workflows sw
                     JOIN workflows w ON sw.workflow_id = w.id
                     WHERE sw.user_id = ?1 AND w.workflow_type = ?2
                     ORDER BY sw.starred_at DESC",
                )?;
                let rows = stmt.query_map(params![user_id, workflow_type.as_str()], |r| r.get(0))?;
                for row in rows {
                    ids.push(row?);
                }
            } else {
                let mut stmt = conn.prepare(
                    "SELECT workflow_id FROM starred_workflows WHERE user_id = ?1 ORDER BY starred_at DESC",
                )?;
                let rows = stmt.query_map(params![user_id], |r| r.get(0))?;
                for row in rows {
                    ids.push(row?);
                }
            }
            Ok(ids)
        })
    }

    pub fn is_workflow_starred(&self, workflow_id: &str, user_id: &str) -> CoreResult<bool> {
        self.db.read(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM starred_workflows WHERE user_id = ?1 AND workflow_id = ?2",
                params![user_id, workflow_id],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Internal fetch without a visibility check, for trigger matching and
    /// stage validation against an already-authorized item.
    pub(crate) fn get_workflow_unchecked(&self, workflow_id: &str) -> CoreResult<Option<Workflow>> {
        self.db.read(|conn| {
            let row = conn.query_row(
                &format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = ?1"),
                params![workflow_id],
                row_to_workflow,
            );
            match row {
                Ok(workflow) => Ok(Some(workflow?)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }
}

fn item_team_id(db: &Db, work_item_id: &str) -> CoreResult<Option<String>> {
    db.read(|conn| {
        let row = conn.query_row(
            "SELECT team_id FROM work_items WHERE id = ?1",
            params![work_item_id],
            |r| r.get::<_, Option<String>>(0),
        );
        match row {
            Ok(team_id) => Ok(team_id),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    })
}

const WORKFLOW_COLUMNS: &str = "id, name, description, icon, category, workflow_type, stages, triggers, \
     enabled, allow_manual_creation, require_approval_to_start, is_template, created_by, created_at, \
     updated_at, version, tags, owner_team_id, visibility";

/// Row conversion can fail twice: SQL-side (rusqlite) and JSON-side (serde),
/// hence the nested Result.
fn row_to_workflow(row: &Row<'_>) -> rusqlite::Result<CoreResult<Workflow>> {
    let stages_json: String = row.get(6)?;
    let triggers_json: String = row.get(7)?;
    let tags_json: Option<String> = row.get(16)?;
    let workflow_type: Option<String> = row.get(5)?;
    let visibility: Option<String> = row.get(18)?;

    let parse = || -> CoreResult<Workflow> {
        Ok(Workflow {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            icon: row.get(3)?,
            category: row.get(4)?,
            workflow_type: WorkflowType::parse(workflow_type.as_deref().unwrap_or("team")),
            stages: serde_json::from_str(&stages_json)?,
            triggers: serde_json::from_str(&triggers_json)?,
            enabled: row.get::<_, Option<i64>>(8)?.unwrap_or(1) != 0,
            allow_manual_creation: row.get::<_, Option<i64>>(9)?.unwrap_or(1) != 0,
            require_approval_to_start: row.get::<_, Option<i64>>(10)?.unwrap_or(0) != 0,
            is_template: row.get::<_, Option<i64>>(11)?.unwrap_or(0) != 0,
            created_by: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
            version: row.get::<_, Option<i64>>(15)?.unwrap_or(1),
            tags: tags_json
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default(),
            owner_team_id: row.get(17)?,
            visibility: Visibility::parse(visibility.as_deref()),
        })
    };
    Ok(parse())
}

const WORK_ITEM_COLUMNS: &str = "id, workflow_id, workflow_name, current_stage_id, current_stage_name, \
     status, priority, assigned_to, claimed_at, data, created_by, created_at, updated_at, \
     completed_at, sla_due_at, is_overdue, tags, reference_number";

fn row_to_work_item(row: &Row<'_>) -> rusqlite::Result<CoreResult<WorkItem>> {
    let status: String = row.get(5)?;
    let priority: String = row.get(6)?;
    let data_json: String = row.get(9)?;
    let tags_json: Option<String> = row.get(16)?;

    let parse = || -> CoreResult<WorkItem> {
        Ok(WorkItem {
            id: row.get(0)?,
            workflow_id: row.get(1)?,
            workflow_name: row.get(2)?,
            current_stage_id: row.get(3)?,
            current_stage_name: row.get(4)?,
            status: WorkItemStatus::parse(&status),
            priority: WorkItemPriority::parse(&priority),
            assigned_to: row.get(7)?,
            claimed_at: row.get(8)?,
            data: serde_json::from_str(&data_json)?,
            created_by: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
            completed_at: row.get(13)?,
            sla_due_at: row.get(14)?,
            is_overdue: row.get::<_, Option<i64>>(15)?.unwrap_or(0) != 0,
            tags: tags_json
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default(),
            reference_number: row.get(17)?,
            history: Vec::new(),
            attachments: Vec::new(),
        })
    };
    Ok(parse())
}
