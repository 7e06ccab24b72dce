//! Scheduled and break-glass team role changes.
//!
//! Delayed promotions apply a future role change when their `execute_at`
//! passes; a periodic sweep picks up due rows. Temporary promotions cover
//! the case where a team's sole super_admin is unavailable: the most senior
//! admin is elevated until the original super_admin approves or reverts.

use super::TeamStore;
use crate::errors::{CoreError, CoreResult};
use crate::worker::WorkerHandle;
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DelayedPromotion {
    pub id: i64,
    pub team_id: String,
    pub user_id: String,
    pub from_role: String,
    pub to_role: String,
    pub scheduled_at: String,
    pub execute_at: String,
    pub executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempPromotionStatus {
    Active,
    Approved,
    Reverted,
}

impl TempPromotionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TempPromotionStatus::Active => "active",
            TempPromotionStatus::Approved => "approved",
            TempPromotionStatus::Reverted => "reverted",
        }
    }

    pub fn parse(s: &str) -> TempPromotionStatus {
        match s {
            "approved" => TempPromotionStatus::Approved,
            "reverted" => TempPromotionStatus::Reverted,
            _ => TempPromotionStatus::Active,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TempPromotion {
    pub id: i64,
    pub team_id: String,
    pub original_super_admin_id: String,
    pub promoted_admin_id: String,
    pub status: TempPromotionStatus,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
}

fn row_to_delayed(row: &Row<'_>) -> rusqlite::Result<DelayedPromotion> {
    Ok(DelayedPromotion {
        id: row.get(0)?,
        team_id: row.get(1)?,
        user_id: row.get(2)?,
        from_role: row.get(3)?,
        to_role: row.get(4)?,
        scheduled_at: row.get(5)?,
        execute_at: row.get(6)?,
        executed: row.get::<_, i64>(7)? != 0,
        executed_at: row.get(8)?,
    })
}

fn row_to_temp(row: &Row<'_>) -> rusqlite::Result<TempPromotion> {
    let status: String = row.get(4)?;
    Ok(TempPromotion {
        id: row.get(0)?,
        team_id: row.get(1)?,
        original_super_admin_id: row.get(2)?,
        promoted_admin_id: row.get(3)?,
        status: TempPromotionStatus::parse(&status),
        created_at: row.get(5)?,
        resolved_at: row.get(6)?,
    })
}

impl TeamStore {
    /// Schedule a future role change. Only one pending promotion may exist
    /// per (team, user).
    pub fn schedule_promotion(
        &self,
        team_id: &str,
        user_id: &str,
        to_role: &str,
        execute_at: &str,
        scheduled_by: &str,
    ) -> CoreResult<DelayedPromotion> {
        let from_role = self
            .member_role_checked(team_id, user_id)?
            .ok_or(CoreError::NotFound)?;
        if self.pending_promotion(team_id, user_id)?.is_some() {
            return Err(CoreError::Invalid(format!(
                "a pending promotion already exists for user {user_id} in team {team_id}"
            )));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let id = {
            let conn = self.db.write();
            conn.execute(
                "INSERT INTO delayed_promotions (team_id, user_id, from_role, to_role, scheduled_at, execute_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![team_id, user_id, from_role, to_role, now, execute_at],
            )?;
            conn.last_insert_rowid()
        };

        self.audit.record(
            "promotion.scheduled",
            scheduled_by,
            "team",
            team_id,
            &serde_json::json!({"user_id": user_id, "from": from_role, "to": to_role, "execute_at": execute_at}),
            None,
        );

        Ok(DelayedPromotion {
            id,
            team_id: team_id.to_string(),
            user_id: user_id.to_string(),
            from_role,
            to_role: to_role.to_string(),
            scheduled_at: now,
            execute_at: execute_at.to_string(),
            executed: false,
            executed_at: None,
        })
    }

    pub fn pending_promotion(&self, team_id: &str, user_id: &str) -> CoreResult<Option<DelayedPromotion>> {
        self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT id, team_id, user_id, from_role, to_role, scheduled_at, execute_at, executed, executed_at
                 FROM delayed_promotions
                 WHERE team_id = ?1 AND user_id = ?2 AND executed = 0",
                params![team_id, user_id],
                row_to_delayed,
            );
            match row {
                Ok(promotion) => Ok(Some(promotion)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Apply every due promotion. Returns the number applied.
    pub fn run_due_promotions(&self) -> CoreResult<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        let due: Vec<DelayedPromotion> = self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, team_id, user_id, from_role, to_role, scheduled_at, execute_at, executed, executed_at
                 FROM delayed_promotions
                 WHERE executed = 0 AND execute_at <= ?1
                 ORDER BY execute_at ASC",
            )?;
            let rows = stmt.query_map(params![now], row_to_delayed)?;
            let mut due = Vec::new();
            for row in rows {
                due.push(row?);
            }
            Ok(due)
        })?;

        for promotion in &due {
            self.set_member_role(&promotion.team_id, &promotion.user_id, &promotion.to_role)?;
            let conn = self.db.write();
            conn.execute(
                "UPDATE delayed_promotions SET executed = 1, executed_at = ?1 WHERE id = ?2",
                params![now, promotion.id],
            )?;
            drop(conn);
            self.audit.record(
                "promotion.executed",
                "system",
                "team",
                &promotion.team_id,
                &serde_json::json!({"user_id": promotion.user_id, "to": promotion.to_role}),
                None,
            );
        }

        Ok(due.len())
    }

    /// Break-glass: the sole super_admin is unavailable, elevate the most
    /// senior admin (earliest joined_at). At most one active record per team.
    pub fn begin_temp_promotion(&self, team_id: &str, requested_by: &str) -> CoreResult<TempPromotion> {
        if self.active_temp_promotion(team_id)?.is_some() {
            return Err(CoreError::Invalid(format!(
                "team {team_id} already has an active temporary promotion"
            )));
        }

        let super_admin: Option<String> = self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT user_id FROM team_members
                 WHERE team_id = ?1 AND role = 'super_admin'
                 ORDER BY joined_at ASC LIMIT 1",
                params![team_id],
                |r| r.get(0),
            );
            match row {
                Ok(user_id) => Ok(Some(user_id)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })?;
        let Some(original_super_admin_id) = super_admin else {
            return Err(CoreError::Invalid(format!("team {team_id} has no super_admin")));
        };

        let senior_admin: Option<String> = self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT user_id FROM team_members
                 WHERE team_id = ?1 AND role = 'admin'
                 ORDER BY joined_at ASC LIMIT 1",
                params![team_id],
                |r| r.get(0),
            );
            match row {
                Ok(user_id) => Ok(Some(user_id)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })?;
        let Some(promoted_admin_id) = senior_admin else {
            return Err(CoreError::Invalid(format!("team {team_id} has no admin to promote")));
        };

        self.set_member_role(team_id, &promoted_admin_id, "super_admin")?;

        let now = chrono::Utc::now().to_rfc3339();
        let id = {
            let conn = self.db.write();
            conn.execute(
                "INSERT INTO temp_promotions (team_id, original_super_admin_id, promoted_admin_id, status, created_at)
                 VALUES (?1, ?2, ?3, 'active', ?4)",
                params![team_id, original_super_admin_id, promoted_admin_id, now],
            )?;
            conn.last_insert_rowid()
        };

        self.audit.record(
            "temp_promotion.started",
            requested_by,
            "team",
            team_id,
            &serde_json::json!({"promoted": promoted_admin_id, "original": original_super_admin_id}),
            None,
        );

        Ok(TempPromotion {
            id,
            team_id: team_id.to_string(),
            original_super_admin_id,
            promoted_admin_id,
            status: TempPromotionStatus::Active,
            created_at: now,
            resolved_at: None,
        })
    }

    pub fn active_temp_promotion(&self, team_id: &str) -> CoreResult<Option<TempPromotion>> {
        self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT id, team_id, original_super_admin_id, promoted_admin_id, status, created_at, resolved_at
                 FROM temp_promotions WHERE team_id = ?1 AND status = 'active'",
                params![team_id],
                row_to_temp,
            );
            match row {
                Ok(promotion) => Ok(Some(promotion)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// The returned original super_admin confirms the elevation.
    pub fn approve_temp_promotion(&self, team_id: &str, approved_by: &str) -> CoreResult<TempPromotion> {
        let promotion = self
            .active_temp_promotion(team_id)?
            .ok_or(CoreError::NotFound)?;
        if approved_by != promotion.original_super_admin_id {
            return Err(CoreError::AccessDenied);
        }
        self.resolve_temp_promotion(&promotion, TempPromotionStatus::Approved, approved_by)
    }

    /// Undo the elevation: the promoted admin drops back to admin.
    pub fn revert_temp_promotion(&self, team_id: &str, reverted_by: &str) -> CoreResult<TempPromotion> {
        let promotion = self
            .active_temp_promotion(team_id)?
            .ok_or(CoreError::NotFound)?;
        self.set_member_role(team_id, &promotion.promoted_admin_id, "admin")?;
        self.resolve_temp_promotion(&promotion, TempPromotionStatus::Reverted, reverted_by)
    }

    fn resolve_temp_promotion(
        &self,
        promotion: &TempPromotion,
        status: TempPromotionStatus,
        actor: &str,
    ) -> CoreResult<TempPromotion> {
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.db.write();
            conn.execute(
                "UPDATE temp_promotions SET status = ?1, resolved_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, promotion.id],
            )?;
        }
        self.audit.record(
            &format!("temp_promotion.{}", status.as_str()),
            actor,
            "team",
            &promotion.team_id,
            &serde_json::json!({"promoted": promotion.promoted_admin_id}),
            None,
        );
        Ok(TempPromotion {
            status,
            resolved_at: Some(now),
            ..promotion.clone()
        })
    }

    fn member_role_checked(&self, team_id: &str, user_id: &str) -> CoreResult<Option<String>> {
        self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT role FROM team_members WHERE team_id = ?1 AND user_id = ?2",
                params![team_id, user_id],
                |r| r.get::<_, String>(0),
            );
            match row {
                Ok(role) => Ok(Some(role)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }
}

/// Spawn the delayed-promotion sweeper: applies due promotions every
/// `interval` until stopped.
pub fn spawn_promotion_sweeper(store: Arc<TeamStore>, interval: Duration) -> WorkerHandle {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            match store.run_due_promotions() {
                Ok(0) => {}
                Ok(n) => eprintln!("⏫ Applied {n} delayed promotion(s)"),
                Err(e) => eprintln!("⚠️ Promotion sweep failed: {e}"),
            }
        }
    });
    WorkerHandle::new(shutdown_tx, handle)
}
