//! Users, teams, and membership.
//!
//! The team boundary every other subsystem leans on: the sync engine asks it
//! whether a principal belongs to a team, chat and workflow stores scope
//! rows by the team ids it hands out.

pub mod invites;
pub mod promotions;

pub use invites::InviteCode;
pub use promotions::{DelayedPromotion, TempPromotion, spawn_promotion_sweeper};

use crate::audit::AuditLog;
use crate::db::Db;
use crate::errors::{CoreError, CoreResult};
use crate::models::Role;
use rusqlite::{Row, params};
use serde::{Deserialize, Serialize};

/// Membership lookup consumed by the sync engine and workflow triggers.
/// Returns the member's team role, or None for non-members.
pub trait TeamMembership: Send + Sync {
    fn member_role(&self, team_id: &str, user_id: &str) -> Option<String>;
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub is_active: bool,
    pub must_change_password: bool,
    pub failed_login_attempts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_until: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Team {
    pub team_id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TeamMember {
    pub team_id: String,
    pub user_id: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_role: Option<String>,
    pub joined_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

/// Failed logins tolerated before the account locks.
const MAX_FAILED_LOGINS: i64 = 5;
const LOCKOUT_MINUTES: i64 = 15;

pub struct TeamStore {
    pub(crate) db: Db,
    pub(crate) audit: AuditLog,
    pub(crate) invite_max_failures: i64,
    pub(crate) invite_window_secs: i64,
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(2)?;
    Ok(User {
        user_id: row.get(0)?,
        username: row.get(1)?,
        role: Role::parse(&role),
        is_active: row.get::<_, i64>(3)? != 0,
        must_change_password: row.get::<_, i64>(4)? != 0,
        failed_login_attempts: row.get(5)?,
        lockout_until: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn row_to_member(row: &Row<'_>) -> rusqlite::Result<TeamMember> {
    Ok(TeamMember {
        team_id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        job_role: row.get(3)?,
        joined_at: row.get(4)?,
        last_seen: row.get(5)?,
    })
}

impl TeamStore {
    pub fn new(
        db: Db,
        audit: AuditLog,
        invite_max_failures: i64,
        invite_window_secs: i64,
    ) -> CoreResult<Self> {
        {
            let conn = db.write();
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    user_id TEXT PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    role TEXT NOT NULL DEFAULT 'member',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    must_change_password INTEGER NOT NULL DEFAULT 0,
                    failed_login_attempts INTEGER NOT NULL DEFAULT 0,
                    lockout_until TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS teams (
                    team_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    created_by TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS team_members (
                    team_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'member',
                    job_role TEXT,
                    joined_at TEXT NOT NULL,
                    last_seen TEXT,
                    PRIMARY KEY (team_id, user_id)
                );
                CREATE INDEX IF NOT EXISTS idx_team_members_user ON team_members(user_id);

                CREATE TABLE IF NOT EXISTS invite_codes (
                    code TEXT PRIMARY KEY,
                    team_id TEXT NOT NULL,
                    created_by TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    expires_at TEXT,
                    used INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_invite_codes_team ON invite_codes(team_id, used);

                CREATE TABLE IF NOT EXISTS invite_attempts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    code TEXT NOT NULL,
                    ip TEXT NOT NULL,
                    success INTEGER NOT NULL,
                    attempted_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_invite_attempts_code_ip ON invite_attempts(code, ip);

                CREATE TABLE IF NOT EXISTS delayed_promotions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    team_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    from_role TEXT NOT NULL,
                    to_role TEXT NOT NULL,
                    scheduled_at TEXT NOT NULL,
                    execute_at TEXT NOT NULL,
                    executed INTEGER NOT NULL DEFAULT 0,
                    executed_at TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_delayed_promotions_due ON delayed_promotions(executed, execute_at);

                CREATE TABLE IF NOT EXISTS temp_promotions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    team_id TEXT NOT NULL,
                    original_super_admin_id TEXT NOT NULL,
                    promoted_admin_id TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'active',
                    created_at TEXT NOT NULL,
                    resolved_at TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_temp_promotions_team ON temp_promotions(team_id, status);",
            )?;
        }
        Ok(TeamStore {
            db,
            audit,
            invite_max_failures,
            invite_window_secs,
        })
    }

    // --- Users ---

    pub fn create_user(&self, user_id: &str, username: &str, role: Role) -> CoreResult<User> {
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT INTO users (user_id, username, role, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![user_id, username, role.as_str(), now],
            )?;
        }
        Ok(User {
            user_id: user_id.to_string(),
            username: username.to_string(),
            role,
            is_active: true,
            must_change_password: false,
            failed_login_attempts: 0,
            lockout_until: None,
            created_at: now,
        })
    }

    pub fn get_user(&self, user_id: &str) -> CoreResult<Option<User>> {
        self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT user_id, username, role, is_active, must_change_password, failed_login_attempts, lockout_until, created_at
                 FROM users WHERE user_id = ?1",
                params![user_id],
                row_to_user,
            );
            match row {
                Ok(user) => Ok(Some(user)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Global role changes are audited: who flipped whom, from what, to what.
    pub fn set_user_role(&self, actor_user_id: &str, target_user_id: &str, role: Role) -> CoreResult<()> {
        let previous = self
            .get_user(target_user_id)?
            .ok_or(CoreError::NotFound)?
            .role;
        {
            let conn = self.db.write();
            conn.execute(
                "UPDATE users SET role = ?1 WHERE user_id = ?2",
                params![role.as_str(), target_user_id],
            )?;
        }
        self.audit.record(
            "user.role_changed",
            actor_user_id,
            "user",
            target_user_id,
            &serde_json::json!({"from": previous.as_str(), "to": role.as_str()}),
            None,
        );
        Ok(())
    }

    pub fn set_user_active(&self, user_id: &str, is_active: bool) -> CoreResult<()> {
        let conn = self.db.write();
        let changed = conn.execute(
            "UPDATE users SET is_active = ?1 WHERE user_id = ?2",
            params![is_active as i64, user_id],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound);
        }
        Ok(())
    }

    /// Bump the failed-login counter; lock the account once the limit is hit.
    pub fn record_failed_login(&self, username: &str) -> CoreResult<()> {
        let lockout_until =
            (chrono::Utc::now() + chrono::Duration::minutes(LOCKOUT_MINUTES)).to_rfc3339();
        let conn = self.db.write();
        conn.execute(
            "UPDATE users SET failed_login_attempts = failed_login_attempts + 1 WHERE username = ?1",
            params![username],
        )?;
        conn.execute(
            "UPDATE users SET lockout_until = ?1
             WHERE username = ?2 AND failed_login_attempts >= ?3",
            params![lockout_until, username, MAX_FAILED_LOGINS],
        )?;
        Ok(())
    }

    pub fn reset_failed_logins(&self, username: &str) -> CoreResult<()> {
        let conn = self.db.write();
        conn.execute(
            "UPDATE users SET failed_login_attempts = 0, lockout_until = NULL WHERE username = ?1",
            params![username],
        )?;
        Ok(())
    }

    pub fn is_locked_out(&self, username: &str) -> CoreResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT lockout_until FROM users WHERE username = ?1",
                params![username],
                |r| r.get::<_, Option<String>>(0),
            );
            match row {
                Ok(Some(until)) => Ok(until > now),
                Ok(None) => Ok(false),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    // --- Teams ---

    /// Create a team. The creator joins immediately as its super_admin: a
    /// team must never (except mid-promotion) lack one.
    pub fn create_team(&self, team_id: &str, name: &str, created_by: &str) -> CoreResult<Team> {
        let now = chrono::Utc::now().to_rfc3339();
        {
            let mut conn = self.db.write();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO teams (team_id, name, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![team_id, name, created_by, now],
            )?;
            tx.execute(
                "INSERT INTO team_members (team_id, user_id, role, joined_at) VALUES (?1, ?2, 'super_admin', ?3)",
                params![team_id, created_by, now],
            )?;
            tx.commit()?;
        }
        self.audit.record(
            "team.created",
            created_by,
            "team",
            team_id,
            &serde_json::json!({"name": name}),
            None,
        );
        Ok(Team {
            team_id: team_id.to_string(),
            name: name.to_string(),
            created_by: created_by.to_string(),
            created_at: now,
        })
    }

    pub fn get_team(&self, team_id: &str) -> CoreResult<Option<Team>> {
        self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT team_id, name, created_by, created_at FROM teams WHERE team_id = ?1",
                params![team_id],
                |r| {
                    Ok(Team {
                        team_id: r.get(0)?,
                        name: r.get(1)?,
                        created_by: r.get(2)?,
                        created_at: r.get(3)?,
                    })
                },
            );
            match row {
                Ok(team) => Ok(Some(team)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn add_member(
        &self,
        team_id: &str,
        user_id: &str,
        role: &str,
        job_role: Option<&str>,
    ) -> CoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.db.write();
            conn.execute(
                "INSERT INTO team_members (team_id, user_id, role, job_role, joined_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(team_id, user_id)
                 DO UPDATE SET role = excluded.role, job_role = excluded.job_role",
                params![team_id, user_id, role, job_role, now],
            )?;
        }
        self.audit.record(
            "team.member_added",
            user_id,
            "team",
            team_id,
            &serde_json::json!({"user_id": user_id, "role": role}),
            None,
        );
        Ok(())
    }

    pub fn remove_member(&self, team_id: &str, user_id: &str) -> CoreResult<bool> {
        let removed = {
            let conn = self.db.write();
            conn.execute(
                "DELETE FROM team_members WHERE team_id = ?1 AND user_id = ?2",
                params![team_id, user_id],
            )?
        };
        if removed > 0 {
            self.audit.record(
                "team.member_removed",
                user_id,
                "team",
                team_id,
                &serde_json::json!({"user_id": user_id}),
                None,
            );
        }
        Ok(removed > 0)
    }

    pub fn set_member_role(&self, team_id: &str, user_id: &str, role: &str) -> CoreResult<()> {
        let changed = {
            let conn = self.db.write();
            conn.execute(
                "UPDATE team_members SET role = ?1 WHERE team_id = ?2 AND user_id = ?3",
                params![role, team_id, user_id],
            )?
        };
        if changed == 0 {
            return Err(CoreError::NotFound);
        }
        self.audit.record(
            "team.member_role_changed",
            user_id,
            "team",
            team_id,
            &serde_json::json!({"user_id": user_id, "to": role}),
            None,
        );
        Ok(())
    }

    pub fn team_members(&self, team_id: &str) -> CoreResult<Vec<TeamMember>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT team_id, user_id, role, job_role, joined_at, last_seen
                 FROM team_members WHERE team_id = ?1 ORDER BY joined_at ASC",
            )?;
            let rows = stmt.query_map(params![team_id], row_to_member)?;
            let mut members = Vec::new();
            for row in rows {
                members.push(row?);
            }
            Ok(members)
        })
    }

    pub fn user_teams(&self, user_id: &str) -> CoreResult<Vec<Team>> {
        self.db.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.team_id, t.name, t.created_by, t.created_at
                 FROM teams t JOIN team_members m ON t.team_id = m.team_id
                 WHERE m.user_id = ?1 ORDER BY t.created_at ASC",
            )?;
            let rows = stmt.query_map(params![user_id], |r| {
                Ok(Team {
                    team_id: r.get(0)?,
                    name: r.get(1)?,
                    created_by: r.get(2)?,
                    created_at: r.get(3)?,
                })
            })?;
            let mut teams = Vec::new();
            for row in rows {
                teams.push(row?);
            }
            Ok(teams)
        })
    }

    pub fn touch_member_last_seen(&self, team_id: &str, user_id: &str) -> CoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.write();
        conn.execute(
            "UPDATE team_members SET last_seen = ?1 WHERE team_id = ?2 AND user_id = ?3",
            params![now, team_id, user_id],
        )?;
        Ok(())
    }
}

impl TeamMembership for TeamStore {
    fn member_role(&self, team_id: &str, user_id: &str) -> Option<String> {
        self.db
            .read(|conn| {
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
            .unwrap_or(None)
    }
}
