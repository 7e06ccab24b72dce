//! Team invite codes.
//!
//! One active code per team: minting a new code retires older active ones.
//! Redemption is rate-limited by failure count per (code, ip) using the
//! invite_attempts audit table, so a correct guess after the limit still
//! fails.

use super::TeamStore;
use crate::errors::{CoreError, CoreResult};
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InviteCode {
    pub code: String,
    pub team_id: String,
    pub created_by: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub used: bool,
}

/// Generate an invite code: `team_<32 hex chars>`
pub fn generate_invite_code() -> String {
    format!("team_{:032x}", uuid::Uuid::new_v4().as_u128())
}

impl TeamStore {
    /// Mint a new invite code for a team, invalidating any older active ones.
    pub fn create_invite(
        &self,
        team_id: &str,
        created_by: &str,
        expires_in_hours: Option<i64>,
    ) -> CoreResult<InviteCode> {
        if self.get_team(team_id)?.is_none() {
            return Err(CoreError::NotFound);
        }
        let code = generate_invite_code();
        let now = chrono::Utc::now();
        let expires_at = expires_in_hours
            .map(|hours| (now + chrono::Duration::hours(hours)).to_rfc3339());
        let now = now.to_rfc3339();

        {
            let mut conn = self.db.write();
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE invite_codes SET used = 1 WHERE team_id = ?1 AND used = 0",
                params![team_id],
            )?;
            tx.execute(
                "INSERT INTO invite_codes (code, team_id, created_by, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![code, team_id, created_by, now, expires_at],
            )?;
            tx.commit()?;
        }

        self.audit.record(
            "invite.created",
            created_by,
            "team",
            team_id,
            &serde_json::json!({"expires_at": expires_at}),
            None,
        );

        Ok(InviteCode {
            code,
            team_id: team_id.to_string(),
            created_by: created_by.to_string(),
            created_at: now,
            expires_at,
            used: false,
        })
    }

    /// Redeem an invite code and join the team as a member. Returns the team
    /// id on success.
    pub fn redeem_invite(&self, code: &str, user_id: &str, ip: &str) -> CoreResult<String> {
        let cutoff = (chrono::Utc::now()
            - chrono::Duration::seconds(self.invite_window_secs))
        .to_rfc3339();
        let recent_failures: i64 = self.db.read(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM invite_attempts
                 WHERE code = ?1 AND ip = ?2 AND success = 0 AND attempted_at > ?3",
                params![code, ip, cutoff],
                |r| r.get(0),
            )?;
            Ok(count)
        })?;
        if recent_failures >= self.invite_max_failures {
            self.record_invite_attempt(code, ip, false)?;
            return Err(CoreError::RateLimited(format!(
                "too many failed attempts for this invite from {ip}"
            )));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let team_id: Option<String> = self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT team_id FROM invite_codes
                 WHERE code = ?1 AND used = 0
                   AND (expires_at IS NULL OR expires_at > ?2)",
                params![code, now],
                |r| r.get(0),
            );
            match row {
                Ok(team_id) => Ok(Some(team_id)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })?;

        let Some(team_id) = team_id else {
            self.record_invite_attempt(code, ip, false)?;
            return Err(CoreError::NotFound);
        };

        {
            let conn = self.db.write();
            conn.execute("UPDATE invite_codes SET used = 1 WHERE code = ?1", params![code])?;
        }
        self.add_member(&team_id, user_id, "member", None)?;
        self.record_invite_attempt(code, ip, true)?;

        self.audit.record(
            "invite.redeemed",
            user_id,
            "team",
            &team_id,
            &serde_json::json!({"ip": ip}),
            Some(ip),
        );

        Ok(team_id)
    }

    pub fn active_invite(&self, team_id: &str) -> CoreResult<Option<InviteCode>> {
        self.db.read(|conn| {
            let row = conn.query_row(
                "SELECT code, team_id, created_by, created_at, expires_at, used
                 FROM invite_codes WHERE team_id = ?1 AND used = 0
                 ORDER BY created_at DESC LIMIT 1",
                params![team_id],
                |r| {
                    Ok(InviteCode {
                        code: r.get(0)?,
                        team_id: r.get(1)?,
                        created_by: r.get(2)?,
                        created_at: r.get(3)?,
                        expires_at: r.get(4)?,
                        used: r.get::<_, i64>(5)? != 0,
                    })
                },
            );
            match row {
                Ok(invite) => Ok(Some(invite)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn record_invite_attempt(&self, code: &str, ip: &str, success: bool) -> CoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.db.write();
        conn.execute(
            "INSERT INTO invite_attempts (code, ip, success, attempted_at) VALUES (?1, ?2, ?3, ?4)",
            params![code, ip, success as i64, now],
        )?;
        Ok(())
    }
}
