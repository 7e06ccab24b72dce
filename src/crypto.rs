//! Team operation signing.
//!
//! HMAC-SHA256 over the canonical operation payload, keyed per team. When a
//! team has no key registered the keyring degrades to dev mode: signatures
//! come back empty and verification accepts anything.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

pub struct TeamKeyring {
    keys: RwLock<HashMap<String, Vec<u8>>>,
}

impl Default for TeamKeyring {
    fn default() -> Self {
        Self::new()
    }
}

impl TeamKeyring {
    pub fn new() -> Self {
        TeamKeyring {
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_key(&self, team_id: &str, secret: &[u8]) {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        keys.insert(team_id.to_string(), secret.to_vec());
    }

    pub fn remove_key(&self, team_id: &str) {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        keys.remove(team_id);
    }

    pub fn has_key(&self, team_id: &str) -> bool {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        keys.contains_key(team_id)
    }

    /// Sign a canonical payload for a team. Empty string when the team has no
    /// key (dev mode).
    pub fn sign(&self, payload: &str, team_id: &str) -> String {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        let Some(secret) = keys.get(team_id) else {
            return String::new();
        };
        match HmacSha256::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            Err(_) => String::new(),
        }
    }

    /// Verify a signature over a canonical payload. Accepts anything when the
    /// team has no key (dev mode).
    pub fn verify(&self, payload: &str, signature: &str, team_id: &str) -> bool {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        let Some(secret) = keys.get(team_id) else {
            return true;
        };
        let Ok(sig_bytes) = hex::decode(signature) else {
            return false;
        };
        match HmacSha256::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload.as_bytes());
                mac.verify_slice(&sig_bytes).is_ok()
            }
            Err(_) => false,
        }
    }
}
