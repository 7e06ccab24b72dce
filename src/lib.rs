//! Offline-first collaboration core for private teams.
//!
//! Four subsystems share a tenant model, embedded SQLite durability, and
//! hardened dynamic SQL: the chat memory engine, the P2P sync engine, the
//! workflow/work-item store, and the permission & team boundary engine.
//! `MeshCore` is the composition root; the HTTP surface, auth middleware,
//! and real embedding models live outside and talk to it through the
//! interfaces exposed here.

pub mod audit;
pub mod cache;
pub mod chat;
pub mod config;
pub mod crypto;
pub mod db;
pub mod discovery;
pub mod embeddings;
pub mod errors;
pub mod ident;
pub mod models;
pub mod permissions;
pub mod sync;
pub mod teams;
pub mod tracker;
pub mod worker;
pub mod workflow;

use crate::audit::AuditLog;
use crate::chat::ChatMemory;
use crate::config::CoreConfig;
use crate::crypto::TeamKeyring;
use crate::db::{Db, sync_db_path_for};
use crate::discovery::{PeerDirectory, local_peer_id};
use crate::embeddings::{Embedder, HashedBagEmbedder};
use crate::errors::CoreResult;
use crate::permissions::PermissionEngine;
use crate::sync::{PeerTransport, SyncEngine};
use crate::teams::TeamStore;
use crate::worker::WorkerHandle;
use crate::workflow::WorkflowStore;
use std::sync::Arc;
use std::time::Duration;

/// The assembled collaboration core. Construct once per process with
/// [`MeshCore::open`]; hand `Arc`s of the subsystems to the serving layer.
pub struct MeshCore {
    pub config: CoreConfig,
    pub local_peer_id: String,
    pub audit: AuditLog,
    pub keyring: Arc<TeamKeyring>,
    pub chat: Arc<ChatMemory>,
    pub sync: Arc<SyncEngine>,
    pub workflows: Arc<WorkflowStore>,
    pub teams: Arc<TeamStore>,
    pub permissions: Arc<PermissionEngine>,
}

impl MeshCore {
    /// Open all four databases, run idempotent schema init, and wire the
    /// subsystems together with the default local embedder.
    pub fn open(config: CoreConfig) -> CoreResult<Self> {
        Self::open_with_embedder(config, Arc::new(HashedBagEmbedder))
    }

    /// Same as [`MeshCore::open`] with a caller-provided embedding model.
    pub fn open_with_embedder(config: CoreConfig, embedder: Arc<dyn Embedder>) -> CoreResult<Self> {
        let app_db = Db::open(&config.app_db_path())?;
        let chat_db = Db::open(&config.chat_db_path())?;
        let workflows_db = Db::open(&config.workflows_db_path())?;
        let sync_db = Db::open(&sync_db_path_for(&config.app_db_path()))?;

        let peer_id = local_peer_id();
        let keyring = Arc::new(TeamKeyring::new());
        let audit = AuditLog::new(app_db.clone())?;

        let teams = Arc::new(TeamStore::new(
            app_db.clone(),
            audit.clone(),
            config.invite_max_failures,
            config.invite_window_secs,
        )?);
        let permissions = Arc::new(PermissionEngine::new(app_db.clone(), audit.clone())?);

        let sync = Arc::new(
            SyncEngine::new(app_db, sync_db, &peer_id, keyring.clone())?
                .with_membership(teams.clone()),
        );

        let chat = Arc::new(
            ChatMemory::new(
                chat_db,
                embedder,
                Duration::from_secs(config.search_cache_ttl_secs),
            )?
            .with_tracker(sync.clone()),
        );
        let workflows = Arc::new(workflow::open_store(workflows_db)?.with_tracker(sync.clone()));

        eprintln!("🔄 Collaboration core ready (peer {peer_id})");

        Ok(MeshCore {
            config,
            local_peer_id: peer_id,
            audit,
            keyring,
            chat,
            sync,
            workflows,
            teams,
            permissions,
        })
    }

    /// Start the background workers: the peer sync coordinator and the
    /// delayed-promotion sweeper. Returns their handles; call `stop()` on
    /// each for a clean shutdown.
    pub fn spawn_background(
        &self,
        directory: Arc<dyn PeerDirectory>,
        transport: Arc<dyn PeerTransport>,
    ) -> Vec<WorkerHandle> {
        let sync_worker = sync::spawn_sync_worker(
            self.sync.clone(),
            directory,
            transport,
            Duration::from_secs(self.config.sync_interval_secs),
        );
        let sweeper = teams::spawn_promotion_sweeper(
            self.teams.clone(),
            Duration::from_secs(self.config.promotion_sweep_secs),
        );
        vec![sync_worker, sweeper]
    }
}
