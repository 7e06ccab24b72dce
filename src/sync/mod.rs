//! P2P offline sync engine.
//!
//! A vector-clock-ordered operation log replicated between peers over HTTP.
//! Local mutations of allowlisted tables are tracked as `SyncOperation`s; a
//! periodic coordinator exchanges unsynced deltas with discovered peers and
//! applies incoming operations with Last-Write-Wins conflict resolution.

mod engine;
pub mod store;
pub mod tables;
mod transport;

pub use engine::SyncEngine;
pub use transport::{HttpTransport, PeerTransport};

use crate::discovery::PeerDirectory;
use crate::worker::WorkerHandle;
use std::sync::Arc;
use std::time::Duration;

/// Spawn the sync coordinator: every `interval`, exchange deltas with every
/// known peer. Failures are per-peer; one unreachable peer never blocks the
/// others.
pub fn spawn_sync_worker(
    engine: Arc<SyncEngine>,
    directory: Arc<dyn PeerDirectory>,
    transport: Arc<dyn PeerTransport>,
    interval: Duration,
) -> WorkerHandle {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            for peer in directory.known_peers() {
                if peer.peer_id == engine.local_peer_id() {
                    continue;
                }
                match engine
                    .sync_with_peer(transport.as_ref(), directory.as_ref(), &peer.peer_id, None)
                    .await
                {
                    Ok(state) => {
                        if state.operations_sent > 0 || state.operations_received > 0 {
                            eprintln!("🔄 Synced with peer {}", peer.peer_id);
                        }
                    }
                    Err(e) => {
                        eprintln!("⚠️ Sync with {} failed: {e}", peer.peer_id);
                    }
                }
            }
        }
    });
    WorkerHandle::new(shutdown_tx, handle)
}
