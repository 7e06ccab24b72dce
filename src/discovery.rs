//! Peer identity and discovery.
//!
//! The local peer id is derived once from a stable machine identifier so it
//! survives reboots. Peer addresses come from a `PeerDirectory`; the static
//! in-process registry covers embedders and tests, and the mesh service can
//! additionally be advertised over mDNS for LAN discovery.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;

const SERVICE_TYPE: &str = "_teammesh._tcp.local.";

/// Derive the local peer id: SHA-256 of the machine hostname, truncated to
/// 16 hex chars. Stable across restarts on the same device.
pub fn local_peer_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    let digest = Sha256::digest(host.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeerAddr {
    pub peer_id: String,
    pub host: String,
    pub port: u16,
}

pub trait PeerDirectory: Send + Sync {
    fn get_peer_by_id(&self, peer_id: &str) -> Option<PeerAddr>;
    fn known_peers(&self) -> Vec<PeerAddr>;
}

/// In-process peer registry.
pub struct StaticPeerDirectory {
    peers: RwLock<HashMap<String, PeerAddr>>,
}

impl Default for StaticPeerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticPeerDirectory {
    pub fn new() -> Self {
        StaticPeerDirectory {
            peers: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_peer(&self, peer: PeerAddr) {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.insert(peer.peer_id.clone(), peer);
    }

    pub fn remove_peer(&self, peer_id: &str) {
        let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
        peers.remove(peer_id);
    }
}

impl PeerDirectory for StaticPeerDirectory {
    fn get_peer_by_id(&self, peer_id: &str) -> Option<PeerAddr> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.get(peer_id).cloned()
    }

    fn known_peers(&self) -> Vec<PeerAddr> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.values().cloned().collect()
    }
}

/// Holds the mDNS daemon handle for graceful shutdown
pub struct MdnsHandle {
    daemon: mdns_sd::ServiceDaemon,
    fullname: String,
}

impl MdnsHandle {
    pub fn fullname(&self) -> &str {
        &self.fullname
    }
}

impl Drop for MdnsHandle {
    fn drop(&mut self) {
        let _ = self.daemon.unregister(&self.fullname);
        let _ = self.daemon.shutdown();
    }
}

/// Advertise this node's mesh sync endpoint over mDNS.
/// Returns a handle that keeps the service registered until dropped.
pub fn advertise_mesh(port: u16, peer_id: &str) -> Result<MdnsHandle, String> {
    let mdns = mdns_sd::ServiceDaemon::new().map_err(|e| format!("mDNS daemon: {e}"))?;

    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());

    let host_fqdn = if host.ends_with(".local.") {
        host.clone()
    } else if host.ends_with(".local") {
        format!("{host}.")
    } else {
        format!("{host}.local.")
    };

    let ip = local_ip_address::local_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string());

    let mut properties = HashMap::new();
    properties.insert("peer_id".to_string(), peer_id.to_string());
    properties.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());
    properties.insert("path".to_string(), "/api/v1/mesh".to_string());
    properties.insert("protocol".to_string(), "http".to_string());

    let service_info = mdns_sd::ServiceInfo::new(
        SERVICE_TYPE,
        peer_id,
        &host_fqdn,
        &ip,
        port,
        Some(properties),
    )
    .map_err(|e| format!("mDNS service info: {e}"))?;

    let fullname = service_info.get_fullname().to_string();

    mdns.register(service_info)
        .map_err(|e| format!("mDNS register: {e}"))?;

    Ok(MdnsHandle { daemon: mdns, fullname })
}

/// Service type constant for discovery clients
pub fn service_type() -> &'static str {
    SERVICE_TYPE
}
