//! Peer identity and the persisted peer directory.
//!
//! A node introduces itself with a [`PeerIdentity`] (greeting payload)
//! and keeps a roster of [`Peer`]s per session. The only thing that
//! survives a restart is the [`PeerDirectory`]: a small JSON map from
//! peer IP address to MAC, enough to pre-populate the roster with
//! offline entries before anyone is heard from.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LanternError;
use crate::network::PeerAddr;

// ── Roles ─────────────────────────────────────────────────────────

/// Whether a node is willing to hand over its desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PeerRole {
    /// Accepts remote-control requests.
    #[default]
    Follower,

    /// Views and drives other peers, never controlled itself.
    Leader,
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerRole::Follower => write!(f, "follower"),
            PeerRole::Leader => write!(f, "leader"),
        }
    }
}

// ── Identity ──────────────────────────────────────────────────────

/// What a node says about itself when a link comes up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Human-readable name, environment-derived by default.
    pub display_name: String,

    /// Primary interface MAC, `"unknown"` when unavailable.
    pub mac: String,

    /// Whether the sender currently accepts remote control.
    pub role: PeerRole,
}

impl PeerIdentity {
    pub fn new(display_name: impl Into<String>, mac: impl Into<String>, role: PeerRole) -> Self {
        Self {
            display_name: display_name.into(),
            mac: mac.into(),
            role,
        }
    }
}

// ── Peer ──────────────────────────────────────────────────────────

/// A peer as the roster sees it.
///
/// Created on first contact, refreshed by every greeting and status
/// update, marked offline on disconnect. Entries outlive their link
/// so a status history survives reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub addr: PeerAddr,
    pub display_name: String,
    pub mac: String,
    pub role: PeerRole,
    pub status: String,
    pub online: bool,
}

impl Peer {
    /// Roster identity line: `name@ip:port // mac`.
    pub fn roster_line(&self) -> String {
        format!("{}@{} // {}", self.display_name, self.addr, self.mac)
    }
}

// ── Peer Directory ────────────────────────────────────────────────

/// Name of the on-disk directory file. The platform is embedded so a
/// home directory shared across OSes does not mix entries.
pub fn directory_filename() -> String {
    format!("peers-{}.json", std::env::consts::OS)
}

/// Persisted map of peer IP address to MAC.
///
/// Every write is a full load-merge-rewrite of the JSON file. Entries
/// are small and updates are rare (one per new greeting), so the
/// simplicity wins over an append log.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    path: PathBuf,
}

impl PeerDirectory {
    /// Directory file inside `dir`, named per platform.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(directory_filename()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All persisted entries. A missing file is an empty directory; a
    /// corrupt one is logged and treated as empty.
    pub fn load_all(&self) -> BTreeMap<String, String> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), "peer directory unreadable, starting empty: {e}");
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&text) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), "peer directory corrupt, starting empty: {e}");
                BTreeMap::new()
            }
        }
    }

    /// Merge one address→MAC entry and rewrite the file.
    pub fn upsert(&self, ip: IpAddr, mac: &str) -> Result<(), LanternError> {
        let mut entries = self.load_all();
        entries.insert(ip.to_string(), mac.to_string());
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// MAC recorded for `ip`, if any.
    pub fn lookup(&self, ip: IpAddr) -> Option<String> {
        self.load_all().remove(&ip.to_string())
    }
}

// ── Local identity ────────────────────────────────────────────────

/// The display name this node advertises: the first non-empty of
/// `USERNAME`, `USER`, `USERDOMAIN`, `HOSTNAME`, `DOMAINNAME`, else
/// `"unknown"`.
pub fn display_name() -> String {
    display_name_from(|var| std::env::var(var).ok())
}

fn display_name_from(lookup: impl Fn(&str) -> Option<String>) -> String {
    ["USERNAME", "USER", "USERDOMAIN", "HOSTNAME", "DOMAINNAME"]
        .iter()
        .find_map(|var| lookup(var).filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Primary interface MAC, or `"unknown"` when the lookup fails.
pub fn local_mac() -> String {
    match mac_address::get_mac_address() {
        Ok(Some(mac)) => mac.to_string(),
        _ => "unknown".to_string(),
    }
}
