//! UDP peer discovery: a periodic identity beacon plus a listener.
//!
//! Every node broadcasts `[display_name, listen_port]` on a fixed UDP
//! port and listens on the same port. Hearing an announcement that is
//! not its own echo produces a [`Sighting`]; the session layer decides
//! whether to dial. Send failures are absorbed and retried forever at
//! the same cadence, with the broadcast target list recomputed from
//! the live interfaces after any failure (survives sleep/wake and VPN
//! flips without a restart).

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use local_ip_address::list_afinet_netifas;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::codec::datagram::Announcement;
use crate::error::LanternError;
use crate::network::PeerAddr;

/// UDP port every node announces on and listens to.
pub const DISCOVERY_PORT: u16 = 45000;

/// Default beacon cadence.
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(2000);

/// What the discovery beacon advertises.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Name broadcast to the network.
    pub display_name: String,

    /// TCP session port being advertised.
    pub listen_port: u16,

    /// UDP port to announce on, [`DISCOVERY_PORT`] unless overridden.
    pub discovery_port: u16,

    /// Beacon cadence.
    pub interval: Duration,
}

impl DiscoveryConfig {
    pub fn new(display_name: impl Into<String>, listen_port: u16) -> Self {
        Self {
            display_name: display_name.into(),
            listen_port,
            discovery_port: DISCOVERY_PORT,
            interval: BROADCAST_INTERVAL,
        }
    }
}

/// A peer heard on the discovery port.
///
/// `addr` pairs the datagram's source IP with the peer's *advertised*
/// TCP port, which is where a session connect should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub addr: PeerAddr,
    pub display_name: String,
}

/// Beacon and listener, run as one task over one socket.
pub struct DiscoveryService {
    config: DiscoveryConfig,
    running: Arc<AtomicBool>,
}

impl DiscoveryService {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Handle for stopping the service from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Broadcast and listen until stopped. Failing to bind the
    /// discovery port is fatal; everything after that is absorbed.
    pub async fn run(&self, sightings: mpsc::Sender<Sighting>) -> Result<(), LanternError> {
        let socket = bind_discovery_socket(self.config.discovery_port)?;
        info!(port = self.config.discovery_port, "discovery listening");

        let wire =
            Announcement::new(self.config.display_name.clone(), self.config.listen_port)
                .to_datagram()?;

        let mut targets = broadcast_targets();
        let mut local = local_addrs();
        let mut beacon = tokio::time::interval(self.config.interval);
        beacon.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; 2048];

        loop {
            tokio::select! {
                _ = beacon.tick() => {
                    let mut failed = false;
                    for target in &targets {
                        let dest = SocketAddr::new(IpAddr::V4(*target), self.config.discovery_port);
                        if let Err(e) = socket.send_to(&wire, dest).await {
                            debug!(%dest, "beacon send failed: {e}");
                            failed = true;
                        }
                    }
                    if failed {
                        // Interface set may have changed; recompute
                        // before the next tick.
                        targets = broadcast_targets();
                        local = local_addrs();
                    }
                }
                result = socket.recv_from(&mut buf) => {
                    let (n, source) = match result {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!("discovery receive failed: {e}");
                            continue;
                        }
                    };
                    let announcement = match Announcement::from_datagram(&buf[..n]) {
                        Ok(a) => a,
                        Err(e) => {
                            debug!(%source, "dropped malformed announcement: {e}");
                            continue;
                        }
                    };
                    if is_own_echo(source, announcement.port, &local, self.config.listen_port) {
                        continue;
                    }
                    let sighting = Sighting {
                        addr: PeerAddr::new(source.ip(), announcement.port),
                        display_name: announcement.display_name,
                    };
                    if sightings.send(sighting).await.is_err() {
                        break;
                    }
                }
                _ = wait_for_stop(self.running.clone()) => break,
            }
        }

        info!("discovery stopped");
        Ok(())
    }
}

async fn wait_for_stop(running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Bind the shared discovery port with address reuse, so several nodes
/// on one machine can all hear the broadcasts.
fn bind_discovery_socket(port: u16) -> Result<UdpSocket, LanternError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Broadcast targets: each non-loopback IPv4 interface's /24 directed
/// broadcast, plus the limited broadcast address.
fn broadcast_targets() -> Vec<Ipv4Addr> {
    let mut targets = vec![Ipv4Addr::BROADCAST];
    match list_afinet_netifas() {
        Ok(interfaces) => {
            for (_name, ip) in interfaces {
                if let IpAddr::V4(v4) = ip {
                    if !v4.is_loopback() {
                        let o = v4.octets();
                        targets.push(Ipv4Addr::new(o[0], o[1], o[2], 255));
                    }
                }
            }
        }
        Err(e) => warn!("interface enumeration failed: {e}"),
    }
    targets.sort_unstable();
    targets.dedup();
    targets
}

/// Addresses that count as "this machine" for echo suppression.
/// Loopback is always in the set: broadcasts loop back locally.
fn local_addrs() -> HashSet<IpAddr> {
    let mut addrs = HashSet::from([IpAddr::V4(Ipv4Addr::LOCALHOST)]);
    if let Ok(interfaces) = list_afinet_netifas() {
        addrs.extend(interfaces.into_iter().map(|(_name, ip)| ip));
    }
    addrs
}

/// An announcement is this node's own echo only when it came from a
/// local address *and* advertises this node's own listening port. Two
/// nodes sharing a machine differ in port and still see each other.
fn is_own_echo(
    source: SocketAddr,
    advertised_port: u16,
    local: &HashSet<IpAddr>,
    own_port: u16,
) -> bool {
    advertised_port == own_port && local.contains(&source.ip())
}
