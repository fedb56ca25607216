//! Appliance discovery: per-interface listeners fanned out by a session.
//!
//! Control flow:
//!
//! ```text
//! DiscoverySession::discover(timeout)
//!  └─ netif::list()                 -- fails NoInterfacesFound if empty
//!  └─ one DiscoveryListener per interface (Tokio task)
//!       ├─ advertisement feed       -- UDP socket → mpsc channel
//!       ├─ advertiser::announce_controller
//!       └─ race: match / deadline / cancel
//!  └─ aggregate: all-or-nothing-unless-stopped
//! ```
//!
//! The aggregation policy is an inherited behavioural quirk, preserved
//! exactly: the session awaits *all* per-interface races, and any single
//! interface timing out fails the whole attempt with
//! [`DiscoveryError::Timeout`], unless [`DiscoverySession::stop`] ran
//! first, in which case the timeout
//! is swallowed and whatever devices already resolved are returned.
//! "Succeed as soon as one interface resolves" would arguably be the better
//! contract, but it is not what deployments expect today.
//!
//! Losing listeners are not raced-and-abandoned: every listener and feed
//! task holds a `watch` cancellation receiver, so `stop()` (or dropping the
//! session) lets them unwind and release their sockets deterministically.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aircon_core::protocol::request::{DISCOVERY_PORT, EXPECTED_MODEL_CODE};
use aircon_core::{DeviceAdvertisement, DeviceDescriptor};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::advertiser;
use super::netif::{self, NetworkInterfaceDescriptor};

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No usable local IPv4 interface exists; fatal to this attempt.
    #[error("no usable network interface was found")]
    NoInterfacesFound,

    /// Some interface's race ran out before a matching advertisement.
    #[error("discovery timed out after {timeout:?} with no matching advertisement")]
    Timeout { timeout: Duration },

    /// The advertisement socket could not be bound on an interface.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The controller announcement could not be sent.
    #[error("failed to send controller announcement from {address}: {source}")]
    Announce {
        address: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },
}

/// Binds an advertisement socket on `interface:port` and spawns a task that
/// forwards each parsed [`DeviceAdvertisement`] on the returned channel.
///
/// The socket is bound with `SO_REUSEADDR` so several controller processes
/// (or repeated discovery attempts racing their predecessors' unwinding
/// listeners) can share the well-known port.  The task exits when `cancel`
/// flips, when the receiver is dropped, or on a fatal socket error.
pub fn start_advertisement_feed(
    interface: Ipv4Addr,
    port: u16,
    mut cancel: watch::Receiver<bool>,
) -> Result<mpsc::Receiver<DeviceAdvertisement>, DiscoveryError> {
    let addr = SocketAddrV4::new(interface, port);
    let socket = bind_reusable(addr).map_err(|source| DiscoveryError::Bind {
        addr: SocketAddr::V4(addr),
        source,
    })?;

    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        debug!(%interface, "advertisement feed cancelled");
                        break;
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, SocketAddr::V4(source))) => {
                            let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                                continue;
                            };
                            let advertisement =
                                DeviceAdvertisement::parse(text, *source.ip());
                            if tx.send(advertisement).await.is_err() {
                                break; // listener gone
                            }
                        }
                        Ok((_, SocketAddr::V6(_))) => continue,
                        Err(error) => {
                            warn!(%interface, "advertisement socket error: {error}");
                            break;
                        }
                    }
                }
            }
        }
    });

    Ok(rx)
}

fn bind_reusable(addr: SocketAddrV4) -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&socket2::SockAddr::from(addr))?;
    UdpSocket::from_std(socket.into())
}

/// Terminal state of one per-interface listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// A matching advertisement arrived before the deadline.
    Resolved(DeviceDescriptor),
    /// No matching advertisement arrived before the deadline.
    TimedOut,
    /// An external stop request suppressed further resolution.
    Cancelled,
}

/// One-shot discovery listener for a single interface.
///
/// Lifecycle: bind the advertisement socket, send the controller
/// announcement, then race the matching advertisement against the deadline
/// and the cancellation signal.  No retries; one shot per discovery attempt.
#[derive(Debug)]
pub struct DiscoveryListener {
    interface: NetworkInterfaceDescriptor,
    port: u16,
    expected_model_code: String,
}

impl DiscoveryListener {
    pub fn new(
        interface: NetworkInterfaceDescriptor,
        port: u16,
        expected_model_code: impl Into<String>,
    ) -> Self {
        Self {
            interface,
            port,
            expected_model_code: expected_model_code.into(),
        }
    }

    /// Runs the listener to its terminal state.
    pub async fn run(
        self,
        deadline: Duration,
        cancel: watch::Receiver<bool>,
    ) -> Result<ListenerOutcome, DiscoveryError> {
        if *cancel.borrow() {
            return Ok(ListenerOutcome::Cancelled);
        }
        let feed = start_advertisement_feed(self.interface.address, self.port, cancel.clone())?;
        advertiser::announce_controller(self.interface.address, self.port)
            .await
            .map_err(|source| DiscoveryError::Announce {
                address: self.interface.address,
                source,
            })?;
        Ok(self.run_with_feed(feed, deadline, cancel).await)
    }

    /// Races the advertisement feed against the deadline and cancellation.
    ///
    /// Public so callers (and tests) can supply their own advertisement
    /// source; `run` wires up the UDP-backed one.
    pub async fn run_with_feed(
        self,
        mut feed: mpsc::Receiver<DeviceAdvertisement>,
        deadline: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> ListenerOutcome {
        let sleep = tokio::time::sleep(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => {
                    debug!(interface = %self.interface.address, "listener deadline elapsed");
                    return ListenerOutcome::TimedOut;
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return ListenerOutcome::Cancelled;
                    }
                }
                advertisement = feed.recv() => match advertisement {
                    Some(adv) if adv.matches(&self.expected_model_code) => {
                        match DeviceDescriptor::from_advertisement(&adv) {
                            Some(descriptor) => {
                                info!(
                                    mac = %descriptor.mac,
                                    ip = %descriptor.ip,
                                    "appliance resolved"
                                );
                                return ListenerOutcome::Resolved(descriptor);
                            }
                            // A matching advertisement without a MAC cannot
                            // key a session; keep listening.
                            None => warn!("matching advertisement without MAC address"),
                        }
                    }
                    Some(adv) => {
                        debug!(model = ?adv.model_code, "ignoring foreign advertisement");
                    }
                    None => return ListenerOutcome::Cancelled,
                }
            }
        }
    }
}

/// Fans a discovery attempt out across all usable interfaces.
///
/// A session is one-shot with respect to [`stop`](Self::stop): once stopped
/// it stays stopped, matching the semantics of the deployed controller.
pub struct DiscoverySession {
    port: u16,
    expected_model_code: String,
    stopped: Arc<AtomicBool>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Default for DiscoverySession {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoverySession {
    pub fn new() -> Self {
        Self::with_port(DISCOVERY_PORT)
    }

    /// A session listening and announcing on a non-standard port.
    pub fn with_port(port: u16) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            port,
            expected_model_code: EXPECTED_MODEL_CODE.to_owned(),
            stopped: Arc::new(AtomicBool::new(false)),
            cancel_tx,
            cancel_rx,
        }
    }

    /// Discovers appliances on every usable interface.
    ///
    /// Fails immediately with [`DiscoveryError::NoInterfacesFound`] if the
    /// enumerator returns nothing; otherwise applies the
    /// all-or-nothing-unless-stopped policy described at module level.
    pub async fn discover(
        &self,
        timeout: Duration,
    ) -> Result<Vec<DeviceDescriptor>, DiscoveryError> {
        self.discover_on(netif::list(), timeout).await
    }

    /// Discovery over an explicit interface list; [`discover`](Self::discover)
    /// feeds it the enumerated system interfaces.
    pub async fn discover_on(
        &self,
        interfaces: Vec<NetworkInterfaceDescriptor>,
        timeout: Duration,
    ) -> Result<Vec<DeviceDescriptor>, DiscoveryError> {
        if interfaces.is_empty() {
            return Err(DiscoveryError::NoInterfacesFound);
        }

        info!(
            interfaces = interfaces.len(),
            ?timeout,
            "starting discovery fan-out"
        );

        let mut handles = Vec::with_capacity(interfaces.len());
        for interface in interfaces {
            let listener =
                DiscoveryListener::new(interface, self.port, self.expected_model_code.clone());
            let cancel = self.cancel_rx.clone();
            handles.push(tokio::spawn(listener.run(timeout, cancel)));
        }

        // Await every per-interface race; losers are not cancelled by a
        // winner, they settle on their own (§ module docs).
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                // Socket setup failures on one interface are not in the
                // caller-facing taxonomy; that interface simply contributes
                // no device.
                Ok(Err(error)) => warn!("discovery listener failed: {error}"),
                Err(join_error) => warn!("discovery listener task panicked: {join_error}"),
            }
        }

        aggregate(outcomes, self.stopped.load(Ordering::Relaxed), timeout)
    }

    /// Requests a stop: flips the stopped flag and cancels every listener
    /// and advertisement feed.  In-flight waits are not interrupted; they
    /// unwind to `Cancelled` and are ignored at aggregation.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        let _ = self.cancel_tx.send(true);
        info!("discovery stop requested");
    }
}

/// The all-or-nothing-unless-stopped aggregation rule (kept separate from
/// the task plumbing so the policy itself is directly testable).
fn aggregate(
    outcomes: Vec<ListenerOutcome>,
    stopped: bool,
    timeout: Duration,
) -> Result<Vec<DeviceDescriptor>, DiscoveryError> {
    let mut devices = Vec::new();
    let mut timed_out = false;
    for outcome in outcomes {
        match outcome {
            ListenerOutcome::Resolved(descriptor) => devices.push(descriptor),
            ListenerOutcome::TimedOut => timed_out = true,
            ListenerOutcome::Cancelled => {}
        }
    }
    if timed_out && !stopped {
        return Err(DiscoveryError::Timeout { timeout });
    }
    Ok(devices)
}
