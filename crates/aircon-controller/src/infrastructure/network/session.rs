//! The TLS device session: one connection to one appliance.
//!
//! Architecture (mirrors the discovery side: socket → channel → state):
//!
//! - `DeviceSession` owns the TLS control channel to the device.
//! - Inbound lines are classified by `aircon_core::classify_line` and folded
//!   into a single-writer [`SessionCore`] (the handshake state machine plus
//!   the converging [`DeviceState`]).
//! - Outbound request lines go through an `mpsc` channel to a writer task.
//! - Callers block on state transitions via a `Notify` keyed wait: the
//!   observable contract of the deployed controller's polling loops, without
//!   the fixed poll interval.
//!
//! # The handshake (for beginners)
//!
//! The appliance never waits to be asked; right after TLS it starts talking:
//!
//! ```text
//! Device                                   Controller
//! ──────                                   ──────────
//! DRC-1.00
//! <Update Type="InvalidateAccount"/>
//!                      token known ──►     <Request Type="AuthToken">...
//!                   no token known ──►     <Request Type="GetToken" />
//! <Response Type="GetToken" Status="Ready"/>   (user power-cycles device)
//! <Update Type="GetToken" Status="Completed" Token="..."/>
//! -- or --
//! <Response Type="AuthToken" Status="Okay"/>
//! -- or --
//! <Response Status="Fail" Type="Authenticate" ErrorCode="301" />
//! ```
//!
//! There is no request/response id anywhere, so every response is correlated
//! purely by the state the session is in when the line arrives.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aircon_core::domain::climate::{
    FanLevel, OperationMode, ATTR_OPERATION_MODE, ATTR_POWER, ATTR_TEMPERATURE_SET,
    ATTR_WIND_LEVEL,
};
use aircon_core::protocol::request::{self, CONTROL_PORT};
use aircon_core::{classify_line, DeviceDescriptor, DeviceState, LineEvent};
use openssl::error::ErrorStack;
use openssl::pkcs12::Pkcs12;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use rand::Rng;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infrastructure::certificate::{CertificateError, CertificateProvider};

/// Cipher policy for the appliance's legacy TLS stack: modern defaults are
/// rejected outright, and its ephemeral-DH keys are too small for current
/// OpenSSL, so weak-DH and anonymous suites are excluded explicitly.
const CIPHER_LIST: &str = "HIGH:!DH:!aNULL";

/// Message shown while pairing waits on the physical power-cycle.
const PAIRING_MESSAGE: &str =
    "pairing armed: power the device off and on within the next 30 seconds";

/// Error type for device-session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The TCP/TLS establishment exceeded its deadline.
    #[error("connection attempt to {addr} timed out after {timeout:?}")]
    ConnectTimeout {
        addr: std::net::SocketAddr,
        timeout: Duration,
    },

    /// The TCP connection could not be opened.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Local TLS setup failed (connector construction, identity parsing).
    #[error("TLS setup failed: {0}")]
    Tls(#[from] ErrorStack),

    /// The TLS handshake with the device failed.
    #[error("TLS handshake with {addr} failed: {source}")]
    Handshake {
        addr: std::net::SocketAddr,
        #[source]
        source: openssl::ssl::Error,
    },

    /// The transport closed before a voluntary disconnect.
    #[error("device hung up unexpectedly")]
    UnexpectedHangUp,

    /// A control operation was invoked with no established transport.
    #[error("not connected to the device")]
    NotConnected,

    /// The device explicitly rejected authentication; terminal for this
    /// session.
    #[error("device rejected authentication (error code {error_code})")]
    AuthenticationFailed { error_code: String },

    /// The client certificate could not be obtained.
    #[error(transparent)]
    Certificate(#[from] CertificateError),
}

/// Handshake phase of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakePhase {
    AwaitingGreeting,
    AuthenticatingNoToken,
    AuthenticatingWithToken,
    LoggedIn,
    AuthFailed,
}

/// The single-writer state machine: all mutation happens on the
/// line-delivery path, one line at a time, in arrival order.
struct SessionCore {
    token: Option<String>,
    phase: HandshakePhase,
    state: DeviceState,
    auth_error_code: String,
}

impl SessionCore {
    fn new(token: Option<String>) -> Self {
        Self {
            token,
            phase: HandshakePhase::AwaitingGreeting,
            state: DeviceState::default(),
            auth_error_code: String::new(),
        }
    }

    /// Folds one inbound line into the session state.
    ///
    /// Returns the outbound request line this event demands, if any.
    /// Unrecognized lines are forward-compatible no-ops.
    fn handle_line(&mut self, line: &str) -> Option<String> {
        let event = classify_line(line)?;
        debug!(?event, "control line");
        match event {
            LineEvent::Greeting => None,
            LineEvent::InvalidateAccount => match &self.token {
                Some(token) => {
                    self.phase = HandshakePhase::AuthenticatingWithToken;
                    Some(request::auth_token(token))
                }
                None => {
                    self.phase = HandshakePhase::AuthenticatingNoToken;
                    Some(request::get_token())
                }
            },
            LineEvent::GetTokenReady => {
                self.state.waiting = true;
                self.state.message = PAIRING_MESSAGE.to_owned();
                None
            }
            LineEvent::AuthFailure { error_code } => {
                self.state.login_success = false;
                self.state.waiting = false;
                self.state.message =
                    format!("authentication rejected by device (error code {error_code})");
                self.auth_error_code = error_code;
                self.phase = HandshakePhase::AuthFailed;
                None
            }
            LineEvent::GetTokenCompleted { token } => {
                self.token = Some(token);
                self.state.login_success = true;
                self.state.waiting = false;
                self.phase = HandshakePhase::LoggedIn;
                None
            }
            LineEvent::AuthSuccess => {
                self.state.login_success = true;
                self.state.waiting = false;
                self.state.pending_status = false;
                self.phase = HandshakePhase::LoggedIn;
                None
            }
            LineEvent::StatusUpdate { id, value } => {
                self.state.merge_attribute(id, value);
                None
            }
            LineEvent::DeviceStateResponse { attributes } => {
                self.state.merge_attributes(attributes);
                self.state.pending_status = false;
                self.state.message.clear();
                None
            }
        }
    }
}

/// State shared between the session handle and its pump tasks.
struct SessionShared {
    core: Mutex<SessionCore>,
    /// Signalled after every processed line and on transport loss.
    changed: Notify,
    connected: AtomicBool,
    hung_up: AtomicBool,
    voluntary_disconnect: AtomicBool,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    /// Reader and writer pump tasks of the current transport; aborted on
    /// disconnect so the transport halves are dropped and no further line
    /// can mutate the core.
    pump_tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// One authenticated, encrypted session with one appliance.
pub struct DeviceSession {
    descriptor: DeviceDescriptor,
    shared: Arc<SessionShared>,
}

impl DeviceSession {
    /// Creates a session for `descriptor`.  `token` is the stored session
    /// credential; `None` selects the pairing flow on connect.
    pub fn new(descriptor: DeviceDescriptor, token: Option<String>) -> Self {
        // An empty token means "no token": the environment variable and the
        // config file both default to empty strings.
        let token = token.filter(|t| !t.is_empty());
        Self {
            descriptor,
            shared: Arc::new(SessionShared {
                core: Mutex::new(SessionCore::new(token)),
                changed: Notify::new(),
                connected: AtomicBool::new(false),
                hung_up: AtomicBool::new(false),
                voluntary_disconnect: AtomicBool::new(false),
                outbound: Mutex::new(None),
                pump_tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// The current session token: the externally supplied one, or the one
    /// obtained by a completed pairing flow.
    pub async fn token(&self) -> Option<String> {
        self.shared.core.lock().await.token.clone()
    }

    /// A snapshot of the current device state.
    pub async fn state(&self) -> DeviceState {
        self.shared.core.lock().await.state.clone()
    }

    /// Opens the TLS control channel and starts the line pump.
    ///
    /// The whole establishment (certificate, TCP, TLS handshake) races
    /// against `timeout`; on timeout or failure no partial session is left
    /// usable.
    pub async fn connect(
        &self,
        certificates: &CertificateProvider,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let addr = std::net::SocketAddr::new(self.descriptor.ip.into(), CONTROL_PORT);
        match tokio::time::timeout(timeout, self.connect_inner(certificates, addr)).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::ConnectTimeout { addr, timeout }),
        }
    }

    async fn connect_inner(
        &self,
        certificates: &CertificateProvider,
        addr: std::net::SocketAddr,
    ) -> Result<(), SessionError> {
        let identity = certificates.certificate().await?;
        let connector = build_connector(&identity)?;

        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|source| SessionError::Connect { addr, source })?;

        let mut config = connector.configure()?;
        config.set_use_server_name_indication(false);
        config.set_verify_hostname(false);
        let ssl = config.into_ssl(&self.descriptor.ip.to_string())?;
        let mut stream = tokio_openssl::SslStream::new(ssl, tcp)?;
        Pin::new(&mut stream)
            .connect()
            .await
            .map_err(|source| SessionError::Handshake { addr, source })?;

        info!(%addr, mac = %self.descriptor.mac, "TLS control channel established");
        self.attach(stream).await;
        Ok(())
    }

    /// Wires the session to an established line transport and starts the
    /// reader and writer tasks.  [`connect`](Self::connect) calls this with
    /// the TLS stream; anything `AsyncRead + AsyncWrite` works.
    pub async fn attach<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let (out_tx, mut out_rx) = mpsc::channel::<String>(16);

        // Replacing the transport: any previous pump tasks go first.
        let mut pump_tasks = self.shared.pump_tasks.lock().await;
        for task in pump_tasks.drain(..) {
            task.abort();
        }

        *self.shared.outbound.lock().await = Some(out_tx);
        self.shared.hung_up.store(false, Ordering::SeqCst);
        self.shared.voluntary_disconnect.store(false, Ordering::SeqCst);
        self.shared.connected.store(true, Ordering::SeqCst);

        // Writer: every request line goes out CRLF-terminated.
        let writer = tokio::spawn(async move {
            while let Some(line) = out_rx.recv().await {
                debug!(%line, "sending request");
                if let Err(error) = write_half.write_all(format!("{line}\r\n").as_bytes()).await
                {
                    warn!("control channel write failed: {error}");
                    break;
                }
            }
        });

        // Reader: the single writer of SessionCore.
        let shared = Arc::clone(&self.shared);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let outbound = shared.core.lock().await.handle_line(&line);
                        if let Some(request_line) = outbound {
                            let sender = shared.outbound.lock().await.clone();
                            if let Some(sender) = sender {
                                let _ = sender.send(request_line).await;
                            }
                        }
                        shared.changed.notify_waiters();
                    }
                    Ok(None) => break,
                    Err(error) => {
                        warn!("control channel read failed: {error}");
                        break;
                    }
                }
            }
            shared.connected.store(false, Ordering::SeqCst);
            if !shared.voluntary_disconnect.load(Ordering::SeqCst) {
                shared.hung_up.store(true, Ordering::SeqCst);
            }
            *shared.outbound.lock().await = None;
            shared.changed.notify_waiters();
        });

        pump_tasks.push(writer);
        pump_tasks.push(reader);
    }

    /// Voluntarily tears the session down: aborts the pump tasks so the
    /// transport halves are dropped and closed, and no line arriving after
    /// this call can still mutate the session state.
    pub async fn disconnect(&self) {
        self.shared.voluntary_disconnect.store(true, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        // Same lock order as `attach`: pump_tasks, then outbound.
        for task in self.shared.pump_tasks.lock().await.drain(..) {
            task.abort();
        }
        *self.shared.outbound.lock().await = None;
        self.shared.changed.notify_waiters();
    }

    /// Blocks until the handshake reached the logged-in state.
    pub async fn wait_for_login(&self) -> Result<(), SessionError> {
        self.wait_until(|core| core.state.login_success).await
    }

    /// Fetches the full device state.
    ///
    /// Waits for login, marks the status pending, sends exactly one
    /// DeviceState request keyed by the device MAC, waits until the response
    /// has been merged, and returns the resulting snapshot.
    pub async fn fetch_status(&self) -> Result<DeviceState, SessionError> {
        self.wait_until(|core| core.state.login_success).await?;
        self.shared.core.lock().await.state.pending_status = true;
        self.send(request::device_state(&self.descriptor.mac)).await?;
        self.wait_until(|core| !core.state.pending_status).await?;
        Ok(self.shared.core.lock().await.state.clone())
    }

    /// Sends a DeviceControl request for one attribute/value pair.
    ///
    /// No acknowledgment is awaited: the resulting state change, if any,
    /// arrives asynchronously via a later status line.
    pub async fn device_control(
        &self,
        attribute_id: &str,
        value: &str,
    ) -> Result<(), SessionError> {
        self.wait_until(|core| core.state.login_success).await?;
        let command_id: u32 = rand::rng().random_range(0..=10_000);
        self.send(request::device_control(
            &self.descriptor.mac,
            command_id,
            attribute_id,
            value,
        ))
        .await
    }

    /// Switches the appliance on or off.
    pub async fn set_power(&self, on: bool) -> Result<(), SessionError> {
        self.device_control(ATTR_POWER, if on { "On" } else { "Off" })
            .await
    }

    /// Sets the temperature setpoint in degrees Celsius.
    pub async fn set_temperature(&self, celsius: u8) -> Result<(), SessionError> {
        self.device_control(ATTR_TEMPERATURE_SET, &celsius.to_string())
            .await
    }

    /// Sets the fan level.
    pub async fn set_fan_level(&self, level: FanLevel) -> Result<(), SessionError> {
        self.device_control(ATTR_WIND_LEVEL, level.as_str()).await
    }

    /// Sets the operation mode.
    pub async fn set_mode(&self, mode: OperationMode) -> Result<(), SessionError> {
        self.device_control(ATTR_OPERATION_MODE, mode.as_str()).await
    }

    /// Suspends until `predicate` holds over the session core.
    ///
    /// Fails with [`SessionError::NotConnected`] when no transport was ever
    /// attached, [`SessionError::UnexpectedHangUp`] when the transport
    /// closed underneath us, and [`SessionError::AuthenticationFailed`]
    /// when the handshake ended in the terminal failure state (the
    /// predicate could otherwise never come true).
    async fn wait_until<F>(&self, predicate: F) -> Result<(), SessionError>
    where
        F: Fn(&SessionCore) -> bool,
    {
        loop {
            // Arm the notification before checking, so a transition between
            // the check and the await is not lost.  `notify_waiters` only
            // reaches futures that are already enabled.
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let core = self.shared.core.lock().await;
                if predicate(&core) {
                    return Ok(());
                }
                if core.phase == HandshakePhase::AuthFailed {
                    return Err(SessionError::AuthenticationFailed {
                        error_code: core.auth_error_code.clone(),
                    });
                }
            }
            if !self.shared.connected.load(Ordering::SeqCst) {
                return if self.shared.hung_up.load(Ordering::SeqCst) {
                    Err(SessionError::UnexpectedHangUp)
                } else {
                    Err(SessionError::NotConnected)
                };
            }
            notified.await;
        }
    }

    async fn send(&self, line: String) -> Result<(), SessionError> {
        let sender = self.shared.outbound.lock().await.clone();
        let Some(sender) = sender else {
            return Err(SessionError::NotConnected);
        };
        sender.send(line).await.map_err(|_| SessionError::NotConnected)
    }
}

/// Builds the TLS connector: client identity from the PKCS#12 blob, server
/// verification disabled (the vendor chain is self-signed on purpose), and
/// the legacy cipher policy.
fn build_connector(identity_der: &[u8]) -> Result<SslConnector, ErrorStack> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    builder.set_verify(SslVerifyMode::NONE);
    builder.set_cipher_list(CIPHER_LIST)?;

    let parsed = Pkcs12::from_der(identity_der)?.parse2("")?;
    if let Some(cert) = &parsed.cert {
        builder.set_certificate(cert)?;
    }
    if let Some(pkey) = &parsed.pkey {
        builder.set_private_key(pkey)?;
    }
    if let Some(chain) = parsed.ca {
        for cert in chain {
            builder.add_extra_chain_cert(cert)?;
        }
    }
    Ok(builder.build())
}
