//! AcquireDeviceUseCase: from an empty network to a logged-in session.
//!
//! Orchestrates the full happy path: discover the appliance on every usable
//! interface, take the first resolved device, open the TLS control channel,
//! and hand the connected session to the caller.  Retry policy is left to
//! the caller; every step fails with exactly one taxonomy error.

use thiserror::Error;
use tracing::info;

use crate::infrastructure::certificate::CertificateProvider;
use crate::infrastructure::network::discovery::{DiscoveryError, DiscoverySession};
use crate::infrastructure::network::session::{DeviceSession, SessionError};
use crate::infrastructure::storage::config::ControllerConfig;

/// Error type for the acquire-device use case.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Discovery finished without error but resolved no device (only
    /// possible after an explicit stop).
    #[error("discovery resolved no device")]
    NoDeviceResolved,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Discovers the appliance and connects an authenticated session to it.
pub async fn run(
    config: &ControllerConfig,
    certificates: &CertificateProvider,
) -> Result<DeviceSession, AcquireError> {
    let discovery = DiscoverySession::with_port(config.discovery.port);
    let mut devices = discovery.discover(config.discovery_timeout()).await?;
    let Some(descriptor) = devices.drain(..).next() else {
        return Err(AcquireError::NoDeviceResolved);
    };
    info!(mac = %descriptor.mac, ip = %descriptor.ip, "connecting to appliance");

    let session = DeviceSession::new(descriptor, config.effective_token());
    session.connect(certificates, config.connect_timeout()).await?;
    Ok(session)
}
