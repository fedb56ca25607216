//! Aircon-Over-LAN controller entry point.
//!
//! Wires together configuration, the certificate provider, discovery, and
//! the device session, then prints the fetched device state as JSON.
//!
//! ```text
//! main()
//!  └─ ControllerConfig::load()        -- aircon.toml, all fields optional
//!  └─ CertificateProvider::new()      -- pinned PKCS#12 identity
//!  └─ acquire_device::run()           -- discover → connect → logged in
//!  └─ session.fetch_status()          -- full DeviceState snapshot
//! ```

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use aircon_controller::application::acquire_device;
use aircon_controller::infrastructure::certificate::CertificateProvider;
use aircon_controller::infrastructure::storage::config::ControllerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        PathBuf::from(std::env::var("AIRCON_CONFIG").unwrap_or_else(|_| "aircon.toml".into()));
    let config = ControllerConfig::load(&config_path)?;

    // Initialise structured logging.  `RUST_LOG` overrides the config level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!("Aircon-Over-LAN controller starting");

    let certificates = CertificateProvider::new(config.certificate_path.clone());
    let session = acquire_device::run(&config, &certificates).await?;

    let status = session.fetch_status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);

    if let Some(token) = session.token().await {
        // A completed pairing flow yields a fresh credential the user must
        // persist for the next run.
        info!(%token, "session token");
    }

    session.disconnect().await;
    Ok(())
}
