//! The pinned client-certificate bundle.
//!
//! The appliance authenticates the controller with a fixed PKCS#12 identity
//! shipped alongside the application (`ac14k_m.pfx` by default).  The blob
//! is read once and cached for the process lifetime; it is immutable after
//! load and safe to share read-only across every device session.  There is
//! no invalidation path; replacing the file requires a restart.
//!
//! Passed explicitly into each session rather than living in an ambient
//! global, so tests and multi-controller setups can carry their own.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

/// Error type for certificate access.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The backing resource could not be read; fatal to all connection
    /// attempts until resolved.
    #[error("client certificate at {path} is unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Load-once-cache-forever provider of the PKCS#12 identity blob.
pub struct CertificateProvider {
    path: PathBuf,
    blob: OnceCell<Arc<Vec<u8>>>,
}

impl CertificateProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            blob: OnceCell::new(),
        }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the certificate blob, reading the backing file on first call
    /// and serving the cached copy (no I/O) afterwards.
    pub async fn certificate(&self) -> Result<Arc<Vec<u8>>, CertificateError> {
        let blob = self
            .blob
            .get_or_try_init(|| async {
                let bytes = tokio::fs::read(&self.path).await.map_err(|source| {
                    CertificateError::Unavailable {
                        path: self.path.clone(),
                        source,
                    }
                })?;
                info!(path = %self.path.display(), len = bytes.len(), "client certificate loaded");
                Ok(Arc::new(bytes))
            })
            .await?;
        Ok(Arc::clone(blob))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let provider = CertificateProvider::new("/nonexistent/ac14k_m.pfx");
        let error = provider.certificate().await.expect_err("missing file");
        assert!(matches!(error, CertificateError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_blob_is_read_once_and_cached() {
        let path = std::env::temp_dir().join(format!(
            "aircon-cert-test-{}.pfx",
            std::process::id()
        ));
        tokio::fs::write(&path, b"pkcs12-bytes").await.unwrap();

        let provider = CertificateProvider::new(&path);
        let first = provider.certificate().await.unwrap();
        assert_eq!(first.as_slice(), b"pkcs12-bytes");

        // Remove the backing file: the cached blob must still be served.
        tokio::fs::remove_file(&path).await.unwrap();
        let second = provider.certificate().await.unwrap();
        assert_eq!(second.as_slice(), b"pkcs12-bytes");
    }
}
