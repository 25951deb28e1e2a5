//! Certificate path resolution.
//!
//! The utility's mTLS material lives under the state directory. The
//! server and client pairs are issued by the utility's own self-signed
//! root; generation is handled by the `certificate generate` entry
//! point outside this crate, which writes to exactly these paths.

use std::path::PathBuf;

use crate::error::Result;
use crate::paths::directory_for;

/// Locations of the mTLS certificate material.
#[derive(Debug, Clone)]
pub struct CertificatePaths {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    pub client_certificate: PathBuf,
    pub client_key: PathBuf,
}

impl CertificatePaths {
    /// Resolves the certificate paths, creating the certificates
    /// directory when missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub fn resolve() -> Result<Self> {
        Self::resolve_in(directory_for("certificates"))
    }

    /// Resolves paths under an explicit base directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub fn resolve_in(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base)?;
        Ok(Self {
            certificate: base.join("vagrant-utility.crt"),
            private_key: base.join("vagrant-utility.key"),
            client_certificate: base.join("vagrant-utility.client.crt"),
            client_key: base.join("vagrant-utility.client.key"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn resolve_creates_directory() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("certificates");
        let paths = CertificatePaths::resolve_in(&base).unwrap();
        assert!(base.is_dir());
        assert!(paths.certificate.ends_with("vagrant-utility.crt"));
        assert!(paths.client_key.ends_with("vagrant-utility.client.key"));
    }
}
