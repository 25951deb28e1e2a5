//! TLS configuration for the mutually authenticated API listener.
//!
//! The server certificate doubles as the root of trust: both the
//! server pair and the orchestrator's client pair are issued by the
//! utility's self-signed CA, so the same certificate populates the
//! client verification pool.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use vmgate_utility::certificate::CertificatePaths;

use crate::server::{Result, ServerError};

/// Builds the server TLS configuration requiring verified client
/// certificates.
///
/// # Errors
///
/// Returns an error when the certificate material cannot be loaded.
pub fn load_tls_config(paths: &CertificatePaths) -> Result<Arc<ServerConfig>> {
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut BufReader::new(File::open(&paths.certificate)?))
            .collect::<std::result::Result<_, _>>()?;
    if certs.is_empty() {
        return Err(ServerError::Tls(
            "failed to properly load certificate".to_string(),
        ));
    }
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(&paths.private_key)?))?
        .ok_or_else(|| ServerError::Tls("no private key found".to_string()))?;

    let mut roots = RootCertStore::empty();
    for cert in &certs {
        roots
            .add(cert.clone())
            .map_err(|err| ServerError::Tls(err.to_string()))?;
    }
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|err| ServerError::Tls(err.to_string()))?;

    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|err| ServerError::Tls(err.to_string()))?;
    Ok(Arc::new(config))
}
