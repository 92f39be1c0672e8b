//! TLS acceptor construction from PEM material.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, crypto::ring};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;

/// Reasons the TLS material cannot be used.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A PEM file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The PEM data is malformed.
    #[error("malformed PEM: {0}")]
    Pem(#[source] std::io::Error),

    /// No certificate was found in the certificate PEM.
    #[error("no certificate found in PEM data")]
    NoCertificate,

    /// No private key was found in the key PEM.
    #[error("no private key found in PEM data")]
    NoPrivateKey,

    /// rustls rejected the certificate/key pair.
    #[error("invalid certificate or key: {0}")]
    Rustls(#[from] rustls::Error),
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse every certificate in a PEM blob.
pub fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(TlsError::Pem)?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate);
    }
    Ok(certs)
}

/// Parse the first private key (PKCS#8, PKCS#1 or SEC1) in a PEM blob.
pub fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(TlsError::Pem)?
        .ok_or(TlsError::NoPrivateKey)
}

/// Build a TLS acceptor that offers HTTP/1.1.
pub fn load_tls_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, TlsError> {
    let (cert_pem, key_pem) = match config {
        TlsConfig::Pem { cert, key } => (cert.clone(), key.clone()),
        TlsConfig::Files {
            cert_path,
            key_path,
        } => (read_pem(cert_path)?, read_pem(key_path)?),
    };

    let certs = parse_certificates(&cert_pem)?;
    let key = parse_private_key(&key_pem)?;

    let mut server_config = rustls::ServerConfig::builder_with_provider(Arc::new(
        ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_no_client_auth()
    .with_single_cert(certs, key)?;
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    tracing::debug!("TLS acceptor ready");
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
