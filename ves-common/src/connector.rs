// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTPS-capable connector construction.
//!
//! The connector serves both `http` and `https` uris. The TLS root store is
//! the platform's native certificates, optionally extended with a PEM
//! bundle for collectors signed by a private CA.

use hyper_util::client::legacy::connect::HttpConnector;
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};
use tracing::warn;

pub type Connector = hyper_rustls::HttpsConnector<HttpConnector>;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("cannot parse CA certificate: {0}")]
    InvalidCaCert(#[source] std::io::Error),
    #[error("no usable root certificates found")]
    EmptyRootStore,
}

/// Build a connector trusting the native roots plus `ca_pem`, when given.
///
/// An unreadable PEM bundle is a hard error (a collector pinned to a
/// private CA would otherwise silently fail every TLS handshake later).
pub fn build_connector(ca_pem: Option<&str>) -> Result<Connector, ConnectorError> {
    let roots = build_root_store(ca_pem)?;
    let tls = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .build())
}

fn build_root_store(ca_pem: Option<&str>) -> Result<RootCertStore, ConnectorError> {
    let mut roots = RootCertStore::empty();

    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        warn!(error = %err, "Skipping unreadable native root certificate");
    }
    for cert in native.certs {
        if roots.add(cert).is_err() {
            warn!("Skipping invalid native root certificate");
        }
    }

    if let Some(pem) = ca_pem {
        let mut cursor = std::io::Cursor::new(pem.as_bytes());
        let certs: Result<Vec<CertificateDer<'static>>, _> =
            rustls_pemfile::certs(&mut cursor).collect();
        for cert in certs.map_err(ConnectorError::InvalidCaCert)? {
            if roots.add(cert).is_err() {
                warn!("Skipping invalid certificate in provided CA bundle");
            }
        }
    }

    if roots.is_empty() {
        return Err(ConnectorError::EmptyRootStore);
    }
    Ok(roots)
}
