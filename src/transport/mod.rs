// SPDX-License-Identifier: MIT OR Apache-2.0

//! QUIC transport bring-up: TLS 1.3 config, the default self-signed
//! ECDSA P-256 certificate, and the sender/receiver endpoint wrappers.
//!
//! Grounded in the same quinn + rustls pattern used elsewhere for
//! QUIC media transports: build a `rustls::ClientConfig`/`ServerConfig`,
//! set the ALPN, and wrap it as a `quinn::crypto::rustls::Quic{Client,Server}Config`.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use log::{debug, info};

use crate::Error;

/// ALPN identifier both sides must negotiate.
pub const ALPN: &[u8] = b"omt";

/// Stream-abort application error code: the ASCII bytes `"OMT"`.
pub const STREAM_ABORT_CODE: u32 = 0x4F_4D_54;

/// Connection-close application error code.
pub const CONN_CLOSE_CODE: u32 = 0x4F_4D_54_00;

pub const DEFAULT_PORT: u16 = 6400;
pub const PORT_SCAN_RANGE: std::ops::RangeInclusive<u16> = 6400..=6600;

/// A self-signed ECDSA P-256 certificate and its private key, generated
/// when no certificate is supplied by the caller.
pub struct SelfSignedCert {
    pub cert_der: rustls::pki_types::CertificateDer<'static>,
    pub key_der: rustls::pki_types::PrivateKeyDer<'static>,
}

/// Generates a self-signed ECDSA P-256 certificate for `subject_alt_name`
/// (typically a hostname or the literal "localhost").
pub fn generate_self_signed_cert(subject_alt_name: &str) -> Result<SelfSignedCert, Error> {
    let rcgen::CertifiedKey { cert, signing_key } =
        rcgen::generate_simple_self_signed(vec![subject_alt_name.to_string()])
            .map_err(|e| Error::configuration(format!("failed to generate self-signed certificate: {e}")))?;
    Ok(SelfSignedCert {
        cert_der: cert.der().clone(),
        key_der: rustls::pki_types::PrivateKeyDer::Pkcs8(signing_key.serialize_der().into()),
    })
}

/// Builds the server side of the QUIC endpoint: TLS 1.3 with the given
/// certificate chain (or a freshly generated self-signed one) and the
/// `"omt"` ALPN.
pub fn server_config(cert: Option<SelfSignedCert>) -> Result<quinn::ServerConfig, Error> {
    let cert = match cert {
        Some(c) => c,
        None => generate_self_signed_cert("localhost")?,
    };
    let mut tls = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert.cert_der], cert.key_der)
        .map_err(|e| Error::configuration(format!("invalid TLS certificate: {e}")))?;
    tls.alpn_protocols = vec![ALPN.to_vec()];
    let quic_tls = quinn::crypto::rustls::QuicServerConfig::try_from(tls)
        .map_err(|e| Error::configuration(format!("QUIC TLS config error: {e}")))?;
    Ok(quinn::ServerConfig::with_crypto(Arc::new(quic_tls)))
}

/// Builds the client side. `pinned_cert_der` pins to an exact self-signed
/// certificate (the sender's); `None` falls back to the Mozilla root store
/// for a CA-signed deployment.
pub fn client_config(pinned_cert_der: Option<rustls::pki_types::CertificateDer<'static>>) -> Result<quinn::ClientConfig, Error> {
    let mut tls = match pinned_cert_der {
        Some(der) => rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(PinnedCertVerifier { der }))
            .with_no_client_auth(),
        None => {
            let mut roots = rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        }
    };
    tls.alpn_protocols = vec![ALPN.to_vec()];
    let quic_tls = quinn::crypto::rustls::QuicClientConfig::try_from(tls)
        .map_err(|e| Error::configuration(format!("QUIC TLS config error: {e}")))?;
    Ok(quinn::ClientConfig::new(Arc::new(quic_tls)))
}

/// Verifies the peer certificate by exact DER match against a pinned value,
/// then delegates signature verification to the default ring provider.
/// Used for the common case of connecting to a sender's self-signed cert
/// without a CA.
#[derive(Debug)]
struct PinnedCertVerifier {
    der: rustls::pki_types::CertificateDer<'static>,
}

impl rustls::client::danger::ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        if end_entity.as_ref() == self.der.as_ref() {
            Ok(rustls::client::danger::ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                rustls::CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Binds a server endpoint on `port`, or scans [`PORT_SCAN_RANGE`] if `port`
/// is `None`.
pub fn bind_server_endpoint(server_config: quinn::ServerConfig, port: Option<u16>) -> Result<quinn::Endpoint, Error> {
    if let Some(port) = port {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        return quinn::Endpoint::server(server_config, addr)
            .map_err(|e| Error::configuration(format!("failed to bind port {port}: {e}")));
    }
    for candidate in PORT_SCAN_RANGE {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, candidate));
        match quinn::Endpoint::server(server_config.clone(), addr) {
            Ok(endpoint) => {
                info!("bound OMT sender endpoint on port {candidate}");
                return Ok(endpoint);
            }
            Err(e) => debug!("port {candidate} unavailable: {e}"),
        }
    }
    Err(Error::configuration(format!(
        "no free port in {}..={}",
        PORT_SCAN_RANGE.start(),
        PORT_SCAN_RANGE.end()
    )))
}

/// Builds a client endpoint (an ephemeral local UDP socket) with the given
/// default client config.
pub fn bind_client_endpoint(client_config: quinn::ClientConfig) -> Result<quinn::Endpoint, Error> {
    let mut endpoint = quinn::Endpoint::client(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
    endpoint.set_default_client_config(client_config);
    Ok(endpoint)
}
