//! TLS connector construction.
//!
//! ## Security
//!
//! - `TrustAll` disables certificate and host name verification. It exists
//!   for lab directories with self-signed certificates only.
//! - `PinnedCertificate` trusts exactly the PEM certificate(s) configured
//!   for the directory; built-in roots are disabled.
//! - `SystemTrustStore` uses the platform store.

use la_model::TrustPolicy;
use native_tls::{Certificate, TlsConnector};

use crate::error::{DirectoryError, DirectoryResult};

const PEM_END: &str = "-----END CERTIFICATE-----";

/// Builds a TLS connector for the given trust policy.
///
/// ## Errors
///
/// Returns `DirectoryError::Tls` if the pinned PEM holds no certificate or
/// the connector cannot be built.
pub fn build_connector(trust: &TrustPolicy) -> DirectoryResult<TlsConnector> {
    let mut builder = TlsConnector::builder();
    match trust {
        TrustPolicy::TrustAll => {
            tracing::warn!("certificate verification disabled for directory connection");
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        TrustPolicy::PinnedCertificate { pem } => {
            let certificates = parse_pem_chain(pem)?;
            builder.disable_built_in_roots(true);
            for certificate in certificates {
                builder.add_root_certificate(certificate);
            }
        }
        TrustPolicy::SystemTrustStore => {}
    }
    builder
        .build()
        .map_err(|e| DirectoryError::tls(format!("failed to build TLS connector: {e}")))
}

/// Parses every certificate in a PEM bundle.
fn parse_pem_chain(pem: &str) -> DirectoryResult<Vec<Certificate>> {
    let certificates = pem
        .split_inclusive(PEM_END)
        .filter(|block| block.contains("-----BEGIN CERTIFICATE-----"))
        .map(|block| {
            Certificate::from_pem(block.trim().as_bytes())
                .map_err(|e| DirectoryError::tls(format!("invalid pinned certificate: {e}")))
        })
        .collect::<DirectoryResult<Vec<_>>>()?;

    if certificates.is_empty() {
        return Err(DirectoryError::tls("pinned certificate PEM contains no certificate"));
    }
    Ok(certificates)
}
