//! Upstream TLS client configuration

use anyhow::Result;
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, RootCertStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-request upstream trust selection.
///
/// Both configurations are built once at startup and chosen per connection,
/// so one request skipping certificate checks never affects a concurrent
/// request that must verify.
pub struct TlsProfiles {
    verified: Arc<ClientConfig>,
    unverified: Arc<ClientConfig>,
}

impl TlsProfiles {
    pub fn new() -> Result<Self> {
        Ok(Self {
            verified: create_verifying_config()?,
            unverified: create_trust_all_config(),
        })
    }

    /// Client configuration for one upstream connection. `skip_verify` is
    /// decided by the resource classification (MP4 targets skip checks for
    /// legacy players on self-signed media hosts).
    pub fn client_config(&self, skip_verify: bool) -> Arc<ClientConfig> {
        if skip_verify {
            debug!("upstream certificate verification disabled for this connection");
            Arc::clone(&self.unverified)
        } else {
            Arc::clone(&self.verified)
        }
    }
}

/// Create a rustls ClientConfig that verifies upstream certificates against
/// the system trust store.
fn create_verifying_config() -> Result<Arc<ClientConfig>> {
    let mut root_store = RootCertStore::empty();
    add_system_root_certificates(&mut root_store)?;

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(Arc::new(config))
}

/// Create a rustls ClientConfig that accepts any upstream certificate.
fn create_trust_all_config() -> Arc<ClientConfig> {
    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAllCertVerifier))
        .with_no_client_auth();

    Arc::new(config)
}

/// Add system root certificates to the root store
fn add_system_root_certificates(root_store: &mut RootCertStore) -> Result<()> {
    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let mut added = 0;
            let mut failed = 0;

            for cert_der in certs {
                let cert = Certificate(cert_der.to_vec());
                match root_store.add(&cert) {
                    Ok(_) => added += 1,
                    Err(_) => failed += 1,
                }
            }

            info!("Root certificate store initialized ({} added)", added);
            if failed > 0 {
                info!("   Failed: {} certificates", failed);
            }

            Ok(())
        }
        Err(e) => {
            // Don't fail completely if system certs can't be loaded; verified
            // connections will simply reject everything.
            info!("Could not load system root certificates: {}", e);
            Ok(())
        }
    }
}

/// Certificate verifier that accepts all certificates
pub struct AcceptAllCertVerifier;

impl ServerCertVerifier for AcceptAllCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_are_distinct_per_policy() {
        let profiles = TlsProfiles::new().unwrap();
        let verified = profiles.client_config(false);
        let unverified = profiles.client_config(true);
        assert!(!Arc::ptr_eq(&verified, &unverified));
        // Repeated selections hand back the same shared configs.
        assert!(Arc::ptr_eq(&verified, &profiles.client_config(false)));
        assert!(Arc::ptr_eq(&unverified, &profiles.client_config(true)));
    }
}
