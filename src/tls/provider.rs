use std::sync::Arc;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;

use crate::model::error::GenerationError;
use crate::model::options::HostArgument;
use crate::tls::cert::{generate, GeneratedCertificate};

struct Served {
    certificate: Arc<GeneratedCertificate>,
    certified_key: Arc<CertifiedKey>,
}

/// Serves one self-signed certificate for every TLS handshake.
///
/// The certificate is generated once, when the provider is built. The outcome,
/// success or failure, is kept and returned on every later call, whatever
/// server name the client asks for.
pub struct CertificateProvider {
    outcome: Result<Served, Arc<GenerationError>>,
}

/// Builds a provider using the operating system randomness.
pub fn make_provider(
    arg: impl Into<HostArgument>,
) -> Result<CertificateProvider, GenerationError> {
    make_provider_with_rng(arg, &mut OsRng)
}

/// Builds a provider drawing key and serial number from `rng`.
///
/// Only an invalid argument is returned as an error here. Generation failures
/// are captured by the provider and replayed by [`CertificateProvider::get_certificate`].
pub fn make_provider_with_rng<R>(
    arg: impl Into<HostArgument>,
    rng: &mut R,
) -> Result<CertificateProvider, GenerationError>
where
    R: RngCore + CryptoRng,
{
    let opts = arg.into().resolve()?;
    tracing::info!(hosts = ?opts.hosts, bits = opts.key_bits, "preparing self-signed certificate");
    let outcome = generate(&opts, rng)
        .and_then(|certificate| {
            let certified_key = certificate.certified_key()?;
            Ok(Served {
                certificate: Arc::new(certificate),
                certified_key: Arc::new(certified_key),
            })
        })
        .map_err(|e| {
            tracing::error!("certificate generation failed: {}", e);
            Arc::new(e)
        });
    Ok(CertificateProvider { outcome })
}

impl CertificateProvider {
    /// Returns the captured outcome. `_server_name` is ignored.
    pub fn get_certificate(
        &self,
        _server_name: Option<&str>,
    ) -> Result<Arc<GeneratedCertificate>, Arc<GenerationError>> {
        match &self.outcome {
            Ok(served) => Ok(Arc::clone(&served.certificate)),
            Err(e) => Err(Arc::clone(e)),
        }
    }
}

impl std::fmt::Debug for CertificateProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateProvider")
            .field("ready", &self.outcome.is_ok())
            .finish_non_exhaustive()
    }
}

impl ResolvesServerCert for CertificateProvider {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        tracing::trace!(sni = ?client_hello.server_name(), "resolving certificate");
        match &self.outcome {
            Ok(served) => Some(Arc::clone(&served.certified_key)),
            Err(e) => {
                tracing::error!("no certificate to present: {}", e);
                None
            }
        }
    }
}

/// Rustls server configuration presenting the provider's certificate.
pub fn server_config(provider: CertificateProvider) -> ServerConfig {
    ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::options::CertificateOptions;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::OnceLock;
    use std::thread;
    use test_case::test_case;
    use time::{Duration, OffsetDateTime};
    use x509_parser::extensions::GeneralName;
    use x509_parser::prelude::{FromDer, X509Certificate};
    use x509_parser::public_key::PublicKey;

    fn shorthand() -> &'static CertificateProvider {
        static PROVIDER: OnceLock<CertificateProvider> = OnceLock::new();
        PROVIDER.get_or_init(|| {
            make_provider_with_rng("example.org", &mut StdRng::seed_from_u64(42)).unwrap()
        })
    }

    #[test]
    fn test_shorthand_certificate() {
        let cert = shorthand().get_certificate(None).unwrap();
        let (_, x509) = X509Certificate::from_der(cert.cert_der().as_ref()).unwrap();

        let san = x509.subject_alternative_name().unwrap().unwrap();
        assert_eq!(
            san.value.general_names,
            vec![GeneralName::DNSName("example.org")]
        );
        assert!(x509.basic_constraints().unwrap().unwrap().value.ca);
        assert!(x509.key_usage().unwrap().unwrap().value.key_cert_sign());
        match x509.public_key().parsed().unwrap() {
            PublicKey::RSA(rsa) => assert_eq!(rsa.key_size(), 2048),
            other => panic!("unexpected key {:?}", other),
        }

        // zero duration: valid only at the instant of creation
        assert_eq!(cert.not_before(), cert.not_after());
        assert!(!cert.is_valid_at(OffsetDateTime::now_utc() + Duration::seconds(1)));
    }

    #[test]
    fn test_shorthand_ip() {
        let provider = make_provider_with_rng("192.168.1.10", &mut StdRng::seed_from_u64(1)).unwrap();
        let cert = provider.get_certificate(None).unwrap();
        let (_, x509) = X509Certificate::from_der(cert.cert_der().as_ref()).unwrap();
        let san = x509.subject_alternative_name().unwrap().unwrap();
        assert_eq!(
            san.value.general_names,
            vec![GeneralName::IPAddress(&[192, 168, 1, 10])]
        );
    }

    #[test_case(None; "no sni")]
    #[test_case(Some("example.org"); "covered sni")]
    #[test_case(Some("other.test"); "uncovered sni")]
    fn test_same_certificate_for_any_name(name: Option<&str>) {
        let first = shorthand().get_certificate(None).unwrap();
        let again = shorthand().get_certificate(name).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.cert_der(), again.cert_der());
    }

    #[test]
    fn test_concurrent_reads() {
        let provider = shorthand();
        let expected = provider.get_certificate(None).unwrap();
        thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let name = format!("host{}.test", i);
                    s.spawn(move || provider.get_certificate(Some(&name)).unwrap())
                })
                .collect();
            for h in handles {
                assert!(Arc::ptr_eq(&expected, &h.join().unwrap()));
            }
        });
    }

    #[test_case(""; "empty")]
    #[test_case("a.org,,b.org"; "empty entry")]
    fn test_invalid_argument(arg: &str) {
        let err = make_provider(arg).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidArgument(_)));
    }

    #[test]
    fn test_invalid_options() {
        let opts = CertificateOptions {
            key_bits: 2048,
            hosts: vec![],
            is_certificate_authority: false,
            valid_from: OffsetDateTime::now_utc(),
            valid_duration: Duration::hours(1),
        };
        let err = make_provider(opts).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidArgument(_)));
    }

    #[test]
    fn test_failure_replayed() {
        let opts = CertificateOptions {
            key_bits: 2048,
            hosts: vec!["bücher.example".to_string()],
            is_certificate_authority: false,
            valid_from: OffsetDateTime::now_utc(),
            valid_duration: Duration::hours(1),
        };
        let provider = make_provider_with_rng(opts, &mut StdRng::seed_from_u64(9)).unwrap();
        let first = provider.get_certificate(None).unwrap_err();
        let second = provider.get_certificate(Some("localhost")).unwrap_err();
        assert!(matches!(*first, GenerationError::SigningFailed(_)));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_options_form() {
        let opts = CertificateOptions {
            key_bits: 2048,
            hosts: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            is_certificate_authority: false,
            valid_from: OffsetDateTime::now_utc(),
            valid_duration: Duration::days(30),
        };
        let provider = make_provider_with_rng(opts.clone(), &mut StdRng::seed_from_u64(2)).unwrap();
        let cert = provider.get_certificate(None).unwrap();
        assert_eq!(cert.not_before(), opts.valid_from);
        assert_eq!(cert.not_after(), opts.valid_from + Duration::days(30));
        assert!(cert.is_valid_at(OffsetDateTime::now_utc()));

        let (_, x509) = X509Certificate::from_der(cert.cert_der().as_ref()).unwrap();
        assert!(!x509.basic_constraints().unwrap().unwrap().value.ca);
    }
}
