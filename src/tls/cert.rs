use std::net::IpAddr;

use anyhow::Context;
use rand::{CryptoRng, RngCore};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, RemoteKeyPair, SanType, SerialNumber, SignatureAlgorithm,
    PKCS_RSA_SHA256,
};
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::EncodePrivateKey;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::sign::CertifiedKey;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::model::error::GenerationError;
use crate::model::options::CertificateOptions;

const ORGANIZATION: &str = "Acme Co";
const SERIAL_BYTES: usize = 16;
// GeneralizedTime has four year digits
const MAX_CERT_YEAR: i32 = 9999;

/// A self-signed certificate together with its private key.
#[derive(Debug)]
pub struct GeneratedCertificate {
    cert_der: CertificateDer<'static>,
    key_der: PrivatePkcs8KeyDer<'static>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl GeneratedCertificate {
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }

    /// Single element chain, the certificate is its own issuer.
    pub fn cert_chain(&self) -> Vec<CertificateDer<'static>> {
        vec![self.cert_der.clone()]
    }

    pub fn key_der(&self) -> &PrivatePkcs8KeyDer<'static> {
        &self.key_der
    }

    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(self.key_der.clone_key())
    }

    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    pub fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }

    /// Pairs the certificate with a rustls signing key.
    pub fn certified_key(&self) -> Result<CertifiedKey, GenerationError> {
        let signing_key = rustls::crypto::aws_lc_rs::sign::any_supported_type(&self.private_key())
            .context("failed to load signing key")
            .map_err(GenerationError::SigningFailed)?;
        Ok(CertifiedKey::new(self.cert_chain(), signing_key))
    }
}

/// Generates a self-signed certificate for the given options.
///
/// All randomness (key and serial number) is drawn from `rng`. Any failing
/// step aborts the generation.
pub fn generate<R>(
    opts: &CertificateOptions,
    rng: &mut R,
) -> Result<GeneratedCertificate, GenerationError>
where
    R: RngCore + CryptoRng,
{
    tracing::debug!(bits = opts.key_bits, "generating private key");
    let (key_pair, key_der) = generate_key_pair(opts.key_bits, rng)?;

    let not_before = opts.valid_from;
    let not_after = opts
        .valid_until()
        .context("validity end out of range")
        .map_err(GenerationError::SigningFailed)?;

    let serial_number = random_serial(rng)?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, ORGANIZATION);

    let mut params = CertificateParams::default();
    params.distinguished_name = dn;
    params.serial_number = Some(serial_number);
    params.not_before = to_cert_time(not_before)?;
    params.not_after = to_cert_time(not_after)?;
    params.key_usages = vec![
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.is_ca = IsCa::ExplicitNoCa;

    let mut ip_addresses = Vec::new();
    for host in &opts.hosts {
        match host.parse::<IpAddr>() {
            Ok(ip) => ip_addresses.push(SanType::IpAddress(ip.to_canonical())),
            Err(_) => params.subject_alt_names.push(
                dns_name(host)
                    .with_context(|| format!("invalid DNS name {:?}", host))
                    .map_err(GenerationError::SigningFailed)?,
            ),
        }
    }
    params.subject_alt_names.extend(ip_addresses);

    if opts.is_certificate_authority {
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages.push(KeyUsagePurpose::KeyCertSign);
    }

    tracing::debug!(hosts = ?opts.hosts, ca = opts.is_certificate_authority, "signing certificate");
    let cert = params
        .self_signed(&key_pair)
        .context("failed to sign certificate")
        .map_err(GenerationError::SigningFailed)?;

    tracing::info!(
        hosts = ?opts.hosts,
        not_before = %not_before,
        not_after = %not_after,
        "certificate generated"
    );
    Ok(GeneratedCertificate {
        cert_der: cert.der().clone(),
        key_der,
        not_before,
        not_after,
    })
}

/// Draws a serial number uniformly from `[0, 2^128)`.
pub fn random_serial<R: RngCore + ?Sized>(rng: &mut R) -> Result<SerialNumber, GenerationError> {
    let mut bytes = [0u8; SERIAL_BYTES];
    rng.try_fill_bytes(&mut bytes)
        .context("no randomness available")
        .map_err(GenerationError::SerialNumberFailed)?;
    Ok(SerialNumber::from(bytes.to_vec()))
}

fn generate_key_pair<R>(
    bits: usize,
    rng: &mut R,
) -> Result<(KeyPair, PrivatePkcs8KeyDer<'static>), GenerationError>
where
    R: RngCore + CryptoRng,
{
    let private_key = RsaPrivateKey::new(rng, bits)
        .with_context(|| format!("rsa key of {} bits", bits))
        .map_err(GenerationError::KeyGenerationFailed)?;
    let der = private_key
        .to_pkcs8_der()
        .context("pkcs8 encoding")
        .map_err(GenerationError::KeyGenerationFailed)?;
    let key_der = PrivatePkcs8KeyDer::from(der.as_bytes().to_vec());
    let signer = RsaSigner::new(private_key).map_err(GenerationError::KeyGenerationFailed)?;
    let key_pair = KeyPair::from_remote(Box::new(signer))
        .context("failed to wrap rsa key")
        .map_err(GenerationError::KeyGenerationFailed)?;
    Ok((key_pair, key_der))
}

/// Signs with the `rsa` crate so every key size it generates can be used.
struct RsaSigner {
    public_key: Vec<u8>,
    signing_key: SigningKey<Sha256>,
}

impl RsaSigner {
    fn new(private_key: RsaPrivateKey) -> anyhow::Result<Self> {
        let public_key = private_key
            .to_public_key()
            .to_pkcs1_der()
            .context("pkcs1 public key encoding")?
            .into_vec();
        Ok(RsaSigner {
            public_key,
            signing_key: SigningKey::<Sha256>::new(private_key),
        })
    }
}

impl RemoteKeyPair for RsaSigner {
    fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, rcgen::Error> {
        let signature = self.signing_key.try_sign(msg).map_err(|e| {
            tracing::error!("rsa signing failed: {}", e);
            rcgen::Error::RemoteKeyError
        })?;
        Ok(signature.to_vec())
    }

    fn algorithm(&self) -> &'static SignatureAlgorithm {
        &PKCS_RSA_SHA256
    }
}

fn dns_name(host: &str) -> Result<SanType, rcgen::Error> {
    Ok(SanType::DnsName(host.try_into()?))
}

// X.509 validity has whole second precision and years 0 to 9999
fn to_cert_time(at: OffsetDateTime) -> Result<OffsetDateTime, GenerationError> {
    let at = at.to_offset(UtcOffset::UTC);
    if !(0..=MAX_CERT_YEAR).contains(&at.year()) {
        return Err(GenerationError::SigningFailed(anyhow::anyhow!(
            "validity time {} can not be encoded",
            at
        )));
    }
    Ok(at - Duration::nanoseconds(i64::from(at.nanosecond())))
}
