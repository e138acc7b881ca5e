use time::{Duration, OffsetDateTime};

use super::error::GenerationError;

pub const DEFAULT_KEY_BITS: usize = 2048;

/// Parameters of a self-signed certificate.
#[derive(Clone, Debug, PartialEq)]
pub struct CertificateOptions {
    /// RSA modulus size in bits.
    pub key_bits: usize,
    /// IP literals or DNS names, in the order they are written to the certificate.
    pub hosts: Vec<String>,
    pub is_certificate_authority: bool,
    pub valid_from: OffsetDateTime,
    /// May be zero or negative, the certificate is then already expired.
    pub valid_duration: Duration,
}

impl CertificateOptions {
    /// Options used for a bare host string: 2048 bit key, CA, issued now.
    ///
    /// `valid_duration` stays zero, so the certificate is only valid at the
    /// instant of its creation. Use the full options form for a usable window.
    pub fn for_hosts(hosts: &str) -> Result<Self, GenerationError> {
        Ok(CertificateOptions {
            key_bits: DEFAULT_KEY_BITS,
            hosts: parse_hosts(hosts)?,
            is_certificate_authority: true,
            valid_from: OffsetDateTime::now_utc(),
            valid_duration: Duration::ZERO,
        })
    }

    /// End of the validity window, `None` when out of the representable range.
    pub fn valid_until(&self) -> Option<OffsetDateTime> {
        self.valid_from.checked_add(self.valid_duration)
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        check_hosts(&self.hosts)
    }
}

/// Argument accepted by the provider constructor.
#[derive(Clone, Debug, PartialEq)]
pub enum HostArgument {
    /// Comma separated list of hosts, expanded with default options.
    Hostname(String),
    Options(CertificateOptions),
}

impl HostArgument {
    pub fn resolve(self) -> Result<CertificateOptions, GenerationError> {
        match self {
            HostArgument::Hostname(hosts) => CertificateOptions::for_hosts(&hosts),
            HostArgument::Options(opts) => {
                opts.validate()?;
                Ok(opts)
            }
        }
    }
}

impl From<&str> for HostArgument {
    fn from(hosts: &str) -> Self {
        HostArgument::Hostname(hosts.to_string())
    }
}

impl From<String> for HostArgument {
    fn from(hosts: String) -> Self {
        HostArgument::Hostname(hosts)
    }
}

impl From<CertificateOptions> for HostArgument {
    fn from(opts: CertificateOptions) -> Self {
        HostArgument::Options(opts)
    }
}

/// Splits a comma separated host list. Entries are kept verbatim, an empty
/// entry (as in `"a.org,"`) makes the whole list invalid.
pub fn parse_hosts(input: &str) -> Result<Vec<String>, GenerationError> {
    let hosts: Vec<String> = input.split(',').map(str::to_string).collect();
    check_hosts(&hosts)?;
    Ok(hosts)
}

fn check_hosts(hosts: &[String]) -> Result<(), GenerationError> {
    if hosts.is_empty() {
        return Err(GenerationError::InvalidArgument("no hosts".to_string()));
    }
    if let Some(pos) = hosts.iter().position(|h| h.is_empty()) {
        return Err(GenerationError::InvalidArgument(format!(
            "empty host at position {}",
            pos
        )));
    }
    Ok(())
}
