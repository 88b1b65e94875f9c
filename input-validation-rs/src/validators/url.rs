//! URL validators
//!
//! Rejects URLs that could be used for script injection or to reach
//! internal infrastructure, and returns the canonical form of the rest.

use crate::errors::{InputError, InputResult};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Schemes that are never acceptable, whatever the allow-list says
pub const FORBIDDEN_SCHEMES: &[&str] = &["javascript", "data", "vbscript", "file", "about"];

/// Policy applied by [`validate_url`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPolicy {
    pub allowed_schemes: Vec<String>,
    pub allow_private_hosts: bool,
    pub allow_credentials: bool,
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self {
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            allow_private_hosts: false,
            allow_credentials: false,
        }
    }
}

/// A URL that passed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedUrl {
    /// Canonical absolute form
    pub url: String,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub is_secure: bool,
}

/// Validate and canonicalize a URL
pub fn validate_url(input: &str, policy: &UrlPolicy) -> InputResult<ValidatedUrl> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InputError::InvalidUrl("URL is empty".to_string()));
    }

    let url = Url::parse(trimmed).map_err(|e| InputError::InvalidUrl(e.to_string()))?;
    let scheme = url.scheme().to_ascii_lowercase();

    if FORBIDDEN_SCHEMES.contains(&scheme.as_str()) {
        log::warn!("Rejected URL with forbidden scheme '{}'", scheme);
        return Err(InputError::ForbiddenScheme(scheme));
    }
    if !policy
        .allowed_schemes
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&scheme))
    {
        return Err(InputError::ForbiddenScheme(scheme));
    }

    if !policy.allow_credentials && (!url.username().is_empty() || url.password().is_some()) {
        return Err(InputError::EmbeddedCredentials);
    }

    let host = url
        .host()
        .ok_or_else(|| InputError::InvalidUrl("URL has no host component".to_string()))?;

    if !policy.allow_private_hosts && is_internal_host(&host) {
        log::warn!("Rejected URL targeting internal host '{}'", host);
        return Err(InputError::PrivateHost(host.to_string()));
    }

    Ok(ValidatedUrl {
        url: url.to_string(),
        scheme: scheme.clone(),
        host: host.to_string(),
        path: url.path().to_string(),
        is_secure: scheme == "https",
    })
}

/// Returns true when `host` is loopback, private, link-local or unspecified
pub fn is_internal_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost"
                || domain.ends_with(".localhost")
                || domain == "localhost.localdomain"
        }
        Host::Ipv4(ip) => is_internal_ipv4(ip),
        Host::Ipv6(ip) => is_internal_ipv6(ip),
    }
}

fn is_internal_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_internal_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link local
    if (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80 {
        return true;
    }
    embedded_ipv4(ip).map_or(false, |v4| is_internal_ipv4(&v4))
}

/// IPv4 address carried by a mapped (`::ffff:a.b.c.d`), compatible
/// (`::a.b.c.d`) or NAT64 (`64:ff9b::a.b.c.d`) IPv6 address
fn embedded_ipv4(ip: &Ipv6Addr) -> Option<Ipv4Addr> {
    let segments = ip.segments();
    if segments[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        let [.., a, b, c, d] = ip.octets();
        return Some(Ipv4Addr::new(a, b, c, d));
    }
    ip.to_ipv4()
}

/// Convenience check used by the scanner and pipeline
pub fn is_safe_url(input: &str) -> bool {
    validate_url(input, &UrlPolicy::default()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("http://127.0.0.1/admin" ; "loopback v4")]
    #[test_case("http://127.8.9.10/" ; "loopback range")]
    #[test_case("http://10.0.0.5/" ; "ten slash eight")]
    #[test_case("http://172.16.4.1/" ; "one seventy two")]
    #[test_case("http://172.31.255.255/" ; "one seventy two upper")]
    #[test_case("http://192.168.1.1/router" ; "one ninety two")]
    #[test_case("http://169.254.169.254/latest/meta-data" ; "link local metadata")]
    #[test_case("http://[::1]/" ; "loopback v6")]
    #[test_case("http://[::ffff:127.0.0.1]/" ; "mapped loopback")]
    #[test_case("http://[fd00::1]/" ; "unique local v6")]
    #[test_case("http://[::7f00:1]/" ; "compatible loopback")]
    #[test_case("http://[::a00:5]/" ; "compatible private")]
    #[test_case("http://[64:ff9b::7f00:1]/" ; "nat64 loopback")]
    #[test_case("http://[64:ff9b::a9fe:a9fe]/" ; "nat64 metadata")]
    #[test_case("http://localhost:8080/" ; "localhost")]
    #[test_case("http://api.localhost/" ; "localhost subdomain")]
    #[test_case("http://2130706433/" ; "decimal loopback")]
    fn test_rejects_internal_hosts(input: &str) {
        assert!(matches!(
            validate_url(input, &UrlPolicy::default()),
            Err(InputError::PrivateHost(_))
        ));
    }

    #[test_case("javascript:alert(1)" ; "javascript")]
    #[test_case("data:text/html;base64,PHNjcmlwdD4=" ; "data")]
    #[test_case("vbscript:msgbox(1)" ; "vbscript")]
    #[test_case("file:///etc/passwd" ; "file")]
    #[test_case("about:blank" ; "about")]
    #[test_case("ftp://example.com/file" ; "not allow listed")]
    fn test_rejects_schemes(input: &str) {
        assert!(matches!(
            validate_url(input, &UrlPolicy::default()),
            Err(InputError::ForbiddenScheme(_))
        ));
    }

    #[test]
    fn test_nat64_public_address_allowed() {
        assert!(validate_url("https://[64:ff9b::808:808]/", &UrlPolicy::default()).is_ok());
    }

    #[test]
    fn test_https_round_trip() {
        let input = "https://docs.example.com/guide/intro?lang=en#setup";
        let validated = validate_url(input, &UrlPolicy::default()).unwrap();
        assert_eq!(validated.url, input);
        assert_eq!(validated.scheme, "https");
        assert_eq!(validated.host, "docs.example.com");
        assert_eq!(validated.path, "/guide/intro");
        assert!(validated.is_secure);
    }

    #[test]
    fn test_canonicalizes() {
        let validated = validate_url("  HTTP://Example.COM/a/../b ", &UrlPolicy::default()).unwrap();
        assert_eq!(validated.url, "http://example.com/b");
        assert!(!validated.is_secure);
    }

    #[test]
    fn test_rejects_credentials_and_relative() {
        assert_eq!(
            validate_url("https://user:pw@example.com/", &UrlPolicy::default()),
            Err(InputError::EmbeddedCredentials)
        );
        assert!(matches!(
            validate_url("/relative/path", &UrlPolicy::default()),
            Err(InputError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_policy_can_allow_private_hosts() {
        let policy = UrlPolicy {
            allow_private_hosts: true,
            ..UrlPolicy::default()
        };
        assert!(validate_url("http://192.168.0.10/", &policy).is_ok());
        assert!(is_safe_url("https://example.org/"));
        assert!(!is_safe_url("http://localhost/"));
    }
}
