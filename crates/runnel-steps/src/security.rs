//! Outbound URL checks for server-side requests.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

const INTERNAL_SUFFIXES: [&str; 5] = [".local", ".internal", ".corp", ".lan", ".home"];

/// Why a URL was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsafeUrl {
  #[error("invalid URL: {0}")]
  Invalid(String),

  #[error("invalid URL scheme '{0}': must be http or https")]
  Scheme(String),

  #[error("URL must have a hostname")]
  MissingHost,

  #[error("URLs pointing to localhost are not allowed")]
  Localhost,

  #[error("URLs pointing to {kind} addresses are not allowed")]
  RestrictedAddress { kind: &'static str },

  #[error("URLs with internal TLD '{0}' are not allowed")]
  InternalDomain(&'static str),
}

/// Refuse URLs that would let a flow reach the host's own network.
pub fn validate_safe_url(raw: &str) -> Result<Url, UnsafeUrl> {
  let url = Url::parse(raw).map_err(|e| UnsafeUrl::Invalid(e.to_string()))?;

  match url.scheme() {
    "http" | "https" => {}
    other => return Err(UnsafeUrl::Scheme(other.to_string())),
  }

  match url.host().map(|host| host.to_owned()) {
    None => return Err(UnsafeUrl::MissingHost),
    Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip))?,
    Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip))?,
    Some(Host::Domain(domain)) => {
      let domain = domain.trim_end_matches('.').to_ascii_lowercase();
      if domain == "localhost" || domain.ends_with(".localhost") {
        return Err(UnsafeUrl::Localhost);
      }
      if let Some(suffix) = INTERNAL_SUFFIXES.into_iter().find(|s| domain.ends_with(s)) {
        return Err(UnsafeUrl::InternalDomain(suffix));
      }
    }
  }
  Ok(url)
}

fn check_ip(ip: IpAddr) -> Result<(), UnsafeUrl> {
  let restricted = |kind| Err(UnsafeUrl::RestrictedAddress { kind });
  match ip {
    IpAddr::V4(v4) => check_ipv4(v4),
    IpAddr::V6(v6) => {
      if let Some(v4) = v6.to_ipv4_mapped() {
        return check_ipv4(v4);
      }
      if v6.is_loopback() || v6.is_unspecified() {
        return Err(UnsafeUrl::Localhost);
      }
      if is_unique_local(&v6) {
        return restricted("private");
      }
      if is_link_local(&v6) {
        return restricted("link-local");
      }
      if v6.is_multicast() {
        return restricted("multicast");
      }
      Ok(())
    }
  }
}

fn check_ipv4(ip: Ipv4Addr) -> Result<(), UnsafeUrl> {
  let restricted = |kind| Err(UnsafeUrl::RestrictedAddress { kind });
  if ip.is_loopback() || ip.is_unspecified() {
    return Err(UnsafeUrl::Localhost);
  }
  if ip.is_private() || is_shared(&ip) {
    return restricted("private");
  }
  if ip.is_link_local() {
    return restricted("link-local");
  }
  if ip.is_multicast() {
    return restricted("multicast");
  }
  if ip.is_broadcast() || ip.octets()[0] >= 240 {
    return restricted("reserved");
  }
  Ok(())
}

// 100.64.0.0/10
fn is_shared(ip: &Ipv4Addr) -> bool {
  let [a, b, ..] = ip.octets();
  a == 100 && (b & 0xc0) == 64
}

// fc00::/7
fn is_unique_local(ip: &Ipv6Addr) -> bool {
  (ip.segments()[0] & 0xfe00) == 0xfc00
}

// fe80::/10
fn is_link_local(ip: &Ipv6Addr) -> bool {
  (ip.segments()[0] & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_allows_public_urls() {
    for url in [
      "https://api.example.com/v1/items",
      "http://8.8.8.8/dns",
      "https://[2001:4860:4860::8888]/",
    ] {
      assert!(validate_safe_url(url).is_ok(), "{} should be allowed", url);
    }
  }

  #[test]
  fn test_rejects_schemes_and_localhost() {
    assert_eq!(
      validate_safe_url("ftp://example.com/file"),
      Err(UnsafeUrl::Scheme("ftp".to_string()))
    );
    assert!(matches!(validate_safe_url("not a url"), Err(UnsafeUrl::Invalid(_))));
    for url in [
      "http://localhost:8080/",
      "http://LOCALHOST./",
      "http://127.0.0.1/",
      "http://0.0.0.0/",
      "http://[::1]/",
    ] {
      assert_eq!(validate_safe_url(url), Err(UnsafeUrl::Localhost), "{}", url);
    }
  }

  #[test]
  fn test_rejects_restricted_addresses() {
    let cases = [
      ("http://10.0.0.5/", "private"),
      ("http://192.168.1.1/", "private"),
      ("http://172.16.0.1/", "private"),
      ("http://169.254.169.254/latest/meta-data", "link-local"),
      ("http://224.0.0.1/", "multicast"),
      ("http://[fd00::1]/", "private"),
      ("http://[fe80::1]/", "link-local"),
      ("http://[::ffff:10.0.0.1]/", "private"),
    ];
    for (url, kind) in cases {
      assert_eq!(
        validate_safe_url(url),
        Err(UnsafeUrl::RestrictedAddress { kind }),
        "{}",
        url
      );
    }
  }

  #[test]
  fn test_rejects_internal_domains() {
    assert_eq!(
      validate_safe_url("https://printer.local/status"),
      Err(UnsafeUrl::InternalDomain(".local"))
    );
    assert_eq!(
      validate_safe_url("https://billing.corp/"),
      Err(UnsafeUrl::InternalDomain(".corp"))
    );
  }
}
