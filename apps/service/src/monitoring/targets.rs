//! Probe target validation (SSRF defense).
//!
//! Rejects targets that point at private, loopback, or otherwise reserved
//! address space before any network call is made. This is advisory
//! defense-in-depth: hostnames that are not IP literals pass through
//! unless they equal `localhost` - no DNS resolution is attempted here.

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("target must be a valid URL")]
    InvalidUrl,
    #[error("target protocol must be http or https")]
    InvalidScheme,
    #[error("target must include a hostname")]
    MissingHost,
    #[error("target hostname is not allowed")]
    BlockedHost,
    #[error("target port is invalid")]
    InvalidPort,
    #[error("target must be in host:port format (IPv6: [addr]:port)")]
    InvalidTcpFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpTarget {
    pub host: String,
    pub port: u16,
}

/// Blocked IPv4 ranges: loopback, RFC1918, link-local, CGNAT, test nets,
/// benchmarks, multicast, and reserved space.
const BLOCKED_V4_CIDRS: &[(Ipv4Addr, u8)] = &[
    (Ipv4Addr::new(0, 0, 0, 0), 8),
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(100, 64, 0, 0), 10),
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(169, 254, 0, 0), 16),
    (Ipv4Addr::new(172, 16, 0, 0), 12),
    (Ipv4Addr::new(192, 0, 0, 0), 24),
    (Ipv4Addr::new(192, 0, 2, 0), 24),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(198, 18, 0, 0), 15),
    (Ipv4Addr::new(198, 51, 100, 0), 24),
    (Ipv4Addr::new(203, 0, 113, 0), 24),
    (Ipv4Addr::new(224, 0, 0, 0), 4),
    (Ipv4Addr::new(240, 0, 0, 0), 4),
];

fn ipv4_in_cidr(ip: Ipv4Addr, base: Ipv4Addr, mask_bits: u8) -> bool {
    let mask: u32 = if mask_bits == 0 { 0 } else { u32::MAX << (32 - mask_bits) };
    (u32::from(ip) & mask) == (u32::from(base) & mask)
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    BLOCKED_V4_CIDRS.iter().any(|&(base, bits)| ipv4_in_cidr(ip, base, bits))
}

/// Strip the brackets from an `[ipv6]` literal.
fn normalize_literal_host(host: &str) -> &str {
    host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host)
}

fn is_blocked_ip_literal(host: &str) -> bool {
    let normalized = normalize_literal_host(host);

    if let Ok(v4) = normalized.parse::<Ipv4Addr>() {
        return is_blocked_ipv4(v4);
    }

    if let Ok(v6) = normalized.parse::<Ipv6Addr>() {
        if v6.is_loopback() || v6.is_unspecified() {
            return true;
        }
        let segments = v6.segments();
        if segments[0] & 0xffc0 == 0xfe80 {
            return true; // IPv6 link-local
        }
        if segments[0] & 0xfe00 == 0xfc00 {
            return true; // IPv6 ULA (fc00::/7)
        }
        // IPv4-mapped literals are resolved to their IPv4 form and re-checked.
        if let Some(mapped) = v6.to_ipv4_mapped() {
            return is_blocked_ipv4(mapped);
        }
    }

    false
}

/// Normalize unusual IPv4 notations (e.g. `127.1`, `0x7f000001`) by
/// round-tripping the host through the URL parser before blocked-range
/// checks. IPv6 literals are kept as-is.
fn normalize_host_for_validation(host: &str) -> String {
    let trimmed = normalize_literal_host(host.trim());
    if trimmed.is_empty() || trimmed.contains(':') {
        return trimmed.to_string();
    }

    match Url::parse(&format!("http://{trimmed}")) {
        Ok(url) => url.host_str().unwrap_or(trimmed).to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Validate an HTTP(S) probe target.
pub fn validate_http_target(target: &str) -> Result<(), TargetError> {
    let url = Url::parse(target).map_err(|_| TargetError::InvalidUrl)?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(TargetError::InvalidScheme);
    }

    let hostname = url.host_str().ok_or(TargetError::MissingHost)?;
    if hostname.eq_ignore_ascii_case("localhost") {
        return Err(TargetError::BlockedHost);
    }
    if is_blocked_ip_literal(hostname) {
        return Err(TargetError::BlockedHost);
    }

    // Explicit port or scheme default; 0 is never valid.
    match url.port_or_known_default() {
        Some(port) if port >= 1 => Ok(()),
        _ => Err(TargetError::InvalidPort),
    }
}

/// Parse `host:port` / `[ipv6]:port` into its components.
pub fn parse_tcp_target(target: &str) -> Option<TcpTarget> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return None;
    }

    // IPv6 form: [::1]:443
    if let Some(rest) = trimmed.strip_prefix('[') {
        let end = rest.find(']')?;
        let host = &rest[..end];
        let port = rest[end + 1..].strip_prefix(':')?;
        let port: u16 = port.parse().ok().filter(|&p| p >= 1)?;
        return Some(TcpTarget { host: host.to_string(), port });
    }

    let idx = trimmed.rfind(':')?;
    if idx == 0 {
        return None;
    }
    let host = &trimmed[..idx];
    if host.contains(':') {
        return None; // IPv6 must use [addr]:port
    }
    let port: u16 = trimmed[idx + 1..].parse().ok().filter(|&p| p >= 1)?;
    Some(TcpTarget { host: host.to_string(), port })
}

/// Validate a TCP probe target.
pub fn validate_tcp_target(target: &str) -> Result<(), TargetError> {
    let parsed = parse_tcp_target(target).ok_or(TargetError::InvalidTcpFormat)?;

    let host = normalize_host_for_validation(&parsed.host);
    if host.is_empty() {
        return Err(TargetError::MissingHost);
    }
    if host.eq_ignore_ascii_case("localhost") {
        return Err(TargetError::BlockedHost);
    }
    if is_blocked_ip_literal(&host) {
        return Err(TargetError::BlockedHost);
    }

    Ok(())
}
