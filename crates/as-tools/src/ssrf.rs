//! Pre-connect SSRF guard: refuses private, loopback,
//! link-local, and cloud-metadata addresses before the HTTP executor
//! opens a connection.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};

use as_domain::error::{Error, Result};

const METADATA_ADDR: Ipv4Addr = Ipv4Addr::new(169, 254, 169, 254);

/// Resolve `host` and reject the URL if any candidate address is
/// private/loopback/link-local/ULA or the cloud metadata address.
pub fn check_host(host: &str) -> Result<()> {
    // Literal IPs skip DNS resolution.
    if let Ok(ip) = host.parse::<IpAddr>() {
        return check_ip(ip, host);
    }

    let lookup = format!("{host}:0");
    let addrs = lookup
        .to_socket_addrs()
        .map_err(|e| Error::SsrfBlocked(format!("could not resolve host {host}: {e}")))?;

    let mut saw_any = false;
    for addr in addrs {
        saw_any = true;
        check_ip(addr.ip(), host)?;
    }
    if !saw_any {
        return Err(Error::SsrfBlocked(format!("host {host} resolved to no addresses")));
    }
    Ok(())
}

fn check_ip(ip: IpAddr, host: &str) -> Result<()> {
    if is_blocked(ip) {
        return Err(Error::SsrfBlocked(format!(
            "host {host} resolves to disallowed address {ip}"
        )));
    }
    Ok(())
}

fn is_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    if ip == METADATA_ADDR {
        return true;
    }
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_documentation()
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(v4);
    }
    let segments = ip.segments();
    // fc00::/7 — unique local addresses.
    let is_ula = (segments[0] & 0xfe00) == 0xfc00;
    // fe80::/10 — link-local.
    let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
    is_ula || is_link_local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_loopback_v4() {
        assert!(check_host("127.0.0.1").is_err());
    }

    #[test]
    fn blocks_private_ranges() {
        assert!(check_host("10.0.0.1").is_err());
        assert!(check_host("172.16.0.1").is_err());
        assert!(check_host("192.168.1.1").is_err());
    }

    #[test]
    fn blocks_metadata_address() {
        assert!(check_host("169.254.169.254").is_err());
    }

    #[test]
    fn blocks_loopback_v6() {
        assert!(check_host("::1").is_err());
    }

    #[test]
    fn blocks_ula_and_link_local_v6() {
        assert!(is_blocked_v6("fc00::1".parse().unwrap()));
        assert!(is_blocked_v6("fe80::1".parse().unwrap()));
    }

    #[test]
    fn allows_public_v4() {
        assert!(!is_blocked_v4("93.184.216.34".parse().unwrap()));
    }
}
