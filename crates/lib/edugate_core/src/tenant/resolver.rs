//! Host header → tenant identity claim. Pure; no I/O.

use std::net::Ipv4Addr;

use crate::models::tenant::TenantClaim;

/// Host names that never identify a tenant on their own.
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// Parse the request host (and optional school-scope header) into a claim.
///
/// Returns `None` when no host is present or nothing tenant-identifying can be
/// extracted from it.
pub fn resolve_claim(host: Option<&str>, school_header: Option<&str>) -> Option<TenantClaim> {
    let host = strip_port(host?.trim()).to_ascii_lowercase();
    let host = host.trim_end_matches('.');
    if host.is_empty() {
        return None;
    }

    let is_local = is_local_host(host);
    let labels: Vec<&str> = host.split('.').collect();
    if labels.iter().any(|l| l.is_empty()) {
        return None;
    }

    let subdomain = if is_local {
        None
    } else if labels.len() > 2 {
        Some(labels[0].to_string())
    } else if labels.len() == 2 && labels[1] == "localhost" {
        Some(labels[0].to_string())
    } else {
        None
    };

    let custom_domain = if is_local || labels.last() == Some(&"localhost") || labels.len() < 2 {
        None
    } else {
        Some(host.to_string())
    };

    if subdomain.is_none() && custom_domain.is_none() {
        return None;
    }

    let school_id = school_header
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(TenantClaim {
        subdomain,
        custom_domain,
        school_id,
    })
}

/// Remove a trailing `:port`, handling bracketed IPv6 literals.
fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    // Bare IPv6 without brackets has several colons and no port to strip.
    if host.matches(':').count() > 1 {
        return host;
    }
    host.split(':').next().unwrap_or(host)
}

fn is_local_host(host: &str) -> bool {
    LOCAL_HOSTS.contains(&host) || host.contains(':') || host.parse::<Ipv4Addr>().is_ok()
}
