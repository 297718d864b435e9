//! Host candidate resolution
//!
//! Turns the configured host fields into the ordered list of candidates that
//! discovery and connection probe.

/// Ordered list of hostname candidates
pub type HostList = Vec<String>;

/// Resolves host candidates from an optional multi-host field and an optional
/// single-host field.
///
/// The multi-host field may be bracketed and comma separated
/// (`"[one, two]"`, `"one,two"`). Its tokens come first, the single host is
/// appended last, and empty tokens are dropped. No sorting or deduplication
/// happens here.
pub fn resolve_hosts(multi: Option<&str>, single: Option<&str>) -> HostList {
    let mut hosts: HostList = multi
        .map(|raw| {
            raw.chars()
                .filter(|c| !matches!(c, '[' | ']') && !c.is_whitespace())
                .collect::<String>()
        })
        .map(|cleaned| cleaned.split(',').map(str::to_string).collect())
        .unwrap_or_default();

    if let Some(host) = single {
        hosts.push(host.to_string());
    }

    hosts.retain(|h| !h.is_empty());
    hosts
}

/// Strips a leading `http://` or `https://` from a candidate.
pub fn strip_scheme(host: &str) -> &str {
    host.strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host)
}
