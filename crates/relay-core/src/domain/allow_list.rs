//! Connection allow-list filter.
//!
//! Matching is by substring, not exact address or CIDR: an entry such as
//! `"192.168.10"` admits every peer whose address contains it.  An empty
//! list admits everyone.

/// Removes a trailing `:port` from a peer address string.
///
/// Handles `a.b.c.d:port`, bracketed IPv6 `[addr]:port`, and leaves bare
/// addresses (including unbracketed IPv6) untouched.
///
/// ```rust
/// use relay_core::strip_port;
///
/// assert_eq!(strip_port("192.168.10.5:4444"), "192.168.10.5");
/// assert_eq!(strip_port("[fe80::1]:4444"), "fe80::1");
/// assert_eq!(strip_port("fe80::1"), "fe80::1");
/// ```
pub fn strip_port(peer: &str) -> &str {
    if let Some(rest) = peer.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &rest[..end],
            None => rest,
        };
    }
    match peer.rfind(':') {
        // A single colon separates host and port; several mean bare IPv6.
        Some(idx) if peer[..idx].find(':').is_none() => &peer[..idx],
        _ => peer,
    }
}

/// Returns `true` if `peer_address` may connect under `allow_list`.
pub fn is_allowed(peer_address: &str, allow_list: &[String]) -> bool {
    if allow_list.is_empty() {
        return true;
    }
    let host = strip_port(peer_address);
    allow_list.iter().any(|entry| host.contains(entry.as_str()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
