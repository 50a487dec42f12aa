//! Input validation and sanitization for fwctl
//!
//! This module is the single trust boundary between operator-supplied field
//! values and engine-native syntax. Every sanitizer is total (never panics),
//! allowlist-based, and returns either a canonical safe value or a rejection.
//! Rejection degrades gracefully: the caller omits the clause, or, for
//! fields with no safe default like a NAT rewrite target, omits the whole
//! rule.
//!
//! # Safe tokens
//!
//! The `Safe*` newtypes below can only be constructed here. The ruleset
//! builder accepts only these tokens (plus statically-typed enums), so a raw
//! untrusted string cannot be positionally inserted into a rule line.

use crate::core::rules::{Action, Protocol};
use std::str::FromStr;

/// A CIDR or bare IP that passed the charset allowlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeCidr(String);

/// A port or "lo:hi" port range with every segment in [1,65535]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePort(String);

/// A comment stripped to `[A-Za-z0-9 _.-]`, trimmed, at most 128 chars
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeComment(String);

/// An interface name within kernel constraints (charset, 15 chars max)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeInterface(String);

macro_rules! impl_safe_token {
    ($($ty:ident),+) => {$(
        impl $ty {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    )+};
}

impl_safe_token!(SafeCidr, SafePort, SafeComment, SafeInterface);

/// Sanitizes a CIDR or IP field.
///
/// Accepts only `[0-9a-fA-F.:/]` so both IPv4 and IPv6 notations pass while
/// every shell or iptables metacharacter is rejected outright. Returns
/// `None` for empty input (field means "any") or any disallowed character
/// (caller omits the match clause).
pub fn sanitize_cidr(input: &str) -> Option<SafeCidr> {
    if input.is_empty() {
        return None;
    }
    let ok = input
        .chars()
        .all(|c| c.is_ascii_hexdigit() || matches!(c, '.' | ':' | '/'));
    ok.then(|| SafeCidr(input.to_string()))
}

/// Sanitizes a port or port range like "80" or "1024:65535".
///
/// Each colon-separated segment must be all digits and parse into
/// [1,65535]. Anything else rejects and the port clause is omitted.
pub fn sanitize_port(input: &str) -> Option<SafePort> {
    if input.is_empty() {
        return None;
    }
    let valid = input.splitn(2, ':').all(|segment| {
        !segment.is_empty()
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.parse::<u16>().is_ok_and(|n| n != 0)
    });
    valid.then(|| SafePort(input.to_string()))
}

/// Sanitizes a free-text comment for the iptables comment match.
///
/// Keeps `[A-Za-z0-9 _.-]` only, trims surrounding whitespace, truncates to
/// 128 characters. An empty result means "emit no comment clause"; comments
/// are never a reason to drop a rule.
pub fn sanitize_comment(input: &str) -> Option<SafeComment> {
    let filtered: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
        .collect();
    let trimmed: String = filtered.trim().chars().take(128).collect();
    if trimmed.is_empty() {
        None
    } else {
        Some(SafeComment(trimmed))
    }
}

/// Sanitizes a network interface name (eth0, wlan0, br-lan, ...).
///
/// Linux caps interface names at 15 bytes (IFNAMSIZ - 1); the charset covers
/// what the kernel itself accepts plus the `+` wildcard iptables understands.
pub fn sanitize_interface(input: &str) -> Option<SafeInterface> {
    if input.is_empty() || input.len() > 15 {
        return None;
    }
    let ok = input
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'));
    ok.then(|| SafeInterface(input.to_string()))
}

/// Parses an untrusted protocol string against the closed enum
pub fn sanitize_protocol(input: &str) -> Option<Protocol> {
    Protocol::from_str(input).ok()
}

/// Parses an untrusted action string against the closed enum
pub fn sanitize_action(input: &str) -> Option<Action> {
    Action::from_str(input).ok()
}

/// Validates a CIDR field at the DTO boundary.
///
/// Stricter than [`sanitize_cidr`]: the value must actually parse as an IP
/// network, so operators get feedback at save time instead of a silently
/// omitted clause at apply time. Empty means "any" and is accepted.
///
/// # Errors
///
/// Returns `Err` with a human-readable message when the value is not a
/// valid IP or CIDR.
pub fn validate_cidr(input: &str) -> Result<(), String> {
    if input.is_empty() {
        return Ok(());
    }
    input
        .parse::<ipnetwork::IpNetwork>()
        .map(|_| ())
        .or_else(|_| input.parse::<std::net::IpAddr>().map(|_| ()))
        .map_err(|_| format!("invalid CIDR or IP address: {input}"))
}

/// Validates a port or port-range field at the DTO boundary.
///
/// # Errors
///
/// Returns `Err` when a segment is non-numeric, zero, out of range, or a
/// range runs high-to-low.
pub fn validate_port_spec(input: &str) -> Result<(), String> {
    if input.is_empty() {
        return Ok(());
    }
    if sanitize_port(input).is_none() {
        return Err(format!("invalid port or port range: {input}"));
    }
    if let Some((lo, hi)) = input.split_once(':') {
        let lo: u16 = lo.parse().map_err(|_| format!("invalid port: {lo}"))?;
        let hi: u16 = hi.parse().map_err(|_| format!("invalid port: {hi}"))?;
        if lo > hi {
            return Err(format!("port range start exceeds end: {input}"));
        }
    }
    Ok(())
}

/// Validates an interface name field at the DTO boundary.
///
/// # Errors
///
/// Returns `Err` when the name violates kernel interface-name constraints.
pub fn validate_interface(input: &str) -> Result<(), String> {
    if input.is_empty() {
        return Ok(());
    }
    if sanitize_interface(input).is_none() {
        return Err(format!("invalid interface name: {input}"));
    }
    Ok(())
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_sanitize_cidr_output_charset(input in "\\PC*") {
            if let Some(safe) = sanitize_cidr(&input) {
                prop_assert!(safe
                    .as_str()
                    .chars()
                    .all(|c| c.is_ascii_hexdigit() || matches!(c, '.' | ':' | '/')));
            }
        }

        #[test]
        fn test_sanitize_cidr_rejects_foreign_chars(
            prefix in "[0-9a-fA-F.:/]{0,10}",
            bad in "[^0-9a-fA-F.:/]",
            suffix in "[0-9a-fA-F.:/]{0,10}"
        ) {
            let input = format!("{prefix}{bad}{suffix}");
            prop_assert!(sanitize_cidr(&input).is_none());
        }

        #[test]
        fn test_sanitize_port_accepts_exactly_valid_ranges(lo in 1u32..=70000u32, hi in 1u32..=70000u32) {
            let input = format!("{lo}:{hi}");
            let accepted = sanitize_port(&input).is_some();
            prop_assert_eq!(accepted, lo <= 65535 && hi <= 65535);
        }

        #[test]
        fn test_sanitize_comment_bounded_and_clean(input in "\\PC*") {
            if let Some(safe) = sanitize_comment(&input) {
                prop_assert!(safe.as_str().chars().count() <= 128);
                prop_assert!(!safe.as_str().contains('"'));
                prop_assert!(!safe.as_str().contains(';'));
                prop_assert!(!safe.as_str().contains('`'));
                prop_assert!(!safe.as_str().chars().any(char::is_control));
            }
        }

        #[test]
        fn test_sanitize_interface_never_exceeds_kernel_limit(input in "\\PC*") {
            if let Some(safe) = sanitize_interface(&input) {
                prop_assert!(safe.as_str().len() <= 15);
                prop_assert!(!safe.as_str().is_empty());
            }
        }

        #[test]
        fn test_sanitizers_are_total(input in "\\PC*") {
            // Must never panic, whatever arrives
            let _ = sanitize_cidr(&input);
            let _ = sanitize_port(&input);
            let _ = sanitize_comment(&input);
            let _ = sanitize_interface(&input);
            let _ = sanitize_protocol(&input);
            let _ = sanitize_action(&input);
        }
    }
}
