//! Preview host parsing.

use crate::registry::is_valid_label;

/// Strip an optional `:port` suffix. Bracketed IPv6 literals are rejected.
fn strip_port(host: &str) -> Option<&str> {
    if host.starts_with('[') {
        return None;
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            Some(name)
        }
        Some(_) => None,
        None => Some(host),
    }
}

/// Extract the project subdomain from a `Host` header value.
///
/// Only hosts of the exact form `<label>.<root_domain>` (case-insensitive,
/// optional port, optional trailing dot) yield a label, and the label must be
/// a valid subdomain. Anything else, including nested subdomains and the
/// bare root domain, is `None`.
pub fn extract_sub_domain(host: &str, root_domain: &str) -> Option<String> {
    let host = strip_port(host.trim())?
        .trim_end_matches('.')
        .to_ascii_lowercase();
    let root = root_domain.trim_end_matches('.').to_ascii_lowercase();
    if root.is_empty() {
        return None;
    }

    let label = host.strip_suffix(root.as_str())?.strip_suffix('.')?;
    if label.contains('.') || !is_valid_label(label) {
        return None;
    }
    Some(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_host() {
        assert_eq!(
            extract_sub_domain("foo.example.com", "example.com").as_deref(),
            Some("foo")
        );
    }

    #[test]
    fn test_extract_strips_port_and_case() {
        assert_eq!(
            extract_sub_domain("Brave-Otter-a1b2.LocalHost:8000", "localhost").as_deref(),
            Some("brave-otter-a1b2")
        );
        assert_eq!(
            extract_sub_domain("foo.example.com.", "example.com").as_deref(),
            Some("foo")
        );
    }

    #[test]
    fn test_extract_rejects_foreign_and_malformed_hosts() {
        let root = "example.com";
        for host in [
            "example.com",
            "foo.other.com",
            "fooexample.com",
            "a.b.example.com",
            "-foo.example.com",
            "foo_bar.example.com",
            ".example.com",
            "foo.example.com:http",
            "[::1]:8000",
            "",
        ] {
            assert_eq!(extract_sub_domain(host, root), None, "host {host:?}");
        }
    }

    #[test]
    fn test_extract_requires_root_domain() {
        assert_eq!(extract_sub_domain("foo.example.com", ""), None);
    }
}
