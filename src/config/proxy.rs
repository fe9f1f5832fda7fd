//! Preview proxy configuration types.

use serde::Deserialize;

/// Preview proxy configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Base URL of the artifact store. A project's files live under
    /// `<artifact_base>/<project id>/`.
    pub artifact_base: String,
    /// Domain preview hosts are subdomains of. Only `<label>.<root_domain>`
    /// hosts are routed.
    pub root_domain: String,
    /// Upstream connect timeout.
    pub connect_timeout_ms: u64,
    /// Upstream response timeout (until headers arrive).
    pub request_timeout_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            artifact_base: "http://localhost:9001/__outputs".to_string(),
            root_domain: "localhost".to_string(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl ProxyConfig {
    /// Public URL a project is previewed at.
    pub fn preview_url(&self, sub_domain: &str, proxy_port: u16) -> String {
        match proxy_port {
            80 => format!("http://{}.{}", sub_domain, self.root_domain),
            port => format!("http://{}.{}:{}", sub_domain, self.root_domain, port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_url() {
        let config = ProxyConfig::default();
        assert_eq!(
            config.preview_url("brave-quiet-otter-a1b2", 8000),
            "http://brave-quiet-otter-a1b2.localhost:8000"
        );

        let config = ProxyConfig {
            root_domain: "preview.example.com".to_string(),
            ..ProxyConfig::default()
        };
        assert_eq!(config.preview_url("foo", 80), "http://foo.preview.example.com");
    }
}
