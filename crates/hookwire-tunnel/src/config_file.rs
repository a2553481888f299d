// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extraction of the public hostname from a prepared cloudflared config.
//!
//! The config file is opaque to the broker except for the `hostname:`
//! field; the operator prepares it out of band. When the file yields no
//! hostname, the supervisor falls back to the tunnel UUID it sees in the
//! child's output.

use std::path::Path;

use regex::Regex;

/// Extract the first `hostname:` value from config text.
pub fn parse_hostname(content: &str) -> Option<String> {
    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("hostname:") {
            let value = rest.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Read the config file and derive the public base URL from its hostname.
pub fn public_url_from_config(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_hostname(&content).map(|hostname| format!("https://{hostname}"))
}

/// Match a tunnel UUID in a line of child output and derive the
/// `cfargotunnel.com` fallback URL.
pub fn fallback_url_from_output(line: &str) -> Option<String> {
    let uuid_re = Regex::new(
        r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
    )
    .ok()?;
    uuid_re
        .find(line)
        .map(|m| format!("https://{}.cfargotunnel.com", m.as_str()))
}

/// Match a quick-tunnel URL in a line of child output.
pub fn quick_url_from_output(line: &str) -> Option<String> {
    let url_re = Regex::new(r"https://[a-z0-9-]+\.trycloudflare\.com").ok()?;
    url_re.find(line).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_extracted_from_ingress_block() {
        let config = "\
tunnel: 0bf3d879-2f12-4a9f-9d9a-4c2f3e8f0b11
credentials-file: /home/op/.cloudflared/creds.json
ingress:
  - hostname: hooks.example.com
    service: http://localhost:7842
  - service: http_status:404
";
        assert_eq!(parse_hostname(config).as_deref(), Some("hooks.example.com"));
    }

    #[test]
    fn quoted_hostname_is_unquoted() {
        assert_eq!(
            parse_hostname("hostname: \"hooks.example.com\"").as_deref(),
            Some("hooks.example.com")
        );
    }

    #[test]
    fn missing_hostname_yields_none() {
        assert!(parse_hostname("tunnel: abc\n").is_none());
        assert!(parse_hostname("hostname:\n").is_none());
    }

    #[test]
    fn fallback_url_built_from_uuid_in_output() {
        let line = "INF Starting tunnel tunnelID=0bf3d879-2f12-4a9f-9d9a-4c2f3e8f0b11";
        assert_eq!(
            fallback_url_from_output(line).as_deref(),
            Some("https://0bf3d879-2f12-4a9f-9d9a-4c2f3e8f0b11.cfargotunnel.com")
        );
    }

    #[test]
    fn quick_url_matched_in_banner() {
        let line = "|  https://lazy-otter-aa12.trycloudflare.com  |";
        assert_eq!(
            quick_url_from_output(line).as_deref(),
            Some("https://lazy-otter-aa12.trycloudflare.com")
        );
    }

    #[test]
    fn unrelated_output_matches_nothing() {
        assert!(quick_url_from_output("INF Registered tunnel connection").is_none());
        assert!(fallback_url_from_output("no uuid here").is_none());
    }
}
