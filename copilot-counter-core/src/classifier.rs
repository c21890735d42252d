//! Backend fingerprinting for outbound requests.
//!
//! Rules, first match wins:
//! 1. a canonical API domain of an excluded backend -> [`Classification::Excluded`]
//! 2. a loopback `host:port` literal of the target backend -> [`Classification::Target`]
//! 3. an excluded-backend brand keyword -> [`Classification::Excluded`]
//! 4. otherwise [`Classification::Other`]
//!
//! Domain literals outrank everything. Keywords rank below the target
//! fingerprint because a request routed through the target can name a remote
//! provider's model in its body.

use crate::config::AttributionConfig;
use crate::types::Classification;

#[derive(Debug, Clone)]
pub struct BackendClassifier {
    excluded_domains: Vec<String>,
    target_fingerprints: Vec<String>,
    excluded_keywords: Vec<String>,
}

impl Default for BackendClassifier {
    fn default() -> Self {
        Self::from_config(&AttributionConfig::default())
    }
}

impl BackendClassifier {
    pub fn from_config(config: &AttributionConfig) -> Self {
        let target_fingerprints = config
            .target_hosts
            .iter()
            .flat_map(|host| {
                let host = host.to_ascii_lowercase();
                let port = config.target_port;
                [format!("{host}:{port}"), format!("{host}:{port}/v1")]
            })
            .collect();

        Self {
            excluded_domains: lowercase_all(&config.excluded_domains),
            target_fingerprints,
            excluded_keywords: lowercase_all(&config.excluded_keywords),
        }
    }

    /// Target-backend fingerprints in match order.
    pub fn target_fingerprints(&self) -> &[String] {
        &self.target_fingerprints
    }

    pub fn classify(&self, url: &str, body: &str) -> Classification {
        let haystack = format!("{}\n{}", url, body).to_ascii_lowercase();

        if self
            .excluded_domains
            .iter()
            .any(|domain| !domain.is_empty() && haystack.contains(domain.as_str()))
        {
            return Classification::Excluded;
        }

        if self
            .target_fingerprints
            .iter()
            .any(|fingerprint| contains_port_literal(&haystack, fingerprint))
        {
            return Classification::Target;
        }

        if self
            .excluded_keywords
            .iter()
            .any(|keyword| !keyword.is_empty() && haystack.contains(keyword.as_str()))
        {
            return Classification::Excluded;
        }

        Classification::Other
    }
}

/// Substring match where a trailing port is not continued by another digit,
/// so `localhost:4141` does not match `localhost:41410`.
fn contains_port_literal(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, matched)| {
        let after = &haystack[start + matched.len()..];
        !(needle.ends_with(|c: char| c.is_ascii_digit())
            && after.starts_with(|c: char| c.is_ascii_digit()))
    })
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_ascii_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_chat_completions() {
        let classifier = BackendClassifier::default();
        let result = classifier.classify(
            "http://localhost:4141/v1/chat/completions",
            r#"{"messages":[{"role":"user","content":"hi"}],"model":"gpt-4"}"#,
        );
        assert_eq!(result, Classification::Target);
    }

    #[test]
    fn test_domain_literal_beats_target_port() {
        let classifier = BackendClassifier::default();
        let body = r#"{"endpoint":"https://generativelanguage.googleapis.com","proxy":"127.0.0.1:4141"}"#;
        assert_eq!(classifier.classify("", body), Classification::Excluded);
    }

    #[test]
    fn test_target_beats_keyword() {
        let classifier = BackendClassifier::default();
        let result = classifier.classify(
            "http://127.0.0.1:4141/v1/chat/completions",
            r#"{"model":"gemini-2.5-pro","messages":[]}"#,
        );
        assert_eq!(result, Classification::Target);
    }

    #[test]
    fn test_keyword_only_is_excluded() {
        let classifier = BackendClassifier::default();
        let result = classifier.classify(
            "/api/backends/chat-completions/generate",
            r#"{"chat_completion_source":"makersuite","model":"gemini-pro"}"#,
        );
        assert_eq!(result, Classification::Excluded);
    }

    #[test]
    fn test_other_and_empty_inputs() {
        let classifier = BackendClassifier::default();
        assert_eq!(classifier.classify("", ""), Classification::Other);
        assert_eq!(
            classifier.classify("https://api.openai.com/v1/chat/completions", "{}"),
            Classification::Other
        );
    }

    #[test]
    fn test_port_must_not_continue() {
        let classifier = BackendClassifier::default();
        assert_eq!(
            classifier.classify("http://localhost:41410/v1/chat/completions", ""),
            Classification::Other
        );
        assert_eq!(
            classifier.classify("http://LOCALHOST:4141", ""),
            Classification::Target
        );
    }

    #[test]
    fn test_fingerprints_follow_config() {
        let config = AttributionConfig {
            target_port: 8080,
            target_hosts: vec!["Proxy.Local".to_string()],
            ..Default::default()
        };
        let classifier = BackendClassifier::from_config(&config);
        assert_eq!(
            classifier.target_fingerprints(),
            &["proxy.local:8080".to_string(), "proxy.local:8080/v1".to_string()]
        );
        assert_eq!(
            classifier.classify("http://proxy.local:8080/v1/chat/completions", ""),
            Classification::Target
        );
        assert_eq!(
            classifier.classify("http://localhost:4141/v1", ""),
            Classification::Other
        );
    }
}
