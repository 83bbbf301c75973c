//! Sensitive-value extraction (spec.md §4.6).
//!
//! Walks the fully-parsed config and pulls out every string value whose key
//! name looks like a credential, so the router's outbound guard and the log
//! masking layer can block/redact them. Grounded on
//! `examples/original_source/services/bridge.py`'s `_collect_sensitive` and
//! `services/logger.py`'s `MaskingFilter`/`register_sensitive`.

use std::collections::HashSet;

use aho_corasick::AhoCorasick;
use serde_json::Value;

/// Minimum length (bytes) for a value to be treated as sensitive, to avoid
/// masking common short substrings that happen to share a key-name pattern.
const MIN_SENSITIVE_LEN: usize = 8;

/// Key-name substrings (matched case-insensitively) that mark a string
/// value as a credential.
const SENSITIVE_KEY_PATTERNS: &[&str] = &["token", "secret", "password", "webhook_url"];

/// Immutable set of secret strings extracted from configuration at
/// startup. Frozen after construction; used both to block outbound leaks
/// and to redact log output.
pub struct SensitiveIndex {
    values: HashSet<String>,
    matcher: Option<AhoCorasick>,
}

impl SensitiveIndex {
    /// Build an index by recursively walking `config`.
    pub fn extract(config: &Value) -> Self {
        let mut values = HashSet::new();
        collect(config, &mut values);
        Self::from_values(values)
    }

    /// Build directly from a pre-computed set (mainly for tests).
    pub fn from_values(values: HashSet<String>) -> Self {
        let matcher = if values.is_empty() {
            None
        } else {
            AhoCorasick::new(values.iter()).ok()
        };
        Self { values, matcher }
    }

    pub fn empty() -> Self {
        Self {
            values: HashSet::new(),
            matcher: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Plain substring test: does `text` contain any configured secret?
    pub fn contains_leak(&self, text: &str) -> bool {
        match &self.matcher {
            Some(m) => m.is_match(text),
            None => false,
        }
    }

    /// Replace every occurrence of every configured secret in `text` with
    /// `***`. Used by the logging layer, never by the router (the router's
    /// guard is a hard block, not a redact — spec.md §4.4).
    pub fn mask(&self, text: &str) -> String {
        match &self.matcher {
            Some(m) => {
                let mut out = String::with_capacity(text.len());
                let mut last = 0;
                for mat in m.find_iter(text) {
                    out.push_str(&text[last..mat.start()]);
                    out.push_str("***");
                    last = mat.end();
                }
                out.push_str(&text[last..]);
                out
            }
            None => text.to_string(),
        }
    }
}

fn collect(value: &Value, found: &mut HashSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                if let Value::String(s) = v {
                    let key_lower = key.to_lowercase();
                    let looks_sensitive = SENSITIVE_KEY_PATTERNS
                        .iter()
                        .any(|p| key_lower.contains(p));
                    if looks_sensitive && s.len() >= MIN_SENSITIVE_LEN {
                        found.insert(s.clone());
                        continue;
                    }
                }
                collect(v, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, found);
            }
        }
        _ => {}
    }
}
