//! Reconciliation primitives for deployment scan passes.
//!
//! This library provides the pieces a scan pass uses to turn a discovered set
//! of descriptors into activation verdicts. Key concepts:
//!
//! - **Discovered set**: every descriptor the metadata store knows about.
//! - **Configured set**: descriptors an administrator already bound, directly
//!   or through an equivalent override.
//! - **Verdict**: the single decision each descriptor receives per pass.
//!
//! # Invariants
//!
//! - All decisions are recomputed from scratch each pass
//! - Decisions are deterministic given the same inputs
//! - Semantic equality is decided on canonical content, never on identity

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A value could not be rendered to canonical form.
    #[error("cannot fingerprint value: {0}")]
    Fingerprint(String),
}

/// Verdict assigned to a descriptor during a scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActivationDecision {
    /// An administrator binding (or an equivalent override) already exists.
    ExplicitlyConfigured,

    /// No binding found and not excluded; activate automatically.
    AutoActivate,

    /// Matched an exclusion suffix.
    Excluded,

    /// Metadata for the descriptor could not be read this pass.
    Malformed,
}

impl ActivationDecision {
    /// Returns true if the descriptor should be handed to the activation driver.
    pub fn is_candidate(&self) -> bool {
        matches!(self, Self::AutoActivate)
    }

    /// Stable lowercase label for logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitlyConfigured => "explicitly-configured",
            Self::AutoActivate => "auto-activate",
            Self::Excluded => "excluded",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for ActivationDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Archive suffixes that must never be auto-activated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionList {
    suffixes: Vec<String>,
}

impl ExclusionList {
    /// Build from an iterator of suffixes. Blank entries are dropped.
    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let suffixes = suffixes
            .into_iter()
            .map(Into::into)
            .map(|s: String| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self { suffixes }
    }

    /// Parse a comma-separated list (`"jdbc.rar, jms-ra.rar"`).
    pub fn from_csv(value: &str) -> Self {
        Self::new(value.split(','))
    }

    /// Returns true if `location` ends with any configured suffix.
    pub fn matches(&self, location: &str) -> bool {
        self.suffixes.iter().any(|suffix| location.ends_with(suffix.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }
}

/// Decide the verdict for a package location.
///
/// A binding takes precedence over exclusion so that reports show the
/// administrator's intent rather than the exclusion that would also apply.
pub fn decide(
    location: &str,
    configured: &BTreeSet<String>,
    exclusions: &ExclusionList,
) -> ActivationDecision {
    if configured.contains(location) {
        ActivationDecision::ExplicitlyConfigured
    } else if exclusions.matches(location) {
        ActivationDecision::Excluded
    } else {
        ActivationDecision::AutoActivate
    }
}

/// Canonical content fingerprint.
///
/// Two values with the same fingerprint serialize to the same canonical JSON.
/// Callers still confirm with deep equality before acting on a match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute a fingerprint from a JSON value.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let canonical = canonical_json(json);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&result[..16])))
    }

    /// Compute a fingerprint from any serializable value.
    pub fn of<T: Serialize>(value: &T) -> Result<Self, ReconcileError> {
        let json =
            serde_json::to_value(value).map_err(|e| ReconcileError::Fingerprint(e.to_string()))?;
        Ok(Self::from_json(&json))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("\"{}\":{}", escape(k), canonical_json(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        serde_json::Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        serde_json::Value::String(s) => format!("\"{}\"", escape(s)),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Default interval between deployment scan passes.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on a single activation attempt.
pub const DEFAULT_ACTIVATION_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = serde_json::json!({"b": 2, "a": {"y": [1, 2], "x": null}});
        let b = serde_json::json!({"a": {"x": null, "y": [1, 2]}, "b": 2});

        assert_eq!(Fingerprint::from_json(&a), Fingerprint::from_json(&b));
    }

    #[test]
    fn test_fingerprint_respects_array_order() {
        let a = serde_json::json!({"items": [1, 2]});
        let b = serde_json::json!({"items": [2, 1]});

        assert_ne!(Fingerprint::from_json(&a), Fingerprint::from_json(&b));
    }

    #[test]
    fn test_fingerprint_of_struct() {
        #[derive(Serialize)]
        struct Pool {
            name: &'static str,
            size: u32,
        }

        let fp = Fingerprint::of(&Pool { name: "p", size: 3 }).unwrap();
        assert!(fp.as_str().starts_with("sha256:"));
        assert_eq!(fp, Fingerprint::from_json(&serde_json::json!({"size": 3, "name": "p"})));
    }

    #[test]
    fn test_exclusion_list_from_csv() {
        let list = ExclusionList::from_csv(" jdbc-local.rar, ,jms-ra.rar ");

        assert_eq!(list.suffixes(), ["jdbc-local.rar", "jms-ra.rar"]);
        assert!(list.matches("file:/deploy/jdbc-local.rar"));
        assert!(!list.matches("file:/deploy/mail.rar"));
        assert!(ExclusionList::from_csv("").is_empty());
    }

    #[test]
    fn test_decide_precedence() {
        let configured: BTreeSet<String> = ["a.rar".to_string()].into();
        let exclusions = ExclusionList::new(["a.rar", "b.rar"]);

        assert_eq!(
            decide("a.rar", &configured, &exclusions),
            ActivationDecision::ExplicitlyConfigured
        );
        assert_eq!(decide("b.rar", &configured, &exclusions), ActivationDecision::Excluded);
        assert_eq!(decide("c.rar", &configured, &exclusions), ActivationDecision::AutoActivate);
    }

    #[test]
    fn test_only_auto_activate_is_candidate() {
        assert!(ActivationDecision::AutoActivate.is_candidate());
        assert!(!ActivationDecision::ExplicitlyConfigured.is_candidate());
        assert!(!ActivationDecision::Excluded.is_candidate());
        assert!(!ActivationDecision::Malformed.is_candidate());
        assert_eq!(ActivationDecision::AutoActivate.to_string(), "auto-activate");
    }
}
