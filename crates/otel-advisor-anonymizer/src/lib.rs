#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **otel-advisor-anonymizer** – redacts sensitive substrings from telemetry
//! strings before they are handed to the advisory client.
//!
//! The implementation mirrors the ordered-pattern-list approach used by the
//! request sanitizer this crate is descended from: a fixed sequence of
//! regexes, each with a literal replacement, applied in order. Order matters
//! here specifically because the UUID pattern must run before the
//! long-alphanumeric-token pattern, or the latter would swallow UUIDs whole.

use once_cell::sync::Lazy;
use otel_advisor_types::AttributeMap;
use regex::Regex;

struct RedactionRule {
    pattern: Regex,
    replacement: &'static str,
}

static RULES: Lazy<Vec<RedactionRule>> = Lazy::new(|| {
    vec![
        RedactionRule {
            pattern: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
            replacement: "user@example.com",
        },
        RedactionRule {
            pattern: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap(),
            replacement: "XXX-XX-XXXX",
        },
        RedactionRule {
            pattern: Regex::new(r"\b(?:\d[ -]?){13,16}\b").unwrap(),
            replacement: "XXXX-XXXX-XXXX-XXXX",
        },
        RedactionRule {
            pattern: Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap(),
            replacement: "XXX.XXX.XXX.XXX",
        },
        RedactionRule {
            pattern: Regex::new(r"\buser-\d+\b").unwrap(),
            replacement: "user-XXXXX",
        },
        RedactionRule {
            pattern: Regex::new(
                r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b",
            )
            .unwrap(),
            replacement: "00000000-0000-0000-0000-000000000000",
        },
        RedactionRule {
            pattern: Regex::new(r"\b[A-Za-z0-9]{20,}\b").unwrap(),
            replacement: "REDACTED_TOKEN",
        },
    ]
});

/// Stateless anonymizer. Construction is cheap (the pattern list is a
/// process-wide lazy static); the type exists so call sites have something
/// to depend on and so the ruleset can grow stateful configuration later
/// without changing callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymizer;

impl Anonymizer {
    /// Construct a new anonymizer. Always succeeds; the pattern list is
    /// compiled once, lazily, on first use.
    pub fn new() -> Self {
        Self
    }

    /// Redact every sensitive substring in `input`, applying the rule list
    /// in order.
    pub fn anonymize_str(&self, input: &str) -> String {
        let mut out = input.to_string();
        for rule in RULES.iter() {
            out = rule.pattern.replace_all(&out, rule.replacement).into_owned();
        }
        out
    }

    /// Redact every value in an attribute map. Keys are left untouched –
    /// they are considered non-sensitive schema metadata, not payload.
    pub fn anonymize_map(&self, input: &AttributeMap) -> AttributeMap {
        input
            .iter()
            .map(|(k, v)| (k.clone(), self.anonymize_str(v)))
            .collect()
    }
}
