//! The tiny condition grammar the filter manager evaluates.
//!
//! Rather than embed a general expression language, only four literal
//! shapes are recognized. Anything else compiles to [`Condition::Unsupported`],
//! which always evaluates to "keep the signal" – unsupported conditions fail
//! closed rather than silently dropping data nobody asked to drop.

/// A condition, parsed once at install time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `attributes["K"] == "V"`
    AttributeEquals {
        /// The attribute key to look up.
        key: String,
        /// The value the attribute must equal.
        value: String,
    },
    /// `resource.attributes["K"] == "V"`
    ResourceEquals {
        /// The resource attribute key to look up.
        key: String,
        /// The value the resource attribute must equal.
        value: String,
    },
    /// `attributes["K"] == nil`
    AttributeAbsent {
        /// The attribute key that must be absent.
        key: String,
    },
    /// `resource.attributes["K"] == nil`
    ResourceAbsent {
        /// The resource attribute key that must be absent.
        key: String,
    },
    /// Any shape outside the four above.
    Unsupported,
}

/// Parse a raw condition string into a [`Condition`].
pub fn compile(raw: &str) -> Condition {
    let trimmed = raw.trim();

    let (is_resource, rest) = if let Some(r) = trimmed.strip_prefix("resource.attributes[") {
        (true, r)
    } else if let Some(r) = trimmed.strip_prefix("attributes[") {
        (false, r)
    } else {
        return Condition::Unsupported;
    };

    let Some(close) = rest.find(']') else {
        return Condition::Unsupported;
    };
    let key = rest[..close].trim().trim_matches('"').to_string();
    if key.is_empty() {
        return Condition::Unsupported;
    }

    let after = rest[close + 1..].trim();
    let Some(rhs) = after.strip_prefix("==") else {
        return Condition::Unsupported;
    };
    let rhs = rhs.trim();

    if rhs == "nil" {
        return if is_resource {
            Condition::ResourceAbsent { key }
        } else {
            Condition::AttributeAbsent { key }
        };
    }

    if rhs.len() >= 2 && rhs.starts_with('"') && rhs.ends_with('"') {
        let value = rhs[1..rhs.len() - 1].to_string();
        return if is_resource {
            Condition::ResourceEquals { key, value }
        } else {
            Condition::AttributeEquals { key, value }
        };
    }

    Condition::Unsupported
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_attribute_equals() {
        let c = compile(r#"attributes["level"] == "DEBUG""#);
        assert_eq!(c, Condition::AttributeEquals { key: "level".into(), value: "DEBUG".into() });
    }

    #[test]
    fn compiles_resource_equals() {
        let c = compile(r#"resource.attributes["environment"] == "prod""#);
        assert_eq!(c, Condition::ResourceEquals { key: "environment".into(), value: "prod".into() });
    }

    #[test]
    fn compiles_attribute_absent() {
        let c = compile(r#"attributes["trace_id"] == nil"#);
        assert_eq!(c, Condition::AttributeAbsent { key: "trace_id".into() });
    }

    #[test]
    fn compiles_resource_absent() {
        let c = compile(r#"resource.attributes["environment"] == nil"#);
        assert_eq!(c, Condition::ResourceAbsent { key: "environment".into() });
    }

    #[test]
    fn unsupported_shapes_fail_closed() {
        assert_eq!(compile("span.duration > 100ms"), Condition::Unsupported);
        assert_eq!(compile("attributes[level] == DEBUG"), Condition::Unsupported);
        assert_eq!(compile(""), Condition::Unsupported);
    }
}
