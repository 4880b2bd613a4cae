use chrono::{DateTime, Utc};
use otel_advisor_parser::parse;
use otel_advisor_types::{Priority, RecommendationType, SignalKind};

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
}

const CANONICAL_REPLY: &str = r#"
SIGNALS TO DROP
- Drop debug level logs, they are high volume and low value

LABEL POLICY VIOLATIONS
- Spans missing environment label violate compliance requirements

OTEL FILTER RULES
traces:
  span:
    - 'attributes["level"] == "DEBUG"'
    - 'resource.attributes["environment"] == nil'

RATIONALE
- Debug logs account for most volume with little diagnostic value
- Environment label is required for cost attribution
"#;

#[test]
fn canonical_reply_produces_expected_shape() {
    let parsed = parse(CANONICAL_REPLY, now()).unwrap();
    assert!(parsed.recommendations.len() >= 2);
    assert!(parsed
        .recommendations
        .iter()
        .any(|r| r.r#type == RecommendationType::DropSignal));
    assert!(parsed
        .recommendations
        .iter()
        .any(|r| r.r#type == RecommendationType::LabelPolicy));
    let trace_rules: Vec<_> = parsed
        .all_rules()
        .into_iter()
        .filter(|r| r.signal_type == SignalKind::Trace)
        .collect();
    assert!(trace_rules.len() >= 2);
    assert!(trace_rules.iter().any(|r| r.condition.contains("DEBUG")));
    assert_eq!(parsed.summary.total, parsed.recommendations.len());
    assert!(
        parsed.recommendations.iter().all(|r| r.priority >= Priority::Medium),
        "every recommendation from a reply this actionable should rank medium or higher"
    );
}
