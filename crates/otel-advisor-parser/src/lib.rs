#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **otel-advisor-parser** – turns the advisory LLM's free-text reply into
//! a [`ParsedRecommendations`] batch.
//!
//! This is deliberately *not* a JSON parser: the reply is prose with four
//! mandated sections (see `otel-advisor-llm`'s system prompt). The
//! implementation is a small state machine over lines, not a grammar –
//! malformed or missing sections degrade to "zero items in that category"
//! rather than a parse failure.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use otel_advisor_types::{
    FilterRule, ParsedRecommendations, Priority, Recommendation, RecommendationType, SignalKind,
};
use tracing::debug;

/// Errors the parser can return. Only a wholly empty reply is rejected;
/// everything else degrades gracefully.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The advisory service returned an empty (or whitespace-only) reply.
    #[error("advisory reply was empty")]
    EmptyReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    SignalsToDrop,
    LabelPolicyViolations,
    OtelFilterRules,
    Rationale,
}

fn classify_header(line: &str) -> Option<Section> {
    let normalized: String = line
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    let normalized = normalized.trim();
    if normalized.contains("SIGNALS TO DROP") {
        Some(Section::SignalsToDrop)
    } else if normalized.contains("LABEL POLICY VIOLATIONS") {
        Some(Section::LabelPolicyViolations)
    } else if normalized.contains("OTEL FILTER RULES") {
        Some(Section::OtelFilterRules)
    } else if normalized.contains("RATIONALE") {
        Some(Section::Rationale)
    } else {
        None
    }
}

fn is_bullet(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with('-') || t.starts_with('*')
}

fn strip_bullet(line: &str) -> String {
    line.trim_start()
        .trim_start_matches(['-', '*'])
        .trim()
        .trim_matches(['"', '\''])
        .to_string()
}

fn is_block_header(line: &str) -> bool {
    let t = line.trim().to_lowercase();
    matches!(
        t.trim_end_matches(':'),
        "traces" | "span" | "metrics" | "metric" | "logs" | "log_record"
    )
}

fn classify_condition(condition: &str) -> SignalKind {
    let lower = condition.to_lowercase();
    if lower.contains("span.") || lower.contains("trace.") {
        SignalKind::Trace
    } else if lower.contains("metric.") {
        SignalKind::Metric
    } else if lower.contains("log.") {
        SignalKind::Log
    } else {
        SignalKind::Trace
    }
}

fn infer_priority(description: &str) -> Priority {
    let lower = description.to_lowercase();
    const HIGH: &[&str] = &["critical", "urgent", "compliance", "security", "high volume", "expensive"];
    const MEDIUM: &[&str] = &["optimize", "improve", "reduce", "performance"];
    if HIGH.iter().any(|k| lower.contains(k)) {
        Priority::High
    } else if MEDIUM.iter().any(|k| lower.contains(k)) {
        Priority::Medium
    } else {
        Priority::Low
    }
}

fn overlaps(condition: &str, description: &str) -> bool {
    let words = |s: &str| -> BTreeSet<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(|w| w.to_string())
            .collect()
    };
    let a = words(condition);
    let b = words(description);
    a.intersection(&b).next().is_some()
}

/// Parse a raw advisory reply into structured recommendations.
///
/// `now` is injected rather than read from the wall clock so parsing is
/// deterministic in tests.
pub fn parse(reply: &str, now: DateTime<Utc>) -> Result<ParsedRecommendations, ParseError> {
    if reply.trim().is_empty() {
        return Err(ParseError::EmptyReply);
    }

    let mut current: Option<Section> = None;
    let mut drop_bullets = Vec::new();
    let mut policy_bullets = Vec::new();
    let mut rationale_bullets = Vec::new();
    let mut conditions: Vec<(SignalKind, String)> = Vec::new();
    let mut in_block: Option<&'static str> = None;

    for raw_line in reply.lines() {
        let line = raw_line.trim_end();
        if let Some(section) = classify_header(line) {
            current = Some(section);
            in_block = None;
            continue;
        }
        if is_block_header(line) {
            in_block = Some("block");
            continue;
        }
        match current {
            Some(Section::SignalsToDrop) if is_bullet(line) => drop_bullets.push(strip_bullet(line)),
            Some(Section::LabelPolicyViolations) if is_bullet(line) => policy_bullets.push(strip_bullet(line)),
            Some(Section::Rationale) if is_bullet(line) => rationale_bullets.push(strip_bullet(line)),
            Some(Section::OtelFilterRules) if in_block.is_some() && is_bullet(line) => {
                let condition = strip_bullet(line);
                let kind = classify_condition(&condition);
                conditions.push((kind, condition));
            }
            _ => {}
        }
    }

    let mut recommendations = Vec::new();
    let mut rule_counter = 0usize;

    for bullet in &drop_bullets {
        let priority = infer_priority(bullet);
        recommendations.push(Recommendation {
            id: format!("drop-{}", recommendations.len() + 1),
            r#type: RecommendationType::DropSignal,
            priority,
            description: bullet.clone(),
            rationale: String::new(),
            rules: Vec::new(),
            estimated_saving: "Unknown".to_string(),
            created_at: now,
        });
    }

    for bullet in &policy_bullets {
        let priority = infer_priority(bullet);
        recommendations.push(Recommendation {
            id: format!("policy-{}", recommendations.len() + 1),
            r#type: RecommendationType::LabelPolicy,
            priority,
            description: bullet.clone(),
            rationale: String::new(),
            rules: Vec::new(),
            estimated_saving: "Unknown".to_string(),
            created_at: now,
        });
    }

    for (kind, condition) in &conditions {
        rule_counter += 1;
        let rule = FilterRule::new_drop(
            format!("auto-{}-{}", kind.as_str(), rule_counter),
            *kind,
            condition.clone(),
            format!("advisory rule derived from reply: {condition}"),
            now,
        );
        if let Some(target) = recommendations.iter_mut().find(|r| overlaps(condition, &r.description)) {
            target.rules.push(rule);
        } else {
            recommendations.push(Recommendation {
                id: format!("rule-{rule_counter}"),
                r#type: RecommendationType::NoiseReduction,
                priority: infer_priority(condition),
                description: format!("unattached filter rule: {condition}"),
                rationale: String::new(),
                rules: vec![rule],
                estimated_saving: "Unknown".to_string(),
                created_at: now,
            });
        }
    }

    for (i, rationale) in rationale_bullets.iter().enumerate() {
        if let Some(r) = recommendations.get_mut(i) {
            r.rationale = rationale.clone();
        }
    }

    debug!(
        recommendations = recommendations.len(),
        conditions = conditions.len(),
        "parsed advisory reply"
    );

    Ok(ParsedRecommendations::from_recommendations(recommendations, now))
}

/// Render a filter-processor-style YAML fragment from a batch of
/// recommendations, bucketed by signal type. This is a convenience used by
/// the dry-run CLI; it is never part of the live data path.
pub fn render_yaml(parsed: &ParsedRecommendations) -> String {
    let mut traces = Vec::new();
    let mut metrics = Vec::new();
    let mut logs = Vec::new();

    for rule in parsed.all_rules() {
        match rule.signal_type {
            SignalKind::Trace => traces.push(rule.condition),
            SignalKind::Metric => metrics.push(rule.condition),
            SignalKind::Log => logs.push(rule.condition),
        }
    }

    let mut out = String::new();
    if !traces.is_empty() {
        out.push_str("traces:\n  span:\n");
        for c in traces {
            out.push_str(&format!("    - \"{c}\"\n"));
        }
    }
    if !metrics.is_empty() {
        out.push_str("metrics:\n  metric:\n");
        for c in metrics {
            out.push_str(&format!("    - \"{c}\"\n"));
        }
    }
    if !logs.is_empty() {
        out.push_str("logs:\n  log_record:\n");
        for c in logs {
            out.push_str(&format!("    - \"{c}\"\n"));
        }
    }
    out
}
