//! Bot rule matcher - selects at most one rule for an inbound message

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::debug;
use wacm_common::types::BotRuleId;
use wacm_storage::models::{BotRule, TriggerType};

/// Compiled-size limit for user-supplied trigger patterns
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Tiers in precedence order
pub const TIER_ORDER: [TriggerType; 4] = [
    TriggerType::Exact,
    TriggerType::StartsWith,
    TriggerType::Contains,
    TriggerType::Regex,
];

/// Lowercase and trim inbound text
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Compile a regex trigger the way the matcher does
pub fn compile_trigger(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
}

fn trigger_matches(trigger_type: TriggerType, trigger: &str, normalized: &str) -> bool {
    match trigger_type {
        TriggerType::Exact => normalized == normalize(trigger),
        TriggerType::StartsWith => normalized.starts_with(&normalize(trigger)),
        TriggerType::Contains => normalized.contains(&normalize(trigger)),
        TriggerType::Regex => match compile_trigger(trigger) {
            Ok(re) => re.is_match(normalized),
            Err(e) => {
                debug!(trigger, "Skipping invalid regex trigger: {}", e);
                false
            }
        },
    }
}

/// Whether any of the rule's triggers match already-normalized text
pub fn rule_matches(rule: &BotRule, normalized: &str) -> bool {
    rule.triggers
        .iter()
        .any(|trigger| trigger_matches(rule.trigger_type, trigger, normalized))
}

/// Higher priority first, then earliest created, then lowest id
fn precedence(a: &BotRule, b: &BotRule) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

fn tier<'a>(rules: &'a [BotRule], trigger_type: TriggerType, normalized: &str) -> Vec<&'a BotRule> {
    let mut matched: Vec<&BotRule> = rules
        .iter()
        .filter(|r| r.active && r.trigger_type == trigger_type && rule_matches(r, normalized))
        .collect();
    matched.sort_by(|a, b| precedence(a, b));
    matched
}

/// Pick the rule that answers `text`, if any.
///
/// The first non-empty tier in exact, startswith, contains, regex order wins
/// regardless of priority; inside it the highest priority wins and ties go to
/// the earliest created rule, then the lowest id.
pub fn select_rule<'a>(text: &str, rules: &'a [BotRule]) -> Option<&'a BotRule> {
    let normalized = normalize(text);
    TIER_ORDER
        .iter()
        .find_map(|tt| tier(rules, *tt, &normalized).into_iter().next())
}

/// Candidates of one tier
#[derive(Debug, Clone, Serialize)]
pub struct TierMatches {
    pub trigger_type: TriggerType,
    pub rule_ids: Vec<BotRuleId>,
}

/// Matching breakdown for the rule tester
#[derive(Debug, Clone, Serialize)]
pub struct MatchExplanation {
    pub normalized: String,
    pub tiers: Vec<TierMatches>,
    pub selected: Option<BotRuleId>,
}

pub fn explain(text: &str, rules: &[BotRule]) -> MatchExplanation {
    let normalized = normalize(text);
    let tiers: Vec<TierMatches> = TIER_ORDER
        .iter()
        .map(|tt| TierMatches {
            trigger_type: *tt,
            rule_ids: tier(rules, *tt, &normalized).iter().map(|r| r.id).collect(),
        })
        .collect();
    let selected = tiers.iter().find_map(|t| t.rule_ids.first().copied());

    MatchExplanation {
        normalized,
        tiers,
        selected,
    }
}
