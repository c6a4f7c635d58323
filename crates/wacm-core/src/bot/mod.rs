//! Keyword bot - rule matching and automatic replies

mod matcher;
mod responder;

pub use matcher::{
    compile_trigger, explain, normalize, rule_matches, select_rule, MatchExplanation,
    TierMatches, TIER_ORDER,
};
pub use responder::{BotReply, BotResponder};
