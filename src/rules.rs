/// User-defined grouping rules and hostname pattern matching
use serde::{Deserialize, Serialize};

use crate::colors::GroupColor;

/// A user-declared mapping from domain patterns to a group name/color
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRule {
    pub id: String,
    pub name: String,
    pub color: GroupColor,
    pub domains: Vec<String>,
}

/// Find the first rule matching a hostname. Rules are checked in
/// declaration order, then each rule's patterns in order; a pattern
/// matches on equality or as a dot-separated suffix ("docs.github.com"
/// matches "github.com"). First match wins, so rule order is significant.
pub fn match_rule<'a>(hostname: &str, rules: &'a [CustomRule]) -> Option<&'a CustomRule> {
    for rule in rules {
        for pattern in &rule.domains {
            if hostname == pattern || hostname.ends_with(&format!(".{pattern}")) {
                return Some(rule);
            }
        }
    }
    None
}
