/// Engine configuration snapshot
///
/// Delivered into the engine as an immutable value; the engine never
/// writes settings back. Malformed custom rules are dropped here and
/// never reach the grouping logic.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::colors::GroupColor;
use crate::rules::CustomRule;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub all_windows: bool,
    pub auto_grouping: bool,
    pub auto_ordering: bool,
    pub auto_ordering_seconds: u32,
    pub custom_grouping: bool,
    pub custom_groups: Vec<CustomRule>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            all_windows: false,
            auto_grouping: false,
            auto_ordering: false,
            auto_ordering_seconds: 5,
            custom_grouping: false,
            custom_groups: Vec::new(),
        }
    }
}

impl Settings {
    /// Drop malformed rules (empty name or no patterns), preserving the
    /// declaration order of the survivors
    pub fn sanitized(mut self) -> Self {
        let before = self.custom_groups.len();
        self.custom_groups
            .retain(|rule| !rule.name.trim().is_empty() && !rule.domains.is_empty());
        let dropped = before - self.custom_groups.len();
        if dropped > 0 {
            log::warn!("dropped {dropped} malformed custom rule(s)");
        }
        self
    }

    /// Colors reserved by custom rules while custom grouping is on
    pub fn reserved_colors(&self) -> HashSet<GroupColor> {
        if !self.custom_grouping {
            return HashSet::new();
        }
        self.custom_groups.iter().map(|rule| rule.color).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.auto_grouping);
        assert!(!settings.custom_grouping);
        assert!(!settings.all_windows);
        assert_eq!(settings.auto_ordering_seconds, 5);
        assert!(settings.custom_groups.is_empty());
    }

    #[test]
    fn test_deserialize_partial() {
        let settings: Settings =
            serde_json::from_str(r#"{"autoGrouping":true,"allWindows":true}"#).unwrap();
        assert!(settings.auto_grouping);
        assert!(settings.all_windows);
        assert!(!settings.custom_grouping);
    }

    #[test]
    fn test_sanitized_drops_malformed_rules() {
        let settings: Settings = serde_json::from_str(
            r#"{"customGrouping":true,"customGroups":[
                {"id":"1","name":"Work","color":"blue","domains":["github.com"]},
                {"id":"2","name":"","color":"red","domains":["x.com"]},
                {"id":"3","name":"Empty","color":"green","domains":[]}
            ]}"#,
        )
        .unwrap();

        let clean = settings.sanitized();
        assert_eq!(clean.custom_groups.len(), 1);
        assert_eq!(clean.custom_groups[0].name, "Work");
    }

    #[test]
    fn test_reserved_colors_follow_toggle() {
        let mut settings = Settings::default();
        settings.custom_groups = vec![CustomRule {
            id: "1".to_string(),
            name: "Work".to_string(),
            color: GroupColor::Blue,
            domains: vec!["github.com".to_string()],
        }];

        assert!(settings.reserved_colors().is_empty());

        settings.custom_grouping = true;
        assert!(settings.reserved_colors().contains(&GroupColor::Blue));
    }
}
