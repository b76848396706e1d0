//! crates/ar_pipeline/src/tag.rs
//! Action, instruction text and tag bundle per scored line. Pure derivation.

use core::fmt;

use serde::{Deserialize, Serialize};

use ar_core::entities::GroupKey;

use crate::score::ScoredLine;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    Add,
    Reduce,
    #[serde(rename = "No-Change")]
    NoChange,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Add, Action::Reduce, Action::NoChange];

    pub fn from_quantity(q: i64) -> Self {
        match q.signum() {
            1 => Action::Add,
            -1 => Action::Reduce,
            _ => Action::NoChange,
        }
    }

    /// Sort position of the action partition.
    pub fn order(self) -> u8 {
        match self {
            Action::Add => 0,
            Action::Reduce => 1,
            Action::NoChange => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Add => "Add",
            Action::Reduce => "Reduce",
            Action::NoChange => "No-Change",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TaggedLine {
    pub scored: ScoredLine,
    pub action: Action,
    pub instruction: String,
    pub tag_bundle: Vec<String>,
}

/// `"{action} {n} unit(s) in {dims}"`, plus `" ({tags})"` when tags exist.
pub fn instruction(action: Action, quantity: i64, key: &GroupKey, tags: &[String]) -> String {
    let n = quantity.unsigned_abs();
    let unit = if n == 1 { "unit" } else { "units" };
    let mut s = format!("{action} {n} {unit} in {}", key.dims_label());
    if !tags.is_empty() {
        s.push_str(" (");
        s.push_str(&tags.join(", "));
        s.push(')');
    }
    s
}

pub fn tag(lines: Vec<ScoredLine>) -> Vec<TaggedLine> {
    lines
        .into_iter()
        .map(|s| {
            let q = s.reconciled.rounded_quantity;
            let action = Action::from_quantity(q);
            let tag_bundle = s.reconciled.line.tag_bundle();
            let instruction = instruction(action, q, &s.reconciled.line.group_key, &tag_bundle);
            TaggedLine { scored: s, action, instruction, tag_bundle }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim_key() -> GroupKey {
        GroupKey::Dimensional { group_name: "G1".into(), category: "Shoes".into(), subcategory: "Boots".into() }
    }

    #[test]
    fn action_follows_sign() {
        assert_eq!(Action::from_quantity(3), Action::Add);
        assert_eq!(Action::from_quantity(-1), Action::Reduce);
        assert_eq!(Action::from_quantity(0), Action::NoChange);
        assert_eq!(serde_json::to_value(Action::NoChange).unwrap(), "No-Change");
    }

    #[test]
    fn instruction_with_tags() {
        let tags = vec!["winter".to_string(), "women".to_string()];
        assert_eq!(instruction(Action::Add, 3, &dim_key(), &tags), "Add 3 units in Shoes/Boots (winter, women)");
    }

    #[test]
    fn instruction_uses_magnitude_and_singular() {
        assert_eq!(instruction(Action::Reduce, -1, &dim_key(), &[]), "Reduce 1 unit in Shoes/Boots");
    }

    #[test]
    fn fallback_key_uses_group_name() {
        let k = GroupKey::Fallback { group_name: "Cluster 7".into(), tags: vec![] };
        assert_eq!(instruction(Action::NoChange, 0, &k, &[]), "No-Change 0 units in Cluster 7");
    }
}
