use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `matchExpressions` operator, as named in §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MatchOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchExpression {
    pub key: String,
    pub operator: MatchOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

impl MatchExpression {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self.operator {
            MatchOperator::Exists => labels.contains_key(&self.key),
            MatchOperator::DoesNotExist => !labels.contains_key(&self.key),
            MatchOperator::In => labels
                .get(&self.key)
                .is_some_and(|v| self.values.iter().any(|want| want == v)),
            MatchOperator::NotIn => labels
                .get(&self.key)
                .is_none_or(|v| self.values.iter().all(|want| want != v)),
        }
    }
}

/// A label selector: `matchLabels` (implicit equality + AND) combined with
/// `matchExpressions` (explicit operators), also AND'd together. An empty
/// selector (no labels, no expressions) matches every device — this is
/// deliberate so an empty `Batch.selector` can express "everyone else,"
/// used by the synthetic final batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub match_expressions: Vec<MatchExpression>,
}

impl LabelSelector {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let labels_match = self
            .match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v));
        labels_match && self.match_expressions.iter().all(|e| e.matches(labels))
    }

    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn empty_selector_matches_everything() {
        let sel = LabelSelector::default();
        assert!(sel.matches(&labels(&[])));
        assert!(sel.matches(&labels(&[("site", "madrid")])));
    }

    #[test]
    fn match_labels_is_conjunctive() {
        let mut sel = LabelSelector::default();
        sel.match_labels.insert("site".into(), "madrid".into());
        sel.match_labels.insert("function".into(), "web".into());
        assert!(sel.matches(&labels(&[("site", "madrid"), ("function", "web")])));
        assert!(!sel.matches(&labels(&[("site", "madrid")])));
    }

    #[test]
    fn not_in_treats_missing_key_as_satisfied() {
        let sel = LabelSelector {
            match_labels: BTreeMap::new(),
            match_expressions: vec![MatchExpression {
                key: "site".into(),
                operator: MatchOperator::NotIn,
                values: vec!["madrid".into()],
            }],
        };
        assert!(sel.matches(&labels(&[])));
        assert!(sel.matches(&labels(&[("site", "paris")])));
        assert!(!sel.matches(&labels(&[("site", "madrid")])));
    }

    #[test]
    fn exists_and_does_not_exist() {
        let exists = LabelSelector {
            match_labels: BTreeMap::new(),
            match_expressions: vec![MatchExpression {
                key: "console".into(),
                operator: MatchOperator::Exists,
                values: vec![],
            }],
        };
        assert!(exists.matches(&labels(&[("console", "")])));
        assert!(!exists.matches(&labels(&[])));
    }
}
