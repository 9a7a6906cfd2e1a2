//! In-memory policy model: the rule sections a policy engine keeps and the adapter fills or drains.
//! Only two sections exist, `p` (policies) and `g` (grouping/role rules). Each section holds one
//! assertion per policy type (`p`, `p2`, `g`, `g2`, ...), and an assertion is an ordered list of rule rows.

use std::collections::BTreeMap;

pub const POLICY_SECTION: &str = "p";
pub const GROUPING_SECTION: &str = "g";

/// Rule rows stored under one policy type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assertion {
    pub key: String,
    pub policy: Vec<Vec<String>>,
}

impl Assertion {
    fn new(key: &str) -> Self { Self { key: key.to_string(), policy: Vec::new() } }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyModel {
    sections: BTreeMap<String, BTreeMap<String, Assertion>>,
}

/// Section a policy type belongs to: its leading character.
pub fn section_of(ptype: &str) -> Option<&str> {
    match ptype.get(..1) {
        Some(POLICY_SECTION) => Some(POLICY_SECTION),
        Some(GROUPING_SECTION) => Some(GROUPING_SECTION),
        _ => None,
    }
}

impl PolicyModel {
    pub fn new() -> Self { Self::default() }

    /// Model with the given policy types defined and no rules.
    pub fn with_ptypes(ptypes: &[&str]) -> Self {
        let mut m = Self::new();
        for p in ptypes { m.define(p); }
        m
    }

    /// Define a policy type so rules can be stored under it. Returns false when the
    /// ptype belongs to neither section.
    pub fn define(&mut self, ptype: &str) -> bool {
        let Some(sec) = section_of(ptype) else { return false };
        self.sections
            .entry(sec.to_string())
            .or_default()
            .entry(ptype.to_string())
            .or_insert_with(|| Assertion::new(ptype));
        true
    }

    pub fn has_ptype(&self, sec: &str, ptype: &str) -> bool {
        self.sections.get(sec).map(|m| m.contains_key(ptype)).unwrap_or(false)
    }

    /// Append a rule. Duplicates are kept. Returns false if the ptype is not defined.
    pub fn add_policy(&mut self, sec: &str, ptype: &str, rule: Vec<String>) -> bool {
        match self.sections.get_mut(sec).and_then(|m| m.get_mut(ptype)) {
            Some(a) => { a.policy.push(rule); true }
            None => false,
        }
    }

    /// Remove the first occurrence of a rule. Returns false if nothing matched.
    pub fn remove_policy(&mut self, sec: &str, ptype: &str, rule: &[String]) -> bool {
        let Some(a) = self.sections.get_mut(sec).and_then(|m| m.get_mut(ptype)) else { return false };
        match a.policy.iter().position(|r| r.as_slice() == rule) {
            Some(i) => { a.policy.remove(i); true }
            None => false,
        }
    }

    pub fn has_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> bool {
        self.get_policy(sec, ptype).iter().any(|r| r.as_slice() == rule)
    }

    pub fn get_policy(&self, sec: &str, ptype: &str) -> &[Vec<String>] {
        self.sections.get(sec).and_then(|m| m.get(ptype)).map(|a| a.policy.as_slice()).unwrap_or(&[])
    }

    /// Drop every rule but keep the defined policy types.
    pub fn clear_policy(&mut self) {
        for a in self.sections.values_mut().flat_map(|m| m.values_mut()) { a.policy.clear(); }
    }

    pub fn policy_count(&self) -> usize {
        self.sections.values().flat_map(|m| m.values()).map(|a| a.policy.len()).sum()
    }

    pub fn is_empty(&self) -> bool { self.policy_count() == 0 }

    /// Assertions of one section in ptype order.
    pub fn assertions<'a>(&'a self, sec: &str) -> impl Iterator<Item = (&'a str, &'a Assertion)> + 'a {
        self.sections.get(sec).into_iter().flat_map(|m| m.iter().map(|(k, a)| (k.as_str(), a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(fields: &[&str]) -> Vec<String> { fields.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn section_from_ptype() {
        assert_eq!(section_of("p"), Some("p"));
        assert_eq!(section_of("p2"), Some("p"));
        assert_eq!(section_of("g3"), Some("g"));
        assert_eq!(section_of("e"), None);
        assert_eq!(section_of(""), None);
    }

    #[test]
    fn add_requires_defined_ptype() {
        let mut m = PolicyModel::with_ptypes(&["p"]);
        assert!(m.add_policy("p", "p", rule(&["alice", "data1", "read"])));
        assert!(!m.add_policy("p", "p2", rule(&["alice", "data1", "read"])));
        assert!(!m.define("x"));
        assert_eq!(m.policy_count(), 1);
    }

    #[test]
    fn remove_takes_first_occurrence_only() {
        let mut m = PolicyModel::with_ptypes(&["p", "g"]);
        let r = rule(&["bob", "data2", "write"]);
        m.add_policy("p", "p", r.clone());
        m.add_policy("p", "p", r.clone());
        assert!(m.remove_policy("p", "p", &r));
        assert!(m.has_policy("p", "p", &r));
        assert!(m.remove_policy("p", "p", &r));
        assert!(!m.remove_policy("p", "p", &r));
    }

    #[test]
    fn clear_keeps_definitions() {
        let mut m = PolicyModel::with_ptypes(&["p", "g", "g2"]);
        m.add_policy("g", "g", rule(&["alice", "admin"]));
        m.clear_policy();
        assert!(m.is_empty());
        assert!(m.has_ptype("g", "g2"));
        let keys: Vec<&str> = m.assertions("g").map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["g", "g2"]);
    }
}
