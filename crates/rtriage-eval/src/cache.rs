//! Property caches attached to evaluated rule nodes.
//!
//! A [`PropertyCache`] holds the evidence a check or requirement produced
//! while evaluating: matched package versions, result counts, file lists.
//! Conclusion messages read it back through cache references.

use std::collections::BTreeMap;

use serde::Serialize;

use rtriage_rules::RuleValue;

/// Records which requirement kind last wrote into a cache shared across a
/// logical group, so evidence from unrelated kinds is never blended.
pub const REQUIREMENT_TYPE_KEY: &str = "__requirement_type";

// =============================================================================
// CacheValue
// =============================================================================

/// A value stored in a [`PropertyCache`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CacheValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<CacheValue>),
    Dict(BTreeMap<String, CacheValue>),
}

impl CacheValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render to the string form used in issue messages.
    pub fn render(&self) -> String {
        match self {
            CacheValue::Str(s) => s.clone(),
            CacheValue::Int(n) => n.to_string(),
            CacheValue::Float(n) => n.to_string(),
            CacheValue::Bool(b) => b.to_string(),
            CacheValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.render()).collect();
                parts.join(", ")
            }
            CacheValue::Dict(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}={}", v.render())).collect();
                parts.join(", ")
            }
        }
    }
}

impl From<&RuleValue> for CacheValue {
    fn from(v: &RuleValue) -> Self {
        match v {
            RuleValue::String(s) => CacheValue::Str(s.clone()),
            RuleValue::Integer(i) => CacheValue::Int(*i),
            RuleValue::Float(f) => CacheValue::Float(*f),
            RuleValue::Bool(b) => CacheValue::Bool(*b),
            RuleValue::Null => CacheValue::Str(String::new()),
            RuleValue::List(items) => CacheValue::List(items.iter().map(CacheValue::from).collect()),
        }
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        CacheValue::Str(s)
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        CacheValue::Str(s.to_string())
    }
}

impl From<i64> for CacheValue {
    fn from(n: i64) -> Self {
        CacheValue::Int(n)
    }
}

impl From<bool> for CacheValue {
    fn from(b: bool) -> Self {
        CacheValue::Bool(b)
    }
}

// =============================================================================
// PropertyCache
// =============================================================================

/// String-keyed evidence map owned by one rule node.
///
/// Setting the same key twice with dict values merges them recursively;
/// any other collision overwrites.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertyCache {
    entries: BTreeMap<String, CacheValue>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: CacheValue) {
        let key = key.into();
        match (self.entries.get_mut(&key), value) {
            (Some(CacheValue::Dict(existing)), CacheValue::Dict(incoming)) => {
                merge_dicts(existing, incoming);
            }
            (_, value) => {
                self.entries.insert(key, value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&CacheValue> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The requirement-kind tag recorded by the first primitive that wrote
    /// into this cache, if any.
    pub fn requirement_type(&self) -> Option<&str> {
        self.get(REQUIREMENT_TYPE_KEY).and_then(|v| v.as_str())
    }

    pub fn set_requirement_type(&mut self, kind: &str) {
        if self.entries.contains_key(REQUIREMENT_TYPE_KEY) {
            return;
        }
        self.entries
            .insert(REQUIREMENT_TYPE_KEY.to_string(), CacheValue::from(kind));
    }

    /// Copy all of `other`'s entries into this cache, merging nested dicts.
    pub fn merge_from(&mut self, other: &PropertyCache) {
        for (key, value) in &other.entries {
            self.set(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheValue)> {
        self.entries.iter()
    }
}

fn merge_dicts(existing: &mut BTreeMap<String, CacheValue>, incoming: BTreeMap<String, CacheValue>) {
    for (key, value) in incoming {
        match (existing.get_mut(&key), value) {
            (Some(CacheValue::Dict(sub)), CacheValue::Dict(inc)) => merge_dicts(sub, inc),
            (_, value) => {
                existing.insert(key, value);
            }
        }
    }
}
