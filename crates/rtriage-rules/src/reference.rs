//! Cache reference grammar.
//!
//! Conclusion message templates pull previously cached evaluation results out
//! of the live check and variable caches using two reference forms:
//!
//! - `$name[:renderer]` — variable lookup
//! - `@checks.<check>.<property>.<key>[:renderer]` — check cache lookup
//!
//! The cache key prefix `results_group_<N>` selects group `N` from every one
//! of the check's search results rather than a plain cache entry.

use serde::Serialize;

use crate::error::{Result, RuleParserError};

/// A renderer applied to a resolved reference value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    /// Join list items with `", "`.
    CommaJoin,
    /// Sort, dedupe, then join list items with `", "`.
    UniqueCommaJoin,
    /// First item of a list.
    First,
    /// Compress a list of integers into ranges: `[1,2,3,5]` → `"1-3,5"`.
    IntRanges,
    /// Length of a list or string.
    Len,
}

impl RendererKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "comma_join" => Some(RendererKind::CommaJoin),
            "unique_comma_join" => Some(RendererKind::UniqueCommaJoin),
            "first" => Some(RendererKind::First),
            "int_ranges" => Some(RendererKind::IntRanges),
            "len" => Some(RendererKind::Len),
            _ => None,
        }
    }
}

/// A parsed cache reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CacheRef {
    Var {
        name: String,
        renderer: Option<RendererKind>,
    },
    Check {
        check: String,
        /// Which cache section of the check: `search` or `requires`.
        property: String,
        key: String,
        renderer: Option<RendererKind>,
    },
}

impl CacheRef {
    /// Quick test for whether a string is plausibly a reference at all.
    pub fn looks_like_ref(s: &str) -> bool {
        s.starts_with('$') || s.starts_with("@checks.")
    }

    /// Parse a reference string. Fails with a clear error when the syntax is
    /// invalid; plain strings are not references and also fail here — callers
    /// gate on [`CacheRef::looks_like_ref`] first.
    pub fn parse(raw: &str) -> Result<Self> {
        let (body, renderer) = match raw.rsplit_once(':') {
            Some((body, tail)) => {
                let renderer = RendererKind::from_str(tail).ok_or_else(|| {
                    RuleParserError::InvalidReference(
                        raw.to_string(),
                        format!("unknown renderer '{tail}'"),
                    )
                })?;
                (body, Some(renderer))
            }
            None => (raw, None),
        };

        if let Some(name) = body.strip_prefix('$') {
            if name.is_empty() {
                return Err(RuleParserError::InvalidReference(
                    raw.to_string(),
                    "empty variable name".to_string(),
                ));
            }
            return Ok(CacheRef::Var {
                name: name.to_string(),
                renderer,
            });
        }

        if let Some(rest) = body.strip_prefix("@checks.") {
            let mut parts = rest.splitn(3, '.');
            let check = parts.next().unwrap_or_default();
            let property = parts.next().unwrap_or_default();
            let key = parts.next().unwrap_or_default();
            if check.is_empty() || property.is_empty() || key.is_empty() {
                return Err(RuleParserError::InvalidReference(
                    raw.to_string(),
                    "expected @checks.<check>.<property>.<key>".to_string(),
                ));
            }
            return Ok(CacheRef::Check {
                check: check.to_string(),
                property: property.to_string(),
                key: key.to_string(),
                renderer,
            });
        }

        Err(RuleParserError::InvalidReference(
            raw.to_string(),
            "references start with '$' or '@checks.'".to_string(),
        ))
    }

    pub fn renderer(&self) -> Option<RendererKind> {
        match self {
            CacheRef::Var { renderer, .. } | CacheRef::Check { renderer, .. } => *renderer,
        }
    }
}

/// Group index parsed from a `results_group_<N>` cache key, if it is one.
pub fn results_group_index(key: &str) -> Option<usize> {
    key.strip_prefix("results_group_")?.parse().ok()
}
