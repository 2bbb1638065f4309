//! Cache reference resolution for issue message templates.

use std::collections::BTreeMap;

use rtriage_rules::{results_group_index, CacheRef, RendererKind};

use crate::cache::CacheValue;
use crate::check::CheckOutcome;
use crate::context::ScenarioScope;
use crate::error::{EvalError, Result};

/// Resolves `$var` and `@checks.*` references against a scenario's variable
/// scope and evaluated check outcomes.
pub struct CacheRefResolver<'a> {
    scope: &'a ScenarioScope<'a>,
    outcomes: &'a BTreeMap<String, CheckOutcome>,
}

impl<'a> CacheRefResolver<'a> {
    pub fn new(scope: &'a ScenarioScope<'a>, outcomes: &'a BTreeMap<String, CheckOutcome>) -> Self {
        CacheRefResolver { scope, outcomes }
    }

    /// Resolve a reference string to its rendered form.
    pub fn resolve(&self, raw: &str) -> Result<String> {
        let reference = CacheRef::parse(raw)?;
        let (value, renderer) = match &reference {
            CacheRef::Var { name, renderer } => {
                (CacheValue::from(self.scope.var(name)?), *renderer)
            }
            CacheRef::Check {
                check,
                property,
                key,
                renderer,
            } => (self.resolve_check_ref(check, property, key)?, *renderer),
        };
        Ok(match renderer {
            Some(kind) => render(kind, &value),
            None => value.render(),
        })
    }

    fn resolve_check_ref(&self, check: &str, property: &str, key: &str) -> Result<CacheValue> {
        let outcome = self
            .outcomes
            .get(check)
            .ok_or_else(|| EvalError::CheckNotEvaluated(check.to_string()))?;

        // `results_group_<N>` collects group N across all of the check's
        // search results instead of reading the cache.
        if property == "search"
            && let Some(idx) = results_group_index(key)
        {
            return Ok(CacheValue::List(
                outcome
                    .results
                    .iter()
                    .filter_map(|r| r.group(idx))
                    .map(CacheValue::from)
                    .collect(),
            ));
        }

        let section = outcome.cache.get(property).ok_or_else(|| {
            EvalError::UnknownCacheRef {
                check: check.to_string(),
                property: property.to_string(),
                key: key.to_string(),
            }
        })?;
        let CacheValue::Dict(entries) = section else {
            return Err(EvalError::UnknownCacheRef {
                check: check.to_string(),
                property: property.to_string(),
                key: key.to_string(),
            });
        };
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::UnknownCacheRef {
                check: check.to_string(),
                property: property.to_string(),
                key: key.to_string(),
            })
    }
}

fn render(kind: RendererKind, value: &CacheValue) -> String {
    match kind {
        RendererKind::CommaJoin => match value {
            CacheValue::List(items) => items
                .iter()
                .map(|i| i.render())
                .collect::<Vec<_>>()
                .join(", "),
            other => other.render(),
        },
        RendererKind::UniqueCommaJoin => match value {
            CacheValue::List(items) => {
                let mut parts: Vec<String> = items.iter().map(|i| i.render()).collect();
                parts.sort();
                parts.dedup();
                parts.join(", ")
            }
            other => other.render(),
        },
        RendererKind::First => match value {
            CacheValue::List(items) => items.first().map(|i| i.render()).unwrap_or_default(),
            other => other.render(),
        },
        RendererKind::IntRanges => int_ranges(value),
        RendererKind::Len => match value {
            CacheValue::List(items) => items.len().to_string(),
            CacheValue::Str(s) => s.chars().count().to_string(),
            other => other.render(),
        },
    }
}

/// Compress a list of integers into comma-separated ranges:
/// `[1, 2, 3, 5]` becomes `"1-3,5"`.
fn int_ranges(value: &CacheValue) -> String {
    let CacheValue::List(items) = value else {
        return value.render();
    };
    let mut ints: Vec<i64> = items
        .iter()
        .filter_map(|v| match v {
            CacheValue::Int(n) => Some(*n),
            CacheValue::Str(s) => s.parse().ok(),
            _ => None,
        })
        .collect();
    ints.sort_unstable();
    ints.dedup();

    let mut parts: Vec<String> = Vec::new();
    let mut i = 0;
    while i < ints.len() {
        let start = ints[i];
        let mut end = start;
        while i + 1 < ints.len() && ints[i + 1] == end + 1 {
            end = ints[i + 1];
            i += 1;
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
        i += 1;
    }
    parts.join(",")
}
