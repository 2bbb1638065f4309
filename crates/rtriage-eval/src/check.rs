//! Check evaluation.
//!
//! A check combines an optional tagged search with an optional requirement
//! tree; when both are present both must hold. Search evidence
//! (`num_results`, `files`) and requirement evidence land in separate cache
//! sections so cache references can address them as
//! `@checks.<name>.search.<key>` and `@checks.<name>.requires.<key>`.

use std::collections::BTreeMap;

use tracing::debug;

use rtriage_rules::{CheckDef, SearchDef, SearchExpr};
use rtriage_search::{ExtraConstraints, SearchResult, SearchResults};

use crate::cache::{CacheValue, PropertyCache};
use crate::context::ScenarioScope;
use crate::error::{EvalError, Result};
use crate::logical::evaluate_requirement;

/// The outcome of evaluating one check, computed once per run.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub result: bool,
    pub cache: PropertyCache,
    /// Filtered search results, kept for message rendering.
    pub results: Vec<SearchResult>,
}

/// Evaluate a check against the combined search results.
pub fn evaluate_check(
    def: &CheckDef,
    scope: &ScenarioScope,
    combined: &SearchResults,
) -> Result<CheckOutcome> {
    if def.search.is_none() && def.requires.is_none() {
        return Err(EvalError::EmptyCheck(def.name.clone()));
    }

    let mut cache = PropertyCache::new();
    let mut result = true;
    let mut results = Vec::new();

    if let Some(search) = &def.search {
        results = filtered_results(search, &def.resolve_path, scope, combined);
        let mut files: Vec<String> = results
            .iter()
            .map(|r| r.source.display().to_string())
            .collect();
        files.sort();
        files.dedup();
        let mut section = BTreeMap::new();
        section.insert(
            "num_results".to_string(),
            CacheValue::Int(results.len() as i64),
        );
        section.insert(
            "files".to_string(),
            CacheValue::List(files.into_iter().map(CacheValue::Str).collect()),
        );
        cache.set("search", CacheValue::Dict(section));
        result = !results.is_empty();
        debug!(check = %def.name, num_results = results.len(), "search evaluated");
    }

    if result && let Some(requires) = &def.requires {
        let mut req_cache = PropertyCache::new();
        result = evaluate_requirement(requires, scope, &mut req_cache)?;
        let section: BTreeMap<String, CacheValue> = req_cache
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        cache.set("requires", CacheValue::Dict(section));
        debug!(check = %def.name, result, "requirements evaluated");
    }

    Ok(CheckOutcome {
        result,
        cache,
        results,
    })
}

/// Pull a search's tagged results and apply its post-filters. Sequence
/// searches are judged by their assembled sections; passthrough sequences
/// by the raw start/end lines.
fn filtered_results(
    search: &SearchDef,
    tag: &str,
    scope: &ScenarioScope,
    combined: &SearchResults,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = match &search.expr {
        SearchExpr::Simple(_) => combined.find_by_tag(tag).into_iter().cloned().collect(),
        SearchExpr::Sequence { .. } if search.passthrough_results => {
            let (start_tag, _, end_tag) = rtriage_search::sequence_tags(tag);
            let mut all: Vec<SearchResult> = combined
                .find_by_tag(&start_tag)
                .into_iter()
                .chain(combined.find_by_tag(&end_tag))
                .cloned()
                .collect();
            all.sort_by(|a, b| (&a.source, a.line_number).cmp(&(&b.source, b.line_number)));
            all
        }
        SearchExpr::Sequence { .. } => combined
            .find_sequence_sections(tag)
            .into_iter()
            .map(|section| section.start)
            .collect(),
    };
    if let Some(constraints) = &search.constraints {
        let extra = ExtraConstraints::from(constraints);
        results = extra.apply(results, scope.ctx.now, scope.ctx.host.boot_time);
    }
    results
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;
    use std::path::PathBuf;

    use rtriage_rules::{PackageCheckDef, PackageEntry, PatternDef, PrimitiveDef, RequirementDef};

    use crate::context::{HostState, RunContext};

    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn ctx() -> RunContext {
        let host = HostState::from_yaml("packages:\n  pkg-good: '2.0'\n").unwrap();
        RunContext::new("/tmp", dt("2024-05-01 12:00:00"), host)
    }

    fn hit(tag: &str, line: u64) -> SearchResult {
        SearchResult {
            tag: tag.to_string(),
            source: PathBuf::from("/var/log/app.log"),
            line_number: line,
            timestamp: None,
            groups: vec![Some(format!("line{line}"))],
        }
    }

    fn search_def() -> SearchDef {
        SearchDef {
            expr: SearchExpr::Simple(PatternDef {
                patterns: vec!["x".to_string()],
                hint: None,
            }),
            passthrough_results: false,
            constraints: None,
        }
    }

    fn apt_requires(name: &str) -> RequirementDef {
        RequirementDef::Primitive(PrimitiveDef::Apt(PackageCheckDef {
            packages: vec![PackageEntry {
                name: name.to_string(),
                ranges: vec![],
            }],
        }))
    }

    #[test]
    fn test_search_check_caches_counts_and_files() {
        let ctx = ctx();
        let scope = ScenarioScope::new(&ctx);
        let combined = SearchResults::new(vec![hit("p.g.s.checks.c1", 1), hit("p.g.s.checks.c1", 2)]);
        let def = CheckDef {
            name: "c1".to_string(),
            resolve_path: "p.g.s.checks.c1".to_string(),
            search: Some(search_def()),
            requires: None,
            input: None,
        };
        let outcome = evaluate_check(&def, &scope, &combined).unwrap();
        assert!(outcome.result);
        let CacheValue::Dict(section) = outcome.cache.get("search").unwrap() else {
            panic!("expected dict");
        };
        assert_eq!(section.get("num_results"), Some(&CacheValue::Int(2)));
        assert_eq!(
            section.get("files"),
            Some(&CacheValue::List(vec![CacheValue::Str(
                "/var/log/app.log".to_string()
            )]))
        );
    }

    #[test]
    fn test_search_and_requires_both_must_hold() {
        let ctx = ctx();
        let scope = ScenarioScope::new(&ctx);
        let combined = SearchResults::new(vec![hit("p.g.s.checks.c1", 1)]);
        let def = CheckDef {
            name: "c1".to_string(),
            resolve_path: "p.g.s.checks.c1".to_string(),
            search: Some(search_def()),
            requires: Some(apt_requires("pkg-missing")),
            input: None,
        };
        let outcome = evaluate_check(&def, &scope, &combined).unwrap();
        assert!(!outcome.result);
    }

    #[test]
    fn test_empty_check_is_config_error() {
        let ctx = ctx();
        let scope = ScenarioScope::new(&ctx);
        let combined = SearchResults::new(vec![]);
        let def = CheckDef {
            name: "c1".to_string(),
            resolve_path: "p.g.s.checks.c1".to_string(),
            search: None,
            requires: None,
            input: None,
        };
        assert!(matches!(
            evaluate_check(&def, &scope, &combined),
            Err(EvalError::EmptyCheck(_))
        ));
    }

    #[test]
    fn test_requires_only_check() {
        let ctx = ctx();
        let scope = ScenarioScope::new(&ctx);
        let combined = SearchResults::new(vec![]);
        let def = CheckDef {
            name: "c1".to_string(),
            resolve_path: "p.g.s.checks.c1".to_string(),
            search: None,
            requires: Some(apt_requires("pkg-good")),
            input: None,
        };
        let outcome = evaluate_check(&def, &scope, &combined).unwrap();
        assert!(outcome.result);
        let CacheValue::Dict(section) = outcome.cache.get("requires").unwrap() else {
            panic!("expected dict");
        };
        assert_eq!(
            section.get("version"),
            Some(&CacheValue::Str("2.0".to_string()))
        );
    }
}
