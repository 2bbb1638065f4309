//! Declarative config assertion requirement.

use tracing::warn;

use rtriage_rules::ConfigCheckDef;

use crate::cache::{CacheValue, PropertyCache};
use crate::context::ScenarioScope;
use crate::error::Result;
use crate::requirement::ops::apply_ops_chain;

/// Load the configured handler's document and evaluate every assertion
/// against it. Unknown handler ids are fatal; unreadable files degrade to
/// `false`.
pub fn evaluate(
    def: &ConfigCheckDef,
    scope: &ScenarioScope,
    cache: &mut PropertyCache,
) -> Result<bool> {
    let handler = scope.ctx.config_handlers.get(&def.handler)?;
    let Some(path) = &def.path else {
        warn!(handler = %def.handler, "config requirement without a path");
        return Ok(false);
    };
    let resolved = scope.ctx.resolve_data_path(path);
    let doc = match handler(&resolved) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %resolved.display(), error = %e, "failed to load config");
            return Ok(false);
        }
    };

    for assertion in &def.assertions {
        let value = doc.get(assertion.section.as_deref(), &assertion.key);
        let passed = match value {
            Some(value) => {
                cache.set("key", CacheValue::from(assertion.key.as_str()));
                cache.set("value_actual", CacheValue::from(value));
                apply_ops_chain(scope, &assertion.ops, value)?
            }
            None => assertion.allow_unset,
        };
        if !passed {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::NaiveDateTime;

    use rtriage_rules::{CmpOp, ConfigAssertionDef, OpStep, OpsChain, RuleValue};

    use crate::context::{HostState, RunContext};

    use super::*;

    fn ctx_with_root(root: &std::path::Path) -> RunContext {
        RunContext::new(
            root,
            NaiveDateTime::parse_from_str("2024-05-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
            HostState::default(),
        )
    }

    fn assertion(key: &str, steps: Vec<(CmpOp, i64)>, allow_unset: bool) -> ConfigAssertionDef {
        ConfigAssertionDef {
            key: key.to_string(),
            section: None,
            ops: OpsChain {
                steps: steps
                    .into_iter()
                    .map(|(op, n)| OpStep {
                        op,
                        expected: Some(RuleValue::Integer(n)),
                    })
                    .collect(),
                normalise_value_types: false,
            },
            allow_unset,
        }
    }

    fn write_conf(dir: &std::path::Path, content: &str) {
        std::fs::create_dir_all(dir.join("etc")).unwrap();
        let mut f = std::fs::File::create(dir.join("etc/app.conf")).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_window_assertion_passes() {
        let dir = tempfile::tempdir().unwrap();
        write_conf(dir.path(), "threshold = 101\n");
        let ctx = ctx_with_root(dir.path());
        let scope = ScenarioScope::new(&ctx);
        let def = ConfigCheckDef {
            handler: "ini".to_string(),
            path: Some("etc/app.conf".to_string()),
            assertions: vec![assertion(
                "threshold",
                vec![(CmpOp::Lt, 102), (CmpOp::Gt, 0)],
                false,
            )],
        };
        let mut cache = PropertyCache::new();
        assert!(evaluate(&def, &scope, &mut cache).unwrap());
        assert_eq!(cache.get("value_actual"), Some(&CacheValue::Int(101)));
    }

    #[test]
    fn test_unset_key_uses_allow_unset() {
        let dir = tempfile::tempdir().unwrap();
        write_conf(dir.path(), "other = 1\n");
        let ctx = ctx_with_root(dir.path());
        let scope = ScenarioScope::new(&ctx);
        for (allow_unset, expected) in [(true, true), (false, false)] {
            let def = ConfigCheckDef {
                handler: "ini".to_string(),
                path: Some("etc/app.conf".to_string()),
                assertions: vec![assertion("missing", vec![(CmpOp::Gt, 0)], allow_unset)],
            };
            let mut cache = PropertyCache::new();
            assert_eq!(evaluate(&def, &scope, &mut cache).unwrap(), expected);
        }
    }

    #[test]
    fn test_missing_file_degrades_to_false() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_root(dir.path());
        let scope = ScenarioScope::new(&ctx);
        let def = ConfigCheckDef {
            handler: "ini".to_string(),
            path: Some("etc/nope.conf".to_string()),
            assertions: vec![assertion("k", vec![(CmpOp::Gt, 0)], false)],
        };
        let mut cache = PropertyCache::new();
        assert!(!evaluate(&def, &scope, &mut cache).unwrap());
    }

    #[test]
    fn test_not_wrapped_assertions_invert() {
        use rtriage_rules::{LogicalOp, PrimitiveDef, RequirementDef};

        use crate::logical::evaluate_requirement;

        let dir = tempfile::tempdir().unwrap();
        write_conf(dir.path(), "threshold = 101\n");
        let ctx = ctx_with_root(dir.path());
        let scope = ScenarioScope::new(&ctx);

        let member = |steps| {
            RequirementDef::Primitive(PrimitiveDef::Config(ConfigCheckDef {
                handler: "ini".to_string(),
                path: Some("etc/app.conf".to_string()),
                assertions: vec![assertion("threshold", steps, false)],
            }))
        };
        let group = RequirementDef::Group {
            op: LogicalOp::Not,
            members: vec![
                member(vec![(CmpOp::Lt, 103)]),
                member(vec![(CmpOp::Gt, 100)]),
            ],
        };

        // Both members hold individually, so the negated group must fail.
        let mut cache = PropertyCache::new();
        assert!(!evaluate_requirement(&group, &scope, &mut cache).unwrap());
    }

    #[test]
    fn test_unknown_handler_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_root(dir.path());
        let scope = ScenarioScope::new(&ctx);
        let def = ConfigCheckDef {
            handler: "toml".to_string(),
            path: Some("etc/app.conf".to_string()),
            assertions: vec![],
        };
        let mut cache = PropertyCache::new();
        assert!(evaluate(&def, &scope, &mut cache).is_err());
    }
}
