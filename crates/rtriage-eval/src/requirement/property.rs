//! Registered property comparison requirement.

use tracing::warn;

use rtriage_rules::PropertyCheckDef;

use crate::cache::{CacheValue, PropertyCache};
use crate::context::ScenarioScope;
use crate::error::Result;
use crate::requirement::ops::apply_ops_chain;

/// Import a registered property value and apply the ops chain to it. An
/// unknown property id is fatal; a provider returning nothing degrades to
/// `false`.
pub fn evaluate(
    def: &PropertyCheckDef,
    scope: &ScenarioScope,
    cache: &mut PropertyCache,
) -> Result<bool> {
    let Some(value) = scope.ctx.properties.resolve(&def.property, scope.ctx)? else {
        warn!(property = %def.property, "no value available");
        return Ok(false);
    };
    cache.set("property", CacheValue::from(def.property.as_str()));
    cache.set("value_actual", CacheValue::from(&value));
    apply_ops_chain(scope, &def.ops, &value)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use rtriage_rules::{CmpOp, OpStep, OpsChain, RuleValue};

    use crate::context::{HostState, RunContext};
    use crate::error::EvalError;

    use super::*;

    fn ctx() -> RunContext {
        let host = HostState::from_yaml("properties:\n  num_cpus: 8\n").unwrap();
        RunContext::new(
            "/tmp",
            NaiveDateTime::parse_from_str("2024-05-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
            host,
        )
    }

    fn check(property: &str, op: CmpOp, expected: i64) -> PropertyCheckDef {
        PropertyCheckDef {
            property: property.to_string(),
            ops: OpsChain {
                steps: vec![OpStep {
                    op,
                    expected: Some(RuleValue::Integer(expected)),
                }],
                normalise_value_types: false,
            },
        }
    }

    #[test]
    fn test_property_comparison() {
        let ctx = ctx();
        let scope = ScenarioScope::new(&ctx);
        let mut cache = PropertyCache::new();
        assert!(evaluate(&check("num_cpus", CmpOp::Ge, 4), &scope, &mut cache).unwrap());
        assert_eq!(cache.get("value_actual"), Some(&CacheValue::Int(8)));
        let mut cache = PropertyCache::new();
        assert!(!evaluate(&check("num_cpus", CmpOp::Gt, 8), &scope, &mut cache).unwrap());
    }

    #[test]
    fn test_unknown_property_is_fatal() {
        let ctx = ctx();
        let scope = ScenarioScope::new(&ctx);
        let mut cache = PropertyCache::new();
        let err = evaluate(&check("nope", CmpOp::Eq, 1), &scope, &mut cache).unwrap_err();
        assert!(matches!(err, EvalError::UnknownProperty(_)));
    }
}
