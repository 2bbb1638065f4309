//! Variable comparison requirement.

use rtriage_rules::VarOpsDef;

use crate::cache::{CacheValue, PropertyCache};
use crate::context::ScenarioScope;
use crate::error::Result;
use crate::requirement::ops::apply_ops_chain;

/// Resolve a `$name` variable from the scenario scope and apply the ops
/// chain. Unknown variables are configuration errors.
pub fn evaluate(
    def: &VarOpsDef,
    scope: &ScenarioScope,
    cache: &mut PropertyCache,
) -> Result<bool> {
    let value = scope.var(&def.name)?.clone();
    cache.set("name", CacheValue::from(def.name.as_str()));
    cache.set("value_actual", CacheValue::from(&value));
    apply_ops_chain(scope, &def.ops, &value)
}
