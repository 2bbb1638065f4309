//! Filesystem path existence requirement.

use tracing::debug;

use rtriage_rules::PathCheckDef;

use crate::cache::{CacheValue, PropertyCache};
use crate::context::ScenarioScope;
use crate::error::Result;

/// All listed paths must exist under the data root; short-circuits on the
/// first miss.
pub fn evaluate(
    def: &PathCheckDef,
    scope: &ScenarioScope,
    cache: &mut PropertyCache,
) -> Result<bool> {
    for path in &def.paths {
        let resolved = scope.ctx.resolve_data_path(path);
        if !resolved.exists() {
            debug!(path = %resolved.display(), "path missing");
            cache.set("path_not_found", CacheValue::from(path.as_str()));
            return Ok(false);
        }
    }
    cache.set(
        "paths",
        CacheValue::List(def.paths.iter().map(|p| CacheValue::from(p.as_str())).collect()),
    );
    Ok(true)
}
