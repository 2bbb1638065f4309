//! Requirement primitives and their shared evaluation seam.
//!
//! The set of primitive kinds is closed; each kind is one module here, all
//! reached through [`evaluate_primitive`]. Data problems (missing package,
//! unreadable config file) degrade the primitive to `false` with a warning;
//! configuration problems (unknown handler or property id, unknown variable)
//! are returned as errors.

pub mod config;
pub mod ops;
pub mod package;
pub mod path;
pub mod property;
pub mod service;
pub mod varops;
pub mod version;

use rtriage_rules::PrimitiveDef;

use crate::cache::PropertyCache;
use crate::context::ScenarioScope;
use crate::error::Result;

/// Anything evaluable to a boolean against a scenario scope, recording its
/// evidence into a cache.
pub trait Requirement {
    fn evaluate(&self, scope: &ScenarioScope, cache: &mut PropertyCache) -> Result<bool>;
}

impl Requirement for PrimitiveDef {
    fn evaluate(&self, scope: &ScenarioScope, cache: &mut PropertyCache) -> Result<bool> {
        evaluate_primitive(self, scope, cache)
    }
}

/// Evaluate one typed primitive, tagging the cache with its kind.
pub fn evaluate_primitive(
    def: &PrimitiveDef,
    scope: &ScenarioScope,
    cache: &mut PropertyCache,
) -> Result<bool> {
    cache.set_requirement_type(def.kind());
    match def {
        PrimitiveDef::Apt(check) => package::evaluate(check, &scope.ctx.host.packages, cache),
        PrimitiveDef::Snap(check) => package::evaluate(check, &scope.ctx.host.snaps, cache),
        PrimitiveDef::Systemd(check) => service::evaluate(check, &scope.ctx.host.services, cache),
        PrimitiveDef::Pebble(check) => {
            service::evaluate(check, &scope.ctx.host.pebble_services, cache)
        }
        PrimitiveDef::Config(check) => config::evaluate(check, scope, cache),
        PrimitiveDef::Path(check) => path::evaluate(check, scope, cache),
        PrimitiveDef::Property(check) => property::evaluate(check, scope, cache),
        PrimitiveDef::Varops(check) => varops::evaluate(check, scope, cache),
    }
}
