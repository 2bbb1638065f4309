//! Logical grouping of requirements (and/or/not/nand).
//!
//! Members are evaluated in list order with short-circuiting: AND and NAND
//! stop at the first `false` member, OR stops at the first `true`. NOT
//! negates the aggregate AND of its members.

use rtriage_rules::{LogicalOp, RequirementDef};

use crate::cache::PropertyCache;
use crate::context::ScenarioScope;
use crate::error::Result;
use crate::requirement::evaluate_primitive;

/// Evaluate a full requirement tree, merging member evidence into `cache`.
pub fn evaluate_requirement(
    def: &RequirementDef,
    scope: &ScenarioScope,
    cache: &mut PropertyCache,
) -> Result<bool> {
    evaluate_node(def, scope, cache, false)
}

fn evaluate_node(
    def: &RequirementDef,
    scope: &ScenarioScope,
    shared: &mut PropertyCache,
    nested: bool,
) -> Result<bool> {
    match def {
        RequirementDef::Primitive(primitive) => {
            let mut scratch = PropertyCache::new();
            let result = evaluate_primitive(primitive, scope, &mut scratch)?;
            merge_guarded(shared, &scratch);
            Ok(result)
        }
        RequirementDef::Group { op, members } => {
            evaluate_group(*op, members, scope, shared, nested)
        }
    }
}

fn evaluate_group(
    op: LogicalOp,
    members: &[RequirementDef],
    scope: &ScenarioScope,
    shared: &mut PropertyCache,
    nested: bool,
) -> Result<bool> {
    let mut evaluated: Vec<(bool, PropertyCache)> = Vec::new();
    let aggregate = match op {
        LogicalOp::And | LogicalOp::Nand | LogicalOp::Not => {
            let mut all = true;
            for member in members {
                let mut scratch = PropertyCache::new();
                let r = evaluate_node(member, scope, &mut scratch, true)?;
                evaluated.push((r, scratch));
                if !r {
                    all = false;
                    break;
                }
            }
            all
        }
        LogicalOp::Or => {
            let mut any = false;
            for member in members {
                let mut scratch = PropertyCache::new();
                let r = evaluate_node(member, scope, &mut scratch, true)?;
                evaluated.push((r, scratch));
                if r {
                    any = true;
                    break;
                }
            }
            any
        }
    };
    let result = match op {
        LogicalOp::And | LogicalOp::Or => aggregate,
        LogicalOp::Not | LogicalOp::Nand => !aggregate,
    };

    // With short-circuiting, the last evaluated member is the one that
    // determined the aggregate. A nested multi-member group only merges
    // that member's evidence upward; otherwise every successful member is
    // merged in order, each guarded by the shared cache's type tag. Failed
    // members never merge: the first successful member's kind owns the
    // shared cache, so a failing earlier member of another kind must not
    // stamp it first.
    if nested && members.len() >= 2 {
        if let Some((_, determining)) = evaluated.last() {
            merge_guarded(shared, determining);
        }
    } else {
        for (passed, scratch) in &evaluated {
            if *passed {
                merge_guarded(shared, scratch);
            }
        }
    }
    Ok(result)
}

/// Merge member evidence unless it comes from a different requirement kind
/// than the one already recorded on the shared cache.
fn merge_guarded(shared: &mut PropertyCache, member: &PropertyCache) {
    if let (Some(existing), Some(incoming)) = (shared.requirement_type(), member.requirement_type())
        && existing != incoming
    {
        return;
    }
    shared.merge_from(member);
}
