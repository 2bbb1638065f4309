//! Shared ops-chain application.
//!
//! A chain of `[operator, expected?]` steps is applied left-to-right with
//! each step's output feeding the next step's input, and the final value
//! collapsed by truthiness.

use rtriage_rules::{CmpOp, OpsChain, RuleValue};

use crate::context::ScenarioScope;
use crate::error::Result;

/// Apply a full ops chain to an input value.
pub fn apply_ops_chain(scope: &ScenarioScope, chain: &OpsChain, input: &RuleValue) -> Result<bool> {
    let mut current = input.clone();
    for step in &chain.steps {
        let expected = match &step.expected {
            Some(RuleValue::String(s)) if s.starts_with('$') => Some(scope.var(&s[1..])?.clone()),
            other => other.clone(),
        };
        current = apply_op(step.op, &current, expected.as_ref(), chain.normalise_value_types);
    }
    Ok(current.truthy())
}

fn apply_op(
    op: CmpOp,
    actual: &RuleValue,
    expected: Option<&RuleValue>,
    normalise: bool,
) -> RuleValue {
    if op == CmpOp::Not {
        return RuleValue::Bool(!actual.truthy());
    }
    let expected = expected.unwrap_or(&RuleValue::Null);
    let actual = if normalise {
        coerce_to_type_of(actual, expected)
    } else {
        actual.clone()
    };
    RuleValue::Bool(compare(op, &actual, expected))
}

fn compare(op: CmpOp, actual: &RuleValue, expected: &RuleValue) -> bool {
    if let (Some(a), Some(e)) = (as_f64(actual), as_f64(expected)) {
        return match op {
            CmpOp::Eq => a == e,
            CmpOp::Ne => a != e,
            CmpOp::Lt => a < e,
            CmpOp::Le => a <= e,
            CmpOp::Gt => a > e,
            CmpOp::Ge => a >= e,
            CmpOp::Not => unreachable!(),
        };
    }
    // non-numeric operands compare as strings
    let a = actual.to_string();
    let e = expected.to_string();
    match op {
        CmpOp::Eq => actual == expected || a == e,
        CmpOp::Ne => actual != expected && a != e,
        CmpOp::Lt => a < e,
        CmpOp::Le => a <= e,
        CmpOp::Gt => a > e,
        CmpOp::Ge => a >= e,
        CmpOp::Not => unreachable!(),
    }
}

fn as_f64(v: &RuleValue) -> Option<f64> {
    match v {
        RuleValue::Integer(i) => Some(*i as f64),
        RuleValue::Float(f) => Some(*f),
        _ => None,
    }
}

/// Coerce the live value to the expected value's type before comparison.
fn coerce_to_type_of(actual: &RuleValue, expected: &RuleValue) -> RuleValue {
    match expected {
        RuleValue::Integer(_) => match actual {
            RuleValue::Integer(_) => actual.clone(),
            RuleValue::Float(f) => RuleValue::Integer(*f as i64),
            RuleValue::Bool(b) => RuleValue::Integer(*b as i64),
            RuleValue::String(s) => s
                .trim()
                .parse::<i64>()
                .map(RuleValue::Integer)
                .unwrap_or_else(|_| actual.clone()),
            _ => actual.clone(),
        },
        RuleValue::Float(_) => match actual {
            RuleValue::Float(_) => actual.clone(),
            RuleValue::Integer(i) => RuleValue::Float(*i as f64),
            RuleValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(RuleValue::Float)
                .unwrap_or_else(|_| actual.clone()),
            _ => actual.clone(),
        },
        RuleValue::Bool(_) => RuleValue::Bool(actual.truthy()),
        RuleValue::String(_) => RuleValue::String(actual.to_string()),
        _ => actual.clone(),
    }
}
