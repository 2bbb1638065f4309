//! Scalar values and comparison operator chains used throughout the rule tree.

use std::fmt;

use serde::Serialize;

use crate::error::{Result, RuleParserError};

// =============================================================================
// RuleValue — typed scalar values in rule properties
// =============================================================================

/// A typed value appearing in a rule property: an expected comparison operand,
/// a variable definition, a config assertion value, and so on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
    List(Vec<RuleValue>),
}

impl RuleValue {
    /// Convert a `serde_yaml::Value` into a `RuleValue`.
    ///
    /// Mappings are not representable and collapse to `Null`; callers that
    /// need structured values handle mappings before reaching here.
    pub fn from_yaml(v: &serde_yaml::Value) -> Self {
        match v {
            serde_yaml::Value::String(s) => RuleValue::String(s.clone()),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RuleValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    RuleValue::Float(f)
                } else {
                    RuleValue::Null
                }
            }
            serde_yaml::Value::Bool(b) => RuleValue::Bool(*b),
            serde_yaml::Value::Sequence(items) => {
                RuleValue::List(items.iter().map(RuleValue::from_yaml).collect())
            }
            _ => RuleValue::Null,
        }
    }

    /// Truthiness, matching the semantics used by ops chains: `false`, `0`,
    /// `0.0`, empty string, empty list, and null are falsy.
    pub fn truthy(&self) -> bool {
        match self {
            RuleValue::String(s) => !s.is_empty(),
            RuleValue::Integer(i) => *i != 0,
            RuleValue::Float(f) => *f != 0.0,
            RuleValue::Bool(b) => *b,
            RuleValue::Null => false,
            RuleValue::List(l) => !l.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RuleValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleValue::String(s) => write!(f, "{s}"),
            RuleValue::Integer(n) => write!(f, "{n}"),
            RuleValue::Float(n) => write!(f, "{n}"),
            RuleValue::Bool(b) => write!(f, "{b}"),
            RuleValue::Null => write!(f, "null"),
            RuleValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| format!("{i}")).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

// =============================================================================
// Comparison operators and ops chains
// =============================================================================

/// A comparison operator usable in an ops chain.
///
/// The set is closed: rules cannot introduce new operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Truthiness negation; takes no expected operand.
    Not,
}

impl CmpOp {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(CmpOp::Eq),
            "ne" => Some(CmpOp::Ne),
            "lt" => Some(CmpOp::Lt),
            "le" => Some(CmpOp::Le),
            "gt" => Some(CmpOp::Gt),
            "ge" => Some(CmpOp::Ge),
            "not" => Some(CmpOp::Not),
            _ => None,
        }
    }

    /// Whether this operator consumes an expected operand.
    pub fn takes_operand(&self) -> bool {
        !matches!(self, CmpOp::Not)
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
            CmpOp::Not => "not",
        };
        write!(f, "{s}")
    }
}

/// One step in an ops chain: an operator plus its optional expected operand.
///
/// The operand may be a `$variable` reference string, resolved at evaluation
/// time against the current variable scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpStep {
    pub op: CmpOp,
    pub expected: Option<RuleValue>,
}

/// An ordered chain of comparison steps applied left-to-right, each step's
/// output feeding the next step's input.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OpsChain {
    pub steps: Vec<OpStep>,
    /// Coerce the live input value to the expected value's type before
    /// each comparison.
    pub normalise_value_types: bool,
}

impl OpsChain {
    /// Parse an ops chain from YAML: a sequence of `[op, expected?]` entries.
    ///
    /// `[[gt, 100], [lt, 103]]` parses to two steps. A bare `[[not]]` is a
    /// single operand-less step.
    pub fn from_yaml(v: &serde_yaml::Value) -> Result<Self> {
        let seq = v.as_sequence().ok_or_else(|| {
            RuleParserError::InvalidRequirement(format!("ops must be a list, got: {v:?}"))
        })?;
        let mut steps = Vec::with_capacity(seq.len());
        for entry in seq {
            steps.push(Self::parse_step(entry)?);
        }
        Ok(OpsChain {
            steps,
            normalise_value_types: false,
        })
    }

    fn parse_step(entry: &serde_yaml::Value) -> Result<OpStep> {
        let parts = entry.as_sequence().ok_or_else(|| {
            RuleParserError::InvalidRequirement(format!(
                "ops entry must be a [op, expected?] list, got: {entry:?}"
            ))
        })?;
        let name = parts
            .first()
            .and_then(|p| p.as_str())
            .ok_or_else(|| RuleParserError::MissingField("ops operator".to_string()))?;
        let op =
            CmpOp::from_str(name).ok_or_else(|| RuleParserError::UnknownOperator(name.into()))?;
        let expected = match parts.get(1) {
            Some(v) => {
                if !op.takes_operand() {
                    return Err(RuleParserError::InvalidRequirement(format!(
                        "operator '{op}' takes no operand"
                    )));
                }
                Some(RuleValue::from_yaml(v))
            }
            None => None,
        };
        Ok(OpStep { op, expected })
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_ops_chain_parse() {
        let chain = OpsChain::from_yaml(&yaml("[[gt, 100], [lt, 103]]")).unwrap();
        assert_eq!(chain.steps.len(), 2);
        assert_eq!(chain.steps[0].op, CmpOp::Gt);
        assert_eq!(chain.steps[0].expected, Some(RuleValue::Integer(100)));
        assert_eq!(chain.steps[1].op, CmpOp::Lt);
    }

    #[test]
    fn test_ops_chain_not_takes_no_operand() {
        assert!(OpsChain::from_yaml(&yaml("[[not]]")).is_ok());
        assert!(OpsChain::from_yaml(&yaml("[[not, 1]]")).is_err());
    }

    #[test]
    fn test_ops_chain_unknown_operator() {
        let err = OpsChain::from_yaml(&yaml("[[contains, x]]")).unwrap_err();
        assert!(matches!(err, RuleParserError::UnknownOperator(_)));
    }

    #[test]
    fn test_ops_chain_variable_operand() {
        let chain = OpsChain::from_yaml(&yaml("[[ge, $limit]]")).unwrap();
        assert_eq!(
            chain.steps[0].expected,
            Some(RuleValue::String("$limit".to_string()))
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!RuleValue::Null.truthy());
        assert!(!RuleValue::Integer(0).truthy());
        assert!(!RuleValue::String(String::new()).truthy());
        assert!(RuleValue::Float(0.5).truthy());
        assert!(RuleValue::Bool(true).truthy());
    }
}
