//! Conclusion selection and issue message rendering.

use std::collections::BTreeMap;

use tracing::debug;

use rtriage_rules::{CacheRef, ConclusionDef, DecisionExpr, LogicalOp, RaisesSpec};

use crate::check::CheckOutcome;
use crate::context::ScenarioScope;
use crate::error::{EvalError, Result};
use crate::issue::Issue;
use crate::resolver::CacheRefResolver;

/// Evaluate a scenario's conclusions and return the issues to raise.
///
/// Conclusions are grouped by priority and walked from the highest level
/// down; the first level with at least one reached conclusion wins, and
/// every reached conclusion at that level is raised.
pub fn select_conclusions(
    scenario_path: &str,
    conclusions: &[ConclusionDef],
    scope: &ScenarioScope,
    outcomes: &BTreeMap<String, CheckOutcome>,
) -> Result<Vec<Issue>> {
    let mut by_priority: BTreeMap<i64, Vec<&ConclusionDef>> = BTreeMap::new();
    for conclusion in conclusions {
        by_priority.entry(conclusion.priority).or_default().push(conclusion);
    }

    for (priority, level) in by_priority.iter().rev() {
        let mut issues = Vec::new();
        for conclusion in level {
            if evaluate_decision(&conclusion.decision, outcomes)? {
                debug!(conclusion = %conclusion.name, priority, "conclusion reached");
                issues.push(build_issue(scenario_path, conclusion, scope, outcomes)?);
            }
        }
        if !issues.is_empty() {
            return Ok(issues);
        }
    }
    Ok(Vec::new())
}

/// Evaluate a decision expression over already-computed check outcomes,
/// with the same short-circuit rules as requirement groups.
pub fn evaluate_decision(
    decision: &DecisionExpr,
    outcomes: &BTreeMap<String, CheckOutcome>,
) -> Result<bool> {
    match decision {
        DecisionExpr::Check(name) => outcomes
            .get(name)
            .map(|o| o.result)
            .ok_or_else(|| EvalError::UnknownCheck(name.clone())),
        DecisionExpr::Group { op, members } => {
            let aggregate = match op {
                LogicalOp::And | LogicalOp::Nand | LogicalOp::Not => {
                    let mut all = true;
                    for member in members {
                        if !evaluate_decision(member, outcomes)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                LogicalOp::Or => {
                    let mut any = false;
                    for member in members {
                        if evaluate_decision(member, outcomes)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
            };
            Ok(match op {
                LogicalOp::And | LogicalOp::Or => aggregate,
                LogicalOp::Not | LogicalOp::Nand => !aggregate,
            })
        }
    }
}

fn build_issue(
    scenario_path: &str,
    conclusion: &ConclusionDef,
    scope: &ScenarioScope,
    outcomes: &BTreeMap<String, CheckOutcome>,
) -> Result<Issue> {
    let message = render_message(&conclusion.raises, &conclusion.decision, scope, outcomes)?;
    Ok(Issue {
        issue_type: conclusion.raises.issue_type.clone(),
        message,
        scenario: scenario_path.to_string(),
        priority: conclusion.priority,
        bug_id: conclusion.raises.bug_id.clone(),
    })
}

/// Render a raises message: positional `{}` placeholders from the first
/// search result's captured groups, or `{name}` substitution from the
/// format dict with cache references resolved.
fn render_message(
    raises: &RaisesSpec,
    decision: &DecisionExpr,
    scope: &ScenarioScope,
    outcomes: &BTreeMap<String, CheckOutcome>,
) -> Result<String> {
    if !raises.format_groups.is_empty() {
        let groups = first_result_groups(decision, outcomes, &raises.format_groups);
        return Ok(fill_positional(&raises.message, &groups));
    }
    if !raises.format_dict.is_empty() {
        let resolver = CacheRefResolver::new(scope, outcomes);
        let mut message = raises.message.clone();
        for (name, value) in &raises.format_dict {
            let rendered = if CacheRef::looks_like_ref(value) {
                resolver.resolve(value)?
            } else {
                value.clone()
            };
            message = message.replace(&format!("{{{name}}}"), &rendered);
        }
        return Ok(message);
    }
    Ok(raises.message.clone())
}

/// Captured groups from the first search result of the first decision check
/// that produced any, in format-group order.
fn first_result_groups(
    decision: &DecisionExpr,
    outcomes: &BTreeMap<String, CheckOutcome>,
    indices: &[usize],
) -> Vec<String> {
    let mut names = Vec::new();
    collect_check_names(decision, &mut names);
    for name in names {
        if let Some(outcome) = outcomes.get(&name)
            && let Some(first) = outcome.results.first()
        {
            return indices
                .iter()
                .map(|&i| first.group(i).unwrap_or_default().to_string())
                .collect();
        }
    }
    Vec::new()
}

fn collect_check_names(decision: &DecisionExpr, out: &mut Vec<String>) {
    match decision {
        DecisionExpr::Check(name) => out.push(name.clone()),
        DecisionExpr::Group { members, .. } => {
            for member in members {
                collect_check_names(member, out);
            }
        }
    }
}

fn fill_positional(template: &str, values: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut next = 0;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        out.push_str(values.get(next).map(String::as_str).unwrap_or(""));
        next += 1;
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}
