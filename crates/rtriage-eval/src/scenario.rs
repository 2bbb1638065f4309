//! Scenario runner: preload searches, evaluate checks, raise conclusions.
//!
//! The run is two-phase. Every scenario's searches are registered and all
//! files scanned once; only then are checks and conclusions evaluated, so no
//! scenario can trigger a rescan. A failure inside one scenario is caught
//! and reported, never allowed to stop the others.

use std::collections::BTreeMap;

use chrono::Datelike;
use tracing::{debug, error, info, warn};

use rtriage_rules::{RuleCollection, RuleValue, ScenarioDef, VarDef};
use rtriage_search::{compile_search, FileSearcher, ScanConstraint, SearchResults};

use crate::check::{evaluate_check, CheckOutcome};
use crate::conclusion::select_conclusions;
use crate::context::{RunContext, ScenarioScope};
use crate::error::Result;
use crate::issue::{Issue, IssueSink};
use crate::registry::{GlobalSearchRegistry, SearchDescriptor};

/// Issue type used for the run-level warning that names failed scenarios.
pub const RUNNER_WARNING_TYPE: &str = "scenario-eval-warning";

/// What one run did.
#[derive(Debug, Default)]
pub struct RunReport {
    pub scenarios_evaluated: usize,
    pub issues_raised: usize,
    pub failed_scenarios: Vec<String>,
}

pub struct ScenarioRunner<'a> {
    ctx: &'a RunContext,
    registry: GlobalSearchRegistry,
    searcher: FileSearcher,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        ScenarioRunner {
            ctx,
            registry: GlobalSearchRegistry::new(),
            searcher: FileSearcher::with_year_hint(ctx.now.year()),
        }
    }

    /// Run every scenario in the collection, sending raised issues to the
    /// sink. Configuration faults during preload (duplicate tags, invalid
    /// patterns) terminate the run; per-scenario evaluation faults are
    /// caught and summarized.
    pub fn run(&mut self, rules: &RuleCollection, sink: &mut dyn IssueSink) -> Result<RunReport> {
        for scenario in &rules.scenarios {
            self.preload(scenario)?;
        }
        let combined = self.registry.run(&self.searcher)?;

        let mut report = RunReport::default();
        for scenario in &rules.scenarios {
            match self.evaluate_scenario(scenario, &combined) {
                Ok(issues) => {
                    report.scenarios_evaluated += 1;
                    report.issues_raised += issues.len();
                    for issue in issues {
                        sink.add(issue);
                    }
                }
                Err(e) => {
                    error!(scenario = %scenario.resolve_path, error = %e, "scenario failed");
                    report.failed_scenarios.push(scenario.resolve_path.clone());
                }
            }
        }

        if !report.failed_scenarios.is_empty() {
            sink.add(Issue {
                issue_type: RUNNER_WARNING_TYPE.to_string(),
                message: format!(
                    "failed to evaluate scenarios: {}",
                    report.failed_scenarios.join(", ")
                ),
                scenario: String::new(),
                priority: 0,
                bug_id: None,
            });
        }
        info!(
            evaluated = report.scenarios_evaluated,
            issues = report.issues_raised,
            failed = report.failed_scenarios.len(),
            "run complete"
        );
        Ok(report)
    }

    fn preload(&mut self, scenario: &ScenarioDef) -> Result<()> {
        for check in &scenario.checks {
            let Some(search) = &check.search else {
                continue;
            };
            self.registry.register(SearchDescriptor {
                tag: check.resolve_path.clone(),
                passthrough: search.passthrough_results,
                sequence: search.is_sequence(),
            })?;

            // the parser has already merged inherited input into the check
            let Some(path) = check.input.as_ref().and_then(|i| i.path.clone()) else {
                warn!(check = %check.resolve_path, "search check without an input path");
                continue;
            };
            let defs = compile_search(&check.resolve_path, search)?;
            let constraint = self
                .ctx
                .constraint
                .clone()
                .map(|c| c as std::sync::Arc<dyn ScanConstraint + Send + Sync>);
            self.searcher
                .add(defs, self.ctx.resolve_data_path(&path), constraint);
        }
        self.registry.set_loaded(&scenario.resolve_path)?;
        debug!(scenario = %scenario.resolve_path, "searches preloaded");
        Ok(())
    }

    fn evaluate_scenario(
        &self,
        scenario: &ScenarioDef,
        combined: &SearchResults,
    ) -> Result<Vec<Issue>> {
        let mut scope = ScenarioScope::new(self.ctx);
        for (name, def) in &scenario.vars {
            let value = match def {
                VarDef::Literal(value) => value.clone(),
                VarDef::PropertyImport(id) => self
                    .ctx
                    .properties
                    .resolve(id, self.ctx)?
                    .unwrap_or(RuleValue::Null),
            };
            scope.set_var(name.clone(), value);
        }

        let mut outcomes: BTreeMap<String, CheckOutcome> = BTreeMap::new();
        for check in &scenario.checks {
            let outcome = evaluate_check(check, &scope, combined)?;
            debug!(check = %check.resolve_path, result = outcome.result, "check evaluated");
            outcomes.insert(check.name.clone(), outcome);
        }

        select_conclusions(&scenario.resolve_path, &scenario.conclusions, &scope, &outcomes)
    }
}
