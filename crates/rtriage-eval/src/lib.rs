//! # rtriage-eval
//!
//! Evaluator for declarative diagnostic scenarios.
//!
//! This crate consumes the rule AST produced by [`rtriage_rules`] and the
//! log search layer from [`rtriage_search`], and turns captured host data
//! plus log files into raised issues.
//!
//! ## Architecture
//!
//! - **Requirements** ([`requirement`]): a closed set of typed primitives
//!   (package versions, service states, config assertions, path existence,
//!   property and variable comparisons) composed through and/or/not/nand
//!   groups ([`logical`]) with short-circuiting and type-guarded evidence
//!   caches.
//! - **Checks** ([`check`]): combine a tagged log search with a requirement
//!   tree; evaluated once, with counts and file lists cached for message
//!   templates.
//! - **Conclusions** ([`conclusion`]): priority-ordered decisions over check
//!   results; every reached conclusion at the highest reaching priority
//!   raises an [`Issue`].
//! - **Runner** ([`scenario`]): preloads all searches into one
//!   [`GlobalSearchRegistry`], scans every file once, then evaluates each
//!   scenario in isolation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use rtriage_rules::parse_rules_file;
//! use rtriage_eval::{HostState, MemoryIssueSink, RunContext, ScenarioRunner};
//!
//! let rules = parse_rules_file("rules/openvswitch.yaml".as_ref()).unwrap();
//! let ctx = RunContext::new("/data/sosreport", Utc::now().naive_utc(), HostState::default());
//! let mut sink = MemoryIssueSink::new();
//! let report = ScenarioRunner::new(&ctx).run(&rules, &mut sink).unwrap();
//! for issue in sink.issues() {
//!     println!("[{}] {}", issue.issue_type, issue.message);
//! }
//! println!("{} scenarios evaluated", report.scenarios_evaluated);
//! ```

pub mod cache;
pub mod check;
pub mod conclusion;
pub mod context;
pub mod error;
pub mod issue;
pub mod logical;
pub mod registry;
pub mod requirement;
pub mod resolver;
pub mod scenario;

pub use cache::{CacheValue, PropertyCache, REQUIREMENT_TYPE_KEY};
pub use check::{evaluate_check, CheckOutcome};
pub use conclusion::{evaluate_decision, select_conclusions};
pub use context::{
    ConfigDoc, ConfigHandlers, HostState, PropertyRegistry, RunContext, ScenarioScope,
    ServiceState,
};
pub use error::{EvalError, Result};
pub use issue::{Issue, IssueSink, MemoryIssueSink};
pub use logical::evaluate_requirement;
pub use registry::{GlobalSearchRegistry, SearchDescriptor};
pub use requirement::{evaluate_primitive, Requirement};
pub use resolver::CacheRefResolver;
pub use scenario::{RunReport, ScenarioRunner, RUNNER_WARNING_TYPE};
