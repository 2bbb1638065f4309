//! # rtriage-rules
//!
//! Parser for declarative diagnostic rule files.
//!
//! Rule files describe *scenarios*: named groups of boolean-producing
//! *checks* (full-text searches over host artifacts and/or typed requirement
//! trees) and *conclusions* (prioritized decisions over check results that
//! raise issues). This crate parses rule YAML into a strongly typed AST:
//!
//! - **Rule tree**: plugin → group → scenario nesting with `vars`/`input`
//!   inheritance
//! - **Requirement primitives**: `apt`, `snap`, `systemd`, `pebble`,
//!   `config`, `path`, `property`, `varops` — a closed set
//! - **Logical composition**: `and`/`or`/`not`/`nand` groups, arbitrarily
//!   nested
//! - **Search properties**: simple and sequence expressions, hints, result
//!   constraints
//! - **Reference grammar**: `$var[:renderer]` and
//!   `@checks.<check>.<property>.<key>[:renderer]`
//!
//! Evaluation lives in `rtriage-eval`; this crate is purely syntactic.
//!
//! ## Quick Start
//!
//! ```rust
//! use rtriage_rules::parse_rules_yaml;
//!
//! let yaml = r#"
//! myplugin:
//!   mygroup:
//!     my-scenario:
//!       checks:
//!         has_error:
//!           search: 'ERROR .+'
//!       conclusions:
//!         trouble:
//!           decision: has_error
//!           raises:
//!             type: SystemWarning
//!             message: errors found
//! "#;
//!
//! let collection = parse_rules_yaml(yaml).unwrap();
//! assert_eq!(collection.scenarios.len(), 1);
//! assert_eq!(collection.scenarios[0].resolve_path, "myplugin.mygroup.my-scenario");
//! ```

pub mod ast;
pub mod error;
pub mod parser;
pub mod reference;
pub mod value;

pub use ast::{
    CheckDef, ConclusionDef, ConfigAssertionDef, ConfigCheckDef, DecisionExpr, InputDef,
    LogicalOp, PackageCheckDef, PackageEntry, PathCheckDef, PatternDef, PrimitiveDef,
    PropertyCheckDef, RaisesSpec, RequirementDef, RuleCollection, ScenarioDef,
    SearchConstraintsDef, SearchDef, SearchExpr, ServiceCheckDef, ServiceEntry, VarDef,
    VarOpsDef, VersionOp, VersionRangeDef,
};
pub use error::{Result, RuleParserError};
pub use parser::{parse_rules_directory, parse_rules_file, parse_rules_yaml};
pub use reference::{CacheRef, RendererKind, results_group_index};
pub use value::{CmpOp, OpStep, OpsChain, RuleValue};
