//! AST types for the declarative rule tree: plugins, groups, scenarios,
//! checks, conclusions, requirement primitives, and searches.
//!
//! Every node is identified by a dot-delimited resolve path unique within a
//! loaded rule set (`plugin.group.scenario.checks.name`). Resolve paths double
//! as search tags.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::value::{CmpOp, OpsChain, RuleValue};

// =============================================================================
// Logical composition
// =============================================================================

/// Logical operator grouping requirement members or decision members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    And,
    Or,
    Not,
    Nand,
}

impl LogicalOp {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "and" => Some(LogicalOp::And),
            "or" => Some(LogicalOp::Or),
            "not" => Some(LogicalOp::Not),
            "nand" => Some(LogicalOp::Nand),
            _ => None,
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
            LogicalOp::Not => "not",
            LogicalOp::Nand => "nand",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Requirement primitives
// =============================================================================

/// A requirement tree: either a single typed primitive or a logical group of
/// nested requirements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RequirementDef {
    Primitive(PrimitiveDef),
    Group {
        op: LogicalOp,
        members: Vec<RequirementDef>,
    },
}

/// One typed requirement primitive. The set of kinds is closed; new behavior
/// is added by extending this enum, not by rule-file scripting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveDef {
    /// Distro package manager package version check.
    Apt(PackageCheckDef),
    /// Snap package version check.
    Snap(PackageCheckDef),
    /// systemd unit state check.
    Systemd(ServiceCheckDef),
    /// Pebble (supervisor-style) service state check.
    Pebble(ServiceCheckDef),
    /// Declarative config assertion against a config handler.
    Config(ConfigCheckDef),
    /// Filesystem path existence check.
    Path(PathCheckDef),
    /// Arbitrary registered property comparison.
    Property(PropertyCheckDef),
    /// Variable comparison.
    Varops(VarOpsDef),
}

impl PrimitiveDef {
    /// The stable kind tag recorded into shared caches.
    pub fn kind(&self) -> &'static str {
        match self {
            PrimitiveDef::Apt(_) => "apt",
            PrimitiveDef::Snap(_) => "snap",
            PrimitiveDef::Systemd(_) => "systemd",
            PrimitiveDef::Pebble(_) => "pebble",
            PrimitiveDef::Config(_) => "config",
            PrimitiveDef::Path(_) => "path",
            PrimitiveDef::Property(_) => "property",
            PrimitiveDef::Varops(_) => "varops",
        }
    }
}

/// Version bound operator in a package version range.
///
/// `min`/`max` are legacy aliases for `ge`/`le`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl VersionOp {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(VersionOp::Eq),
            "lt" => Some(VersionOp::Lt),
            "le" | "max" => Some(VersionOp::Le),
            "gt" => Some(VersionOp::Gt),
            "ge" | "min" => Some(VersionOp::Ge),
            _ => None,
        }
    }
}

/// One version range entry: a set of bounds that must all hold.
///
/// Multiple ranges under one package are OR'd together after normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VersionRangeDef {
    pub bounds: Vec<(VersionOp, String)>,
}

/// One package entry: bare (installed is enough) or constrained to ranges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageEntry {
    pub name: String,
    pub ranges: Vec<VersionRangeDef>,
}

/// Content of an `apt:`/`snap:` requirement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageCheckDef {
    pub packages: Vec<PackageEntry>,
}

/// One service entry in a `systemd:`/`pebble:` requirement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceEntry {
    pub name: String,
    /// Expected state; `None` means "installed is enough".
    pub state: Option<String>,
    /// Operator applied to the state comparison (default `eq`).
    pub op: CmpOp,
    /// Name of another service this one must have started after, with a
    /// 120-second grace window.
    pub started_after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCheckDef {
    pub services: Vec<ServiceEntry>,
}

/// One `{key, section?, ops, allow-unset}` config assertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigAssertionDef {
    pub key: String,
    pub section: Option<String>,
    pub ops: OpsChain,
    /// Truth value used when the key is absent from the config.
    pub allow_unset: bool,
}

/// Content of a `config:` requirement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigCheckDef {
    /// Config handler identifier, resolved through a compile-time registry.
    pub handler: String,
    /// Path of the config file, relative to the data root.
    pub path: Option<String>,
    pub assertions: Vec<ConfigAssertionDef>,
}

/// Content of a `path:` requirement: all listed paths must exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathCheckDef {
    pub paths: Vec<String>,
}

/// Content of a `property:` requirement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyCheckDef {
    /// Property identifier, resolved through a compile-time registry.
    pub property: String,
    pub ops: OpsChain,
}

/// Content of a `varops:` requirement: `[[$name], [op, expected], ...]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarOpsDef {
    /// Variable name, without the leading `$`.
    pub name: String,
    pub ops: OpsChain,
}

// =============================================================================
// Search property
// =============================================================================

/// A pattern expression with an optional cheap pre-filter hint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternDef {
    pub patterns: Vec<String>,
    /// Plain substring checked before attempting the regex.
    pub hint: Option<String>,
}

/// The expression part of a search: simple or sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SearchExpr {
    Simple(PatternDef),
    Sequence {
        start: PatternDef,
        body: Option<PatternDef>,
        end: Option<PatternDef>,
    },
}

/// Post-hoc result constraints attached to a search.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SearchConstraintsDef {
    /// Keep only the first window of this many hours containing at least
    /// `min_results` results.
    pub search_period_hours: Option<f64>,
    /// Drop results older than this many hours.
    pub search_result_age_hours: Option<f64>,
    /// Drop results timestamped within this many hours after boot.
    pub min_hours_since_last_boot: Option<f64>,
    /// Drop the entire result set when fewer than this many results remain.
    pub min_results: Option<usize>,
}

impl SearchConstraintsDef {
    pub fn is_empty(&self) -> bool {
        self.search_period_hours.is_none()
            && self.search_result_age_hours.is_none()
            && self.min_hours_since_last_boot.is_none()
            && self.min_results.is_none()
    }
}

/// A check's search property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchDef {
    pub expr: SearchExpr,
    /// Return raw matching lines rather than structured sequence sections.
    pub passthrough_results: bool,
    pub constraints: Option<SearchConstraintsDef>,
}

impl SearchDef {
    pub fn is_sequence(&self) -> bool {
        matches!(self.expr, SearchExpr::Sequence { .. })
    }
}

// =============================================================================
// Checks, conclusions, scenarios
// =============================================================================

/// The file or command a check's search and input-driven requirements read.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct InputDef {
    /// Path relative to the data root.
    pub path: Option<String>,
    /// Logical command name resolved by the execution collaborator.
    pub command: Option<String>,
}

impl InputDef {
    pub fn is_empty(&self) -> bool {
        self.path.is_none() && self.command.is_none()
    }

    /// Child values override parent values key by key.
    pub fn merged_over(&self, parent: &InputDef) -> InputDef {
        InputDef {
            path: self.path.clone().or_else(|| parent.path.clone()),
            command: self.command.clone().or_else(|| parent.command.clone()),
        }
    }
}

/// A variable definition: a literal value or a `@property` import resolved at
/// scenario start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum VarDef {
    Literal(RuleValue),
    PropertyImport(String),
}

/// A named boolean-producing check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckDef {
    pub name: String,
    /// `plugin.group.scenario.checks.name`; doubles as the search tag.
    pub resolve_path: String,
    pub search: Option<SearchDef>,
    pub requires: Option<RequirementDef>,
    pub input: Option<InputDef>,
}

/// A decision expression over check names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DecisionExpr {
    Check(String),
    Group {
        op: LogicalOp,
        members: Vec<DecisionExpr>,
    },
}

/// What a reached conclusion raises.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaisesSpec {
    /// Issue type tag, e.g. `SystemWarning`.
    pub issue_type: String,
    /// Message template with `{}` (positional) or `{name}` placeholders.
    pub message: String,
    /// Named values; entries that look like cache/variable references are
    /// resolved before formatting.
    pub format_dict: BTreeMap<String, String>,
    /// Indices into the first search result's captured groups.
    pub format_groups: Vec<usize>,
    pub bug_id: Option<String>,
}

/// A named conclusion with priority and decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConclusionDef {
    pub name: String,
    pub resolve_path: String,
    pub priority: i64,
    pub decision: DecisionExpr,
    pub raises: RaisesSpec,
}

/// One rule group: the checks and conclusions evaluated together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioDef {
    pub name: String,
    /// `plugin.group.scenario` — the scenario's identity.
    pub resolve_path: String,
    /// Ordered variable definitions (insertion order preserved).
    pub vars: Vec<(String, VarDef)>,
    /// Effective input after inheritance from plugin/group levels.
    pub input: Option<InputDef>,
    pub checks: Vec<CheckDef>,
    pub conclusions: Vec<ConclusionDef>,
}

impl ScenarioDef {
    pub fn check(&self, name: &str) -> Option<&CheckDef> {
        self.checks.iter().find(|c| c.name == name)
    }
}

// =============================================================================
// Collection
// =============================================================================

/// All scenarios loaded from one or more rule files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RuleCollection {
    pub scenarios: Vec<ScenarioDef>,
    /// Parse errors collected while loading directories.
    #[serde(skip)]
    pub errors: Vec<String>,
}

impl RuleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    pub fn extend(&mut self, other: RuleCollection) {
        self.scenarios.extend(other.scenarios);
        self.errors.extend(other.errors);
    }
}
