//! YAML → AST parser for declarative rule files.
//!
//! A rule file is a nested mapping: plugin name → group name → scenario name.
//! Intermediate nodes may carry `vars` and `input` properties that descendants
//! inherit unless overridden. Scenarios are recognized by the presence of
//! `checks` and `conclusions` sections.
//!
//! Handles:
//! - Requirement trees (logical groups + typed primitives)
//! - Package version range shorthand and dict forms
//! - Service state shorthand and dict forms
//! - Search properties (simple, sequence, constraints)
//! - Decision expressions over check names
//! - Directory-based rule collection loading

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::Value;

use crate::ast::*;
use crate::error::{Result, RuleParserError};
use crate::value::{CmpOp, OpsChain, RuleValue};

// =============================================================================
// Public API
// =============================================================================

/// Parse a YAML string containing a rule tree.
pub fn parse_rules_yaml(yaml: &str) -> Result<RuleCollection> {
    let root: Value = serde_yaml::from_str(yaml)?;
    let mapping = root
        .as_mapping()
        .ok_or_else(|| RuleParserError::InvalidScenario(
            "<root>".to_string(),
            "rule file root must be a mapping".to_string(),
        ))?;

    let mut collection = RuleCollection::new();
    for (plugin_name, plugin_val) in mapping {
        let plugin_name = key_str(plugin_name)?;
        let plugin_map = mapping_of(plugin_val, &plugin_name)?;
        let plugin_scope = Scope::root().child(plugin_map)?;

        for (group_name, group_val) in plugin_map {
            let group_name = key_str(group_name)?;
            if is_meta_key(&group_name) {
                continue;
            }
            let group_map = mapping_of(group_val, &group_name)?;
            let group_scope = plugin_scope.child(group_map)?;

            for (scenario_name, scenario_val) in group_map {
                let scenario_name = key_str(scenario_name)?;
                if is_meta_key(&scenario_name) {
                    continue;
                }
                let path = format!("{plugin_name}.{group_name}.{scenario_name}");
                let scenario_map = mapping_of(scenario_val, &path)?;
                let scenario =
                    parse_scenario(&scenario_name, &path, scenario_map, &group_scope)?;
                collection.scenarios.push(scenario);
            }
        }
    }
    Ok(collection)
}

/// Parse a single rule file.
pub fn parse_rules_file(path: &Path) -> Result<RuleCollection> {
    let content = std::fs::read_to_string(path)?;
    parse_rules_yaml(&content)
}

/// Parse all `.yaml`/`.yml` rule files under a directory (recursive).
///
/// Per-file parse errors are collected into the returned collection's
/// `errors` rather than aborting the whole load.
pub fn parse_rules_directory(dir: &Path) -> Result<RuleCollection> {
    let mut collection = RuleCollection::new();
    walk_rules_dir(dir, &mut collection)?;
    Ok(collection)
}

fn walk_rules_dir(dir: &Path, collection: &mut RuleCollection) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            walk_rules_dir(&path, collection)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        ) {
            match parse_rules_file(&path) {
                Ok(parsed) => collection.extend(parsed),
                Err(e) => collection.errors.push(format!("{}: {e}", path.display())),
            }
        }
    }
    Ok(())
}

// =============================================================================
// Inherited scope (vars + input)
// =============================================================================

/// Accumulated `vars`/`input` inherited down the tree.
#[derive(Debug, Clone, Default)]
struct Scope {
    vars: Vec<(String, VarDef)>,
    input: Option<InputDef>,
}

impl Scope {
    fn root() -> Self {
        Scope::default()
    }

    fn child(&self, map: &serde_yaml::Mapping) -> Result<Scope> {
        let mut scope = self.clone();
        if let Some(vars_val) = map.get(Value::from("vars")) {
            for (name, def) in parse_vars(vars_val)? {
                // child definitions override parent ones of the same name
                scope.vars.retain(|(n, _)| *n != name);
                scope.vars.push((name, def));
            }
        }
        if let Some(input_val) = map.get(Value::from("input")) {
            let input = parse_input(input_val)?;
            scope.input = Some(match &scope.input {
                Some(parent) => input.merged_over(parent),
                None => input,
            });
        }
        Ok(scope)
    }
}

fn is_meta_key(key: &str) -> bool {
    matches!(key, "vars" | "input")
}

fn parse_vars(v: &Value) -> Result<Vec<(String, VarDef)>> {
    let map = v
        .as_mapping()
        .ok_or_else(|| RuleParserError::MissingField("vars mapping".to_string()))?;
    let mut vars = Vec::with_capacity(map.len());
    for (name, val) in map {
        let name = key_str(name)?;
        let def = match val.as_str() {
            Some(s) if s.starts_with('@') => VarDef::PropertyImport(s[1..].to_string()),
            _ => VarDef::Literal(RuleValue::from_yaml(val)),
        };
        vars.push((name, def));
    }
    Ok(vars)
}

fn parse_input(v: &Value) -> Result<InputDef> {
    if let Some(s) = v.as_str() {
        return Ok(InputDef {
            path: Some(s.to_string()),
            command: None,
        });
    }
    let map = v
        .as_mapping()
        .ok_or_else(|| RuleParserError::MissingField("input mapping".to_string()))?;
    Ok(InputDef {
        path: get_str(map, "path"),
        command: get_str(map, "command"),
    })
}

// =============================================================================
// Scenario
// =============================================================================

fn parse_scenario(
    name: &str,
    resolve_path: &str,
    map: &serde_yaml::Mapping,
    parent: &Scope,
) -> Result<ScenarioDef> {
    let scope = parent.child(map)?;

    let checks_val = map.get(Value::from("checks")).ok_or_else(|| {
        RuleParserError::InvalidScenario(resolve_path.to_string(), "missing 'checks'".to_string())
    })?;
    let conclusions_val = map.get(Value::from("conclusions")).ok_or_else(|| {
        RuleParserError::InvalidScenario(
            resolve_path.to_string(),
            "missing 'conclusions'".to_string(),
        )
    })?;

    let checks_map = mapping_of(checks_val, &format!("{resolve_path}.checks"))?;
    let mut checks = Vec::with_capacity(checks_map.len());
    for (check_name, check_val) in checks_map {
        let check_name = key_str(check_name)?;
        let check_path = format!("{resolve_path}.checks.{check_name}");
        checks.push(parse_check(&check_name, &check_path, check_val, &scope)?);
    }

    let conclusions_map = mapping_of(conclusions_val, &format!("{resolve_path}.conclusions"))?;
    let mut conclusions = Vec::with_capacity(conclusions_map.len());
    for (conc_name, conc_val) in conclusions_map {
        let conc_name = key_str(conc_name)?;
        let conc_path = format!("{resolve_path}.conclusions.{conc_name}");
        conclusions.push(parse_conclusion(&conc_name, &conc_path, conc_val)?);
    }

    Ok(ScenarioDef {
        name: name.to_string(),
        resolve_path: resolve_path.to_string(),
        vars: scope.vars,
        input: scope.input,
        checks,
        conclusions,
    })
}

// =============================================================================
// Checks
// =============================================================================

fn parse_check(
    name: &str,
    resolve_path: &str,
    v: &Value,
    scope: &Scope,
) -> Result<CheckDef> {
    let map = mapping_of(v, resolve_path)?;

    let search = map
        .get(Value::from("search"))
        .map(|s| parse_search(s, resolve_path))
        .transpose()?;

    let requires = map
        .get(Value::from("requires"))
        .map(parse_requirement)
        .transpose()?;

    let own_input = map
        .get(Value::from("input"))
        .map(parse_input)
        .transpose()?;
    let input = match (own_input, &scope.input) {
        (Some(own), Some(inherited)) => Some(own.merged_over(inherited)),
        (Some(own), None) => Some(own),
        (None, inherited) => inherited.clone(),
    };

    if search.is_none() && requires.is_none() {
        return Err(RuleParserError::InvalidCheck(
            resolve_path.to_string(),
            "check needs a search and/or requires property".to_string(),
        ));
    }

    Ok(CheckDef {
        name: name.to_string(),
        resolve_path: resolve_path.to_string(),
        search,
        requires,
        input,
    })
}

// =============================================================================
// Requirements
// =============================================================================

/// Parse a requirement tree node.
///
/// A sequence is an implicit AND group. A mapping with a single logical-op key
/// is an explicit group. A mapping of primitive kinds is a primitive (or an
/// implicit AND of several primitives).
pub fn parse_requirement(v: &Value) -> Result<RequirementDef> {
    if let Some(seq) = v.as_sequence() {
        let members = seq
            .iter()
            .map(parse_requirement)
            .collect::<Result<Vec<_>>>()?;
        return Ok(group_or_single(LogicalOp::And, members));
    }

    let map = v.as_mapping().ok_or_else(|| {
        RuleParserError::InvalidRequirement(format!("expected mapping or list, got: {v:?}"))
    })?;

    let mut members = Vec::with_capacity(map.len());
    for (key, val) in map {
        let key = key_str(key)?;
        if let Some(op) = LogicalOp::from_str(&key) {
            let inner = match val.as_sequence() {
                Some(seq) => seq
                    .iter()
                    .map(parse_requirement)
                    .collect::<Result<Vec<_>>>()?,
                None => vec![parse_requirement(val)?],
            };
            members.push(RequirementDef::Group { op, members: inner });
        } else {
            members.push(RequirementDef::Primitive(parse_primitive(&key, val)?));
        }
    }
    Ok(group_or_single(LogicalOp::And, members))
}

fn group_or_single(op: LogicalOp, mut members: Vec<RequirementDef>) -> RequirementDef {
    if members.len() == 1 {
        members.remove(0)
    } else {
        RequirementDef::Group { op, members }
    }
}

fn parse_primitive(kind: &str, v: &Value) -> Result<PrimitiveDef> {
    match kind {
        "apt" => Ok(PrimitiveDef::Apt(parse_package_check(v)?)),
        "snap" => Ok(PrimitiveDef::Snap(parse_package_check(v)?)),
        "systemd" => Ok(PrimitiveDef::Systemd(parse_service_check(v)?)),
        "pebble" => Ok(PrimitiveDef::Pebble(parse_service_check(v)?)),
        "config" => Ok(PrimitiveDef::Config(parse_config_check(v)?)),
        "path" => Ok(PrimitiveDef::Path(PathCheckDef {
            paths: str_or_list(v, "path")?,
        })),
        "property" => Ok(PrimitiveDef::Property(parse_property_check(v)?)),
        "varops" => Ok(PrimitiveDef::Varops(parse_varops(v)?)),
        other => Err(RuleParserError::InvalidRequirement(format!(
            "unknown requirement kind '{other}'"
        ))),
    }
}

fn parse_package_check(v: &Value) -> Result<PackageCheckDef> {
    let mut packages = Vec::new();
    if let Some(s) = v.as_str() {
        packages.push(PackageEntry {
            name: s.to_string(),
            ranges: Vec::new(),
        });
    } else if let Some(seq) = v.as_sequence() {
        for item in seq {
            let name = item.as_str().ok_or_else(|| {
                RuleParserError::InvalidRequirement(format!("package name must be a string: {item:?}"))
            })?;
            packages.push(PackageEntry {
                name: name.to_string(),
                ranges: Vec::new(),
            });
        }
    } else if let Some(map) = v.as_mapping() {
        for (name, ranges_val) in map {
            let name = key_str(name)?;
            let ranges = parse_version_ranges(ranges_val)?;
            packages.push(PackageEntry { name, ranges });
        }
    } else {
        return Err(RuleParserError::InvalidRequirement(format!(
            "invalid package requirement content: {v:?}"
        )));
    }
    Ok(PackageCheckDef { packages })
}

fn parse_version_ranges(v: &Value) -> Result<Vec<VersionRangeDef>> {
    match v {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(seq) => seq.iter().map(parse_version_range).collect(),
        Value::Mapping(_) => Ok(vec![parse_version_range(v)?]),
        other => Err(RuleParserError::InvalidRequirement(format!(
            "invalid version ranges: {other:?}"
        ))),
    }
}

fn parse_version_range(v: &Value) -> Result<VersionRangeDef> {
    let map = v.as_mapping().ok_or_else(|| {
        RuleParserError::InvalidRequirement(format!("version range must be a mapping: {v:?}"))
    })?;
    let mut bounds = Vec::with_capacity(map.len());
    for (op_name, version) in map {
        let op_name = key_str(op_name)?;
        let op = VersionOp::from_str(&op_name)
            .ok_or_else(|| RuleParserError::UnknownOperator(op_name.clone()))?;
        let version = scalar_string(version).ok_or_else(|| {
            RuleParserError::InvalidRequirement(format!("version must be a scalar: {version:?}"))
        })?;
        bounds.push((op, version));
    }
    Ok(VersionRangeDef { bounds })
}

fn parse_service_check(v: &Value) -> Result<ServiceCheckDef> {
    let mut services = Vec::new();
    if let Some(s) = v.as_str() {
        services.push(bare_service(s));
    } else if let Some(seq) = v.as_sequence() {
        for item in seq {
            let name = item.as_str().ok_or_else(|| {
                RuleParserError::InvalidRequirement(format!("service name must be a string: {item:?}"))
            })?;
            services.push(bare_service(name));
        }
    } else if let Some(map) = v.as_mapping() {
        for (name, content) in map {
            let name = key_str(name)?;
            let entry = match content {
                Value::String(state) => ServiceEntry {
                    name,
                    state: Some(state.clone()),
                    op: CmpOp::Eq,
                    started_after: None,
                },
                Value::Mapping(m) => {
                    let op = match get_str(m, "op") {
                        Some(op_name) => CmpOp::from_str(&op_name)
                            .ok_or(RuleParserError::UnknownOperator(op_name))?,
                        None => CmpOp::Eq,
                    };
                    ServiceEntry {
                        name,
                        state: get_str(m, "state"),
                        op,
                        started_after: get_str(m, "started-after"),
                    }
                }
                other => {
                    return Err(RuleParserError::InvalidRequirement(format!(
                        "invalid service entry: {other:?}"
                    )));
                }
            };
            services.push(entry);
        }
    } else {
        return Err(RuleParserError::InvalidRequirement(format!(
            "invalid service requirement content: {v:?}"
        )));
    }
    Ok(ServiceCheckDef { services })
}

fn bare_service(name: &str) -> ServiceEntry {
    ServiceEntry {
        name: name.to_string(),
        state: None,
        op: CmpOp::Eq,
        started_after: None,
    }
}

fn parse_config_check(v: &Value) -> Result<ConfigCheckDef> {
    let map = v.as_mapping().ok_or_else(|| {
        RuleParserError::InvalidRequirement("config requirement must be a mapping".to_string())
    })?;
    let handler = get_str(map, "handler")
        .ok_or_else(|| RuleParserError::MissingField("config handler".to_string()))?;
    let path = get_str(map, "path");

    let assertions_val = map
        .get(Value::from("assertions"))
        .ok_or_else(|| RuleParserError::MissingField("config assertions".to_string()))?;
    let seq = assertions_val.as_sequence().ok_or_else(|| {
        RuleParserError::InvalidRequirement("config assertions must be a list".to_string())
    })?;

    let mut assertions = Vec::with_capacity(seq.len());
    for item in seq {
        let m = item.as_mapping().ok_or_else(|| {
            RuleParserError::InvalidRequirement(format!("assertion must be a mapping: {item:?}"))
        })?;
        let key = get_str(m, "key")
            .ok_or_else(|| RuleParserError::MissingField("assertion key".to_string()))?;
        let mut ops = match m.get(Value::from("ops")) {
            Some(ops_val) => OpsChain::from_yaml(ops_val)?,
            None => OpsChain::default(),
        };
        ops.normalise_value_types = m
            .get(Value::from("normalise-value-types"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        assertions.push(ConfigAssertionDef {
            key,
            section: get_str(m, "section"),
            ops,
            allow_unset: m
                .get(Value::from("allow-unset"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
    }

    Ok(ConfigCheckDef {
        handler,
        path,
        assertions,
    })
}

fn parse_property_check(v: &Value) -> Result<PropertyCheckDef> {
    if let Some(s) = v.as_str() {
        return Ok(PropertyCheckDef {
            property: s.to_string(),
            ops: OpsChain::default(),
        });
    }
    let map = v.as_mapping().ok_or_else(|| {
        RuleParserError::InvalidRequirement("property requirement must be a string or mapping".to_string())
    })?;
    let property = get_str(map, "path")
        .ok_or_else(|| RuleParserError::MissingField("property path".to_string()))?;
    let mut ops = match map.get(Value::from("ops")) {
        Some(ops_val) => OpsChain::from_yaml(ops_val)?,
        None => OpsChain::default(),
    };
    ops.normalise_value_types = map
        .get(Value::from("normalise-value-types"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(PropertyCheckDef { property, ops })
}

/// Parse `varops: [[$name], [op, expected], ...]`.
fn parse_varops(v: &Value) -> Result<VarOpsDef> {
    let seq = v.as_sequence().ok_or_else(|| {
        RuleParserError::InvalidRequirement("varops must be a list".to_string())
    })?;
    let first = seq
        .first()
        .and_then(Value::as_sequence)
        .and_then(|s| s.first())
        .and_then(Value::as_str)
        .ok_or_else(|| {
            RuleParserError::InvalidRequirement(
                "varops must start with a [$name] entry".to_string(),
            )
        })?;
    let name = first.strip_prefix('$').ok_or_else(|| {
        RuleParserError::InvalidRequirement(format!(
            "varops target '{first}' must be a $variable reference"
        ))
    })?;
    let rest = Value::Sequence(seq[1..].to_vec());
    Ok(VarOpsDef {
        name: name.to_string(),
        ops: OpsChain::from_yaml(&rest)?,
    })
}

// =============================================================================
// Searches
// =============================================================================

fn parse_search(v: &Value, resolve_path: &str) -> Result<SearchDef> {
    // shorthand: bare pattern or list of patterns
    if v.as_str().is_some() || v.as_sequence().is_some() {
        return Ok(SearchDef {
            expr: SearchExpr::Simple(parse_pattern(v, resolve_path)?),
            passthrough_results: false,
            constraints: None,
        });
    }

    let map = v.as_mapping().ok_or_else(|| {
        RuleParserError::InvalidSearch(format!("{resolve_path}: invalid search content"))
    })?;

    let constraints = map
        .get(Value::from("constraints"))
        .map(parse_search_constraints)
        .transpose()?;
    let passthrough_results = map
        .get(Value::from("passthrough-results"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let expr = if let Some(start_val) = map.get(Value::from("start")) {
        SearchExpr::Sequence {
            start: parse_pattern(start_val, resolve_path)?,
            body: map
                .get(Value::from("body"))
                .map(|b| parse_pattern(b, resolve_path))
                .transpose()?,
            end: map
                .get(Value::from("end"))
                .map(|e| parse_pattern(e, resolve_path))
                .transpose()?,
        }
    } else if let Some(expr_val) = map.get(Value::from("expr")) {
        let mut pattern = parse_pattern(expr_val, resolve_path)?;
        pattern.hint = get_str(map, "hint");
        SearchExpr::Simple(pattern)
    } else {
        return Err(RuleParserError::InvalidSearch(format!(
            "{resolve_path}: search needs 'expr' or 'start'"
        )));
    };

    Ok(SearchDef {
        expr,
        passthrough_results,
        constraints,
    })
}

fn parse_pattern(v: &Value, resolve_path: &str) -> Result<PatternDef> {
    if let Some(s) = v.as_str() {
        return Ok(PatternDef {
            patterns: vec![s.to_string()],
            hint: None,
        });
    }
    if let Some(seq) = v.as_sequence() {
        let patterns = seq
            .iter()
            .map(|p| {
                p.as_str().map(str::to_string).ok_or_else(|| {
                    RuleParserError::InvalidSearch(format!(
                        "{resolve_path}: pattern must be a string"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(PatternDef {
            patterns,
            hint: None,
        });
    }
    if let Some(map) = v.as_mapping() {
        let expr_val = map.get(Value::from("expr")).ok_or_else(|| {
            RuleParserError::InvalidSearch(format!("{resolve_path}: pattern missing 'expr'"))
        })?;
        let mut pattern = parse_pattern(expr_val, resolve_path)?;
        pattern.hint = get_str(map, "hint");
        return Ok(pattern);
    }
    Err(RuleParserError::InvalidSearch(format!(
        "{resolve_path}: invalid pattern: {v:?}"
    )))
}

fn parse_search_constraints(v: &Value) -> Result<SearchConstraintsDef> {
    let map = v.as_mapping().ok_or_else(|| {
        RuleParserError::InvalidSearch("search constraints must be a mapping".to_string())
    })?;
    Ok(SearchConstraintsDef {
        search_period_hours: get_f64(map, "search-period-hours"),
        search_result_age_hours: get_f64(map, "search-result-age-hours"),
        min_hours_since_last_boot: get_f64(map, "min-hours-since-last-boot"),
        min_results: get_f64(map, "min-results").map(|f| f as usize),
    })
}

// =============================================================================
// Conclusions
// =============================================================================

fn parse_conclusion(name: &str, resolve_path: &str, v: &Value) -> Result<ConclusionDef> {
    let map = mapping_of(v, resolve_path)?;

    let priority = map
        .get(Value::from("priority"))
        .and_then(Value::as_i64)
        .unwrap_or(1);

    let decision_val = map.get(Value::from("decision")).ok_or_else(|| {
        RuleParserError::InvalidConclusion(resolve_path.to_string(), "missing 'decision'".to_string())
    })?;
    let decision = parse_decision(decision_val, resolve_path)?;

    let raises_val = map.get(Value::from("raises")).ok_or_else(|| {
        RuleParserError::InvalidConclusion(resolve_path.to_string(), "missing 'raises'".to_string())
    })?;
    let raises = parse_raises(raises_val, resolve_path)?;

    Ok(ConclusionDef {
        name: name.to_string(),
        resolve_path: resolve_path.to_string(),
        priority,
        decision,
        raises,
    })
}

/// Parse a decision expression: a bare check name, a list (implicit AND), or
/// a mapping of logical ops over nested decisions.
pub fn parse_decision(v: &Value, resolve_path: &str) -> Result<DecisionExpr> {
    if let Some(s) = v.as_str() {
        return Ok(DecisionExpr::Check(s.to_string()));
    }
    if let Some(seq) = v.as_sequence() {
        let members = seq
            .iter()
            .map(|m| parse_decision(m, resolve_path))
            .collect::<Result<Vec<_>>>()?;
        return Ok(decision_group_or_single(LogicalOp::And, members));
    }
    if let Some(map) = v.as_mapping() {
        let mut members = Vec::with_capacity(map.len());
        for (key, val) in map {
            let key = key_str(key)?;
            let op = LogicalOp::from_str(&key)
                .ok_or_else(|| RuleParserError::UnknownLogicalOp(key.clone()))?;
            let inner = match val.as_sequence() {
                Some(seq) => seq
                    .iter()
                    .map(|m| parse_decision(m, resolve_path))
                    .collect::<Result<Vec<_>>>()?,
                None => vec![parse_decision(val, resolve_path)?],
            };
            members.push(DecisionExpr::Group { op, members: inner });
        }
        return Ok(decision_group_or_single(LogicalOp::And, members));
    }
    Err(RuleParserError::InvalidConclusion(
        resolve_path.to_string(),
        format!("invalid decision: {v:?}"),
    ))
}

fn decision_group_or_single(op: LogicalOp, mut members: Vec<DecisionExpr>) -> DecisionExpr {
    if members.len() == 1 {
        members.remove(0)
    } else {
        DecisionExpr::Group { op, members }
    }
}

fn parse_raises(v: &Value, resolve_path: &str) -> Result<RaisesSpec> {
    let map = mapping_of(v, resolve_path)?;
    let issue_type = get_str(map, "type")
        .ok_or_else(|| RuleParserError::MissingField("raises type".to_string()))?;
    let message = get_str(map, "message")
        .ok_or_else(|| RuleParserError::MissingField("raises message".to_string()))?;

    let mut format_dict = BTreeMap::new();
    if let Some(dict_val) = map.get(Value::from("format-dict")) {
        let dict = dict_val.as_mapping().ok_or_else(|| {
            RuleParserError::InvalidConclusion(
                resolve_path.to_string(),
                "format-dict must be a mapping".to_string(),
            )
        })?;
        for (k, val) in dict {
            let k = key_str(k)?;
            let val = scalar_string(val).ok_or_else(|| {
                RuleParserError::InvalidConclusion(
                    resolve_path.to_string(),
                    format!("format-dict value for '{k}' must be a scalar"),
                )
            })?;
            format_dict.insert(k, val);
        }
    }

    let mut format_groups = Vec::new();
    if let Some(groups_val) = map.get(Value::from("format-groups")) {
        let seq = groups_val.as_sequence().ok_or_else(|| {
            RuleParserError::InvalidConclusion(
                resolve_path.to_string(),
                "format-groups must be a list".to_string(),
            )
        })?;
        for g in seq {
            let idx = g.as_u64().ok_or_else(|| {
                RuleParserError::InvalidConclusion(
                    resolve_path.to_string(),
                    "format-groups entries must be integers".to_string(),
                )
            })?;
            format_groups.push(idx as usize);
        }
    }

    Ok(RaisesSpec {
        issue_type,
        message,
        format_dict,
        format_groups,
        bug_id: get_str(map, "bug-id"),
    })
}

// =============================================================================
// Helpers
// =============================================================================

fn key_str(v: &Value) -> Result<String> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| RuleParserError::MissingField(format!("string key, got: {v:?}")))
}

fn mapping_of<'a>(v: &'a Value, context: &str) -> Result<&'a serde_yaml::Mapping> {
    v.as_mapping().ok_or_else(|| {
        RuleParserError::InvalidScenario(context.to_string(), "expected a mapping".to_string())
    })
}

fn get_str(map: &serde_yaml::Mapping, key: &str) -> Option<String> {
    map.get(Value::from(key)).and_then(scalar_string)
}

fn get_f64(map: &serde_yaml::Mapping, key: &str) -> Option<f64> {
    map.get(Value::from(key)).and_then(Value::as_f64)
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn str_or_list(v: &Value, what: &str) -> Result<Vec<String>> {
    if let Some(s) = v.as_str() {
        return Ok(vec![s.to_string()]);
    }
    if let Some(seq) = v.as_sequence() {
        return seq
            .iter()
            .map(|p| {
                p.as_str().map(str::to_string).ok_or_else(|| {
                    RuleParserError::InvalidRequirement(format!("{what} entries must be strings"))
                })
            })
            .collect();
    }
    Err(RuleParserError::InvalidRequirement(format!(
        "{what} must be a string or list"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"
myplugin:
  mygroup:
    input:
      path: var/log/app.log
    vars:
      limit: 10
    my-scenario:
      checks:
        has_error:
          search:
            expr: 'ERROR (\S+)'
            constraints:
              min-results: 3
        pkg_ok:
          requires:
            apt:
              mypkg:
                - gt: '1.0'
                  le: '2.0'
      conclusions:
        trouble:
          priority: 2
          decision:
            and:
              - has_error
              - pkg_ok
          raises:
            type: SystemWarning
            message: 'errors seen in {file}'
            format-dict:
              file: '@checks.has_error.search.files:first'
"#;

    #[test]
    fn test_parse_basic_scenario() {
        let coll = parse_rules_yaml(BASIC).unwrap();
        assert_eq!(coll.scenarios.len(), 1);
        let s = &coll.scenarios[0];
        assert_eq!(s.resolve_path, "myplugin.mygroup.my-scenario");
        assert_eq!(s.checks.len(), 2);
        assert_eq!(s.conclusions.len(), 1);
        assert_eq!(s.vars, vec![(
            "limit".to_string(),
            VarDef::Literal(RuleValue::Integer(10))
        )]);
        assert_eq!(
            s.input.as_ref().unwrap().path.as_deref(),
            Some("var/log/app.log")
        );
    }

    #[test]
    fn test_check_resolve_path_is_search_tag() {
        let coll = parse_rules_yaml(BASIC).unwrap();
        let check = coll.scenarios[0].check("has_error").unwrap();
        assert_eq!(
            check.resolve_path,
            "myplugin.mygroup.my-scenario.checks.has_error"
        );
        let search = check.search.as_ref().unwrap();
        assert_eq!(
            search.constraints.as_ref().unwrap().min_results,
            Some(3)
        );
    }

    #[test]
    fn test_version_range_parse() {
        let coll = parse_rules_yaml(BASIC).unwrap();
        let check = coll.scenarios[0].check("pkg_ok").unwrap();
        let Some(RequirementDef::Primitive(PrimitiveDef::Apt(pkg))) = &check.requires else {
            panic!("expected apt primitive");
        };
        assert_eq!(pkg.packages[0].name, "mypkg");
        assert_eq!(
            pkg.packages[0].ranges[0].bounds,
            vec![
                (VersionOp::Gt, "1.0".to_string()),
                (VersionOp::Le, "2.0".to_string())
            ]
        );
    }

    #[test]
    fn test_legacy_min_max_aliases() {
        let v: Value = serde_yaml::from_str("{min: '1.0', max: '2.0'}").unwrap();
        let range = parse_version_range(&v).unwrap();
        let ops: Vec<VersionOp> = range.bounds.iter().map(|(op, _)| *op).collect();
        assert!(ops.contains(&VersionOp::Ge));
        assert!(ops.contains(&VersionOp::Le));
    }

    #[test]
    fn test_check_without_search_or_requires_rejected() {
        let yaml = r#"
p:
  g:
    s:
      checks:
        empty: {}
      conclusions:
        c:
          decision: empty
          raises: {type: T, message: m}
"#;
        assert!(matches!(
            parse_rules_yaml(yaml),
            Err(RuleParserError::InvalidCheck(_, _))
        ));
    }

    #[test]
    fn test_requirement_logical_nesting() {
        let v: Value = serde_yaml::from_str(
            r#"
or:
  - path: /etc/foo.conf
  - not:
      - path: /etc/bar.conf
"#,
        )
        .unwrap();
        let req = parse_requirement(&v).unwrap();
        let RequirementDef::Group { op, members } = req else {
            panic!("expected group");
        };
        assert_eq!(op, LogicalOp::Or);
        assert_eq!(members.len(), 2);
        assert!(matches!(
            members[1],
            RequirementDef::Group {
                op: LogicalOp::Not,
                ..
            }
        ));
    }

    #[test]
    fn test_varops_parse() {
        let v: Value = serde_yaml::from_str("[[$foo], [gt, 3], [lt, 6]]").unwrap();
        let varops = parse_varops(&v).unwrap();
        assert_eq!(varops.name, "foo");
        assert_eq!(varops.ops.steps.len(), 2);
    }

    #[test]
    fn test_varops_requires_dollar() {
        let v: Value = serde_yaml::from_str("[[foo], [gt, 3]]").unwrap();
        assert!(parse_varops(&v).is_err());
    }

    #[test]
    fn test_sequence_search() {
        let v: Value = serde_yaml::from_str(
            r#"
start:
  expr: 'section start'
body:
  expr: 'content (\d+)'
end:
  expr: 'section end'
"#,
        )
        .unwrap();
        let search = parse_search(&v, "p.g.s.checks.c").unwrap();
        assert!(search.is_sequence());
    }

    #[test]
    fn test_service_started_after() {
        let v: Value = serde_yaml::from_str(
            r#"
apache2:
  state: active
  started-after: mysql
"#,
        )
        .unwrap();
        let svc = parse_service_check(&v).unwrap();
        assert_eq!(svc.services[0].state.as_deref(), Some("active"));
        assert_eq!(svc.services[0].started_after.as_deref(), Some("mysql"));
    }

    #[test]
    fn test_vars_inheritance_and_override() {
        let yaml = r#"
p:
  g:
    vars:
      a: 1
      b: 2
    s:
      vars:
        b: 3
      checks:
        c:
          requires:
            varops: [[$b], [eq, 3]]
      conclusions:
        conc:
          decision: c
          raises: {type: T, message: m}
"#;
        let coll = parse_rules_yaml(yaml).unwrap();
        let vars = &coll.scenarios[0].vars;
        assert_eq!(vars.len(), 2);
        let b = vars.iter().find(|(n, _)| n == "b").unwrap();
        assert_eq!(b.1, VarDef::Literal(RuleValue::Integer(3)));
    }
}
