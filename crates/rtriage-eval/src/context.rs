//! Run context: host state, registries, and per-scenario variable scope.
//!
//! There are no global singletons; everything an evaluator needs travels in
//! an explicit [`RunContext`] with lifecycle = one run.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Deserialize;

use rtriage_rules::RuleValue;
use rtriage_search::SearchConstraint;

use crate::error::{EvalError, Result};

// =============================================================================
// Host state
// =============================================================================

/// Observed state of a service on the host.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceState {
    pub state: String,
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
}

/// Captured host facts the evaluator compares against.
///
/// Loadable from YAML; the evaluator itself only reads it through
/// [`RunContext`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostState {
    /// Distro package name -> installed version.
    pub packages: BTreeMap<String, String>,
    /// Snap package name -> installed version.
    pub snaps: BTreeMap<String, String>,
    /// systemd unit name -> state.
    pub services: BTreeMap<String, ServiceState>,
    /// Pebble service name -> state.
    pub pebble_services: BTreeMap<String, ServiceState>,
    /// Named host properties importable by property requirements.
    pub properties: BTreeMap<String, serde_yaml::Value>,
    pub boot_time: Option<NaiveDateTime>,
}

impl HostState {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml).map_err(rtriage_rules::RuleParserError::from)?)
    }
}

// =============================================================================
// Property registry
// =============================================================================

pub type PropertyFn = Arc<dyn Fn(&RunContext) -> Option<RuleValue> + Send + Sync>;

/// Compile-time registry of importable properties.
///
/// Rule files name properties by string id; unknown ids are configuration
/// errors, not runtime lookups.
#[derive(Clone, Default)]
pub struct PropertyRegistry {
    providers: BTreeMap<String, PropertyFn>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry where every property in the host state resolves to its
    /// captured value.
    pub fn from_host_state(host: &HostState) -> Self {
        let mut registry = Self::new();
        for key in host.properties.keys() {
            let key_owned = key.clone();
            registry.register(key, move |ctx: &RunContext| {
                ctx.host.properties.get(&key_owned).map(RuleValue::from_yaml)
            });
        }
        registry
    }

    pub fn register(
        &mut self,
        id: impl Into<String>,
        provider: impl Fn(&RunContext) -> Option<RuleValue> + Send + Sync + 'static,
    ) {
        self.providers.insert(id.into(), Arc::new(provider));
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Resolve a property id. Unknown id is fatal; a registered provider
    /// returning `None` is a data miss the caller degrades on.
    pub fn resolve(&self, id: &str, ctx: &RunContext) -> Result<Option<RuleValue>> {
        let provider = self
            .providers
            .get(id)
            .ok_or_else(|| EvalError::UnknownProperty(id.to_string()))?;
        Ok(provider(ctx))
    }
}

// =============================================================================
// Config handlers
// =============================================================================

/// A parsed config document: section name ("" for the global section) ->
/// key -> value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDoc {
    sections: BTreeMap<String, BTreeMap<String, RuleValue>>,
}

impl ConfigDoc {
    pub fn insert(&mut self, section: &str, key: &str, value: RuleValue) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Look up a key. With no section, the global section is consulted first
    /// and then every named section in order.
    pub fn get(&self, section: Option<&str>, key: &str) -> Option<&RuleValue> {
        match section {
            Some(name) => self.sections.get(name)?.get(key),
            None => {
                if let Some(v) = self.sections.get("").and_then(|s| s.get(key)) {
                    return Some(v);
                }
                self.sections.values().find_map(|s| s.get(key))
            }
        }
    }
}

pub type ConfigHandlerFn = Arc<dyn Fn(&Path) -> io::Result<ConfigDoc> + Send + Sync>;

/// Compile-time registry of config file handlers, keyed by string id.
#[derive(Clone)]
pub struct ConfigHandlers {
    handlers: BTreeMap<String, ConfigHandlerFn>,
}

impl Default for ConfigHandlers {
    fn default() -> Self {
        let mut registry = ConfigHandlers {
            handlers: BTreeMap::new(),
        };
        registry.register("ini", |path: &Path| parse_ini(path));
        registry
    }
}

impl ConfigHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        id: impl Into<String>,
        handler: impl Fn(&Path) -> io::Result<ConfigDoc> + Send + Sync + 'static,
    ) {
        self.handlers.insert(id.into(), Arc::new(handler));
    }

    pub fn get(&self, id: &str) -> Result<&ConfigHandlerFn> {
        self.handlers
            .get(id)
            .ok_or_else(|| EvalError::UnknownConfigHandler(id.to_string()))
    }
}

/// Minimal ini-style parser: `[section]` headers, `key = value` pairs,
/// `#`/`;` comments. Values are typed as int, float, bool, or string.
fn parse_ini(path: &Path) -> io::Result<ConfigDoc> {
    let mut doc = ConfigDoc::default();
    let mut section = String::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name.trim().to_string();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            doc.insert(&section, key.trim(), parse_config_value(value.trim()));
        }
    }
    Ok(doc)
}

fn parse_config_value(raw: &str) -> RuleValue {
    if let Ok(i) = raw.parse::<i64>() {
        return RuleValue::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return RuleValue::Float(f);
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => RuleValue::Bool(true),
        "false" | "no" | "off" => RuleValue::Bool(false),
        _ => RuleValue::String(raw.trim_matches(['"', '\'']).to_string()),
    }
}

// =============================================================================
// Run context
// =============================================================================

/// Everything one evaluation run needs, threaded explicitly through the
/// call chain.
pub struct RunContext {
    /// Root under which config handler paths are resolved.
    pub data_root: PathBuf,
    pub now: NaiveDateTime,
    pub host: HostState,
    pub properties: PropertyRegistry,
    pub config_handlers: ConfigHandlers,
    /// Time-window constraint applied to every registered search.
    pub constraint: Option<Arc<SearchConstraint>>,
}

impl RunContext {
    pub fn new(data_root: impl Into<PathBuf>, now: NaiveDateTime, host: HostState) -> Self {
        let properties = PropertyRegistry::from_host_state(&host);
        RunContext {
            data_root: data_root.into(),
            now,
            host,
            properties,
            config_handlers: ConfigHandlers::default(),
            constraint: None,
        }
    }

    pub fn with_constraint(mut self, constraint: Arc<SearchConstraint>) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn resolve_data_path(&self, path: &str) -> PathBuf {
        let trimmed = path.trim_start_matches('/');
        self.data_root.join(trimmed)
    }
}

/// One scenario's variable scope layered over the shared run context.
pub struct ScenarioScope<'a> {
    pub ctx: &'a RunContext,
    vars: BTreeMap<String, RuleValue>,
}

impl<'a> ScenarioScope<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        ScenarioScope {
            ctx,
            vars: BTreeMap::new(),
        }
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: RuleValue) {
        self.vars.insert(name.into(), value);
    }

    pub fn var(&self, name: &str) -> Result<&RuleValue> {
        self.vars
            .get(name)
            .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_host_state_from_yaml() {
        let host = HostState::from_yaml(
            "packages:\n  openvswitch-switch: 2.13.3-0ubuntu0.20.04.2\n\
             services:\n  ovs-vswitchd:\n    state: active\n\
             properties:\n  num_cpus: 8\n\
             boot_time: 2024-05-01T08:00:00\n",
        )
        .unwrap();
        assert_eq!(
            host.packages.get("openvswitch-switch").map(String::as_str),
            Some("2.13.3-0ubuntu0.20.04.2")
        );
        assert_eq!(host.services.get("ovs-vswitchd").unwrap().state, "active");
        assert_eq!(host.boot_time, Some(dt("2024-05-01 08:00:00")));
    }

    #[test]
    fn test_property_registry_from_host_state() {
        let host = HostState::from_yaml("properties:\n  num_cpus: 8\n").unwrap();
        let ctx = RunContext::new("/tmp", dt("2024-05-01 12:00:00"), host);
        let value = ctx.properties.resolve("num_cpus", &ctx).unwrap();
        assert_eq!(value, Some(RuleValue::Integer(8)));
        assert!(matches!(
            ctx.properties.resolve("nope", &ctx),
            Err(EvalError::UnknownProperty(_))
        ));
    }

    #[test]
    fn test_ini_handler() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "# global\nglobal_key = 1\n[DEFAULT]\ndebug = true\nworkers = 4\nname = \"vs1\""
        )
        .unwrap();
        let handlers = ConfigHandlers::default();
        let doc = handlers.get("ini").unwrap()(f.path()).unwrap();
        assert_eq!(doc.get(None, "global_key"), Some(&RuleValue::Integer(1)));
        assert_eq!(
            doc.get(Some("DEFAULT"), "debug"),
            Some(&RuleValue::Bool(true))
        );
        // sectionless lookup falls through to named sections
        assert_eq!(doc.get(None, "workers"), Some(&RuleValue::Integer(4)));
        assert_eq!(
            doc.get(None, "name"),
            Some(&RuleValue::String("vs1".to_string()))
        );
        assert_eq!(doc.get(Some("missing"), "debug"), None);
    }

    #[test]
    fn test_scenario_scope_vars() {
        let ctx = RunContext::new("/tmp", dt("2024-05-01 12:00:00"), HostState::default());
        let mut scope = ScenarioScope::new(&ctx);
        scope.set_var("limit", RuleValue::Integer(10));
        assert_eq!(scope.var("limit").unwrap(), &RuleValue::Integer(10));
        assert!(matches!(
            scope.var("nope"),
            Err(EvalError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_resolve_data_path_strips_leading_slash() {
        let ctx = RunContext::new(
            "/data/sosreport",
            dt("2024-05-01 12:00:00"),
            HostState::default(),
        );
        assert_eq!(
            ctx.resolve_data_path("/etc/app/app.conf"),
            PathBuf::from("/data/sosreport/etc/app/app.conf")
        );
    }
}
