//! Service state requirement (systemd and pebble share this evaluator).

use std::collections::BTreeMap;

use chrono::Duration;
use tracing::debug;

use rtriage_rules::{CmpOp, ServiceCheckDef, ServiceEntry};

use crate::cache::{CacheValue, PropertyCache};
use crate::context::ServiceState;
use crate::error::Result;

/// Grace window for started-after comparisons: a restart within this window
/// of the other service does not count as "started after" it.
const STARTED_AFTER_GRACE_SECS: i64 = 120;

/// True when every listed service satisfies its entry. Observed states are
/// cached under `services`.
pub fn evaluate(
    def: &ServiceCheckDef,
    services: &BTreeMap<String, ServiceState>,
    cache: &mut PropertyCache,
) -> Result<bool> {
    let mut observed = BTreeMap::new();
    let mut result = true;
    for entry in &def.services {
        let Some(svc) = services.get(&entry.name) else {
            debug!(service = %entry.name, "not installed");
            result = false;
            break;
        };
        observed.insert(entry.name.clone(), CacheValue::from(svc.state.as_str()));
        if !entry_holds(entry, svc, services) {
            result = false;
            break;
        }
    }
    cache.set("services", CacheValue::Dict(observed));
    Ok(result)
}

fn entry_holds(
    entry: &ServiceEntry,
    svc: &ServiceState,
    services: &BTreeMap<String, ServiceState>,
) -> bool {
    if let Some(expected) = &entry.state {
        let matches = match entry.op {
            CmpOp::Eq => svc.state == *expected,
            CmpOp::Ne => svc.state != *expected,
            _ => svc.state == *expected,
        };
        if !matches {
            debug!(service = %entry.name, state = %svc.state, expected = %expected, "state mismatch");
            return false;
        }
    }
    if let Some(other_name) = &entry.started_after {
        return started_after(&entry.name, svc, other_name, services);
    }
    true
}

/// A is "started after" B only when both are installed with known start
/// times and A's start exceeds B's by more than the grace window.
fn started_after(
    name: &str,
    svc: &ServiceState,
    other_name: &str,
    services: &BTreeMap<String, ServiceState>,
) -> bool {
    let Some(other) = services.get(other_name) else {
        debug!(service = %other_name, "started-after reference not installed");
        return false;
    };
    let (Some(start), Some(other_start)) = (svc.start_time, other.start_time) else {
        debug!(service = %name, "start time unavailable");
        return false;
    };
    start - other_start > Duration::seconds(STARTED_AFTER_GRACE_SECS)
}
