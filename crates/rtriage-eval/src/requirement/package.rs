//! Package version requirement (apt and snap share this evaluator).

use std::collections::BTreeMap;

use tracing::debug;

use rtriage_rules::PackageCheckDef;

use crate::cache::{CacheValue, PropertyCache};
use crate::error::Result;
use crate::requirement::version::version_within;

/// True when any listed package is installed and, if ranges are given,
/// its installed version falls inside one of them. The name and version of
/// the satisfying package are cached.
pub fn evaluate(
    def: &PackageCheckDef,
    installed: &BTreeMap<String, String>,
    cache: &mut PropertyCache,
) -> Result<bool> {
    for entry in &def.packages {
        let Some(version) = installed.get(&entry.name) else {
            debug!(package = %entry.name, "not installed");
            continue;
        };
        if version_within(version, &entry.ranges) {
            cache.set("package", CacheValue::from(entry.name.as_str()));
            cache.set("version", CacheValue::from(version.as_str()));
            return Ok(true);
        }
        debug!(package = %entry.name, %version, "installed version outside ranges");
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use rtriage_rules::{PackageEntry, VersionOp, VersionRangeDef};

    use super::*;

    fn installed(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    fn entry(name: &str, ranges: Vec<VersionRangeDef>) -> PackageEntry {
        PackageEntry {
            name: name.to_string(),
            ranges,
        }
    }

    #[test]
    fn test_bare_name_passes_when_installed() {
        let def = PackageCheckDef {
            packages: vec![entry("nova-compute", vec![])],
        };
        let mut cache = PropertyCache::new();
        assert!(evaluate(&def, &installed(&[("nova-compute", "2:21.0")]), &mut cache).unwrap());
        assert_eq!(cache.get("package"), Some(&CacheValue::Str("nova-compute".into())));
        assert_eq!(cache.get("version"), Some(&CacheValue::Str("2:21.0".into())));
    }

    #[test]
    fn test_missing_package_degrades_to_false() {
        let def = PackageCheckDef {
            packages: vec![entry("nova-compute", vec![])],
        };
        let mut cache = PropertyCache::new();
        assert!(!evaluate(&def, &installed(&[]), &mut cache).unwrap());
    }

    #[test]
    fn test_version_out_of_range() {
        let ranges = vec![VersionRangeDef {
            bounds: vec![
                (VersionOp::Ge, "2.0".to_string()),
                (VersionOp::Le, "2.3".to_string()),
            ],
        }];
        let def = PackageCheckDef {
            packages: vec![entry("ovs", ranges)],
        };
        let mut cache = PropertyCache::new();
        assert!(evaluate(&def, &installed(&[("ovs", "2.1")]), &mut cache).unwrap());
        let mut cache = PropertyCache::new();
        assert!(!evaluate(&def, &installed(&[("ovs", "2.4")]), &mut cache).unwrap());
    }

    #[test]
    fn test_any_listed_package_suffices() {
        let def = PackageCheckDef {
            packages: vec![entry("pkg-a", vec![]), entry("pkg-b", vec![])],
        };
        let mut cache = PropertyCache::new();
        assert!(evaluate(&def, &installed(&[("pkg-b", "1.0")]), &mut cache).unwrap());
        assert_eq!(cache.get("package"), Some(&CacheValue::Str("pkg-b".into())));
    }
}
