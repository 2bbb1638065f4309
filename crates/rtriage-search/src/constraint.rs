//! Search constraints: the pluggable time-window filter consumed by the
//! search engine, and the post-hoc result filters attached to individual
//! searches.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Datelike, Duration, NaiveDateTime};
use tracing::warn;

use rtriage_rules::SearchConstraintsDef;

use crate::result::SearchResult;
use crate::seek::seek_file_since;
use crate::timestamp::extract_timestamp;

/// Filter hooks the search engine consults while scanning.
pub trait ScanConstraint {
    /// Whether a line should be considered at all. Used for in-memory
    /// filtering when seeking is not applicable.
    fn apply_to_line(&self, line: &str) -> bool;

    /// Byte offset the scan of this file should start from.
    fn apply_to_file(&self, path: &Path) -> io::Result<u64>;
}

/// How the search time window is derived.
#[derive(Debug, Clone)]
pub struct ConstraintConfig {
    /// Explicit window override, in hours.
    pub hours: Option<f64>,
    /// Widen the window to cover rotated logs.
    pub all_logs: bool,
    /// Days of rotated logs covered when `all_logs` is set.
    pub max_logrotate_depth: u32,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        ConstraintConfig {
            hours: None,
            all_logs: false,
            max_logrotate_depth: 7,
        }
    }
}

impl ConstraintConfig {
    fn window(&self) -> Duration {
        if let Some(hours) = self.hours {
            Duration::seconds((hours * 3600.0) as i64)
        } else if self.all_logs {
            Duration::days(i64::from(self.max_logrotate_depth))
        } else {
            Duration::hours(24)
        }
    }
}

/// Time-window constraint: bounds file scans to lines at or after a cutoff.
///
/// Seek results are memoized per file path so repeated registrations of the
/// same file do not reseek.
pub struct SearchConstraint {
    cutoff: NaiveDateTime,
    seek_cache: Mutex<HashMap<PathBuf, u64>>,
}

impl SearchConstraint {
    pub fn new(now: NaiveDateTime, config: &ConstraintConfig) -> Self {
        SearchConstraint {
            cutoff: now - config.window(),
            seek_cache: Mutex::new(HashMap::new()),
        }
    }

    /// A constraint with an explicit cutoff, mainly for tests.
    pub fn with_cutoff(cutoff: NaiveDateTime) -> Self {
        SearchConstraint {
            cutoff,
            seek_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cutoff(&self) -> NaiveDateTime {
        self.cutoff
    }
}

impl ScanConstraint for SearchConstraint {
    fn apply_to_line(&self, line: &str) -> bool {
        // Lines with no parsable timestamp pass; only provably-old lines are
        // dropped.
        match extract_timestamp(line, self.cutoff.year()) {
            Some(ts) => ts >= self.cutoff,
            None => true,
        }
    }

    fn apply_to_file(&self, path: &Path) -> io::Result<u64> {
        let mut cache = self.seek_cache.lock().expect("seek cache poisoned");
        if let Some(offset) = cache.get(path) {
            return Ok(*offset);
        }
        let offset = seek_file_since(path, self.cutoff)?;
        cache.insert(path.to_path_buf(), offset);
        Ok(offset)
    }
}

/// Post-hoc filters applied to a check's already-produced tagged results,
/// not to raw lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraConstraints {
    pub search_period_hours: Option<f64>,
    pub search_result_age_hours: Option<f64>,
    pub min_hours_since_last_boot: Option<f64>,
    pub min_results: Option<usize>,
}

impl From<&SearchConstraintsDef> for ExtraConstraints {
    fn from(def: &SearchConstraintsDef) -> Self {
        ExtraConstraints {
            search_period_hours: def.search_period_hours,
            search_result_age_hours: def.search_result_age_hours,
            min_hours_since_last_boot: def.min_hours_since_last_boot,
            min_results: def.min_results,
        }
    }
}

fn hours_duration(hours: f64) -> Duration {
    Duration::seconds((hours * 3600.0) as i64)
}

impl ExtraConstraints {
    pub fn is_empty(&self) -> bool {
        *self == ExtraConstraints::default()
    }

    /// Filter a result set. Order: result age, time since boot, period
    /// bucketing, then the minimum-count gate.
    pub fn apply(
        &self,
        mut results: Vec<SearchResult>,
        now: NaiveDateTime,
        boot_time: Option<NaiveDateTime>,
    ) -> Vec<SearchResult> {
        if let Some(age_hours) = self.search_result_age_hours {
            let oldest = now - hours_duration(age_hours);
            results.retain(|r| r.timestamp.is_none_or(|ts| ts >= oldest));
        }

        if let Some(min_uptime) = self.min_hours_since_last_boot {
            match boot_time {
                Some(boot) => {
                    let earliest = boot + hours_duration(min_uptime);
                    results.retain(|r| r.timestamp.is_none_or(|ts| ts >= earliest));
                }
                None => {
                    warn!("min-hours-since-last-boot set but boot time unknown; skipping filter");
                }
            }
        }

        if let Some(period) = self.search_period_hours {
            results = self.first_dense_window(results, hours_duration(period));
        }

        if let Some(min) = self.min_results
            && results.len() < min
        {
            return Vec::new();
        }
        results
    }

    /// Keep only the earliest window of `period` length containing at least
    /// `min_results` timestamped results. With multiple bursts across a
    /// longer span, this selects the first dense cluster; with no qualifying
    /// window, everything is dropped.
    fn first_dense_window(
        &self,
        results: Vec<SearchResult>,
        period: Duration,
    ) -> Vec<SearchResult> {
        let needed = self.min_results.unwrap_or(1);
        let mut dated: Vec<SearchResult> = results
            .into_iter()
            .filter(|r| r.timestamp.is_some())
            .collect();
        dated.sort_by_key(|r| r.timestamp);

        for i in 0..dated.len() {
            let window_start = dated[i].timestamp.expect("filtered to timestamped");
            let window_end = window_start + period;
            let count = dated[i..]
                .iter()
                .take_while(|r| r.timestamp.expect("filtered") <= window_end)
                .count();
            if count >= needed {
                return dated[i..i + count].to_vec();
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn result_at(ts: &str) -> SearchResult {
        SearchResult {
            tag: "t".to_string(),
            source: PathBuf::from("/var/log/app.log"),
            line_number: 1,
            timestamp: Some(dt(ts)),
            groups: Vec::new(),
        }
    }

    #[test]
    fn test_default_window_is_24h() {
        let c = SearchConstraint::new(dt("2024-06-10 12:00:00"), &ConstraintConfig::default());
        assert_eq!(c.cutoff(), dt("2024-06-09 12:00:00"));
    }

    #[test]
    fn test_all_logs_window_uses_logrotate_depth() {
        let config = ConstraintConfig {
            all_logs: true,
            ..Default::default()
        };
        let c = SearchConstraint::new(dt("2024-06-10 12:00:00"), &config);
        assert_eq!(c.cutoff(), dt("2024-06-03 12:00:00"));
    }

    #[test]
    fn test_explicit_hours_override() {
        let config = ConstraintConfig {
            hours: Some(2.0),
            all_logs: true,
            ..Default::default()
        };
        let c = SearchConstraint::new(dt("2024-06-10 12:00:00"), &config);
        assert_eq!(c.cutoff(), dt("2024-06-10 10:00:00"));
    }

    #[test]
    fn test_apply_to_line() {
        let c = SearchConstraint::with_cutoff(dt("2024-06-09 12:00:00"));
        assert!(c.apply_to_line("2024-06-09 13:00:00 recent"));
        assert!(!c.apply_to_line("2024-06-08 13:00:00 old"));
        assert!(c.apply_to_line("no timestamp at all"));
    }

    #[test]
    fn test_min_results_drops_whole_set() {
        let ec = ExtraConstraints {
            min_results: Some(3),
            ..Default::default()
        };
        let results = vec![result_at("2024-06-10 10:00:00"), result_at("2024-06-10 11:00:00")];
        assert!(ec.apply(results, dt("2024-06-10 12:00:00"), None).is_empty());
    }

    #[test]
    fn test_result_age_filter() {
        let ec = ExtraConstraints {
            search_result_age_hours: Some(24.0),
            ..Default::default()
        };
        let results = vec![
            result_at("2024-06-08 10:00:00"),
            result_at("2024-06-10 10:00:00"),
        ];
        let kept = ec.apply(results, dt("2024-06-10 12:00:00"), None);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].timestamp, Some(dt("2024-06-10 10:00:00")));
    }

    #[test]
    fn test_min_uptime_filter() {
        let ec = ExtraConstraints {
            min_hours_since_last_boot: Some(1.0),
            ..Default::default()
        };
        let results = vec![
            result_at("2024-06-10 08:10:00"), // within the first hour of boot
            result_at("2024-06-10 10:00:00"),
        ];
        let kept = ec.apply(
            results,
            dt("2024-06-10 12:00:00"),
            Some(dt("2024-06-10 08:00:00")),
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_period_selects_first_dense_cluster() {
        // one stray result on day one, a burst of four on day two
        let ec = ExtraConstraints {
            search_period_hours: Some(24.0),
            min_results: Some(3),
            ..Default::default()
        };
        let results = vec![
            result_at("2021-03-29 00:31:00"),
            result_at("2021-03-30 00:32:00"),
            result_at("2021-03-30 00:33:00"),
            result_at("2021-03-30 00:34:00"),
            result_at("2021-03-30 00:36:00"),
        ];
        let kept = ec.apply(results, dt("2021-03-30 01:00:00"), None);
        assert_eq!(kept.len(), 4);
        assert!(kept.iter().all(|r| {
            r.timestamp.unwrap() >= dt("2021-03-30 00:32:00")
        }));
    }

    #[test]
    fn test_period_no_qualifying_window_drops_all() {
        let ec = ExtraConstraints {
            search_period_hours: Some(1.0),
            min_results: Some(3),
            ..Default::default()
        };
        let results = vec![
            result_at("2024-06-10 00:00:00"),
            result_at("2024-06-10 05:00:00"),
            result_at("2024-06-10 10:00:00"),
        ];
        assert!(ec.apply(results, dt("2024-06-10 12:00:00"), None).is_empty());
    }
}
