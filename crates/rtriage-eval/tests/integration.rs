//! End-to-end runs: YAML rules in, issues out.

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use tempfile::TempDir;

use rtriage_eval::{
    HostState, MemoryIssueSink, RunContext, ScenarioRunner, RUNNER_WARNING_TYPE,
};
use rtriage_rules::parse_rules_yaml;

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn write_log(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn ctx(root: &Path, now: &str) -> RunContext {
    RunContext::new(root, dt(now), HostState::default())
}

#[test]
fn test_period_filter_scenario_reports_dense_burst() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "var/log/app.log",
        "2021-03-29 00:31:00 ERROR disk monitor: io saturation\n\
         2021-03-30 00:32:00 ERROR disk monitor: io saturation\n\
         2021-03-30 00:33:00 ERROR disk monitor: io saturation\n\
         2021-03-30 00:34:00 ERROR disk monitor: io saturation\n\
         2021-03-30 00:36:00 ERROR disk monitor: io saturation\n",
    );

    let rules = parse_rules_yaml(
        r#"
storage:
  disk:
    io-saturation:
      input:
        path: var/log/app.log
      checks:
        saturation_events:
          search:
            expr: '^[0-9-]+ (\S+) ERROR disk monitor'
            constraints:
              search-period-hours: 24
              min-results: 3
      conclusions:
        io-saturated:
          decision: saturation_events
          raises:
            type: storage-warning
            message: 'disk io saturated at: {times}'
            format-dict:
              times: '@checks.saturation_events.search.results_group_1:comma_join'
"#,
    )
    .unwrap();

    let ctx = ctx(dir.path(), "2021-03-30 12:00:00");
    let mut sink = MemoryIssueSink::new();
    let report = ScenarioRunner::new(&ctx).run(&rules, &mut sink).unwrap();

    assert_eq!(report.scenarios_evaluated, 1);
    assert!(report.failed_scenarios.is_empty());

    // The lone first-day line falls outside the first dense 24h window, so
    // only the second day's burst of four survives the period filter.
    let issues = sink.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].issue_type, "storage-warning");
    assert_eq!(issues[0].scenario, "storage.disk.io-saturation");
    assert_eq!(
        issues[0].message,
        "disk io saturated at: 00:32:00, 00:33:00, 00:34:00, 00:36:00"
    );
}

#[test]
fn test_higher_priority_conclusion_shadows_lower() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "var/log/app.log",
        "2024-05-01 10:00:00 ERROR something broke\n",
    );

    let rules = parse_rules_yaml(
        r#"
core:
  logs:
    errors:
      input:
        path: var/log/app.log
      checks:
        has_errors:
          search:
            expr: 'ERROR'
      conclusions:
        generic-errors:
          priority: 1
          decision: has_errors
          raises:
            type: system-warning
            message: errors were found
        error-storm:
          priority: 2
          decision: has_errors
          raises:
            type: system-error
            message: errors were found and escalated
"#,
    )
    .unwrap();

    let ctx = ctx(dir.path(), "2024-05-01 12:00:00");
    let mut sink = MemoryIssueSink::new();
    ScenarioRunner::new(&ctx).run(&rules, &mut sink).unwrap();

    let issues = sink.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].issue_type, "system-error");
    assert_eq!(issues[0].priority, 2);
}

#[test]
fn test_failed_scenario_is_caught_and_summarized() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "var/log/app.log",
        "2024-05-01 10:00:00 ERROR something broke\n",
    );

    // The first scenario references an undefined variable and must fail
    // without taking the second one down with it.
    let rules = parse_rules_yaml(
        r#"
core:
  logs:
    broken:
      checks:
        bad_var:
          requires:
            varops: [[$undefined], [gt, 1]]
      conclusions:
        never:
          decision: bad_var
          raises:
            type: system-warning
            message: unreachable
    errors:
      input:
        path: var/log/app.log
      checks:
        has_errors:
          search:
            expr: 'ERROR'
      conclusions:
        found:
          decision: has_errors
          raises:
            type: system-warning
            message: errors were found
"#,
    )
    .unwrap();

    let ctx = ctx(dir.path(), "2024-05-01 12:00:00");
    let mut sink = MemoryIssueSink::new();
    let report = ScenarioRunner::new(&ctx).run(&rules, &mut sink).unwrap();

    assert_eq!(report.scenarios_evaluated, 1);
    assert_eq!(report.failed_scenarios, vec!["core.logs.broken".to_string()]);

    let issues = sink.issues();
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].issue_type, "system-warning");

    let summary = &issues[1];
    assert_eq!(summary.issue_type, RUNNER_WARNING_TYPE);
    assert_eq!(summary.priority, 0);
    assert!(summary.message.contains("core.logs.broken"));
}

#[test]
fn test_duplicate_scenario_registration_is_fatal() {
    let dir = TempDir::new().unwrap();
    write_log(dir.path(), "var/log/app.log", "line\n");

    let yaml = r#"
core:
  logs:
    errors:
      input:
        path: var/log/app.log
      checks:
        has_errors:
          search:
            expr: 'ERROR'
      conclusions:
        found:
          decision: has_errors
          raises:
            type: system-warning
            message: errors were found
"#;
    let mut rules = parse_rules_yaml(yaml).unwrap();
    rules.extend(parse_rules_yaml(yaml).unwrap());

    let ctx = ctx(dir.path(), "2024-05-01 12:00:00");
    let mut sink = MemoryIssueSink::new();
    assert!(ScenarioRunner::new(&ctx).run(&rules, &mut sink).is_err());
}

#[test]
fn test_issue_serializes_with_type_field() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "var/log/app.log",
        "2024-05-01 10:00:00 ERROR something broke\n",
    );

    let rules = parse_rules_yaml(
        r#"
core:
  logs:
    errors:
      input:
        path: var/log/app.log
      checks:
        has_errors:
          search:
            expr: 'ERROR'
      conclusions:
        found:
          decision: has_errors
          raises:
            type: system-warning
            message: errors were found
            bug-id: LP1234567
"#,
    )
    .unwrap();

    let ctx = ctx(dir.path(), "2024-05-01 12:00:00");
    let mut sink = MemoryIssueSink::new();
    ScenarioRunner::new(&ctx).run(&rules, &mut sink).unwrap();

    let json = serde_json::to_value(&sink.issues()[0]).unwrap();
    assert_eq!(json["type"], "system-warning");
    assert_eq!(json["bug-id"], "LP1234567");
    assert_eq!(json["scenario"], "core.logs.errors");
}
