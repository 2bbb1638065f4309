//! End-to-end tests for the search layer: compile definitions from YAML-parsed
//! rules, seek into time windows, scan, and post-filter results.

use std::io::Write;
use std::sync::Arc;

use chrono::NaiveDateTime;
use rtriage_rules::{PatternDef, SearchConstraintsDef, SearchDef, SearchExpr};
use rtriage_search::{
    compile_search, seek_file_since, ExtraConstraints, FileSearcher, SearchConstraint,
};

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn write_log(content: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f
}

fn simple_search(pattern: &str) -> SearchDef {
    SearchDef {
        expr: SearchExpr::Simple(PatternDef {
            patterns: vec![pattern.to_string()],
            hint: None,
        }),
        passthrough_results: false,
        constraints: None,
    }
}

#[test]
fn test_seek_then_scan_matches_full_scan_tail() {
    // Property: scanning from the seeked offset yields exactly the lines a
    // full scan would keep at-or-after the cutoff.
    let mut content = String::new();
    for day in 1..=20 {
        for hour in [6u32, 18] {
            content.push_str(&format!(
                "2024-03-{day:02} {hour:02}:00:00 app: tick day={day} hour={hour}\n"
            ));
        }
    }
    let log = write_log(&content);
    let cutoff = dt("2024-03-14 00:00:00");

    let offset = seek_file_since(log.path(), cutoff).unwrap();
    assert!(offset > 0);

    let constraint = Arc::new(SearchConstraint::with_cutoff(cutoff));
    let mut searcher = FileSearcher::with_year_hint(2024);
    searcher.add(
        compile_search("tick", &simple_search(r"tick day=(\d+)")).unwrap(),
        log.path(),
        Some(constraint),
    );
    let results = searcher.run().unwrap();
    let hits = results.find_by_tag("tick");

    // days 14..=20, two lines each
    assert_eq!(hits.len(), 14);
    assert_eq!(hits[0].group(1), Some("14"));
    assert_eq!(hits.last().unwrap().group(1), Some("20"));
}

#[test]
fn test_dense_period_and_min_results_pipeline() {
    // Matches spread over two days; a 24h period window with min-results 3
    // keeps only the dense day.
    let log = write_log(
        "2021-03-29 00:31:00 kernel: oom victim a\n\
         2021-03-29 02:10:00 kernel: oom victim b\n\
         2021-03-29 12:00:00 kernel: oom victim c\n\
         2021-03-29 23:50:00 kernel: oom victim d\n\
         2021-03-30 00:36:00 kernel: oom victim e\n",
    );
    let mut searcher = FileSearcher::with_year_hint(2021);
    searcher.add(
        compile_search("oom", &simple_search(r"oom victim (\w+)")).unwrap(),
        log.path(),
        None,
    );
    let results = searcher.run().unwrap();
    let hits: Vec<_> = results.find_by_tag("oom").into_iter().cloned().collect();
    assert_eq!(hits.len(), 5);

    let extra = ExtraConstraints::from(&SearchConstraintsDef {
        search_period_hours: Some(24.0),
        search_result_age_hours: None,
        min_hours_since_last_boot: None,
        min_results: Some(3),
    });
    let now = dt("2021-03-30 12:00:00");
    let kept = extra.apply(hits, now, None);
    assert_eq!(kept.len(), 4, "window anchored at first result keeps 4 of 5");
    assert_eq!(kept[0].group(1), Some("a"));
    assert_eq!(kept.last().unwrap().group(1), Some("d"));
}

#[test]
fn test_sequence_search_from_rules_definition() {
    let def = SearchDef {
        expr: SearchExpr::Sequence {
            start: PatternDef {
                patterns: vec![r"Transaction started \(id=(\d+)\)".to_string()],
                hint: Some("Transaction".to_string()),
            },
            body: Some(PatternDef {
                patterns: vec![r"applied change (\S+)".to_string()],
                hint: None,
            }),
            end: Some(PatternDef {
                patterns: vec![r"Transaction committed".to_string()],
                hint: Some("Transaction".to_string()),
            }),
        },
        passthrough_results: true,
        constraints: None,
    };
    let defs = compile_search("txn", &def).unwrap();
    assert_eq!(defs.len(), 3);

    let log = write_log(
        "Transaction started (id=41)\n\
         applied change alpha\n\
         Transaction committed\n\
         Transaction started (id=42)\n\
         applied change beta\n\
         applied change gamma\n",
    );
    let mut searcher = FileSearcher::with_year_hint(2024);
    searcher.add(defs, log.path(), None);
    let results = searcher.run().unwrap();

    let sections = results.find_sequence_sections("txn");
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].start.group(1), Some("41"));
    assert_eq!(sections[0].body.len(), 1);
    assert!(sections[0].end.is_some());
    assert_eq!(sections[1].start.group(1), Some("42"));
    assert_eq!(sections[1].body.len(), 2);
    assert!(sections[1].end.is_none(), "open section survives EOF");
}

#[test]
fn test_min_results_gate_drops_everything() {
    let log = write_log("2024-05-01 10:00:00 app: warn once\n");
    let mut searcher = FileSearcher::with_year_hint(2024);
    searcher.add(
        compile_search("w", &simple_search("warn")).unwrap(),
        log.path(),
        None,
    );
    let hits: Vec<_> = searcher
        .run()
        .unwrap()
        .find_by_tag("w")
        .into_iter()
        .cloned()
        .collect();
    assert_eq!(hits.len(), 1);

    let extra = ExtraConstraints::from(&SearchConstraintsDef {
        search_period_hours: None,
        search_result_age_hours: None,
        min_hours_since_last_boot: None,
        min_results: Some(2),
    });
    let kept = extra.apply(hits, dt("2024-05-01 12:00:00"), None);
    assert!(kept.is_empty());
}
