//! Multi-file tagged search engine.
//!
//! `FileSearcher` accumulates tagged search definitions bound to file paths,
//! then scans each file once in a single `run()` pass, producing the combined
//! [`SearchResults`] collection. A [`ScanConstraint`] attached to a
//! registration bounds the scan: the file hook yields a start offset (binary
//! time seek), and the line hook filters in memory when seeking was not
//! applicable (offset 0).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Datelike, Utc};
use tracing::{debug, warn};

use crate::constraint::ScanConstraint;
use crate::definition::SearchDefinition;
use crate::error::Result;
use crate::result::{SearchResult, SearchResults};
use crate::timestamp::extract_timestamp;

struct Registration {
    defs: Vec<SearchDefinition>,
    path: PathBuf,
    constraint: Option<Arc<dyn ScanConstraint + Send + Sync>>,
}

/// The multi-file pattern search engine.
pub struct FileSearcher {
    registrations: Vec<Registration>,
    /// Year assumed for timestamp formats that omit one.
    year_hint: i32,
}

impl FileSearcher {
    pub fn new() -> Self {
        Self::with_year_hint(Utc::now().year())
    }

    pub fn with_year_hint(year_hint: i32) -> Self {
        FileSearcher {
            registrations: Vec::new(),
            year_hint,
        }
    }

    /// Register the definitions of one search against a file path.
    pub fn add(
        &mut self,
        defs: Vec<SearchDefinition>,
        path: impl Into<PathBuf>,
        constraint: Option<Arc<dyn ScanConstraint + Send + Sync>>,
    ) {
        self.registrations.push(Registration {
            defs,
            path: path.into(),
            constraint,
        });
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.len()
    }

    /// Scan every registered file once and collect all tagged results.
    ///
    /// Missing files degrade to empty results for their registrations; seek
    /// failures degrade to a full scan.
    pub fn run(&self) -> Result<SearchResults> {
        let mut by_file: BTreeMap<&PathBuf, Vec<&Registration>> = BTreeMap::new();
        for reg in &self.registrations {
            by_file.entry(&reg.path).or_default().push(reg);
        }

        let mut results = Vec::new();
        for (path, regs) in by_file {
            if !path.is_file() {
                warn!(path = %path.display(), "search target missing, skipping");
                continue;
            }
            self.scan_file(path, &regs, &mut results)?;
        }
        Ok(SearchResults::new(results))
    }

    fn scan_file(
        &self,
        path: &PathBuf,
        regs: &[&Registration],
        results: &mut Vec<SearchResult>,
    ) -> Result<()> {
        // Per-registration start offsets via the file constraint hook.
        let offsets: Vec<u64> = regs
            .iter()
            .map(|reg| match &reg.constraint {
                Some(c) => c.apply_to_file(path).unwrap_or_else(|e| {
                    warn!(path = %path.display(), error = %e, "seek failed, scanning whole file");
                    0
                }),
                None => 0,
            })
            .collect();

        let min_offset = offsets.iter().copied().min().unwrap_or(0);
        debug!(path = %path.display(), min_offset, "scanning");

        let mut reader = BufReader::new(File::open(path)?);
        let mut offset = 0u64;
        let mut line_number = 0u64;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf)?;
            if n == 0 {
                break;
            }
            line_number += 1;
            let line_start = offset;
            offset += n as u64;
            if line_start < min_offset {
                continue;
            }
            // Log files carry binary garbage; a lossy view keeps the scan
            // going instead of aborting the whole run.
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);

            let mut line_ts = None;
            let mut ts_extracted = false;

            for (reg, reg_offset) in regs.iter().zip(&offsets) {
                if line_start < *reg_offset {
                    continue;
                }
                // Seek not applicable for this registration: fall back to
                // the in-memory line filter.
                if *reg_offset == 0
                    && let Some(c) = &reg.constraint
                    && !c.apply_to_line(line)
                {
                    continue;
                }
                for def in &reg.defs {
                    if let Some(caps) = def.pattern.captures(line) {
                        if !ts_extracted {
                            line_ts = extract_timestamp(line, self.year_hint);
                            ts_extracted = true;
                        }
                        results.push(SearchResult {
                            tag: def.tag.clone(),
                            source: path.clone(),
                            line_number,
                            timestamp: line_ts,
                            groups: caps
                                .iter()
                                .map(|g| g.map(|m| m.as_str().to_string()))
                                .collect(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for FileSearcher {
    fn default() -> Self {
        Self::new()
    }
}
