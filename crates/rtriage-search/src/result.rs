//! Tagged, positioned search results.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::definition::{SearchRole, sequence_tags};

/// One matching line produced by the search engine.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// The tag of the search definition that produced this result.
    pub tag: String,
    /// Source file the match came from.
    pub source: PathBuf,
    /// 1-based line number within the source file.
    pub line_number: u64,
    /// Timestamp extracted from the matching line, when parsable.
    pub timestamp: Option<NaiveDateTime>,
    /// Captured groups, regex convention: index 0 is the whole match.
    pub groups: Vec<Option<String>>,
}

impl SearchResult {
    /// Captured group by index, regex convention.
    pub fn group(&self, idx: usize) -> Option<&str> {
        self.groups.get(idx).and_then(|g| g.as_deref())
    }
}

/// One start→end section assembled from sequence search results.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceSection {
    pub start: SearchResult,
    pub body: Vec<SearchResult>,
    /// `None` when the section ran to end of file unterminated.
    pub end: Option<SearchResult>,
}

/// The combined result collection of one search engine run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    results: Vec<SearchResult>,
}

impl SearchResults {
    pub fn new(results: Vec<SearchResult>) -> Self {
        SearchResults { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchResult> {
        self.results.iter()
    }

    /// All results carrying the given tag, in scan order.
    pub fn find_by_tag(&self, tag: &str) -> Vec<&SearchResult> {
        self.results.iter().filter(|r| r.tag == tag).collect()
    }

    /// Assemble sequence sections for a base tag from its derived
    /// start/body/end results. Sections never span files; a new start closes
    /// any section still open in the same file.
    pub fn find_sequence_sections(&self, base_tag: &str) -> Vec<SequenceSection> {
        let (start_tag, body_tag, end_tag) = sequence_tags(base_tag);
        let mut sections = Vec::new();

        let mut files: Vec<&Path> = Vec::new();
        for r in &self.results {
            if r.tag == start_tag && !files.contains(&r.source.as_path()) {
                files.push(&r.source);
            }
        }

        for file in files {
            let mut open: Option<SequenceSection> = None;
            let mut events: Vec<&SearchResult> = self
                .results
                .iter()
                .filter(|r| {
                    r.source == file
                        && (r.tag == start_tag || r.tag == body_tag || r.tag == end_tag)
                })
                .collect();
            events.sort_by_key(|r| r.line_number);

            for event in events {
                let role = if event.tag == start_tag {
                    SearchRole::SequenceStart
                } else if event.tag == body_tag {
                    SearchRole::SequenceBody
                } else {
                    SearchRole::SequenceEnd
                };
                match role {
                    SearchRole::SequenceStart => {
                        if let Some(section) = open.take() {
                            sections.push(section);
                        }
                        open = Some(SequenceSection {
                            start: event.clone(),
                            body: Vec::new(),
                            end: None,
                        });
                    }
                    SearchRole::SequenceBody => {
                        if let Some(section) = open.as_mut() {
                            section.body.push(event.clone());
                        }
                    }
                    SearchRole::SequenceEnd | SearchRole::Simple => {
                        if let Some(mut section) = open.take() {
                            section.end = Some(event.clone());
                            sections.push(section);
                        }
                    }
                }
            }
            if let Some(section) = open.take() {
                sections.push(section);
            }
        }
        sections
    }
}

impl IntoIterator for SearchResults {
    type Item = SearchResult;
    type IntoIter = std::vec::IntoIter<SearchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
