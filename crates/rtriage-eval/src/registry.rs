//! Write-once search registry shared across one scenario run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use tracing::debug;

use rtriage_search::{FileSearcher, SearchResults};

use crate::error::{EvalError, Result};

/// What was registered under one search tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDescriptor {
    pub tag: String,
    pub passthrough: bool,
    pub sequence: bool,
}

#[derive(Default)]
struct RegistryState {
    descriptors: BTreeMap<String, SearchDescriptor>,
    loaded: BTreeSet<String>,
    results: Option<Arc<SearchResults>>,
}

/// Registry of all searches registered for one run.
///
/// Tags are write-once; registering a duplicate is a fatal configuration
/// error. `run` executes the searcher exactly once and memoizes the combined
/// results, so all registrations must complete before the first call.
#[derive(Default)]
pub struct GlobalSearchRegistry {
    state: Mutex<RegistryState>,
}

impl GlobalSearchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: SearchDescriptor) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.descriptors.contains_key(&descriptor.tag) {
            return Err(EvalError::DuplicateSearchTag(descriptor.tag));
        }
        debug!(tag = %descriptor.tag, "registered search");
        state.descriptors.insert(descriptor.tag.clone(), descriptor);
        Ok(())
    }

    /// Look up a registered descriptor; the error lists all registered tags.
    pub fn get(&self, tag: &str) -> Result<SearchDescriptor> {
        let state = self.state.lock().unwrap();
        state
            .descriptors
            .get(tag)
            .cloned()
            .ok_or_else(|| EvalError::SearchTagNotFound {
                tag: tag.to_string(),
                available: state
                    .descriptors
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Execute the searcher once and memoize the combined result collection.
    ///
    /// Registrations made after the first call are not reflected; preload
    /// completely first.
    pub fn run(&self, searcher: &FileSearcher) -> Result<Arc<SearchResults>> {
        let mut state = self.state.lock().unwrap();
        if let Some(results) = &state.results {
            return Ok(Arc::clone(results));
        }
        debug!(
            registrations = searcher.registration_count(),
            "running combined search"
        );
        let results = Arc::new(searcher.run()?);
        state.results = Some(Arc::clone(&results));
        Ok(results)
    }

    /// Mark preloading complete for a label; marking twice fails loudly.
    pub fn set_loaded(&self, label: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.loaded.insert(label.to_string()) {
            return Err(EvalError::AlreadyLoaded(label.to_string()));
        }
        Ok(())
    }

    pub fn is_loaded(&self, label: &str) -> bool {
        self.state.lock().unwrap().loaded.contains(label)
    }
}
