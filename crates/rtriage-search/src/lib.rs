//! # rtriage-search
//!
//! Log search layer for rtriage: timestamp-aware binary seeking, constrained
//! file scanning, and tagged multi-file pattern search.
//!
//! ## Architecture
//!
//! - **Seeking** ([`seek`]): a binary search over line offsets locates the
//!   first log line at or after a cutoff time, with skip tracking to step
//!   around unparsable lines. Large files are scanned from that offset
//!   instead of from the top.
//! - **Constraints** ([`constraint`]): [`SearchConstraint`] bounds scans to a
//!   time window (file-level seek plus per-line fallback);
//!   [`ExtraConstraints`] post-filters collected results by age, uptime,
//!   dense-period bucketing and a minimum result count.
//! - **Engine** ([`engine`]): [`FileSearcher`] registers compiled search
//!   definitions against files and scans each file once, producing tagged
//!   [`SearchResults`] with capture groups and extracted timestamps.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rtriage_rules::{PatternDef, SearchDef, SearchExpr};
//! use rtriage_search::{compile_search, FileSearcher};
//!
//! let def = SearchDef {
//!     expr: SearchExpr::Simple(PatternDef {
//!         patterns: vec![r"ERROR (\S+)".to_string()],
//!         hint: Some("ERROR".to_string()),
//!     }),
//!     passthrough_results: false,
//!     constraints: None,
//! };
//!
//! let mut searcher = FileSearcher::new();
//! searcher.add(compile_search("my-search", &def).unwrap(), "/var/log/app.log", None);
//! let results = searcher.run().unwrap();
//! for hit in results.find_by_tag("my-search") {
//!     println!("{}:{} {:?}", hit.source.display(), hit.line_number, hit.group(1));
//! }
//! ```

pub mod constraint;
pub mod definition;
pub mod engine;
pub mod error;
pub mod result;
pub mod seek;
pub mod timestamp;

pub use constraint::{ConstraintConfig, ExtraConstraints, ScanConstraint, SearchConstraint};
pub use definition::{compile_search, sequence_tags, CompiledPattern, SearchDefinition, SearchRole};
pub use engine::FileSearcher;
pub use error::{Result, SearchError};
pub use result::{SearchResult, SearchResults, SequenceSection};
pub use seek::{seek_file_since, TimeWindowSeeker, MAX_SEEK_SKIP};
pub use timestamp::extract_timestamp;
