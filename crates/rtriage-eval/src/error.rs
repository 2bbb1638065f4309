//! Error types for rtriage-eval.

use thiserror::Error;

/// Errors produced while evaluating scenarios.
///
/// Configuration errors (duplicate tags, unknown references, unknown
/// registry ids) are fatal to the node being evaluated; data errors degrade
/// requirements to `false` before ever reaching this type.
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("duplicate search tag '{0}'")]
    DuplicateSearchTag(String),

    #[error("search tag '{tag}' not registered (available: {available})")]
    SearchTagNotFound { tag: String, available: String },

    #[error("searches for '{0}' already marked loaded")]
    AlreadyLoaded(String),

    #[error("check '{0}' has neither a search nor a requirement tree")]
    EmptyCheck(String),

    #[error("decision references unknown check '{0}'")]
    UnknownCheck(String),

    #[error("unknown config handler '{0}'")]
    UnknownConfigHandler(String),

    #[error("unknown property '{0}'")]
    UnknownProperty(String),

    #[error("unknown variable '${0}'")]
    UnknownVariable(String),

    #[error("check '{0}' was never evaluated")]
    CheckNotEvaluated(String),

    #[error("no cache entry '{property}.{key}' on check '{check}'")]
    UnknownCacheRef {
        check: String,
        property: String,
        key: String,
    },

    #[error("rule parse error: {0}")]
    Parser(#[from] rtriage_rules::RuleParserError),

    #[error("search error: {0}")]
    Search(#[from] rtriage_search::SearchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EvalError>;
