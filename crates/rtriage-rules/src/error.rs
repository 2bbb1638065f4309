use thiserror::Error;

/// Errors that can occur while parsing declarative rule files.
#[derive(Debug, Error)]
pub enum RuleParserError {
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid scenario '{0}': {1}")]
    InvalidScenario(String, String),

    #[error("invalid check '{0}': {1}")]
    InvalidCheck(String, String),

    #[error("invalid conclusion '{0}': {1}")]
    InvalidConclusion(String, String),

    #[error("invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("unknown comparison operator '{0}'")]
    UnknownOperator(String),

    #[error("unknown logical operator '{0}'")]
    UnknownLogicalOp(String),

    #[error("invalid search property: {0}")]
    InvalidSearch(String),

    #[error("invalid reference '{0}': {1}")]
    InvalidReference(String, String),

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuleParserError>;
