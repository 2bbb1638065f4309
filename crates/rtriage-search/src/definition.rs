//! Compiled search definitions.
//!
//! A rule-file search property compiles to one or more tagged definitions:
//! simple searches keep their tag as-is, sequence searches derive
//! `<tag>-start`/`<tag>-body`/`<tag>-end` from the base tag.

use regex::Regex;

use rtriage_rules::{PatternDef, SearchDef, SearchExpr};

use crate::error::{Result, SearchError};

/// Role a compiled definition plays within its search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchRole {
    Simple,
    SequenceStart,
    SequenceBody,
    SequenceEnd,
}

/// Derived tags for a sequence search: (start, body, end).
pub fn sequence_tags(base_tag: &str) -> (String, String, String) {
    (
        format!("{base_tag}-start"),
        format!("{base_tag}-body"),
        format!("{base_tag}-end"),
    )
}

/// One or more alternative patterns plus an optional cheap substring hint
/// checked before attempting any regex.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regexes: Vec<Regex>,
    hint: Option<String>,
}

impl CompiledPattern {
    pub fn compile(def: &PatternDef) -> Result<Self> {
        if def.patterns.is_empty() {
            return Err(SearchError::InvalidDefinition(
                "pattern list is empty".to_string(),
            ));
        }
        let regexes = def
            .patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(CompiledPattern {
            regexes,
            hint: def.hint.clone(),
        })
    }

    /// Captures of the first alternative that matches the line.
    pub fn captures<'a>(&self, line: &'a str) -> Option<regex::Captures<'a>> {
        if let Some(hint) = &self.hint
            && !line.contains(hint.as_str())
        {
            return None;
        }
        self.regexes.iter().find_map(|re| re.captures(line))
    }
}

/// A single compiled, tagged search definition.
#[derive(Debug, Clone)]
pub struct SearchDefinition {
    pub tag: String,
    pub role: SearchRole,
    pub pattern: CompiledPattern,
}

/// Compile a rule-file search property into its tagged definitions.
pub fn compile_search(tag: &str, def: &SearchDef) -> Result<Vec<SearchDefinition>> {
    match &def.expr {
        SearchExpr::Simple(pattern) => Ok(vec![SearchDefinition {
            tag: tag.to_string(),
            role: SearchRole::Simple,
            pattern: CompiledPattern::compile(pattern)?,
        }]),
        SearchExpr::Sequence { start, body, end } => {
            let (start_tag, body_tag, end_tag) = sequence_tags(tag);
            let mut defs = vec![SearchDefinition {
                tag: start_tag,
                role: SearchRole::SequenceStart,
                pattern: CompiledPattern::compile(start)?,
            }];
            if let Some(body) = body {
                defs.push(SearchDefinition {
                    tag: body_tag,
                    role: SearchRole::SequenceBody,
                    pattern: CompiledPattern::compile(body)?,
                });
            }
            if let Some(end) = end {
                defs.push(SearchDefinition {
                    tag: end_tag,
                    role: SearchRole::SequenceEnd,
                    pattern: CompiledPattern::compile(end)?,
                });
            }
            Ok(defs)
        }
    }
}
