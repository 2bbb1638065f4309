//! Issues raised by reached conclusions, and the sink they flow into.

use serde::Serialize;

/// One raised issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub message: String,
    /// Dot path of the scenario that raised this issue.
    pub scenario: String,
    pub priority: i64,
    #[serde(rename = "bug-id", skip_serializing_if = "Option::is_none")]
    pub bug_id: Option<String>,
}

/// Receives issues as conclusions reach.
pub trait IssueSink {
    fn add(&mut self, issue: Issue);
}

/// Collects issues in memory; the CLI serializes them afterwards.
#[derive(Debug, Default)]
pub struct MemoryIssueSink {
    issues: Vec<Issue>,
}

impl MemoryIssueSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}

impl IssueSink for MemoryIssueSink {
    fn add(&mut self, issue: Issue) {
        self.issues.push(issue);
    }
}
