//! Case selection filters
//!
//! A filter is either a dotted path prefix (`root.math` selects
//! `root.math` and everything below it, but not `root.mathematics`) or a
//! glob pattern over the full dotted case name (`*.parser.*`).

use regex::Regex;

use crate::error::{EngineError, Result};

#[derive(Clone, Debug)]
pub enum CaseFilter {
    Prefix(String),
    Pattern { glob: String, regex: Regex },
}

impl CaseFilter {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if !spec.contains(['*', '?']) {
            return Ok(CaseFilter::Prefix(spec.trim_end_matches('.').to_string()));
        }

        let mut pattern = String::from("^");
        for ch in spec.chars() {
            match ch {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                other => pattern.push_str(&regex::escape(&other.to_string())),
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|source| EngineError::InvalidFilter {
            pattern: spec.to_string(),
            source,
        })?;

        Ok(CaseFilter::Pattern {
            glob: spec.to_string(),
            regex,
        })
    }

    /// Match against a full dotted case name
    pub fn matches(&self, full_name: &str) -> bool {
        match self {
            CaseFilter::Prefix(prefix) => {
                prefix.is_empty()
                    || full_name == prefix
                    || full_name
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            }
            CaseFilter::Pattern { regex, .. } => regex.is_match(full_name),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CaseFilter::Prefix(prefix) => prefix,
            CaseFilter::Pattern { glob, .. } => glob,
        }
    }
}
