//! JUnit XML rendering
//!
//! One `testsuite` per suite, nested the way the tree is, with cases and
//! child suites in discovery order. Counts are the suite aggregates and
//! are assertion counts, so one case can contribute several failures.
//! Suites with nothing reported below them, and pruned cases, are left out.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::{self, Write};
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::models::{AssertionOutcome, Case, Counts, Suite, TestNode, TestTree};

/// Display adapter producing the XML document for a finalized tree
pub struct JunitReport<'a> {
    tree: &'a TestTree,
    timestamp: DateTime<Utc>,
}

impl<'a> JunitReport<'a> {
    pub fn new(tree: &'a TestTree, timestamp: DateTime<Utc>) -> Self {
        Self { tree, timestamp }
    }
}

impl fmt::Display for JunitReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = &self.tree.root;

        writeln!(f, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
        write!(f, r#"<testsuites name="{}" "#, Escaped(&root.name))?;
        write_counts(f, &root.aggregate, reported_time(root).unwrap_or(0))?;
        writeln!(
            f,
            r#" timestamp="{}">"#,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;

        write_suite(f, root, 1)?;

        writeln!(f, "</testsuites>")
    }
}

fn write_suite(f: &mut fmt::Formatter<'_>, suite: &Suite, depth: usize) -> fmt::Result {
    let Some(time) = reported_time(suite) else {
        return Ok(());
    };
    let indent = "  ".repeat(depth);

    write!(f, r#"{indent}<testsuite name="{}" "#, Escaped(&suite.full_name()))?;
    write_counts(f, &suite.aggregate, time)?;
    writeln!(f, ">")?;
    for child in &suite.children {
        match child {
            TestNode::Suite(nested) => write_suite(f, nested, depth + 1)?,
            TestNode::Case(case) => write_case(f, case, depth + 1)?,
        }
    }
    writeln!(f, "{indent}</testsuite>")
}

fn write_counts(f: &mut fmt::Formatter<'_>, counts: &Counts, time_ms: u64) -> fmt::Result {
    write!(
        f,
        r#"tests="{}" failures="{}" errors="{}" skipped="{}" time="{}""#,
        counts.total(),
        counts.fail,
        counts.error,
        counts.broken,
        seconds(time_ms)
    )
}

/// Summed duration of the reported cases below `suite`; `None` when
/// nothing below it was reported
fn reported_time(suite: &Suite) -> Option<u64> {
    suite.children.iter().fold(None, |total, child| {
        let time = match child {
            TestNode::Suite(nested) => reported_time(nested),
            TestNode::Case(case) => case.result.as_ref().map(|r| r.duration_ms),
        };
        match (total, time) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        }
    })
}

fn write_case(f: &mut fmt::Formatter<'_>, case: &Case, depth: usize) -> fmt::Result {
    let Some(result) = &case.result else {
        return Ok(());
    };
    let indent = "  ".repeat(depth);

    write!(
        f,
        r#"{indent}<testcase name="{}" classname="{}" time="{}""#,
        Escaped(&case.name),
        Escaped(&case.path.join(".")),
        seconds(result.duration_ms)
    )?;

    let mut children = result.outcomes.iter().filter(|o| !o.is_pass()).peekable();
    if children.peek().is_none() {
        return writeln!(f, "/>");
    }

    writeln!(f, ">")?;
    for outcome in children {
        write!(f, "{indent}  ")?;
        match outcome {
            AssertionOutcome::Pass => {}
            AssertionOutcome::Fail {
                expression,
                evaluated,
            } => writeln!(
                f,
                r#"<failure message="{}" type="assertion">{}</failure>"#,
                Escaped(expression),
                Escaped(evaluated)
            )?,
            AssertionOutcome::Error {
                kind,
                message,
                location,
            } => writeln!(
                f,
                r#"<error message="{}" type="{}">{}</error>"#,
                Escaped(message),
                kind,
                Escaped(location.as_deref().unwrap_or(""))
            )?,
            AssertionOutcome::Broken { expression, reason } => writeln!(
                f,
                r#"<skipped message="{}: {}"/>"#,
                Escaped(expression),
                Escaped(reason)
            )?,
        }
    }
    writeln!(f, "{indent}</testcase>")
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

/// Attribute and text escaping; control characters XML 1.0 cannot carry
/// are replaced
struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ch in self.0.chars() {
            match ch {
                '&' => f.write_str("&amp;")?,
                '<' => f.write_str("&lt;")?,
                '>' => f.write_str("&gt;")?,
                '"' => f.write_str("&quot;")?,
                '\'' => f.write_str("&apos;")?,
                '\n' => f.write_str("&#10;")?,
                '\t' | '\r' => f.write_char(ch)?,
                c if (c as u32) < 0x20 => f.write_char('\u{FFFD}')?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}

/// Render the XML document for a finalized tree
pub fn render(tree: &TestTree, timestamp: DateTime<Utc>) -> String {
    JunitReport::new(tree, timestamp).to_string()
}

/// Write the XML document to `path`, creating parent directories
pub fn write_report(path: &Path, tree: &TestTree, timestamp: DateTime<Utc>) -> Result<()> {
    let report_error = |source| EngineError::Report {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(report_error)?;
    }
    std::fs::write(path, render(tree, timestamp)).map_err(report_error)
}
