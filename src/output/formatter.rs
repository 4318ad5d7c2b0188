//! Output formatters for run results
//!
//! Provides the hierarchical table, JSON and one-line summary formats.

use serde::Serialize;
use std::fmt::Write;

use crate::error::Result;
use crate::models::{AssertionOutcome, Counts, NodeRef, TestTree};
use crate::scheduler::RunOutcome;

const NAME_WIDTH: usize = 44;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }

    pub fn names() -> &'static [&'static str] {
        &["table", "json", "json-pretty", "summary"]
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a finished run
    pub fn format_run(&self, run: &RunOutcome) -> Result<String> {
        match self.format {
            OutputFormat::Table => Ok(self.format_table(run)),
            OutputFormat::Json => to_json(run, false),
            OutputFormat::JsonPretty => to_json(run, true),
            OutputFormat::Summary => Ok(self.format_summary(run)),
        }
    }

    fn format_table(&self, run: &RunOutcome) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "\n{:=^72}", format!(" {} ", run.tree.root.name));
        let _ = writeln!(output, "{}", self.run_line(run));
        let _ = writeln!(output, "{:-<72}", "");
        let _ = writeln!(
            output,
            "{:<NAME_WIDTH$} {:>6} {:>6} {:>6} {:>6} {:>7}",
            "NAME", "PASS", "FAIL", "ERROR", "BROKEN", "TIME"
        );
        let _ = writeln!(output, "{:-<72}", "");

        self.write_rows(&mut output, &run.tree);

        let _ = writeln!(output, "{:-<72}", "");
        let _ = writeln!(
            output,
            "{:<NAME_WIDTH$} {}",
            "Total",
            self.counts_columns(&run.totals)
        );
        let _ = writeln!(output, "{:=<72}", "");

        let failures = failure_lines(&run.tree);
        if !failures.is_empty() {
            let _ = writeln!(output, "\n Failures:");
            for (name, outcome) in failures {
                let _ = writeln!(output, "   {} {}", self.paint_failure(&name), outcome);
            }
        }

        let _ = writeln!(output, "\n{}", self.status_line(run));
        output
    }

    fn write_rows(&self, output: &mut String, tree: &TestTree) {
        for node in tree.walk() {
            let indent = "  ".repeat(node.depth());
            match node {
                NodeRef::Suite(suite) => {
                    let label = match &suite.build_error {
                        Some(_) => format!("{indent}{} (build error)", suite.name),
                        None => format!("{indent}{}", suite.name),
                    };
                    let _ = writeln!(
                        output,
                        "{:<NAME_WIDTH$} {}",
                        truncate(&label),
                        self.counts_columns(&suite.aggregate)
                    );
                }
                NodeRef::Case(case) => {
                    let Some(result) = &case.result else {
                        let label = format!("{indent}· {}", case.name);
                        let _ = writeln!(
                            output,
                            "{:<NAME_WIDTH$} {:>6} {:>6} {:>6} {:>6} {:>7}",
                            truncate(&label),
                            "-",
                            "-",
                            "-",
                            "-",
                            "skipped"
                        );
                        continue;
                    };

                    let label = format!("{indent}{} {}", case_symbol(&result.counts), case.name);
                    let _ = writeln!(
                        output,
                        "{:<NAME_WIDTH$} {} {:>5}ms",
                        truncate(&label),
                        self.counts_columns(&result.counts),
                        result.duration_ms
                    );

                    for section in &result.sections {
                        let label = format!(
                            "{indent}{}§ {}",
                            "  ".repeat(section.depth()),
                            section.name()
                        );
                        let _ = writeln!(
                            output,
                            "{:<NAME_WIDTH$} {}",
                            truncate(&label),
                            self.counts_columns(&section.counts)
                        );
                    }
                }
            }
        }
    }

    fn counts_columns(&self, counts: &Counts) -> String {
        let fail = format!("{:>6}", counts.fail);
        let error = format!("{:>6}", counts.error);
        let broken = format!("{:>6}", counts.broken);
        format!(
            "{:>6} {} {} {}",
            counts.pass,
            self.paint_if(counts.fail > 0, &fail, "31"),
            self.paint_if(counts.error > 0, &error, "31"),
            self.paint_if(counts.broken > 0, &broken, "33")
        )
    }

    fn run_line(&self, run: &RunOutcome) -> String {
        let mut line = format!(
            " Strategy: {} | Workers: {} | Cases: {}",
            run.strategy, run.workers, run.selected
        );
        if let Some(seed) = run.seed {
            let _ = write!(line, " | Seed: {seed}");
        }
        let _ = write!(
            line,
            " | Started: {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        line
    }

    fn status_line(&self, run: &RunOutcome) -> String {
        let status = if run.passed { "PASSED" } else { "FAILED" };
        let mut line = format!(
            "{} {} in {}ms",
            self.paint_if(true, status, if run.passed { "32" } else { "31" }),
            run.totals,
            run.duration_ms
        );
        if let Some(path) = &run.xml_path {
            match &run.xml_error {
                Some(e) => {
                    let _ = write!(line, "\nJUnit report not written: {e}");
                }
                None => {
                    let _ = write!(line, "\nJUnit report: {}", path.display());
                }
            }
        }
        line
    }

    fn format_summary(&self, run: &RunOutcome) -> String {
        format!(
            "{} {}: {} [{}] in {}ms",
            if run.passed { "✓" } else { "✗" },
            run.tree.root.name,
            run.totals,
            run.strategy,
            run.duration_ms
        )
    }

    fn paint_failure(&self, name: &str) -> String {
        self.paint_if(true, name, "1")
    }

    fn paint_if(&self, condition: bool, text: &str, code: &str) -> String {
        if self.colorize && condition {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn case_symbol(counts: &Counts) -> &'static str {
    if !counts.is_success() {
        "✗"
    } else if counts.broken > 0 {
        "○"
    } else {
        "✓"
    }
}

fn truncate(label: &str) -> String {
    if label.chars().count() <= NAME_WIDTH {
        return label.to_string();
    }
    let kept: String = label.chars().take(NAME_WIDTH - 1).collect();
    format!("{kept}…")
}

/// First Fail or Error of every failing case, in tree order
pub fn failure_lines(tree: &TestTree) -> Vec<(String, &AssertionOutcome)> {
    tree.cases()
        .filter_map(|case| {
            let failure = case.result.as_ref()?.first_failure()?;
            Some((case.full_name(), failure))
        })
        .collect()
}

/// Plain listing of a tree's case paths, one per line
pub fn format_listing(tree: &TestTree, detailed: bool) -> String {
    let mut output = String::new();
    for node in tree.walk() {
        match node {
            NodeRef::Suite(suite) if detailed => {
                let _ = write!(output, "{}{}/", "  ".repeat(node.depth()), suite.name);
                if let Some(error) = &suite.build_error {
                    let _ = write!(output, "  (build error: {error})");
                }
                output.push('\n');
            }
            NodeRef::Case(case) if detailed => {
                let _ = writeln!(output, "{}{}", "  ".repeat(node.depth()), case.name);
            }
            NodeRef::Case(case) if !case.is_build_error() => {
                let _ = writeln!(output, "{}", case.full_name());
            }
            _ => {}
        }
    }
    output
}
