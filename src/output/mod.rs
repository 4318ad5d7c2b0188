//! Output formatting module
//!
//! Console formats for finished runs and the JUnit XML report.

mod formatter;
pub mod junit;

pub use formatter::{failure_lines, format_listing, OutputFormat, ResultFormatter};
