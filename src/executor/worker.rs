//! Worker side of distributed execution
//!
//! A worker process rebuilds the same plan as its coordinator, then answers
//! one JSON work request per line on stdin with one outcome batch per line
//! on stdout. Batch lines carry a prefix so anything a case body prints to
//! stdout is never mistaken for a result.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use tracing::{debug, warn};

use super::run_case;
use crate::models::{AssertionOutcome, CaseId, CaseReport, ErrorKind, ScheduledCase, TestTree};

/// Set in the environment of every worker process (value: worker index)
pub const WORKER_ENV: &str = "TREE_RUNNER_WORKER";

/// Prefix of outcome batch lines on a worker's stdout
pub const BATCH_PREFIX: &str = "@tree-runner:batch ";

/// One case assignment sent from coordinator to worker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub case: CaseId,
    pub path: String,
}

impl WorkRequest {
    pub fn for_case(case: &ScheduledCase) -> Self {
        Self {
            case: case.id,
            path: case.full_name(),
        }
    }
}

/// True inside a process started by the distributed coordinator
pub fn is_worker_process() -> bool {
    std::env::var_os(WORKER_ENV).is_some()
}

/// Serve work requests until `input` is closed. Returns the number of
/// cases executed.
pub fn serve<R: BufRead, W: Write>(tree: &TestTree, input: R, mut output: W) -> Result<usize> {
    let cases: HashMap<CaseId, &ScheduledCase> =
        tree.pending().iter().map(|case| (case.id, case)).collect();
    let mut served = 0;

    for line in input.lines() {
        let line = line.context("Failed to read work request")?;
        if line.trim().is_empty() {
            continue;
        }

        let request: WorkRequest =
            serde_json::from_str(&line).context("Malformed work request")?;

        let report = match cases.get(&request.case) {
            Some(case) if case.full_name() == request.path => {
                debug!("Worker running {}", request.path);
                run_case(case)
            }
            _ => {
                warn!(
                    "Worker has no case {} at '{}'; plan differs from coordinator",
                    request.case, request.path
                );
                CaseReport::new(
                    request.case,
                    request.path.clone(),
                    vec![AssertionOutcome::error(
                        ErrorKind::Protocol,
                        format!(
                            "worker plan has no case {} at '{}'",
                            request.case, request.path
                        ),
                    )],
                )
            }
        };

        let batch = serde_json::to_string(&report).context("Failed to encode outcome batch")?;
        writeln!(output, "{BATCH_PREFIX}{batch}").context("Failed to write outcome batch")?;
        output.flush().context("Failed to flush outcome batch")?;
        served += 1;
    }

    Ok(served)
}

/// Serve requests over the process's stdin and stdout
pub fn serve_stdio(tree: &TestTree) -> Result<usize> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(tree, stdin.lock(), stdout.lock())
}

/// Parse one stdout line from a worker. `None` for lines that are not
/// batches.
pub fn parse_batch(line: &str) -> Option<serde_json::Result<CaseReport>> {
    line.strip_prefix(BATCH_PREFIX)
        .map(|payload| serde_json::from_str(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn tree() -> TestTree {
        TestTree::build("root", |s| {
            s.case("ok", |t| {
                println!("noise from a case body");
                t.check("ok", true);
                Ok(())
            });
            s.case("bad", |t| {
                t.check_eq("2 * 2 == 5", 2 * 2, 5);
                Ok(())
            });
            Ok(())
        })
    }

    #[test]
    fn test_serve_answers_each_request() {
        let tree = tree();
        let requests: String = tree
            .pending()
            .iter()
            .rev()
            .map(|c| serde_json::to_string(&WorkRequest::for_case(c)).unwrap() + "\n")
            .collect();

        let mut output = Vec::new();
        let served = serve(&tree, Cursor::new(requests), &mut output).unwrap();
        assert_eq!(served, 2);

        let text = String::from_utf8(output).unwrap();
        let batches: Vec<CaseReport> = text
            .lines()
            .filter_map(parse_batch)
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].path, "root.bad");
        assert_eq!(batches[0].counts().fail, 1);
        assert_eq!(batches[1].path, "root.ok");
        assert_eq!(batches[1].counts().pass, 1);
    }

    #[test]
    fn test_serve_reports_unknown_case_as_protocol_error() {
        let tree = tree();
        let request = serde_json::to_string(&WorkRequest {
            case: CaseId(0),
            path: "root.renamed".to_string(),
        })
        .unwrap();

        let mut output = Vec::new();
        serve(&tree, Cursor::new(request), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let batch = parse_batch(text.trim_end()).unwrap().unwrap();
        assert!(matches!(
            batch.outcomes[0],
            AssertionOutcome::Error {
                kind: ErrorKind::Protocol,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_batch_ignores_plain_lines() {
        assert!(parse_batch("hello from a test").is_none());
        assert!(parse_batch(&format!("{BATCH_PREFIX}{{not json")).unwrap().is_err());
    }
}
