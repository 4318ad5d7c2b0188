//! Tree Runner - hierarchical test-tree scheduling and execution
//!
//! Test plans are trees of suites and cases. Suite bodies run immediately
//! during a build pass; case bodies are deferred, flattened into a work list
//! and handed to one of four execution strategies:
//!
//! - **sequential**: discovery order, one body at a time
//! - **shuffled**: a seeded permutation of discovery order
//! - **parallel**: a pool of blocking worker threads
//! - **distributed**: a pool of worker processes speaking JSON lines
//!
//! Every strategy reports per-case outcome batches to one recorder; after
//! the run, suite aggregates are summed bottom-up and rendered as a summary
//! table and a JUnit XML document.
//!
//! ```no_run
//! use tree_runner::config::RunConfig;
//! use tree_runner::executor::Strategy;
//! use tree_runner::models::TestTree;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let tree = TestTree::build("root", |s| {
//!     s.suite("math", |s| {
//!         s.case("adds", |t| {
//!             t.check_eq("1 + 1 == 2", 1 + 1, 2);
//!             Ok(())
//!         });
//!         Ok(())
//!     });
//!     Ok(())
//! });
//!
//! let config = RunConfig::new(Strategy::Parallel).with_workers(4);
//! let outcome = tree_runner::scheduler::run(tree, &config).await?;
//! assert!(outcome.passed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod output;
pub mod plans;
pub mod results;
pub mod scheduler;
pub mod utils;
