//! This crate provides a data-driven testing framework for command-line
//! programs. Tests are plain YAML files describing a binary to run, the
//! flags, arguments, and stdin of each case, and the expected stdout, stderr,
//! and return code. When an expectation is not met, the mismatch is rendered
//! as an annotated diff rather than a bare "left != right": text output is
//! diffed at character, word, or line granularity, and structured output
//! (JSON/YAML) is walked recursively so that each differing key or index is
//! reported with its path.
//!
//! A minimal runner looks as follows:
//!
//! ```rust,ignore
//! use cli_tester::CliTester;
//!
//! fn main() {
//!     CliTester::new().config_dir("test_configs").run();
//! }
//! ```
//!
//! and a suite file such as `test_configs/echo.yaml` might contain:
//!
//! ```text
//! name: echo
//! binary_path: /bin/echo
//! tests:
//!   - test: prints_argument
//!     arguments: ["hello"]
//!     expected_stdout:
//!       content: "hello\n"
//!       treat_as: text
//! ```
//!
//! Each case may carry `flags` (rendered as `-name value`), `arguments`,
//! `stdin`, `env`, `cwd`, a `timeout` in seconds, and a `diff_mode`
//! overriding the suite's. Expected content is given inline or via
//! `file_path`, and its `treat_as` field (`text`, `bytes`, `json`, `yaml`)
//! decides how the captured output is compared: `json` and `yaml` content is
//! parsed and compared structurally, so key order and formatting do not
//! matter, while `text` and `bytes` are compared verbatim and any difference
//! is shown as a marked-up diff:
//!
//! ```text
//!  Command stdout and expected output are different
//!   c
//! - olour
//! + olor
//!   the sky
//! ```
//!
//! The runner's output is deliberately similar to Rust's normal testing
//! output: one `test cli_tests::<suite>.<case> ... ok` line per case, a
//! failure listing, and a summary line. Suites run in parallel on a thread
//! pool sized to the machine.
//!
//! Report colours come from a built-in ANSI palette, or from a TOML style
//! file (see [`styles`]) passed to [`CliTester::styles_path`].
//!
//! ## Integration with Cargo.
//!
//! Tests created with this crate can be used as part of an existing test
//! suite and can be run with the `cargo test` command. For example, if the
//! Rust source file that runs your suites is `cli_tests/run.rs` then add the
//! following to your Cargo.toml:
//!
//! ```text
//! [[test]]
//! name = "cli_tests"
//! path = "cli_tests/run.rs"
//! harness = false
//! ```

#![allow(clippy::new_without_default)]

pub mod compare;
pub mod config;
pub mod error;
pub mod pretty;
pub mod structural;
pub mod styles;
mod tester;
pub mod textdiff;

pub use compare::{Comparator, Payload};
pub use config::{CaptureSpec, Content, Encoding, Flag, TestCase, TestSuite, TreatAs};
pub use error::{Error, Result};
pub use pretty::{render, render_with, Markers};
pub use structural::{Change, Path, PathSegment};
pub use styles::StyleMap;
pub use tester::CliTester;
pub use textdiff::{compute_diff, DiffKind, DiffMode, DiffOp};

pub(crate) fn fatal(msg: &str) -> ! {
    eprintln!("\nFatal exception:\n  {}", msg);
    std::process::exit(1);
}
