//! Helpers for testing the mbatch crates.
//!
//! In every test, call [`setup`]. This will set up the logger so that all console output is
//! captured by the test runner. All logs emitted with [`mbatch_log`] will show up for test failures
//! or when run with `--nocapture`.
//!
//! # Example
//!
//! ```no_run
//! #[test]
//! fn my_test() {
//!     mbatch_test::setup();
//!
//!     mbatch_log::debug!("hello, world!");
//! }
//! ```

use serde_json::Value;

/// Setup the test environment.
///
///  - Initializes logs: The logger captures logs from all mbatch crates and mutes all other logs.
pub fn setup() {
    mbatch_log::init_test!("mbatch");
}

/// Renders JSON values as newline-delimited JSON, the input format of the command line.
///
/// # Example
///
/// ```
/// use serde_json::json;
///
/// let input = mbatch_test::json_lines(&[json!({"a": 1}), json!({"b": 2})]);
/// assert_eq!(input, "{\"a\":1}\n{\"b\":2}\n");
/// ```
pub fn json_lines(values: &[Value]) -> String {
    values.iter().map(|value| format!("{value}\n")).collect()
}
