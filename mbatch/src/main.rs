//! Formats structured log events into payloads for a metrics ingestion backend.
//!
//! Events are read as newline-delimited JSON from a file or stdin, and the resulting payloads are
//! written to stdout. Delivery to the backend is left to the caller.
//!
//! # Usage
//!
//! ```text
//! $ mbatch --environment production batch --input events.ndjson
//! {"gauge":[...],"counter":[...]}
//! ```
//!
//! Run `mbatch --help` for all commands and options. Each global option can also be set through an
//! `MBATCH_*` environment variable, and all remaining settings are read from `config.yml` in the
//! config folder.

mod cli;
mod cliapp;

use std::error::Error;
use std::process;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            let error: &dyn Error = err.as_ref();
            mbatch_log::ensure_error(error);
            1
        }
    };

    process::exit(exit_code);
}
