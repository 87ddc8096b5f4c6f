//! CLI entrypoint for the labeling-service control utility.
//!
//! The binary delegates to [`labelctl::run`], which parses arguments, opens
//! the kernel session, dispatches to the subsystem handlers, and renders
//! results in the selected output format.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    labelctl::run(std::env::args_os(), &mut stdout, &mut stderr)
}
