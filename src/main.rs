//! Binary entrypoint that launches the agent bootstrap.

use std::process::ExitCode;

use parley_agent::start_parley_agent;

/// Start the agent with a console chat adapter.
fn main() -> ExitCode {
    start_parley_agent::run()
}
