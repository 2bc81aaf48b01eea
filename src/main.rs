//! Binary entrypoint for the `anmix` terminal chat.

use std::process::ExitCode;

use anmix_chat::start;

/// Run the interactive chat until end of input or `/quit`.
fn main() -> ExitCode {
    start::run()
}
