//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use binroute_cli::{CliError, run};

fn main() {
    match run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            #[expect(clippy::print_stderr, reason = "report fatal errors to the terminal")]
            {
                eprintln!("binroute: {err}");
            }
            std::process::exit(1);
        }
    }
}
