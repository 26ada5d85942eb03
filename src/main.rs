//! Codeweave CLI binary
//!
//! This is the main entry point for the codeweave command-line interface.
//! The CLI is a thin adapter over library APIs - NO logic is implemented here.

use std::process::ExitCode;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = codeweave::cli::parse_args();

    // Initialize logger if verbose
    if cli.verbose {
        env_logger::init();
    }

    // Execute command and handle result
    match codeweave::cli::execute(&cli) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let payload = codeweave::cli::CliErrorPayload::from_error(&e);
            match serde_json::to_string_pretty(&payload) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("Error: {}", e),
            }
            ExitCode::from(1)
        }
    }
}
