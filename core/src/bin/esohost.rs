/// Esohost CLI
///
/// Serves the command/event protocol over stdin/stdout, or runs a single
/// program directly from the terminal.

use esohost_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
