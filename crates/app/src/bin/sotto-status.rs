//! Waybar status probe: prints one JSON object and exits.

use clap::Parser;

use sotto_app::status;

#[derive(Parser, Debug)]
#[command(name = "sotto-status", version, about = "Speech-mode status JSON for a Waybar module")]
struct Cli {}

fn main() {
    let _cli = Cli::parse();
    std::process::exit(status::cli_status());
}
