//! Live dictation daemon CLI.

use clap::{Parser, Subcommand};

use sotto_app::dictation::{self, DictationConfig};
use sotto_app::logging;

#[derive(Parser, Debug)]
#[command(name = "sotto-dictate", version, about = "Offline live dictation for the focused window")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the worker loop in the foreground.
    Run,
    /// Enable typing, spawning the daemon if needed.
    Start,
    /// Disable typing; the daemon stays warm.
    Stop,
    /// Spawn the daemon without enabling typing.
    DaemonStart,
    /// Stop the daemon process entirely.
    DaemonStop,
    /// Print `running=<0|1> typing=<0|1>`.
    Status,
    /// Toggle typing (default when no subcommand is given).
    Toggle,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Toggle);

    let code = match command {
        Command::Run => {
            let _guard = logging::init("sotto-dictate");
            dictation::run(DictationConfig::from_env()).await
        }
        Command::Start => dictation::cli_start(),
        Command::Stop => dictation::cli_stop(),
        Command::DaemonStart => dictation::cli_daemon_start(),
        Command::DaemonStop => dictation::cli_daemon_stop(),
        Command::Status => dictation::cli_status(),
        Command::Toggle => dictation::cli_toggle(),
    };
    std::process::exit(code);
}
