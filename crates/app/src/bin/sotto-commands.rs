//! Voice-command daemon CLI.

use clap::{Parser, Subcommand};

use sotto_app::commands::{self, RecognizerConfig};
use sotto_app::logging;

#[derive(Parser, Debug)]
#[command(name = "sotto-commands", version, about = "Offline voice commands for the desktop")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the worker loop in the foreground.
    Run,
    /// Start the daemon (stops dictation first).
    Start,
    /// Stop the daemon.
    Stop,
    /// Alias of `start`.
    DaemonStart,
    /// Alias of `stop`.
    DaemonStop,
    /// Print `running=<0|1>`.
    Status,
    /// Toggle the daemon (default when no subcommand is given).
    Toggle,
    /// Execute text as if it had been heard; audio is bypassed.
    Simulate {
        #[arg(trailing_var_arg = true)]
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Toggle);

    let code = match command {
        Command::Run => {
            let _guard = logging::init("sotto-commands");
            commands::run(RecognizerConfig::from_env()).await
        }
        Command::Start | Command::DaemonStart => commands::cli_daemon_start(),
        Command::Stop | Command::DaemonStop => commands::cli_daemon_stop(),
        Command::Status => commands::cli_status(),
        Command::Toggle => commands::cli_toggle(),
        Command::Simulate { text } => {
            let _guard = logging::init("sotto-commands");
            commands::cli_simulate(&text.join(" ")).await
        }
    };
    std::process::exit(code);
}
