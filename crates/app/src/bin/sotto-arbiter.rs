//! Double-tap mode arbiter.
//!
//! No subcommands: the arbiter runs in the foreground (typically under a
//! systemd user unit) and exits cleanly on SIGTERM/SIGINT. The event loop
//! is blocking, so it runs on its own thread while the async runtime only
//! carries the signal handlers.

use clap::Parser;

use sotto_app::arbiter::{self, ArbiterConfig};
use sotto_app::logging;
use sotto_foundation::ShutdownFlag;

#[derive(Parser, Debug)]
#[command(name = "sotto-arbiter", version, about = "Double-tap Ctrl to switch speech modes")]
struct Cli {}

#[tokio::main]
async fn main() {
    let _cli = Cli::parse();
    let _guard = logging::init("sotto-arbiter");

    let shutdown = ShutdownFlag::new();
    shutdown.install_signal_handlers();

    let worker_shutdown = shutdown.clone();
    let worker = tokio::task::spawn_blocking(move || {
        arbiter::run(ArbiterConfig::from_env(), worker_shutdown)
    });

    let code = worker.await.unwrap_or_else(|e| {
        tracing::error!("arbiter worker panicked: {}", e);
        1
    });
    std::process::exit(code);
}
