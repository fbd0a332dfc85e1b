//! Hyprland control plane.
//!
//! Everything desktop-side is a bounded subprocess: `hyprctl` for dispatch
//! and queries, `notify-send` for the notification channel, `xdg-open` for
//! URLs. Query calls parse `-j` JSON output with serde. Fire-and-forget
//! calls detach and never report failure beyond a log line.

pub mod clients;
pub mod dispatch;
pub mod notify;

pub use clients::{active_window_address, active_workspace_name, clients, Client, WorkspaceRef};
pub use dispatch::{
    close_window, dispatch, dispatch_line, exec, focus_window, kill_active, move_window_silent,
};
pub use notify::{notify, open_url};
