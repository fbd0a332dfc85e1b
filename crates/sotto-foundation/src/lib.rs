pub mod config;
pub mod error;
pub mod shutdown;
pub mod state;

pub use config::SharedConfig;
pub use error::{AudioError, InjectionError, SttError, StateError, WmError};
pub use shutdown::ShutdownFlag;
pub use state::{runtime_dir, DaemonStatus, StateFiles};
