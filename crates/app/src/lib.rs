pub mod arbiter;
pub mod commands;
pub mod daemonize;
pub mod dictation;
pub mod envcfg;
pub mod logging;
pub mod status;
