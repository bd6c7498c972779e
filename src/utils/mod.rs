pub mod command;
pub mod run_log;
pub mod time;
