//! rpz-cli: the `rpzd` binary's argument parsing, logging and commands.

pub mod cli;
pub mod logging;

pub use cli::run;
