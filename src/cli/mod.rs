//! Command-line interface for the pagevault storage core.

mod app;
mod main;

pub use app::App;
pub use main::Cli;
