//! Command line handling for the controller binary

mod args;
mod logging;

pub use args::Args;
pub use logging::init_logging;
