//! Configuration system for the controller
//!
//! Settings are layered: built-in defaults, then a YAML file, then
//! environment variables. Command line flags are applied last by the binary.

pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::ControllerConfig;
