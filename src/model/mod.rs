//! Data model
//!
//! Snapshots of watched resources, parsed applications and kind descriptors.

mod application;
mod kind;
mod resource;

pub use application::*;
pub use kind::*;
pub use resource::*;
