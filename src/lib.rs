//! appnav-controller library
//!
//! Watches application resources and every kind they declare as component
//! kinds, works out which applications each change affects (including
//! applications nested inside other applications) and hands coalesced
//! batches of affected applications to a status callback.

pub mod batch;
pub mod config;
pub mod error;
pub mod kube;
pub mod matching;
pub mod model;
pub mod resolver;
pub mod status;
pub mod watcher;

pub use error::{Error, Result};
