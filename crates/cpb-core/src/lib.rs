//! Core domain + application logic for the channel post bot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind the
//! messaging port (trait) implemented in the adapter crate.

pub mod callbacks;
pub mod composer;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod domain;
pub mod draft;
pub mod errors;
pub mod expiry;
pub mod gate;
pub mod linking;
pub mod logging;
pub mod menus;
pub mod messaging;
pub mod registry;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{Error, Result};
