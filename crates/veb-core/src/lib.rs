//! Core domain + application logic for the VK Education projects bot.
//!
//! This crate is intentionally transport-agnostic. The VK API and the
//! browser live behind ports (traits) implemented in adapter crates.

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod longpoll;
pub mod ports;
pub mod render;
pub mod scraper;
pub mod utils;

pub use errors::{Error, Result};
