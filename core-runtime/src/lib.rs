//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the indexing crates:
//! - Logging and tracing setup
//! - Configuration management
//! - Event bus for indexing and collection notifications
//!
//! ## Overview
//!
//! Nothing in here knows about tracks or folders. Other crates depend on this
//! one for the conventions they log, configure, and publish with.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
