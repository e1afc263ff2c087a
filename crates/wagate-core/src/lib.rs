//! # wagate-core
//!
//! Core types, traits, configuration, and error handling for the wagate gateway.

pub mod config;
pub mod error;
pub mod message;
pub mod phone;
pub mod report;
pub mod traits;

pub use config::shellexpand;
