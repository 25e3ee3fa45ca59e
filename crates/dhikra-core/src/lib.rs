//! # dhikra-core
//!
//! Core types, traits, configuration, and error handling for the Dhikra assistant.

pub mod config;
pub mod error;
pub mod intent;
pub mod message;
pub mod traits;
