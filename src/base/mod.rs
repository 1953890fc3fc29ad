//! Core components, types, and utilities for triage.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - Canned replies, greeting, and model directives.
//! - Transcript, severity, and result types.

pub mod config;
pub mod prompts;
pub mod types;
