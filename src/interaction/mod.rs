//! Conversation handling and host interactions.
//!
//! This module provides:
//! - The triage session (transcript, single-flight classification, reply hooks)
//! - Explicit page navigation for hosts
//! - Console input parsing

pub mod command;
pub mod navigation;
pub mod session;
