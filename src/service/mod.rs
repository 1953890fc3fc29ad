//! Service integrations behind the conversation engine.
//!
//! This module contains the classification backends used by triage sessions:
//! - A keyword matcher with canned replies (the default)
//! - An OpenAI-backed model classifier
//!
//! Each backend implements the generic `GenericClassifier` trait, allowing
//! for extensibility and easy testing.

pub mod classifier;
