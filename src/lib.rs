//! Library root for `carelink-triage`.
//!
//! CareLink triage is the symptom-assessment conversation behind the CareLink
//! telehealth front end. It:
//! - Keeps an append-only transcript of patient and assistant turns
//! - Classifies each patient message into a mild / moderate / severe tier
//! - Replies with guidance matched to that tier
//! - Allows at most one classification in flight per session
//!
//! Classification sits behind the `GenericClassifier` trait, with a keyword
//! matcher as the default backend and an OpenAI-backed model as the live one.

pub mod base;
pub mod interaction;
pub mod runtime;
pub mod service;

use base::{config::Config, types::Void};
use rustls::crypto;
use tracing::{info, warn};

/// Public async entry for the binary crate.
///
/// Sets up necessary services and runs one console triage session:
/// - Initializes the crypto provider used by the model backend
/// - Creates the runtime context with the configured classifier
/// - Runs the session on stdin until it ends
pub async fn start(config: Config) -> Void {
    info!("Starting carelink-triage ...");

    // Start the crypto provider.
    if crypto::ring::default_provider().install_default().is_err() {
        warn!("A crypto provider was already installed.");
    }

    // Initialize the runtime.
    let runtime = runtime::Runtime::new(config)?;

    // Start the runtime.
    runtime.start().await?;

    Ok(())
}
