//! Symptom classification backends.
//!
//! The `GenericClassifier` trait is the seam between the conversation engine
//! and whatever decides a severity tier: the built-in keyword matcher, or a
//! live model. Sessions only ever see the cloneable `Classifier` handle.

pub mod keyword;
pub mod openai;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use tracing::info;

use crate::base::{
    config::{ClassifierKind, Config},
    types::{Assessment, Res},
};

// Traits.

/// Generic classifier trait that backends must implement.
///
/// Implementations may suspend (network calls, simulated latency) but must
/// not depend on earlier turns: the result is a function of `text` alone.
#[async_trait]
pub trait GenericClassifier: Send + Sync + 'static {
    /// Short backend name, used in logs.
    fn name(&self) -> &str;

    /// Classify one user message into a tier and reply.
    ///
    /// An `Err` means the backend could not produce an answer at all; the
    /// session reports it to the host as a failed classification.
    async fn classify(&self, text: &str) -> Res<Assessment>;
}

// Structs.

/// Classifier handle for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Classifier {
    inner: Arc<dyn GenericClassifier>,
}

impl Deref for Classifier {
    type Target = dyn GenericClassifier;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl Classifier {
    pub fn new(inner: Arc<dyn GenericClassifier>) -> Self {
        Self { inner }
    }

    /// Build the backend selected by the configuration.
    pub fn from_config(config: &Config) -> Res<Self> {
        let classifier = match config.classifier {
            ClassifierKind::Keyword => Self::keyword(config.reply_delay()),
            ClassifierKind::OpenAi => Self::openai(config)?,
        };

        info!("Using `{}` classifier.", classifier.name());

        Ok(classifier)
    }
}
