//! Keyword-matching classifier with canned replies.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::base::types::{Assessment, Res, SeverityTier};

use super::{Classifier, GenericClassifier};

/// Phrases that mark a message as `Severe`. Checked first.
pub const SEVERE_KEYWORDS: [&str; 3] = ["chest pain", "breathing", "severe"];

/// Phrases that mark a message as `Moderate`.
pub const MODERATE_KEYWORDS: [&str; 3] = ["fever", "cough", "moderate"];

// Extra methods on `Classifier` applied by the keyword implementation.

impl Classifier {
    /// Creates a keyword classifier that answers after `delay`.
    pub fn keyword(delay: Duration) -> Self {
        Self {
            inner: Arc::new(KeywordClassifier::new(delay)),
        }
    }
}

/// Classify `text` by substring match.
///
/// First match wins: severe phrases beat moderate ones, anything else is mild.
pub fn classify_keywords(text: &str) -> Assessment {
    let lower = text.to_lowercase();

    let tier = if SEVERE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        SeverityTier::Severe
    } else if MODERATE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        SeverityTier::Moderate
    } else {
        SeverityTier::Mild
    };

    Assessment::canned(tier)
}

// Specific implementations.

/// Keyword classifier implementation.
#[derive(Clone, Debug)]
pub struct KeywordClassifier {
    delay: Duration,
}

impl KeywordClassifier {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl GenericClassifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    #[instrument(name = "KeywordClassifier::classify", skip_all)]
    async fn classify(&self, text: &str) -> Res<Assessment> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let assessment = classify_keywords(text);
        debug!("Keyword classifier chose `{}`.", assessment.tier);

        Ok(assessment)
    }
}

// Tests.
