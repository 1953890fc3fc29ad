//! OpenAI-backed triage classifier.
//!
//! Sends the symptom description (plus any configured patient context) to the
//! chat completions API and parses the JSON answer into an `Assessment`.
//! Malformed answers get one repair round-trip before falling back to a
//! conservative `Moderate` assessment; transport failures surface as errors.

use std::{sync::Arc, time::Duration};

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::base::{
    config::Config,
    prompts::{self, build_repair_prompt, build_triage_prompt},
    types::{Assessment, AssessmentDetails, Res, SeverityTier},
};

use super::{Classifier, GenericClassifier};

const DEFAULT_SUMMARY: &str = "No summary provided.";
const DEFAULT_ADVICE: &str = "Consider contacting a healthcare professional for guidance.";
const DEFAULT_RATIONALE: &str = "No rationale provided.";
const UNPARSEABLE_SUMMARY: &str = "Unable to parse model response.";
const RETRY_DELAY_MS: u64 = 600;

// Extra methods on `Classifier` applied by the openai implementation.

impl Classifier {
    pub fn openai(config: &Config) -> Res<Self> {
        let client = OpenAiClassifier::new(config)?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Wire types.

/// The JSON object the model is asked to return.
#[derive(Debug, Default, Deserialize)]
pub struct TriageResponse {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub advice: Option<String>,
    #[serde(default)]
    pub red_flags: Option<Vec<String>>,
    #[serde(default)]
    pub differential: Option<Vec<String>>,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl From<TriageResponse> for Assessment {
    fn from(response: TriageResponse) -> Self {
        let tier = response.severity.as_deref().and_then(SeverityTier::from_label).unwrap_or(SeverityTier::Moderate);

        let details = AssessmentDetails {
            summary: response.summary.unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
            advice: response.advice.unwrap_or_else(|| DEFAULT_ADVICE.to_string()),
            red_flags: response.red_flags.unwrap_or_default(),
            differential: response.differential.unwrap_or_default(),
            rationale: response.rationale.unwrap_or_else(|| DEFAULT_RATIONALE.to_string()),
        };

        Assessment {
            tier,
            reply: format!("{}\n\n{}", details.summary, details.advice),
            details: Some(details),
        }
    }
}

/// The assessment used when no valid JSON could be recovered.
fn fallback_assessment(raw: &str) -> Assessment {
    let cleaned = strip_code_fences(raw);
    let summary = if cleaned.is_empty() { UNPARSEABLE_SUMMARY } else { cleaned };

    TriageResponse {
        severity: Some(SeverityTier::Moderate.label().to_string()),
        summary: Some(summary.to_string()),
        rationale: Some("Fallback response; JSON parsing failed after repair.".to_string()),
        ..Default::default()
    }
    .into()
}

// Specific implementations.

/// OpenAI classifier implementation.
#[derive(Clone)]
pub struct OpenAiClassifier {
    client: Client<OpenAIConfig>,
    config: Config,
}

impl OpenAiClassifier {
    /// Create a new OpenAI classifier.
    #[instrument(name = "OpenAiClassifier::new", skip_all)]
    pub fn new(config: &Config) -> Res<Self> {
        if config.openai_api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("OpenAI API key is not configured."));
        }

        let cfg = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());

        Ok(Self {
            client: Client::with_config(cfg),
            config: config.clone(),
        })
    }

    /// Models to try, in order.
    fn models(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.config.openai_model.as_str()).chain(self.config.openai_fallback_models.iter().map(String::as_str))
    }

    /// Build the chat request for one model.
    fn build_request(&self, model: &str, prompt: &str) -> Res<CreateChatCompletionRequestArgs> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default().content(prompts::TRIAGE_SYSTEM_DIRECTIVE).build()?.into(),
            ChatCompletionRequestUserMessageArgs::default().content(prompt).build()?.into(),
        ];

        let mut request = CreateChatCompletionRequestArgs::default();
        request
            .model(model)
            .messages(messages)
            .temperature(self.config.openai_temperature)
            .max_completion_tokens(self.config.openai_max_tokens);

        Ok(request)
    }

    /// Helper function to make OpenAI API calls with retry logic and timeout handling.
    async fn call_openai_api(&self, request_builder: &CreateChatCompletionRequestArgs) -> Res<String> {
        let max_retries = self.config.openai_max_retries;
        let request_timeout = Duration::from_secs(self.config.openai_request_timeout_secs);

        let mut retries = 0;

        loop {
            let request = request_builder.build()?;
            let result = timeout(request_timeout, self.client.chat().create(request)).await;

            let err = match result {
                Ok(Ok(response)) => {
                    info!("OpenAI API call succeeded after {} attempts", retries + 1);
                    return Ok(response.choices.first().and_then(|choice| choice.message.content.clone()).unwrap_or_default());
                }
                Ok(Err(err)) => anyhow::anyhow!("OpenAI API call failed: {err}"),
                Err(_) => anyhow::anyhow!("OpenAI API call timed out after {request_timeout:?}"),
            };

            if retries >= max_retries {
                return Err(err.context(format!("gave up after {} attempts", retries + 1)));
            }

            retries += 1;
            warn!("{err}; retrying {retries}/{max_retries}");

            tokio::time::sleep(retry_delay(retries)).await;
        }
    }

    /// Send `prompt`, walking the fallback models until one answers.
    #[instrument(name = "OpenAiClassifier::request", skip_all)]
    async fn request(&self, prompt: &str) -> Res<String> {
        let mut last_err = None;

        for model in self.models() {
            let request = self.build_request(model, prompt)?;

            match self.call_openai_api(&request).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    warn!("Model `{model}` failed: {err:#}");
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("No models configured.")))
    }
}

#[async_trait]
impl GenericClassifier for OpenAiClassifier {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(name = "OpenAiClassifier::classify", skip_all)]
    async fn classify(&self, text: &str) -> Res<Assessment> {
        let prompt = build_triage_prompt(text, &self.config.patient);
        let raw = self.request(&prompt).await?;

        if let Some(response) = parse_triage_response(&raw) {
            return Ok(response.into());
        }

        warn!("Model returned malformed JSON; requesting a repair.");

        match self.request(&build_repair_prompt(&prompt)).await {
            Ok(repaired) => match parse_triage_response(&repaired) {
                Some(response) => Ok(response.into()),
                None => Ok(fallback_assessment(&raw)),
            },
            Err(err) => {
                warn!("Repair request failed: {err:#}");
                Ok(fallback_assessment(&raw))
            }
        }
    }
}

// Parsing helpers.

/// Remove a surrounding markdown code fence (optionally tagged `json`).
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();

    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let body = match body.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &body[4..],
        _ => body,
    };

    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Find the first balanced `{ ... }` block in `text`.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();

    for (start, _) in text.match_indices('{') {
        let mut depth = 0usize;

        for (offset, byte) in bytes[start..].iter().enumerate() {
            match byte {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[start..=start + offset]);
                    }
                }
                _ => {}
            }
        }
    }

    None
}

/// Parse a model answer, tolerating code fences and surrounding prose.
pub fn parse_triage_response(raw: &str) -> Option<TriageResponse> {
    let cleaned = strip_code_fences(raw);

    if let Ok(response) = serde_json::from_str(cleaned) {
        return Some(response);
    }

    extract_json_block(cleaned).and_then(|block| serde_json::from_str(block).ok())
}

/// Exponential backoff before retry number `retry` (starting at 1).
fn retry_delay(retry: u32) -> Duration {
    let factor = 2_u64.saturating_pow(retry.saturating_sub(1));
    Duration::from_millis(RETRY_DELAY_MS.saturating_mul(factor))
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::config::ConfigInner;

    #[test]
    fn test_retry_delay_backs_off_without_overflow() {
        assert_eq!(retry_delay(1), Duration::from_millis(600));
        assert_eq!(retry_delay(2), Duration::from_millis(1200));
        assert_eq!(retry_delay(3), Duration::from_millis(2400));
        assert_eq!(retry_delay(100), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```JSON {\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn test_extract_json_block() {
        assert_eq!(extract_json_block("Here you go: {\"a\": {\"b\": 1}} thanks"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_block("no json here"), None);
        assert_eq!(extract_json_block("{\"severity\":\"Moderate\""), None);
    }

    #[test]
    fn test_parse_full_response() {
        let raw = r#"{"severity":"Critical","summary":"Possible cardiac event.","advice":"Call emergency services.","red_flags":["Chest pain"],"differential":["MI"],"rationale":"Reported chest pain."}"#;
        let assessment: Assessment = parse_triage_response(raw).unwrap().into();

        assert_eq!(assessment.tier, SeverityTier::Severe);
        assert_eq!(assessment.reply, "Possible cardiac event.\n\nCall emergency services.");

        let details = assessment.details.unwrap();
        assert_eq!(details.red_flags, vec!["Chest pain".to_string()]);
        assert_eq!(details.differential, vec!["MI".to_string()]);
    }

    #[test]
    fn test_parse_fenced_partial_response_uses_defaults() {
        let raw = "```json\n{\"summary\":\"Viral infection.\",\"red_flags\":null}\n```";
        let assessment: Assessment = parse_triage_response(raw).unwrap().into();

        assert_eq!(assessment.tier, SeverityTier::Moderate);

        let details = assessment.details.unwrap();
        assert_eq!(details.summary, "Viral infection.");
        assert_eq!(details.advice, DEFAULT_ADVICE);
        assert!(details.red_flags.is_empty());
        assert_eq!(details.rationale, DEFAULT_RATIONALE);
    }

    #[test]
    fn test_parse_response_with_prose() {
        let raw = "Sure! {\"severity\":\"mild\",\"summary\":\"OK\",\"advice\":\"Hydrate\"} Hope that helps.";
        let assessment: Assessment = parse_triage_response(raw).unwrap().into();

        assert_eq!(assessment.tier, SeverityTier::Mild);
        assert_eq!(assessment.reply, "OK\n\nHydrate");
    }

    #[test]
    fn test_fallback_assessment() {
        let assessment = fallback_assessment("```json\n{\"severity\":\"Moderate\",\"summary\":\"X\"\n```");
        assert_eq!(assessment.tier, SeverityTier::Moderate);
        assert!(assessment.details.unwrap().summary.contains("\"summary\":\"X\""));

        let empty = fallback_assessment("   ");
        assert_eq!(empty.details.unwrap().summary, UNPARSEABLE_SUMMARY);
    }

    #[test]
    fn test_new_requires_api_key() {
        let config = Config::from(ConfigInner::default());

        assert!(OpenAiClassifier::new(&config).is_err());
    }

    #[test]
    fn test_models_order() {
        let config = Config::from(ConfigInner {
            openai_api_key: "sk-test".to_string(),
            openai_model: "primary".to_string(),
            openai_fallback_models: vec!["second".to_string(), "third".to_string()],
            ..Default::default()
        });
        let classifier = OpenAiClassifier::new(&config).unwrap();

        assert_eq!(classifier.models().collect::<Vec<_>>(), vec!["primary", "second", "third"]);
    }

    #[tokio::test]
    #[ignore = "requires OPENAI_API_KEY and network access"]
    async fn test_live_classification() {
        let config = Config::from(ConfigInner {
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: "gpt-4.1-mini".to_string(),
            openai_temperature: 0.0,
            openai_max_tokens: 400,
            openai_request_timeout_secs: 60,
            ..Default::default()
        });
        let classifier = Classifier::openai(&config).unwrap();

        let assessment = classifier.classify("Crushing chest pain spreading to my left arm.").await.unwrap();

        assert!(assessment.tier >= SeverityTier::Moderate);
        assert!(!assessment.reply.is_empty());
    }
}
