//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc, time::Duration};

use serde::Deserialize;

use super::types::{PatientContext, Res, Void};

/// Default simulated delay for the keyword classifier, in milliseconds.
fn default_reply_delay_ms() -> u64 {
    1500
}

/// Default upper bound on a single classification, in seconds.
fn default_classification_timeout_secs() -> u64 {
    30
}

/// Default OpenAI model to use.
fn default_openai_model() -> String {
    "gpt-4.1-mini".to_string()
}

/// Default sampling temperature for the OpenAI model.
fn default_openai_temperature() -> f32 {
    0.2
}

/// Default max output tokens for the OpenAI model.
fn default_openai_max_tokens() -> u32 {
    1024
}

/// Default per-request timeout for the OpenAI API, in seconds.
fn default_openai_request_timeout_secs() -> u64 {
    20
}

/// Default number of retries for the OpenAI API.
fn default_openai_max_retries() -> u32 {
    1
}

/// Upper bound on `openai_max_retries`.
pub const MAX_OPENAI_RETRIES: u32 = 10;

/// The `CARELINK_*` environment source.
///
/// Nested keys use `__` (`CARELINK_PATIENT__AGE`), and
/// `CARELINK_OPENAI_FALLBACK_MODELS` takes a comma-separated list.
pub fn environment() -> config::Environment {
    config::Environment::default()
        .prefix("CARELINK")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("openai_fallback_models")
}

/// Which classification backend a session uses.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// Substring matcher with canned replies.
    #[default]
    Keyword,
    /// OpenAI chat completions.
    OpenAi,
}

/// Configuration for the triage application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// Classification backend (`CLASSIFIER`): `keyword` or `openai`.
    #[serde(default)]
    pub classifier: ClassifierKind,
    /// Simulated latency of the keyword classifier (`REPLY_DELAY_MS`).
    #[serde(default = "default_reply_delay_ms")]
    pub reply_delay_ms: u64,
    /// Upper bound on one classification before it counts as failed (`CLASSIFICATION_TIMEOUT_SECS`).
    #[serde(default = "default_classification_timeout_secs")]
    pub classification_timeout_secs: u64,
    /// OpenAI API key (`OPENAI_API_KEY`); required for the `openai` classifier.
    #[serde(default)]
    pub openai_api_key: String,
    /// OpenAI model to use (`OPENAI_MODEL`).
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    /// Models tried in order when the primary model fails.
    #[serde(default)]
    pub openai_fallback_models: Vec<String>,
    /// Sampling temperature to use for the OpenAI model (`OPENAI_TEMPERATURE`).
    /// Value between 0 and 2.
    #[serde(default = "default_openai_temperature")]
    pub openai_temperature: f32,
    /// Max output tokens for the OpenAI model (`OPENAI_MAX_TOKENS`).
    #[serde(default = "default_openai_max_tokens")]
    pub openai_max_tokens: u32,
    /// Per-request timeout for the OpenAI API (`OPENAI_REQUEST_TIMEOUT_SECS`).
    #[serde(default = "default_openai_request_timeout_secs")]
    pub openai_request_timeout_secs: u64,
    /// Retries after a failed or timed out OpenAI request (`OPENAI_MAX_RETRIES`).
    #[serde(default = "default_openai_max_retries")]
    pub openai_max_retries: u32,
    /// Patient facts forwarded to model-backed classifiers (`PATIENT__AGE`, ...).
    #[serde(default)]
    pub patient: PatientContext,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            classifier: ClassifierKind::default(),
            reply_delay_ms: default_reply_delay_ms(),
            classification_timeout_secs: default_classification_timeout_secs(),
            openai_api_key: String::new(),
            openai_model: default_openai_model(),
            openai_fallback_models: Vec::new(),
            openai_temperature: default_openai_temperature(),
            openai_max_tokens: default_openai_max_tokens(),
            openai_request_timeout_secs: default_openai_request_timeout_secs(),
            openai_max_retries: default_openai_max_retries(),
            patient: PatientContext::default(),
        }
    }
}

impl ConfigInner {
    /// Simulated latency of the keyword classifier.
    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }

    /// Upper bound on one classification.
    pub fn classification_timeout(&self) -> Duration {
        Duration::from_secs(self.classification_timeout_secs)
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        Self::load_with(explicit_path, environment())
    }

    /// Load from `explicit_path` (or `.hidden/config.toml`) plus the given environment source.
    pub fn load_with(explicit_path: Option<&std::path::Path>, env: config::Environment) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(env);

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let result = Config {
            inner: Arc::new(cfg.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    /// Check value ranges and backend requirements.
    pub fn validate(&self) -> Void {
        if self.classification_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Classification timeout must be at least one second."));
        }

        if self.openai_temperature < 0.0 || self.openai_temperature > 2.0 {
            return Err(anyhow::anyhow!("OpenAI temperature must be between 0 and 2."));
        }

        if self.openai_max_tokens < 1 || self.openai_max_tokens > 128000 {
            return Err(anyhow::anyhow!("OpenAI max tokens must be between 1 and 128000."));
        }

        if self.openai_max_retries > MAX_OPENAI_RETRIES {
            return Err(anyhow::anyhow!("OpenAI max retries must be at most {MAX_OPENAI_RETRIES}."));
        }

        if self.openai_request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("OpenAI request timeout must be at least one second."));
        }

        if self.classifier == ClassifierKind::OpenAi && self.openai_api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("The `openai` classifier requires `openai_api_key`."));
        }

        Ok(())
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("carelink-{}-{name}.toml", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_defaults() {
        let path = write_config("defaults", "");
        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.classifier, ClassifierKind::Keyword);
        assert_eq!(config.reply_delay(), Duration::from_millis(1500));
        assert_eq!(config.classification_timeout(), Duration::from_secs(30));
        assert_eq!(config.openai_model, "gpt-4.1-mini");
        assert!(config.openai_fallback_models.is_empty());
        assert_eq!(config.patient, PatientContext::default());
    }

    #[test]
    fn test_load_file_values() {
        let path = write_config(
            "values",
            r#"
classifier = "openai"
openai_api_key = "sk-test"
openai_fallback_models = ["gpt-4.1-nano"]
reply_delay_ms = 10

[patient]
age = 44
allergies = "NSAIDs"
"#,
        );
        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.classifier, ClassifierKind::OpenAi);
        assert_eq!(config.openai_fallback_models, vec!["gpt-4.1-nano".to_string()]);
        assert_eq!(config.reply_delay_ms, 10);
        assert_eq!(config.patient.age, Some(44));
        assert_eq!(config.patient.allergies.as_deref(), Some("NSAIDs"));
    }

    #[test]
    fn test_openai_requires_api_key() {
        let path = write_config("nokey", "classifier = \"openai\"\n");

        assert!(Config::load(Some(&path)).is_err());
    }

    fn env_with(vars: &[(&str, &str)]) -> config::Environment {
        let vars = vars.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect::<config::Map<String, String>>();

        environment().source(Some(vars))
    }

    #[test]
    fn test_default_matches_serde_defaults() {
        let path = write_config("serde-defaults", "");
        let loaded = Config::load_with(Some(&path), env_with(&[])).unwrap();
        let built = Config::from(ConfigInner::default());

        assert_eq!(built.reply_delay_ms, loaded.reply_delay_ms);
        assert_eq!(built.classification_timeout_secs, loaded.classification_timeout_secs);
        assert_eq!(built.openai_model, loaded.openai_model);
        assert_eq!(built.openai_max_tokens, loaded.openai_max_tokens);
        assert_eq!(built.openai_request_timeout_secs, loaded.openai_request_timeout_secs);
        assert_eq!(built.openai_max_retries, loaded.openai_max_retries);
        assert!(built.validate().is_ok());
    }

    #[test]
    fn test_load_env_values() {
        let path = write_config("env", "");
        let env = env_with(&[
            ("CARELINK_PATIENT__AGE", "44"),
            ("CARELINK_REPLY_DELAY_MS", "250"),
            ("CARELINK_OPENAI_FALLBACK_MODELS", "gpt-4.1-nano,gpt-4o-mini"),
        ]);
        let config = Config::load_with(Some(&path), env).unwrap();

        assert_eq!(config.patient.age, Some(44));
        assert_eq!(config.reply_delay_ms, 250);
        assert_eq!(config.openai_fallback_models, vec!["gpt-4.1-nano".to_string(), "gpt-4o-mini".to_string()]);
    }

    #[test]
    fn test_validate_ranges() {
        let base = ConfigInner::default();

        assert!(Config::from(base.clone()).validate().is_ok());

        let hot = ConfigInner { openai_temperature: 2.5, ..base.clone() };
        assert!(Config::from(hot).validate().is_err());

        let no_timeout = ConfigInner { classification_timeout_secs: 0, ..base.clone() };
        assert!(Config::from(no_timeout).validate().is_err());

        let max_retries = ConfigInner { openai_max_retries: MAX_OPENAI_RETRIES, ..base.clone() };
        assert!(Config::from(max_retries).validate().is_ok());

        let endless = ConfigInner { openai_max_retries: 100, ..base };
        assert!(Config::from(endless).validate().is_err());
    }
}
