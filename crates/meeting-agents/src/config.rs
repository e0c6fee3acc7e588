use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use coordination::{MeetingConfig, PromptTemplates, RetryPolicy};
use serde::Deserialize;

/// Wire dialect of the chat completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
pub enum ApiStyle {
    /// `POST {url}/chat/completions` with a bearer token and a `model` field.
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,
    /// `POST {url}/openai/deployments/{model}/chat/completions?api-version=...`
    /// with an `api-key` header.
    #[serde(rename = "azure")]
    #[value(name = "azure")]
    Azure,
}

impl std::str::FromStr for ApiStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure" => Ok(Self::Azure),
            other => Err(format!("unknown API style {other:?} (expected openai or azure)")),
        }
    }
}

/// Chat completions endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmEndpoint {
    pub url: String,
    /// Model name, or the deployment name for Azure.
    pub model: String,
    pub api_key: Option<String>,
    pub api_style: ApiStyle,
    /// Required by Azure; ignored otherwise.
    pub api_version: String,
    /// Remove `<think>...</think>` blocks from completions.
    pub strip_reasoning: bool,
}

impl Default for LlmEndpoint {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/v1".into(),
            model: "gpt-4o".into(),
            api_key: None,
            api_style: ApiStyle::OpenAi,
            api_version: "2024-06-01".into(),
            strip_reasoning: true,
        }
    }
}

/// Retry settings in TOML-friendly units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_secs: f64,
    pub max_backoff_secs: f64,
    /// Zero disables the per-call timeout.
    pub call_timeout_secs: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay_secs: 3.0,
            max_backoff_secs: 60.0,
            call_timeout_secs: 120.0,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        let secs = |s: f64| Duration::from_secs_f64(s.max(0.0));
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: secs(self.base_delay_secs),
            max_backoff: secs(self.max_backoff_secs),
            call_timeout: (self.call_timeout_secs > 0.0).then(|| secs(self.call_timeout_secs)),
        }
    }
}

/// Top-level application configuration.
///
/// Loaded from an optional TOML file, then overridden by `MEETING_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub endpoint: LlmEndpoint,
    pub retry: RetrySettings,
    pub meeting: MeetingConfig,
    /// TOML file with prompt templates; built-in templates when unset.
    pub templates_path: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: LlmEndpoint::default(),
            retry: RetrySettings::default(),
            meeting: MeetingConfig::default(),
            templates_path: None,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl AppConfig {
    /// Load from `path` (if any), apply process env overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.meeting.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `MEETING_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("MEETING_LLM_URL") {
            self.endpoint.url = url;
        }
        if let Some(model) = lookup("MEETING_LLM_MODEL") {
            self.endpoint.model = model;
        }
        if let Some(key) = lookup("MEETING_LLM_API_KEY") {
            self.endpoint.api_key = Some(key);
        }
        if let Some(style) = lookup("MEETING_LLM_API_STYLE") {
            self.endpoint.api_style = style
                .parse()
                .map_err(|e: String| anyhow::anyhow!("MEETING_LLM_API_STYLE: {e}"))?;
        }
        if let Some(version) = lookup("MEETING_LLM_API_VERSION") {
            self.endpoint.api_version = version;
        }
        if let Some(dir) = lookup("MEETING_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn templates(&self) -> Result<PromptTemplates> {
        match &self.templates_path {
            Some(path) => PromptTemplates::from_file(path)
                .with_context(|| format!("Failed to load templates {}", path.display())),
            None => Ok(PromptTemplates::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.endpoint.api_style, ApiStyle::OpenAi);
        let policy = config.retry.to_policy();
        assert_eq!(policy.max_attempts, 6);
        assert_eq!(policy.base_delay, Duration::from_secs(3));
        assert_eq!(policy.max_backoff, Duration::from_secs(60));
        assert_eq!(policy.call_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_toml_sections() {
        let config = AppConfig::from_toml_str(
            r#"
            output_dir = "runs"

            [endpoint]
            url = "https://example.openai.azure.com"
            model = "gpt4-deploy"
            api_style = "azure"

            [retry]
            call_timeout_secs = 0

            [meeting]
            language = "German"

            [meeting.discussion]
            soft_max_turns = 10
            hard_max_turns = 12
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint.api_style, ApiStyle::Azure);
        assert_eq!(config.endpoint.api_version, "2024-06-01");
        assert_eq!(config.retry.to_policy().call_timeout, None);
        assert_eq!(config.meeting.language, "German");
        assert_eq!(config.meeting.discussion.hard_max_turns, 12);
        assert_eq!(config.meeting.discussion.extension, 10);
        assert_eq!(config.output_dir, PathBuf::from("runs"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MEETING_LLM_URL", "http://gpu-01:8000/v1"),
            ("MEETING_LLM_MODEL", "qwen"),
            ("MEETING_LLM_API_KEY", "secret"),
            ("MEETING_LLM_API_STYLE", "Azure"),
            ("MEETING_OUTPUT_DIR", "/tmp/meetings"),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.endpoint.url, "http://gpu-01:8000/v1");
        assert_eq!(config.endpoint.model, "qwen");
        assert_eq!(config.endpoint.api_key.as_deref(), Some("secret"));
        assert_eq!(config.endpoint.api_style, ApiStyle::Azure);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/meetings"));
    }

    #[test]
    fn test_bad_api_style_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|k| (k == "MEETING_LLM_API_STYLE").then(|| "bedrock".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("bedrock"));
    }
}
