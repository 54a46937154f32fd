//! Configuration loading and validation.
//!
//! Values come from an optional TOML file with environment-variable
//! fallbacks for secrets (`QUIPBOT_DISCORD_TOKEN`, `QUIPBOT_API_KEY`, ...).
//! The system prompt and word list live in separate plain-text files so the
//! persona can be edited without touching the config.

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

/// Default model when none is configured. Groq-hosted.
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Default OpenAI-compatible endpoint base.
const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Quipbot configuration, fully resolved and validated.
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token.
    pub discord_token: String,

    /// Bind address for the liveness HTTP server, if enabled.
    pub health_addr: Option<SocketAddr>,

    /// Persona: system prompt, interjection word list, filler text.
    pub persona: PersonaConfig,

    /// Completion endpoint configuration.
    pub llm: LlmConfig,

    /// Chat behavior settings.
    pub chat: ChatConfig,
}

/// Persona configuration.
#[derive(Debug, Clone)]
pub struct PersonaConfig {
    /// System prompt text. Immutable for the process lifetime.
    pub system_prompt: String,

    /// Lines for the ambient random interjection. Empty disables the feature.
    pub interjections: Vec<String>,

    /// Substitute text when a mention-only message normalizes to empty.
    pub filler_text: String,
}

/// Completion endpoint configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,

    /// API keys in escalation order. The first is the primary; the rest are
    /// fallbacks tried when the primary fails.
    pub api_keys: Vec<String>,

    /// Model identifiers in escalation order within one credential.
    pub models: Vec<String>,

    /// Output token budget per completion.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Nucleus sampling threshold.
    pub top_p: f32,

    /// Per-attempt request timeout. A timeout counts as a failed attempt.
    pub request_timeout_secs: u64,
}

/// Chat behavior configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Maximum retained turns per conversation.
    pub max_history: usize,

    /// Command marker character (e.g. `!`).
    pub command_marker: char,

    /// Known command names the detector recognizes.
    pub command_names: Vec<String>,

    /// Interjection probability denominator: fires 1 in this many messages.
    pub interject_odds: u32,

    /// Role granted/revoked by the assign/removerole commands.
    pub role_name: String,
}

// Raw (file-level) shapes. Everything optional; resolution applies env
// fallbacks and defaults.

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    discord_token: Option<String>,
    health_addr: Option<String>,
    #[serde(default)]
    persona: RawPersona,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    chat: RawChat,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPersona {
    system_prompt_file: Option<String>,
    words_file: Option<String>,
    filler_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLlm {
    base_url: Option<String>,
    api_keys: Option<Vec<String>>,
    models: Option<Vec<String>>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawChat {
    max_history: Option<usize>,
    command_marker: Option<char>,
    commands: Option<Vec<String>>,
    interject_odds: Option<u32>,
    role_name: Option<String>,
}

impl Config {
    /// Load configuration from environment variables and default file paths.
    pub fn load() -> Result<Self> {
        Self::from_raw(RawConfig::default())
    }

    /// Load from a TOML config file, with env fallbacks for anything unset.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Load {
            path: path.display().to_string(),
            source: Arc::new(source),
        })?;
        let raw: RawConfig = toml::from_str(&text)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let discord_token = raw
            .discord_token
            .or_else(|| env_var("QUIPBOT_DISCORD_TOKEN"))
            .or_else(|| env_var("DISCORD_TOKEN"))
            .ok_or_else(|| ConfigError::MissingKey("discord_token".into()))?;

        let health_addr = raw
            .health_addr
            .or_else(|| env_var("QUIPBOT_HEALTH_ADDR"))
            .map(|addr| {
                addr.parse::<SocketAddr>()
                    .map_err(|e| ConfigError::Invalid(format!("health_addr {addr:?}: {e}")))
            })
            .transpose()?;

        let persona = Self::resolve_persona(raw.persona)?;
        let llm = Self::resolve_llm(raw.llm)?;
        let chat = Self::resolve_chat(raw.chat)?;

        Ok(Self {
            discord_token,
            health_addr,
            persona,
            llm,
            chat,
        })
    }

    fn resolve_persona(raw: RawPersona) -> Result<PersonaConfig> {
        let prompt_path = raw
            .system_prompt_file
            .or_else(|| env_var("QUIPBOT_SYSTEM_PROMPT_FILE"))
            .unwrap_or_else(|| "system_prompt.txt".into());

        let system_prompt = std::fs::read_to_string(&prompt_path)
            .map(|text| text.trim().to_string())
            .map_err(|source| ConfigError::Load {
                path: prompt_path.clone(),
                source: Arc::new(source),
            })?;

        if system_prompt.is_empty() {
            return Err(ConfigError::Invalid(format!("system prompt file {prompt_path} is empty")).into());
        }

        tracing::info!(
            path = %prompt_path,
            chars = system_prompt.chars().count(),
            "system prompt loaded"
        );

        let words_path = raw
            .words_file
            .or_else(|| env_var("QUIPBOT_WORDS_FILE"))
            .unwrap_or_else(|| "random_words.txt".into());

        let interjections = match std::fs::read_to_string(&words_path) {
            Ok(text) => {
                let words: Vec<String> = text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect();
                tracing::info!(path = %words_path, words = words.len(), "word list loaded");
                words
            }
            Err(error) => {
                tracing::warn!(path = %words_path, %error, "word list not found, random interjection disabled");
                Vec::new()
            }
        };

        Ok(PersonaConfig {
            system_prompt,
            interjections,
            filler_text: raw.filler_text.unwrap_or_else(|| "hey".into()),
        })
    }

    fn resolve_llm(raw: RawLlm) -> Result<LlmConfig> {
        let api_keys = match raw.api_keys {
            Some(keys) if !keys.is_empty() => keys,
            _ => {
                let mut keys = Vec::new();
                if let Some(primary) = env_var("QUIPBOT_API_KEY") {
                    keys.push(primary);
                }
                if let Some(fallback) = env_var("QUIPBOT_FALLBACK_API_KEY") {
                    keys.push(fallback);
                }
                keys
            }
        };

        if api_keys.is_empty() {
            return Err(ConfigError::MissingKey("llm.api_keys".into()).into());
        }
        if api_keys.len() == 1 {
            tracing::warn!("no fallback API key configured, no failover if the primary key fails");
        }

        let models = match raw.models {
            Some(models) if !models.is_empty() => models,
            _ => {
                let mut models = Vec::new();
                if let Some(primary) = env_var("QUIPBOT_MODEL") {
                    models.push(primary);
                }
                if let Some(fallback) = env_var("QUIPBOT_FALLBACK_MODEL") {
                    models.push(fallback);
                }
                if models.is_empty() {
                    models.push(DEFAULT_MODEL.into());
                }
                models
            }
        };

        Ok(LlmConfig {
            base_url: raw.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            api_keys,
            models,
            max_tokens: raw.max_tokens.unwrap_or(600),
            temperature: raw.temperature.unwrap_or(0.8),
            top_p: raw.top_p.unwrap_or(0.9),
            request_timeout_secs: raw.request_timeout_secs.unwrap_or(30),
        })
    }

    fn resolve_chat(raw: RawChat) -> Result<ChatConfig> {
        let max_history = raw.max_history.unwrap_or(12);
        if max_history < 2 {
            return Err(ConfigError::Invalid(format!(
                "chat.max_history must hold at least one exchange, got {max_history}"
            ))
            .into());
        }

        let interject_odds = raw.interject_odds.unwrap_or(50);
        if interject_odds == 0 {
            return Err(ConfigError::Invalid(
                "chat.interject_odds must be at least 1 (use an empty word list to disable)".into(),
            )
            .into());
        }

        let command_names = raw.commands.unwrap_or_else(|| {
            vec!["forget".into(), "assign".into(), "removerole".into()]
        });

        Ok(ChatConfig {
            max_history,
            command_marker: raw.command_marker.unwrap_or('!'),
            command_names,
            interject_odds,
            role_name: raw.role_name.unwrap_or_else(|| "agartha".into()),
        })
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::{formatdoc, indoc};
    use std::io::Write as _;

    fn prompt_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write");
        file
    }

    fn raw_from_toml(text: &str) -> RawConfig {
        toml::from_str(text).expect("valid toml")
    }

    #[test]
    fn full_toml_round_trips_into_config() {
        let prompt = prompt_file("you are a helpful gremlin\n");
        let words = prompt_file("aura\nrizz\n\n  fr  \n");

        let toml_text = formatdoc! {r#"
                discord_token = "token-123"
                health_addr = "127.0.0.1:5000"

                [persona]
                system_prompt_file = "{prompt}"
                words_file = "{words}"
                filler_text = "yo"

                [llm]
                api_keys = ["primary-key", "backup-key"]
                models = ["llama-3.3-70b-versatile", "llama-3.1-8b-instant"]
                max_tokens = 400

                [chat]
                max_history = 8
                interject_odds = 20
                role_name = "wizards"
            "#,
            prompt = prompt.path().display(),
            words = words.path().display(),
        };

        let config = Config::from_raw(raw_from_toml(&toml_text)).expect("config resolves");

        assert_eq!(config.discord_token, "token-123");
        assert_eq!(config.health_addr, Some("127.0.0.1:5000".parse().unwrap()));
        assert_eq!(config.persona.system_prompt, "you are a helpful gremlin");
        assert_eq!(config.persona.interjections, vec!["aura", "rizz", "fr"]);
        assert_eq!(config.persona.filler_text, "yo");
        assert_eq!(config.llm.api_keys.len(), 2);
        assert_eq!(config.llm.max_tokens, 400);
        assert_eq!(config.llm.temperature, 0.8);
        assert_eq!(config.chat.max_history, 8);
        assert_eq!(config.chat.interject_odds, 20);
        assert_eq!(config.chat.role_name, "wizards");
        assert_eq!(config.chat.command_marker, '!');
        assert_eq!(
            config.chat.command_names,
            vec!["forget", "assign", "removerole"]
        );
    }

    #[test]
    fn missing_system_prompt_file_is_fatal() {
        let toml_text = indoc! {r#"
            discord_token = "token"

            [persona]
            system_prompt_file = "/nonexistent/prompt.txt"

            [llm]
            api_keys = ["key"]
        "#};

        let error = Config::from_raw(raw_from_toml(toml_text)).expect_err("must fail");
        assert!(error.to_string().contains("/nonexistent/prompt.txt"));
    }

    #[test]
    fn empty_system_prompt_is_fatal() {
        let prompt = prompt_file("   \n");
        let toml_text = formatdoc! {r#"
                discord_token = "token"

                [persona]
                system_prompt_file = "{prompt}"

                [llm]
                api_keys = ["key"]
            "#,
            prompt = prompt.path().display(),
        };

        let error = Config::from_raw(raw_from_toml(&toml_text)).expect_err("must fail");
        assert!(error.to_string().contains("empty"));
    }

    #[test]
    fn missing_word_list_disables_interjection_without_failing() {
        let prompt = prompt_file("persona");
        let toml_text = formatdoc! {r#"
                discord_token = "token"

                [persona]
                system_prompt_file = "{prompt}"
                words_file = "/nonexistent/words.txt"

                [llm]
                api_keys = ["key"]
            "#,
            prompt = prompt.path().display(),
        };

        let config = Config::from_raw(raw_from_toml(&toml_text)).expect("config resolves");
        assert!(config.persona.interjections.is_empty());
    }

    #[test]
    fn default_model_applies_when_none_configured() {
        let prompt = prompt_file("persona");
        let toml_text = formatdoc! {r#"
                discord_token = "token"

                [persona]
                system_prompt_file = "{prompt}"

                [llm]
                api_keys = ["key"]
            "#,
            prompt = prompt.path().display(),
        };

        let config = Config::from_raw(raw_from_toml(&toml_text)).expect("config resolves");
        assert_eq!(config.llm.models, vec![DEFAULT_MODEL]);
        assert_eq!(config.llm.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn zero_interject_odds_is_rejected() {
        let prompt = prompt_file("persona");
        let toml_text = formatdoc! {r#"
                discord_token = "token"

                [persona]
                system_prompt_file = "{prompt}"

                [llm]
                api_keys = ["key"]

                [chat]
                interject_odds = 0
            "#,
            prompt = prompt.path().display(),
        };

        let error = Config::from_raw(raw_from_toml(&toml_text)).expect_err("must fail");
        assert!(error.to_string().contains("interject_odds"));
    }

    #[test]
    fn tiny_max_history_is_rejected() {
        let prompt = prompt_file("persona");
        let toml_text = formatdoc! {r#"
                discord_token = "token"

                [persona]
                system_prompt_file = "{prompt}"

                [llm]
                api_keys = ["key"]

                [chat]
                max_history = 1
            "#,
            prompt = prompt.path().display(),
        };

        let error = Config::from_raw(raw_from_toml(&toml_text)).expect_err("must fail");
        assert!(error.to_string().contains("max_history"));
    }

    #[test]
    fn unknown_toml_keys_are_rejected() {
        let result: std::result::Result<RawConfig, _> = toml::from_str(indoc! {r#"
            discord_token = "token"
            surprise = true
        "#});
        assert!(result.is_err());
    }
}
