use std::env;

use thiserror::Error;

use crate::chat::ContextStyle;

const DEFAULT_POLICY_TEXT: &str = "You are a helpful assistant that answers questions about \
Transcranial Magnetic Stimulation (TMS) and nothing else. If a question is not about TMS, \
politely decline and steer the conversation back to TMS. Keep answers short, factual, and \
grounded in the provided context. Do not give medical advice; suggest consulting a clinician \
for personal treatment decisions.";

const DEFAULT_INITIAL_GREETING: &str =
    "Hi! I can answer questions about Transcranial Magnetic Stimulation (TMS). What would you \
like to know?";

const DEFAULT_INITIAL_FRAMING: &str =
    "I answer questions about TMS using the reference material provided and keep my answers \
brief.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingKey(&'static str),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_hostname: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub corpus_path: String,
    pub context_style: ContextStyle,
    pub policy_text: String,
    pub initial_greeting: String,
    pub initial_framing: String,
}

impl AppConfig {
    /// Loads configuration from the environment. Evaluated once at
    /// process start; a missing or invalid key aborts before any
    /// input is accepted.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key =
            env::var("TMSBOT_API_KEY").map_err(|_| ConfigError::MissingKey("TMSBOT_API_KEY"))?;
        let api_hostname = env::var("TMSBOT_API_HOSTNAME")
            .unwrap_or_else(|_| "https://api.groq.com/openai".to_string());
        let model =
            env::var("TMSBOT_MODEL").unwrap_or_else(|_| "llama-3.1-8b-instant".to_string());
        let corpus_path =
            env::var("TMSBOT_CORPUS_PATH").unwrap_or_else(|_| "./corpus.json".to_string());

        let temperature = match env::var("TMSBOT_TEMPERATURE") {
            Ok(raw) => Some(parse_temperature(&raw)?),
            Err(_) => None,
        };

        let context_style = match env::var("TMSBOT_CONTEXT_STYLE") {
            Ok(raw) => parse_context_style(&raw)?,
            Err(_) => ContextStyle::SeparateTurn,
        };

        let policy_text =
            env::var("TMSBOT_POLICY_TEXT").unwrap_or_else(|_| DEFAULT_POLICY_TEXT.to_string());
        let initial_greeting = env::var("TMSBOT_INITIAL_GREETING")
            .unwrap_or_else(|_| DEFAULT_INITIAL_GREETING.to_string());
        let initial_framing = env::var("TMSBOT_INITIAL_FRAMING")
            .unwrap_or_else(|_| DEFAULT_INITIAL_FRAMING.to_string());

        Ok(Self {
            api_hostname,
            api_key,
            model,
            temperature,
            corpus_path,
            context_style,
            policy_text,
            initial_greeting,
            initial_framing,
        })
    }
}

fn parse_temperature(raw: &str) -> Result<f64, ConfigError> {
    let value: f64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: "TMSBOT_TEMPERATURE",
        reason: format!("not a number: {}", raw),
    })?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            key: "TMSBOT_TEMPERATURE",
            reason: format!("must be in [0, 1], got {}", value),
        });
    }
    Ok(value)
}

fn parse_context_style(raw: &str) -> Result<ContextStyle, ConfigError> {
    match raw {
        "separate-turn" => Ok(ContextStyle::SeparateTurn),
        "inline-suffix" => Ok(ContextStyle::InlineSuffix),
        other => Err(ConfigError::InvalidValue {
            key: "TMSBOT_CONTEXT_STYLE",
            reason: format!("expected separate-turn or inline-suffix, got {}", other),
        }),
    }
}
