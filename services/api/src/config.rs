use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which implementations back the generation capabilities.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CapabilityMode {
    /// Real OpenAI-backed clients (plus the video endpoint when a key is
    /// configured).
    OpenAi,
    /// Deterministic in-process mocks; no network, no keys.
    Mock,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub capability_mode: CapabilityMode,
    pub openai_api_key: Option<String>,
    pub runway_api_key: Option<String>,
    pub chat_model: String,
    pub image_model: String,
    pub tts_model: String,
    pub transcription_model: String,
    pub media_dir: PathBuf,
    /// Bypass the onboarding Q&A with a fixed preset profile.
    pub onboarding_preset: bool,
    /// Hard cap on onboarding questions before the flow gives up.
    pub onboarding_question_cap: u32,
    /// Re-check interval for the agent-side wait on user replies.
    pub channel_poll_interval: Duration,
    /// Attach storyboard images to interactive story turns.
    pub illustrate_story: bool,
    pub log_level: Level,
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let mode_str = std::env::var("CAPABILITY_MODE").unwrap_or_else(|_| "openai".to_string());
        let capability_mode = match mode_str.to_lowercase().as_str() {
            "mock" => CapabilityMode::Mock,
            _ => CapabilityMode::OpenAi,
        };

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let runway_api_key = std::env::var("RUNWAY_API_KEY").ok();

        if capability_mode == CapabilityMode::OpenAi && openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for 'openai' capabilities".to_string(),
            ));
        }

        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());
        let image_model =
            std::env::var("IMAGE_MODEL").unwrap_or_else(|_| "gpt-image-1".to_string());
        let tts_model =
            std::env::var("TTS_MODEL").unwrap_or_else(|_| "gpt-4o-mini-tts".to_string());
        let transcription_model =
            std::env::var("TRANSCRIPTION_MODEL").unwrap_or_else(|_| "whisper-1".to_string());

        let media_dir = std::env::var("MEDIA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./generated_media"));

        let onboarding_preset = env_bool("ONBOARDING_PRESET", false);
        let illustrate_story = env_bool("ILLUSTRATE_STORY", true);

        let onboarding_question_cap = match std::env::var("ONBOARDING_QUESTION_CAP") {
            Ok(value) => value.parse::<u32>().map_err(|_| {
                ConfigError::InvalidValue(
                    "ONBOARDING_QUESTION_CAP".to_string(),
                    format!("'{value}' is not a number"),
                )
            })?,
            Err(_) => 20,
        };

        let channel_poll_interval = match std::env::var("CHANNEL_POLL_MS") {
            Ok(value) => {
                let ms = value.parse::<u64>().map_err(|_| {
                    ConfigError::InvalidValue(
                        "CHANNEL_POLL_MS".to_string(),
                        format!("'{value}' is not a number"),
                    )
                })?;
                Duration::from_millis(ms)
            }
            Err(_) => Duration::from_secs(1),
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            capability_mode,
            openai_api_key,
            runway_api_key,
            chat_model,
            image_model,
            tts_model,
            transcription_model,
            media_dir,
            onboarding_preset,
            onboarding_question_cap,
            channel_poll_interval,
            illustrate_story,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("CAPABILITY_MODE");
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("RUNWAY_API_KEY");
            env::remove_var("CHAT_MODEL");
            env::remove_var("IMAGE_MODEL");
            env::remove_var("TTS_MODEL");
            env::remove_var("TRANSCRIPTION_MODEL");
            env::remove_var("MEDIA_DIR");
            env::remove_var("ONBOARDING_PRESET");
            env::remove_var("ONBOARDING_QUESTION_CAP");
            env::remove_var("CHANNEL_POLL_MS");
            env::remove_var("ILLUSTRATE_STORY");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    #[serial]
    fn minimal_openai_config_applies_defaults() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-key");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8000");
        assert_eq!(config.capability_mode, CapabilityMode::OpenAi);
        assert_eq!(config.openai_api_key, Some("test-key".to_string()));
        assert_eq!(config.chat_model, "gpt-4.1-mini");
        assert_eq!(config.image_model, "gpt-image-1");
        assert_eq!(config.onboarding_question_cap, 20);
        assert_eq!(config.channel_poll_interval, Duration::from_secs(1));
        assert!(!config.onboarding_preset);
        assert!(config.illustrate_story);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn mock_mode_needs_no_api_key() {
        clear_env_vars();
        unsafe {
            env::set_var("CAPABILITY_MODE", "mock");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.capability_mode, CapabilityMode::Mock);
        assert_eq!(config.openai_api_key, None);
    }

    #[test]
    #[serial]
    fn openai_mode_without_a_key_fails() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(msg) => assert!(msg.contains("OPENAI_API_KEY")),
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn custom_values_override_defaults() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:9999");
            env::set_var("CAPABILITY_MODE", "mock");
            env::set_var("CHAT_MODEL", "gpt-4o");
            env::set_var("MEDIA_DIR", "/tmp/media");
            env::set_var("ONBOARDING_PRESET", "true");
            env::set_var("ONBOARDING_QUESTION_CAP", "5");
            env::set_var("CHANNEL_POLL_MS", "250");
            env::set_var("ILLUSTRATE_STORY", "0");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:9999");
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.media_dir, PathBuf::from("/tmp/media"));
        assert!(config.onboarding_preset);
        assert_eq!(config.onboarding_question_cap, 5);
        assert_eq!(config.channel_poll_interval, Duration::from_millis(250));
        assert!(!config.illustrate_story);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn invalid_bind_address_is_rejected() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-an-address");
            env::set_var("CAPABILITY_MODE", "mock");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn invalid_question_cap_is_rejected() {
        clear_env_vars();
        unsafe {
            env::set_var("CAPABILITY_MODE", "mock");
            env::set_var("ONBOARDING_QUESTION_CAP", "lots");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "ONBOARDING_QUESTION_CAP"),
            _ => panic!("Expected InvalidValue for ONBOARDING_QUESTION_CAP"),
        }
    }
}
