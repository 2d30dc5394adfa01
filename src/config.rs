use crate::ingest::AcceptProfile;
use crate::llm::{
    ContextPolicy, DEFAULT_BASE_URL, DEFAULT_MODEL, FullHistory, GeminiSettings, RecentTurns,
};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable holding the Gemini API key.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Accepted document types (`excel` or `documents`)
    #[arg(long, env = "DOCCHAT_PROFILE")]
    pub profile: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub chat: ChatConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    pub profile: AcceptProfile,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub base_url: String,
    /// Resend only this many prior turns; unset resends the whole transcript.
    #[serde(default)]
    pub history_turns: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
}

impl SessionConfig {
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl ChatConfig {
    /// History selection for outgoing requests.
    #[must_use]
    pub fn context_policy(&self) -> Arc<dyn ContextPolicy> {
        match self.history_turns {
            Some(n) => Arc::new(RecentTurns(n)),
            None => Arc::new(FullHistory),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 8501)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.max_upload_bytes", 200 * 1024 * 1024)?
            .set_default("ingest.profile", "documents")?
            .set_default("chat.model", DEFAULT_MODEL)?
            .set_default("chat.base_url", DEFAULT_BASE_URL)?
            .set_default("session.idle_timeout_secs", 1800)?;

        // 2. Config file: explicit path must exist, ./config.* is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 3. Environment variables, e.g. DOCCHAT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("DOCCHAT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their env fallbacks) win
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(profile) = cli.profile {
            builder = builder.set_override("ingest.profile", profile.to_lowercase())?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

/// Gemini connection settings: the key from the environment, the rest from config.
pub fn load_gemini_settings(chat: &ChatConfig) -> Result<GeminiSettings, String> {
    let api_key = std::env::var(API_KEY_VAR)
        .map_err(|e| format!("Missing required env var {API_KEY_VAR}: {e}"))?;
    if api_key.trim().is_empty() {
        return Err(format!("{API_KEY_VAR} cannot be empty"));
    }

    if chat.model.trim().is_empty() {
        return Err("chat.model cannot be empty".to_string());
    }
    url::Url::parse(&chat.base_url)
        .map_err(|e| format!("chat.base_url is not a valid URL: {e}"))?;

    Ok(GeminiSettings {
        base_url: chat.base_url.clone(),
        api_key,
        model: chat.model.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(history_turns: Option<usize>) -> ChatConfig {
        ChatConfig {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            history_turns,
        }
    }

    #[test]
    fn test_context_policy_from_history_turns() {
        assert_eq!(chat(None).context_policy().name(), "full");
        assert_eq!(chat(Some(6)).context_policy().name(), "recent");
    }

    #[test]
    fn test_unknown_cli_flag_is_an_error() {
        let err = AppConfig::load_from_args(["docchat", "--bogus"]).unwrap_err();
        assert!(err.to_string().contains("--bogus"));
    }
}
