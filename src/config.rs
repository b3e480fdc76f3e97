//! # Configuration Management
//!
//! Loads and validates application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Special-cased environment variables (OPENAI_API_KEY, HOST, PORT)
//! 2. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! The agent API key is the one piece of required configuration. Validation
//! runs before the server binds, so a missing credential fails fast instead
//! of surfacing mid-call. Audio parameters are fixed at load time; a live
//! call snapshots them at construction and never renegotiates.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub audio: AudioConfig,
    pub tools: ToolsConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Voice-agent session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Credential for the realtime service. Required; normally supplied via
    /// the OPENAI_API_KEY environment variable (a .env file works too).
    pub api_key: String,

    /// Realtime service WebSocket endpoint
    pub realtime_url: String,

    /// Model negotiated for the session
    pub model: String,

    /// Voice used for agent speech
    pub voice: String,

    /// System instructions for the phone persona
    pub instructions: String,
}

/// Audio stream parameters for the telephony leg.
///
/// ## Fields:
/// - `sample_rate`: samples per second; telephony µ-law runs at 8000 Hz
/// - `chunk_duration_s`: target duration of one forwarded chunk (seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub chunk_duration_s: f64,
}

/// Paths used by the tool dispatch surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Notes document the append tool writes to
    pub document_path: String,

    /// SQLite database the feedback tool inserts into
    pub feedback_db: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            agent: AgentConfig {
                api_key: String::new(), // must come from the environment
                realtime_url: "wss://api.openai.com/v1/realtime?model=gpt-realtime".to_string(),
                model: "gpt-realtime".to_string(),
                voice: "alloy".to_string(),
                instructions: "You are a helpful assistant that starts every conversation \
                               with a creative greeting. Keep responses concise and friendly \
                               since this is a phone conversation."
                    .to_string(),
            },
            audio: AudioConfig {
                sample_rate: 8000,      // g711_ulaw telephony rate
                chunk_duration_s: 0.05, // 50ms chunks
            },
            tools: ToolsConfig {
                document_path: "call_notes.txt".to_string(),
                feedback_db: "feedback.db".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml and the environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists)
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Special environment variables that don't follow the APP_ prefix
        // convention: deployment platform bind overrides and the credential
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("agent.api_key", api_key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// A missing API key is the one fatal startup condition: no connection
    /// may be accepted without it.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.agent.api_key.is_empty() {
            return Err(anyhow::anyhow!(
                "Agent API key is required (set OPENAI_API_KEY)"
            ));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.chunk_duration_s <= 0.0 {
            return Err(anyhow::anyhow!("Chunk duration must be greater than 0"));
        }

        Ok(())
    }

    /// Buffer parameters for a new call, snapshotted at construction.
    pub fn buffer_config(&self) -> crate::bridge::buffer::ChunkBufferConfig {
        crate::bridge::buffer::ChunkBufferConfig {
            sample_rate: self.audio.sample_rate,
            chunk_duration_s: self.audio.chunk_duration_s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The default config deliberately fails validation: the credential has
    /// no safe default and must come from the environment.
    #[test]
    fn test_default_config_requires_api_key() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(config.validate().is_err());

        let mut configured = config;
        configured.agent.api_key = "sk-test".to_string();
        assert!(configured.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.agent.api_key = "sk-test".to_string();

        config.server.port = 0;
        assert!(config.validate().is_err());
        config.server.port = 8080;

        config.audio.sample_rate = 0;
        assert!(config.validate().is_err());
        config.audio.sample_rate = 8000;

        config.audio.chunk_duration_s = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_buffer_config_matches_audio_settings() {
        let config = AppConfig::default();
        let buffer_config = config.buffer_config();
        assert_eq!(buffer_config.sample_rate, 8000);
        assert_eq!(buffer_config.flush_size_bytes(), 400);
    }
}
