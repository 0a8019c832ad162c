use config::{Config as ConfigLoader, ConfigError, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Built-in defaults; `config/default.toml` and the environment override them
const DEFAULTS: &str = include_str!("../config/default.toml");

/// Environment variables that override a single configuration key
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("SERVER_HOST", "server.host"),
    ("SERVER_PORT", "server.port"),
    ("SERVER_REQUEST_TIMEOUT_SECS", "server.request_timeout_secs"),
    ("CORS_ENABLED", "cors.enabled"),
    ("CHAT_HISTORY_LIMIT", "chat.history_limit"),
    ("CHAT_SYSTEM_PROMPT", "chat.system_prompt"),
    ("CHAT_ASSISTANT_NAME", "chat.assistant_name"),
    ("CHAT_SESSION_IDLE_TIMEOUT_SECS", "chat.session_idle_timeout_secs"),
    ("CHAT_SESSION_SWEEP_INTERVAL_SECS", "chat.session_sweep_interval_secs"),
    ("LOG_LEVEL", "logging.level"),
    ("LOG_FORMAT", "logging.format"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Time allowed to produce response headers; streamed bodies are not cut
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Committed messages kept per session
    pub history_limit: usize,
    pub system_prompt: String,
    /// Label shown for assistant messages in the chat page
    pub assistant_name: String,
    /// Idle time after which a session is dropped
    pub session_idle_timeout_secs: u64,
    /// How often idle sessions are looked for
    pub session_sweep_interval_secs: u64,
}

impl ChatConfig {
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. built-in defaults
    /// 2. config/default.toml
    /// 3. config/{ENV}.toml (if ENV is set)
    /// 4. Environment variables (SERVER_*, CORS_*, CHAT_*, LOG_*)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_with(&env, |name| std::env::var(name).ok())
    }

    /// Same as [`Config::load`] with an explicit environment name and lookup
    pub fn load_with<F>(env: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = ConfigLoader::builder()
            .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false));

        for (var, key) in ENV_OVERRIDES {
            builder = builder.set_override_option(*key, lookup(var))?;
        }

        let cfg: Config = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load config from a specific path on top of the built-in defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let cfg: Config = ConfigLoader::builder()
            .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.history_limit == 0 {
            return Err(ConfigError::Message(
                "chat.history_limit must be at least 1".to_string(),
            ));
        }
        if self.chat.session_idle_timeout_secs == 0 || self.chat.session_sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "chat.session_idle_timeout_secs and chat.session_sweep_interval_secs must be at least 1"
                    .to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Message(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                request_timeout_secs: 300,
            },
            cors: CorsConfig {
                enabled: false,
                origins: vec!["*".to_string()],
            },
            chat: ChatConfig {
                history_limit: promptline_llm::DEFAULT_HISTORY_LIMIT,
                system_prompt: "你叫杨紫，是著名女演员。".to_string(),
                assistant_name: "杨紫".to_string(),
                session_idle_timeout_secs: 1800,
                session_sweep_interval_secs: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
