//! Runtime configuration.
//!
//! Loaded from TOML: `--config`, then `$SITEBOT_CONFIG`, then
//! `~/.config/sitebot/config.toml`, which is created with defaults on first
//! run. Secrets may come from `TELEGRAM_BOT_TOKEN` and `MISTRAL_AI_API_KEY`.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::extractor::ExtractionPolicy;

pub const CONFIG_ENV: &str = "SITEBOT_CONFIG";
pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const LLM_API_KEY_ENV: &str = "MISTRAL_AI_API_KEY";

const DEFAULT_CONFIG: &str = r#"# sitebot default configuration
[server]
host = "127.0.0.1"
port = 8087

[telegram]
# Prefer the TELEGRAM_BOT_TOKEN environment variable
token = ""
api_base = "https://api.telegram.org"
poll_timeout_secs = 30
skip_pending = true

[llm]
api_base = "https://api.mistral.ai/v1"
# Prefer the MISTRAL_AI_API_KEY environment variable
api_key = ""
model = "mistral-large-latest"
temperature = 0.0
timeout_secs = 60

[sources]
urls = ["https://ge74.ru"]
fetch_timeout_secs = 10
extraction = "paragraphs"
max_context_chars = 24000
concurrent = true

[logging]
file = "logs/bot_log.log"
json = false
"#;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8087,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub skip_pending: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: default_telegram_api_base(),
            poll_timeout_secs: default_poll_timeout_secs(),
            skip_pending: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub urls: Vec<String>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub extraction: ExtractionPolicy,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_true")]
    pub concurrent: bool,
}

/// User-visible texts. Defaults are the Russian strings the bot shipped with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub system_prompt: String,
    pub no_context: String,
    pub processing: String,
    pub generation_failed: String,
    pub welcome: String,
    pub help: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            system_prompt: "Пожалуйста, отвечай на вопросы на русском языке. \
                Пожалуйста отвечай на вопросы строго как написано на сайте ge74"
                .to_string(),
            no_context: "Не удалось собрать данные с сайтов.".to_string(),
            processing: "Ваш запрос обрабатывается".to_string(),
            generation_failed: "Ошибка генерации ответа от Mistral AI.".to_string(),
            welcome: "Привет! Я бот, который поможет ответить на ваши вопросы.\n\
                Просто отправьте мне свой вопрос, и я постараюсь найти ответ!\n\
                \n\
                ( ge74_bot может допускать ошибки. Рекомендуем проверять важную информацию )"
                .to_string(),
            help: "Чтобы задать вопрос, просто отправьте его в чат.\n\
                Я буду использовать данные с нескольких сайтов и нейросеть Mistral AI для формирования ответа."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub json: bool,
}

fn default_true() -> bool {
    true
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_llm_api_base() -> String {
    "https://api.mistral.ai/v1".to_string()
}

fn default_llm_model() -> String {
    "mistral-large-latest".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_max_context_chars() -> usize {
    24_000
}

impl Config {
    /// Resolves the config file (explicit path, `SITEBOT_CONFIG`, then the
    /// user config dir) and applies secret overrides from the environment.
    pub fn load_auto(explicit: Option<&Path>) -> Result<Self> {
        let mut cfg = if let Some(path) = explicit {
            Self::load(path)?
        } else if let Some(path) = env::var_os(CONFIG_ENV).map(PathBuf::from) {
            if path.exists() {
                Self::load(&path)?
            } else {
                tracing::warn!("{} points to non-existent file: {}", CONFIG_ENV, path.display());
                Self::load_from_user_config()?
            }
        } else {
            Self::load_from_user_config()?
        };

        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse TOML from {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(content)?;
        Ok(cfg)
    }

    fn user_config_path() -> Result<PathBuf> {
        let home = env::var("HOME").context("HOME env var not set")?;
        Ok(Path::new(&home).join(".config").join("sitebot").join("config.toml"))
    }

    fn ensure_user_config_exists() -> Result<PathBuf> {
        let path = Self::user_config_path()?;
        write_default_if_missing(&path)?;
        Ok(path)
    }

    pub fn load_from_user_config() -> Result<Self> {
        let path = Self::ensure_user_config_exists()?;
        Self::load(&path)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            env::var(TELEGRAM_TOKEN_ENV).ok(),
            env::var(LLM_API_KEY_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, telegram_token: Option<String>, llm_api_key: Option<String>) {
        if let Some(token) = telegram_token.filter(|t| !t.trim().is_empty()) {
            self.telegram.token = token;
        }
        if let Some(key) = llm_api_key.filter(|k| !k.trim().is_empty()) {
            self.llm.api_key = key;
        }
    }

    /// Checks everything the question pipeline needs. The Telegram token is
    /// checked separately by [`Config::require_telegram_token`].
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_key.trim().is_empty() {
            bail!(
                "LLM API key is not set; provide {} or llm.api_key in the config",
                LLM_API_KEY_ENV
            );
        }
        self.source_urls()?;
        if self.sources.max_context_chars == 0 {
            bail!("sources.max_context_chars must be greater than zero");
        }
        Ok(())
    }

    pub fn require_telegram_token(&self) -> Result<&str> {
        let token = self.telegram.token.trim();
        if token.is_empty() {
            return Err(anyhow!(
                "Telegram bot token is not set; provide {} or telegram.token in the config",
                TELEGRAM_TOKEN_ENV
            ));
        }
        Ok(token)
    }

    /// Parsed source list, in configured order.
    pub fn source_urls(&self) -> Result<Vec<Url>> {
        if self.sources.urls.is_empty() {
            bail!("sources.urls must list at least one site");
        }
        self.sources
            .urls
            .iter()
            .map(|raw| {
                let url = Url::parse(raw).with_context(|| format!("Invalid source URL: {}", raw))?;
                match url.scheme() {
                    "http" | "https" => Ok(url),
                    other => Err(anyhow!("Unsupported scheme `{}` in source URL {}", other, raw)),
                }
            })
            .collect()
    }
}

pub(crate) fn write_default_if_missing(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        }
    }
    if !path.exists() {
        fs::write(path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write default config to {}", path.display()))?;
        tracing::info!("Wrote default config to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests_support {
    pub use super::*;

    pub fn default_config_text() -> &'static str {
        DEFAULT_CONFIG
    }

    pub fn write_default(path: &Path) -> Result<()> {
        write_default_if_missing(path)
    }

    pub fn overrides(cfg: &mut Config, token: Option<&str>, key: Option<&str>) {
        cfg.apply_overrides(token.map(str::to_string), key.map(str::to_string));
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
