//! Configuration for skill evaluation runs.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{Result, SkillEvalError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the Messages API (e.g., "https://api.anthropic.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model used to generate outputs from both skills
    pub gen_model: String,

    /// Model used to judge paired outputs
    pub judge_model: String,

    /// Maximum tokens for each generation
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Maximum tokens for each judge reply
    #[serde(default = "default_judge_max_tokens")]
    pub judge_max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_judge_max_tokens() -> u32 {
    4096
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.anthropic.com".to_string(),
            api_key: String::new(),
            gen_model: "claude-sonnet-4-5-20250929".to_string(),
            judge_model: "claude-opus-4-5-20251101".to_string(),
            max_tokens: default_max_tokens(),
            judge_max_tokens: default_judge_max_tokens(),
        }
    }
}

/// Screenshot server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Base URL of the screenshot server
    pub url: String,
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
    /// Health probe timeout
    pub health_timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3001".to_string(),
            width: 1200,
            height: 800,
            health_timeout_secs: 3,
        }
    }
}

/// Orchestration limits and state location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Upper bound on simultaneous outbound calls per stage
    pub max_concurrency: usize,
    /// Per-call timeout; expiry marks that call as failed
    pub call_timeout_secs: u64,
    /// Where run state is persisted
    pub state_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            call_timeout_secs: 300,
            state_path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "skill-eval")
        .map(|dirs| dirs.data_dir().join("run_state.json"))
        .unwrap_or_else(|| PathBuf::from("data/run_state.json"))
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM settings
    pub llm: LlmConfig,
    /// Screenshot server settings
    pub render: RenderConfig,
    /// Run orchestration settings
    pub run: RunConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    render: Option<RenderFileSection>,
    run: Option<RunFileSection>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    gen_model: Option<String>,
    judge_model: Option<String>,
    max_tokens: Option<u32>,
    judge_max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RenderFileSection {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    health_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RunFileSection {
    max_concurrency: Option<usize>,
    call_timeout_secs: Option<u64>,
    state_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_KEY, LLM_GEN_MODEL, RENDER_URL, ...)
    /// 2. Config file (~/.config/skill-eval/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY").or_else(|_| env::var("ANTHROPIC_API_KEY")) {
            self.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_GEN_MODEL") {
            self.llm.gen_model = model;
        }

        if let Ok(model) = env::var("LLM_JUDGE_MODEL") {
            self.llm.judge_model = model;
        }

        if let Ok(max_tokens) = env::var("LLM_MAX_TOKENS") {
            if let Ok(tokens) = max_tokens.parse() {
                self.llm.max_tokens = tokens;
            }
        }

        if let Ok(url) = env::var("RENDER_URL") {
            self.render.url = url;
        }

        if let Ok(width) = env::var("EVAL_MAX_CONCURRENCY") {
            if let Ok(n) = width.parse() {
                self.run.max_concurrency = n;
            }
        }

        if let Ok(timeout) = env::var("EVAL_CALL_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.run.call_timeout_secs = secs;
            }
        }

        if let Ok(path) = env::var("EVAL_STATE_PATH") {
            self.run.state_path = PathBuf::from(path);
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SkillEvalError::io(path, e))?;

        let file_config: ConfigFile = serde_yaml::from_str(&content)
            .map_err(|e| SkillEvalError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.gen_model {
                config.llm.gen_model = model;
            }
            if let Some(model) = llm.judge_model {
                config.llm.judge_model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(max_tokens) = llm.judge_max_tokens {
                config.llm.judge_max_tokens = max_tokens;
            }
        }

        if let Some(render) = file_config.render {
            if let Some(url) = render.url {
                config.render.url = url;
            }
            if let Some(width) = render.width {
                config.render.width = width;
            }
            if let Some(height) = render.height {
                config.render.height = height;
            }
            if let Some(secs) = render.health_timeout_secs {
                config.render.health_timeout_secs = secs;
            }
        }

        if let Some(run) = file_config.run {
            if let Some(n) = run.max_concurrency {
                config.run.max_concurrency = n;
            }
            if let Some(secs) = run.call_timeout_secs {
                config.run.call_timeout_secs = secs;
            }
            if let Some(path) = run.state_path {
                config.run.state_path = path;
            }
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "skill-eval")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(SkillEvalError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(SkillEvalError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.llm.gen_model.is_empty() || self.llm.judge_model.is_empty() {
            return Err(SkillEvalError::Config(
                "Generation and judge models are required. Set LLM_GEN_MODEL / LLM_JUDGE_MODEL or add to config file."
                    .to_string(),
            ));
        }

        if self.run.max_concurrency == 0 {
            return Err(SkillEvalError::Config(
                "run.max_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                gen_model: model.clone(),
                judge_model: model,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Explicit settings handed to the run controller at run start.
///
/// Nothing in the orchestration reads ambient configuration; everything it
/// needs for a run is captured here.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub api_key: String,
    pub gen_model: String,
    pub judge_model: String,
    pub max_tokens: u32,
    pub judge_max_tokens: u32,
    pub max_concurrency: usize,
    pub call_timeout: Duration,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.llm.api_key.clone(),
            gen_model: config.llm.gen_model.clone(),
            judge_model: config.llm.judge_model.clone(),
            max_tokens: config.llm.max_tokens,
            judge_max_tokens: config.llm.judge_max_tokens,
            max_concurrency: config.run.max_concurrency.max(1),
            call_timeout: Duration::from_secs(config.run.call_timeout_secs),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.api_base, "https://api.anthropic.com");
        assert!(config.llm.api_key.is_empty());
        assert_eq!(config.llm.max_tokens, 8192);
        assert_eq!(config.llm.judge_max_tokens, 4096);
        assert_eq!(config.render.url, "http://localhost:3001");
        assert_eq!(config.render.health_timeout_secs, 3);
        assert_eq!(config.run.max_concurrency, 8);
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_llm() {
        let config = Config::with_llm("https://api.example.com", "test-key", "model-x");
        assert_eq!(config.llm.api_base, "https://api.example.com");
        assert_eq!(config.llm.api_key, "test-key");
        assert_eq!(config.llm.gen_model, "model-x");
        assert_eq!(config.llm.judge_model, "model-x");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "llm:\n  api_key: file-key\n  judge_model: judge-1\nrender:\n  width: 640\nrun:\n  max_concurrency: 2\n  call_timeout_secs: 12\n",
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.llm.api_key, "file-key");
        assert_eq!(config.llm.judge_model, "judge-1");
        assert_eq!(config.llm.gen_model, LlmConfig::default().gen_model);
        assert_eq!(config.render.width, 640);
        assert_eq!(config.render.height, 800);
        assert_eq!(config.run.max_concurrency, 2);
        assert_eq!(config.run.call_timeout_secs, 12);
    }

    #[test]
    fn test_load_from_file_rejects_bad_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "llm: [not, a, map").unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(SkillEvalError::Config(_))
        ));
    }

    #[test]
    fn test_run_settings_from_config() {
        let mut config = Config::with_llm("https://api.example.com", "k", "m");
        config.run.max_concurrency = 0;
        config.run.call_timeout_secs = 7;
        let settings = RunSettings::from_config(&config);
        assert_eq!(settings.max_concurrency, 1);
        assert_eq!(settings.call_timeout, Duration::from_secs(7));
        assert!(settings.has_credentials());
        assert!(!RunSettings::default().has_credentials());
    }
}
