//! Configuration for the evaluation toolkit.
//!
//! Supports a JSON or YAML config file plus environment variables.
//! Environment variables take precedence over config file values.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// File name of the resumable result store inside the output directory.
pub const STORE_FILENAME: &str = "local_item_results.json";

/// File name of the merged items file inside the output directory.
pub const MERGED_FILENAME: &str = "merged_answers_all.json";

/// LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name, or the deployment name for Azure endpoints
    pub model: String,

    /// Use the Azure request convention (deployment URL + `api-key` header)
    #[serde(default = "default_is_azure")]
    pub is_azure: bool,

    /// `api-version` query parameter for Azure endpoints
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Maximum tokens for response (optional)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation (optional)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Timeout for a single HTTP request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_is_azure() -> bool {
    true
}

fn default_api_version() -> String {
    "2024-02-01".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.0
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: String::new(),
            is_azure: default_is_azure(),
            api_version: default_api_version(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM settings
    pub llm: LlmConfig,

    /// Directory holding prompts, predictions, the result store and reports
    pub output_dir: PathBuf,

    /// Source dialogue dataset, only needed by `convert`
    pub dataset: Option<PathBuf>,

    /// Items per judge call
    pub batch_size: usize,

    /// Pause after every LLM call, in seconds
    pub request_delay_secs: u64,

    /// Attempts per sample when generating answers
    pub max_retries: u32,

    /// Extra attempts for a judge batch that failed as a whole
    pub judge_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            output_dir: PathBuf::new(),
            dataset: None,
            batch_size: 10,
            request_delay_secs: 2,
            max_retries: 3,
            judge_retries: 2,
        }
    }
}

/// Configuration file structure (flat keys, JSON or YAML).
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    model: Option<String>,
    #[serde(alias = "api_base")]
    openai_base_url: Option<String>,
    api_key: Option<String>,
    output_dir: Option<PathBuf>,
    dataset: Option<PathBuf>,
    batch_size: Option<usize>,
    is_azure_openai: Option<FlagValue>,
    api_version: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    request_timeout_secs: Option<u64>,
    request_delay_secs: Option<u64>,
    max_retries: Option<u32>,
    judge_retries: Option<u32>,
}

/// A boolean-like flag as found in hand-written config files: `true`, `1`, `"yes"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FlagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FlagValue {
    fn as_bool(&self) -> Result<bool> {
        match self {
            FlagValue::Bool(b) => Ok(*b),
            FlagValue::Int(i) => Ok(*i != 0),
            FlagValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" | "" => Ok(false),
                other => Err(EvalError::Config(format!(
                    "is_azure_openai must be boolean-like, got '{}'",
                    other
                ))),
            },
        }
    }
}

impl Config {
    /// Load configuration from an optional config file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL,
    ///    QA_EVAL_OUTPUT_DIR, QA_EVAL_BATCH_SIZE)
    /// 2. The given config file, or ~/.config/qa-eval/config.yaml when none is given
    /// 3. Default values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(default_path) if default_path.exists() => {
                    Self::load_from_file(&default_path)?
                }
                _ => Config::default(),
            },
        };

        if let Ok(api_base) = env::var("LLM_API_BASE") {
            config.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            config.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            config.llm.model = model;
        }

        if let Ok(output_dir) = env::var("QA_EVAL_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(output_dir);
        }

        if let Ok(batch_size) = env::var("QA_EVAL_BATCH_SIZE") {
            if let Ok(size) = batch_size.parse() {
                config.batch_size = size;
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// `.yaml`/`.yml` files are read as YAML, everything else as JSON.
    /// Relative `output_dir` and `dataset` paths are resolved against the
    /// directory containing the config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;

        let file_config: ConfigFile = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))?,
            _ => serde_json::from_str(&content)
                .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))?,
        };

        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_file_config(file_config, base_dir)
    }

    fn from_file_config(file: ConfigFile, base_dir: &Path) -> Result<Self> {
        let mut config = Config::default();

        if let Some(model) = file.model {
            config.llm.model = model;
        }
        if let Some(api_base) = file.openai_base_url {
            config.llm.api_base = api_base;
        }
        if let Some(api_key) = file.api_key {
            config.llm.api_key = api_key;
        }
        if let Some(flag) = file.is_azure_openai {
            config.llm.is_azure = flag.as_bool()?;
        }
        if let Some(api_version) = file.api_version {
            config.llm.api_version = api_version;
        }
        if let Some(max_tokens) = file.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = file.temperature {
            config.llm.temperature = temperature;
        }
        if let Some(timeout) = file.request_timeout_secs {
            config.llm.request_timeout_secs = timeout;
        }
        if let Some(output_dir) = file.output_dir {
            config.output_dir = resolve_relative(base_dir, output_dir);
        }
        if let Some(dataset) = file.dataset {
            config.dataset = Some(resolve_relative(base_dir, dataset));
        }
        if let Some(batch_size) = file.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(delay) = file.request_delay_secs {
            config.request_delay_secs = delay;
        }
        if let Some(max_retries) = file.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(judge_retries) = file.judge_retries {
            config.judge_retries = judge_retries;
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "qa-eval")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that the settings needed to talk to the LLM are present.
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_base.is_empty() {
            return Err(EvalError::Config(
                "LLM API base URL is required. Set openai_base_url in the config file or LLM_API_BASE.".to_string(),
            ));
        }

        if self.llm.api_key.is_empty() {
            return Err(EvalError::Config(
                "LLM API key is required. Set api_key in the config file or LLM_API_KEY.".to_string(),
            ));
        }

        if self.llm.model.is_empty() {
            return Err(EvalError::Config(
                "LLM model is required. Set model in the config file or LLM_MODEL.".to_string(),
            ));
        }

        self.validate_output_dir()
    }

    /// Validate only the output directory (enough for offline commands).
    pub fn validate_output_dir(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(EvalError::Config(
                "output_dir is required. Set output_dir in the config file or QA_EVAL_OUTPUT_DIR."
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the resumable result store.
    pub fn store_path(&self) -> PathBuf {
        self.output_dir.join(STORE_FILENAME)
    }

    /// Path of the merged items file consumed by scoring.
    pub fn merged_path(&self) -> PathBuf {
        self.output_dir.join(MERGED_FILENAME)
    }

    /// Path of the text report, named after the judged model.
    pub fn report_path(&self) -> PathBuf {
        let model = self.llm.model.replace(['/', '\\'], "_");
        self.output_dir.join(format!("{}_score.txt", model))
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn resolve_relative(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.llm.api_base.is_empty());
        assert!(config.llm.api_key.is_empty());
        assert!(config.llm.is_azure);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.llm.temperature, 0.0);
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::with_llm("https://api.example.com", "key", "gpt-4o");
        assert!(config.validate().is_err());
        config.output_dir = PathBuf::from("out");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_json_file_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "model": "gpt-4o-mini",
                "openai_base_url": "https://example.openai.azure.com",
                "api_key": "secret",
                "output_dir": "locomo10_output",
                "dataset": "/data/locomo10.json",
                "batch_size": 5,
                "is_azure_openai": 0
            }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.api_base, "https://example.openai.azure.com");
        assert_eq!(config.batch_size, 5);
        assert!(!config.llm.is_azure);
        assert_eq!(config.output_dir, dir.path().join("locomo10_output"));
        assert_eq!(config.dataset, Some(PathBuf::from("/data/locomo10.json")));
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "model: judge\napi_base: https://api.example.com\napi_key: k\noutput_dir: /tmp/out\nis_azure_openai: \"no\"\n",
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.llm.api_base, "https://api.example.com");
        assert!(!config.llm.is_azure);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_bad_flag_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"is_azure_openai": "maybe"}"#).unwrap();
        assert!(matches!(
            Config::load_from_file(&path),
            Err(EvalError::Config(_))
        ));
    }

    #[test]
    fn test_report_path_sanitizes_model() {
        let mut config = Config::with_llm("https://api.example.com", "k", "org/model-7b");
        config.output_dir = PathBuf::from("out");
        assert_eq!(config.report_path(), PathBuf::from("out/org_model-7b_score.txt"));
        assert_eq!(config.store_path(), PathBuf::from("out").join(STORE_FILENAME));
    }
}
