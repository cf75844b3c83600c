use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::params::Params;

/// Environment variable selecting the configuration file path.
pub const CONFIG_PATH_ENV: &str = "POLYGLOT_CONFIG";
/// Environment variable providing a HuggingFace token (lowest precedence).
pub const HF_TOKEN_ENV: &str = "HF_TOKEN";

/// One logical model entry: the adapter kind that backs it plus its parameters.
///
/// Logical model names are the keys of [`GlobalConfig::models`]; using a map
/// makes name uniqueness structural (a duplicate key is a parse error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Registered adapter kind, e.g. `"dummy"` or `"huggingface"`.
    pub adapter: String,

    /// Adapter parameters, overridable per request.
    #[serde(default)]
    pub params: Params,
}

/// Global defaults applied to every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    /// Logical model used when a request names none.
    pub model: Option<String>,

    /// Generation defaults, lowest-precedence parameter layer.
    #[serde(default)]
    pub generation: Params,

    /// Optional per-request timeout around `translate()` only.
    /// Construction (model loading) is intentionally not covered so a slow
    /// first build cannot poison other waiters.
    pub request_timeout_secs: Option<u64>,
}

/// HuggingFace authentication and endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HuggingFaceConfig {
    /// Access token for gated or private models. The `HF_TOKEN` environment
    /// variable is consulted when this is unset.
    pub token: Option<String>,

    /// When enabled, a supplied-but-rejected token is a hard failure instead
    /// of silently retrying anonymously.
    #[serde(default = "default_true")]
    pub strict_auth: bool,

    /// Base URL of the hosted inference endpoint.
    #[serde(default = "default_hf_endpoint")]
    pub endpoint: String,

    /// Base URL of the model hub (repo metadata lookups during setup).
    #[serde(default = "default_hf_hub")]
    pub hub: String,
}

const fn default_true() -> bool {
    true
}

fn default_hf_endpoint() -> String {
    "https://api-inference.huggingface.co".to_string()
}

fn default_hf_hub() -> String {
    "https://huggingface.co".to_string()
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            token: None,
            strict_auth: true,
            endpoint: default_hf_endpoint(),
            hub: default_hf_hub(),
        }
    }
}

impl HuggingFaceConfig {
    /// Configured token, falling back to the `HF_TOKEN` environment variable.
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(HF_TOKEN_ENV).ok().filter(|t| !t.is_empty()))
    }
}

/// Process-wide configuration: the model map, global defaults, and
/// HuggingFace auth settings. Loaded once at startup, read-only thereafter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub huggingface: HuggingFaceConfig,
}

impl GlobalConfig {
    /// Look up a logical model by name.
    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    /// Name of the default logical model, if one is configured.
    pub fn default_model(&self) -> Option<&str> {
        self.defaults.model.as_deref()
    }

    /// Validate the model map against the set of registered adapter kinds.
    ///
    /// Unknown kinds are also caught lazily at registry resolution; running
    /// this at startup surfaces typos before the first request does.
    pub fn validate(&self, known_kinds: &[&str]) -> Result<()> {
        for (name, model) in &self.models {
            if model.adapter.trim().is_empty() {
                return Err(Error::ConfigInvalid {
                    field: format!("models.{name}.adapter"),
                    reason: "adapter kind must not be empty".to_string(),
                });
            }
            if !known_kinds.contains(&model.adapter.as_str()) {
                return Err(Error::ConfigInvalid {
                    field: format!("models.{name}.adapter"),
                    reason: format!(
                        "unknown adapter kind '{}' (available: {})",
                        model.adapter,
                        known_kinds.join(", ")
                    ),
                });
            }
        }
        if let Some(default) = self.default_model()
            && !self.models.contains_key(default)
        {
            return Err(Error::ConfigInvalid {
                field: "defaults.model".to_string(),
                reason: format!("default model '{default}' is not in the model map"),
            });
        }
        Ok(())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigLoad(format!("failed to parse config: {e}")))
    }

    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "failed to read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from the environment-selected path (`POLYGLOT_CONFIG`), then
    /// `./polyglot.toml`, then fall back to defaults.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            tracing::debug!("Loading config from {CONFIG_PATH_ENV}={path}");
            return Self::from_file(path);
        }

        let local_config = std::path::PathBuf::from("polyglot.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./polyglot.toml");
            return Self::from_file(&local_config);
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }
}
