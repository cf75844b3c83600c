//! Polyglot Core Library
//!
//! This library provides the core functionality for the translation service:
//! - Configuration store (model map, defaults, HuggingFace auth settings)
//! - Pluggable translation adapters (dummy, HuggingFace-backed)
//! - Adapter registry with lazy, per-model-name instantiation and caching
//! - Request dispatching with layered parameter merging

pub mod adapter;
pub mod config;
pub mod error;
pub mod params;
pub mod registry;

pub use adapter::{
    AdapterConstructor, AdapterContext, BUILTIN_KINDS, DUMMY_KIND, DummyAdapter, HUGGINGFACE_KIND,
    HuggingFaceAdapter, TranslationAdapter,
};
pub use config::{Defaults, GlobalConfig, HuggingFaceConfig, ModelConfig};
pub use error::{Error, Result};
pub use params::Params;
pub use registry::{AdapterRegistry, SharedAdapter};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// An inbound translation request.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslateRequest {
    /// Plain text to translate.
    pub text: String,
    /// Logical model name; the configured default is used when absent.
    pub model: Option<String>,
    /// Request-level parameter overrides (highest precedence).
    pub params: Option<Params>,
}

/// The outcome of a translation request.
#[derive(Debug, Clone, Serialize)]
pub struct TranslateResult {
    /// Logical model that served the request.
    pub model: String,
    /// Adapter kind that backs the model.
    pub adapter: String,
    /// Translated text.
    pub output: String,
}

/// One entry of the model listing.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub name: String,
    pub adapter: String,
    /// Sorted configured parameter keys (values stay private).
    pub params_keys: Vec<String>,
}

/// The full model listing plus the configured default.
#[derive(Debug, Clone, Serialize)]
pub struct ModelsSummary {
    pub models: Vec<ModelSummary>,
    pub default: Option<String>,
}

/// High-level dispatcher combining the configuration store and the adapter
/// registry: resolves the model name, merges parameters, invokes the cached
/// adapter, and classifies failures.
#[derive(Debug)]
pub struct TranslationService {
    config: Arc<GlobalConfig>,
    registry: Arc<AdapterRegistry>,
}

impl TranslationService {
    /// Create a service with the built-in adapter kinds.
    pub fn new(config: GlobalConfig) -> Result<Self> {
        let config = Arc::new(config);
        let registry = AdapterRegistry::with_builtin_adapters(Arc::clone(&config))?;
        Self::with_registry(config, registry)
    }

    /// Create a service over a custom registry (extension point: register
    /// additional adapter kinds before handing the registry in).
    pub fn with_registry(config: Arc<GlobalConfig>, registry: AdapterRegistry) -> Result<Self> {
        config.validate(&registry.kinds())?;
        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    /// Dispatch one translation request.
    pub async fn translate(&self, req: &TranslateRequest) -> Result<TranslateResult> {
        if req.text.trim().is_empty() {
            return Err(Error::BadRequest("text required".to_string()));
        }

        let model_name = req
            .model
            .as_deref()
            .or_else(|| self.config.default_model())
            .ok_or_else(|| Error::BadRequest("no default adapter configured".to_string()))?;

        let model = self
            .config
            .model(model_name)
            .ok_or_else(|| Error::NotFound(model_name.to_string()))?;

        // Precedence: request params > model params > global generation defaults.
        let empty = Params::new();
        let request_params = req.params.as_ref().unwrap_or(&empty);
        let merged = Params::merged([
            &self.config.defaults.generation,
            &model.params,
            request_params,
        ]);

        debug!("Dispatching to model '{model_name}' ({})", model.adapter);
        let adapter = self.registry.resolve(model_name).await?;

        let translated = match self.config.defaults.request_timeout_secs {
            // The timeout covers only `translate`, never the build lock, so a
            // slow first load cannot fail other waiters spuriously.
            Some(secs) => {
                tokio::time::timeout(
                    Duration::from_secs(secs),
                    adapter.translate(&req.text, &merged),
                )
                .await
                .map_err(|_| {
                    Error::translate(model_name, format!("translation timed out after {secs}s"))
                })?
            }
            None => adapter.translate(&req.text, &merged).await,
        };

        let output = translated.map_err(|e| {
            if e.is_classified() {
                e
            } else {
                Error::translate(model_name, e.to_string())
            }
        })?;

        Ok(TranslateResult {
            model: model_name.to_string(),
            adapter: model.adapter.clone(),
            output,
        })
    }

    /// Listing of every configured logical model, for `GET /models`.
    pub fn models(&self) -> ModelsSummary {
        ModelsSummary {
            models: self
                .config
                .models
                .iter()
                .map(|(name, model)| ModelSummary {
                    name: name.clone(),
                    adapter: model.adapter.clone(),
                    params_keys: model.params.keys(),
                })
                .collect(),
            default: self.config.default_model().map(str::to_string),
        }
    }

    /// Names of currently loaded (ready) adapters, for `GET /health`.
    pub fn loaded_adapters(&self) -> Vec<String> {
        self.registry.loaded()
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }
}
