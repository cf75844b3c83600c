mod dummy;
mod huggingface;

pub use dummy::DummyAdapter;
pub use huggingface::HuggingFaceAdapter;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::HuggingFaceConfig;
use crate::error::Result;
use crate::params::Params;

/// Everything an adapter constructor gets to work with: the logical model
/// name (used to annotate errors), the model's configured parameters, and the
/// global HuggingFace settings.
#[derive(Debug, Clone)]
pub struct AdapterContext {
    /// Logical model name from the configuration.
    pub name: String,
    /// Configured (not request-merged) model parameters.
    pub params: Params,
    /// Global auth/endpoint settings.
    pub huggingface: HuggingFaceConfig,
}

/// Trait for translation adapters.
///
/// `setup` runs exactly once per logical model name, before the instance is
/// cached; it may be slow (resource acquisition, network validation).
/// `translate` takes `&self` and must be safe for concurrent use - the
/// registry hands the same `Arc` to every in-flight request. All shipped
/// adapters delegate inference over HTTP with a shared client, which is
/// concurrency-safe; an adapter wrapping a non-reentrant engine would need
/// its own internal serialization.
#[async_trait]
pub trait TranslationAdapter: Send + Sync + std::fmt::Debug {
    /// Adapter kind name, as referenced by model configuration entries.
    fn kind(&self) -> &'static str;

    /// One-time, possibly expensive initialization.
    async fn setup(&mut self) -> Result<()>;

    /// Translate `text` using request-merged parameters. Must not mutate
    /// shared configuration.
    async fn translate(&self, text: &str, params: &Params) -> Result<String>;
}

/// Constructor for an adapter kind. Registered under a unique kind name at
/// process start; the registry calls it (then `setup`) on first use of each
/// logical model.
pub type AdapterConstructor =
    Arc<dyn Fn(AdapterContext) -> Result<Box<dyn TranslationAdapter>> + Send + Sync>;

/// Adapter kind name for [`DummyAdapter`].
pub const DUMMY_KIND: &str = "dummy";
/// Adapter kind name for [`HuggingFaceAdapter`].
pub const HUGGINGFACE_KIND: &str = "huggingface";

/// The adapter kinds shipped with this crate.
pub const BUILTIN_KINDS: &[&str] = &[DUMMY_KIND, HUGGINGFACE_KIND];
