use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

use crate::adapter::{
    AdapterConstructor, AdapterContext, DUMMY_KIND, DummyAdapter, HUGGINGFACE_KIND,
    HuggingFaceAdapter, TranslationAdapter,
};
use crate::config::GlobalConfig;
use crate::error::{Error, Result};

/// A ready adapter instance, shared across all in-flight requests.
pub type SharedAdapter = Arc<dyn TranslationAdapter>;

type BuildFuture = Shared<BoxFuture<'static, Result<SharedAdapter>>>;

/// Lifecycle of one logical model name.
///
/// `Building` holds a shared future so every concurrent first-caller awaits
/// the same construction and observes the same success or failure. There is
/// deliberately no `Failed` state: a failed build clears the slot so the next
/// request retries instead of hitting a permanently poisoned entry.
enum Slot {
    Building(BuildFuture),
    Ready(SharedAdapter),
}

/// Maps adapter kind names to constructors and lazily builds one adapter
/// instance per logical model name.
///
/// Constructors are registered once at process start, before serving begins;
/// after that the registry is shared immutably (`Arc`) and only the slot map
/// mutates, under a sync mutex held just for lookup/insert. `setup()` runs
/// inside the shared build future with no lock held, so a slow build for one
/// model never delays resolution of another.
pub struct AdapterRegistry {
    config: Arc<GlobalConfig>,
    constructors: HashMap<String, AdapterConstructor>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("config", &self.config)
            .field("kinds", &self.constructors.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl AdapterRegistry {
    /// Create an empty registry over the given configuration.
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        Self {
            config,
            constructors: HashMap::new(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Create a registry with the built-in adapter kinds registered.
    pub fn with_builtin_adapters(config: Arc<GlobalConfig>) -> Result<Self> {
        let mut registry = Self::new(config);
        registry.register(
            DUMMY_KIND,
            Arc::new(|ctx| Ok(Box::new(DummyAdapter::new(&ctx)) as Box<dyn TranslationAdapter>)),
        )?;
        registry.register(
            HUGGINGFACE_KIND,
            Arc::new(|ctx| {
                Ok(Box::new(HuggingFaceAdapter::new(ctx)?) as Box<dyn TranslationAdapter>)
            }),
        )?;
        Ok(registry)
    }

    /// Register a constructor under a unique adapter kind name.
    ///
    /// Takes `&mut self`: registration happens during startup, before the
    /// registry is wrapped in an `Arc` and requests start flowing.
    pub fn register(&mut self, kind: impl Into<String>, ctor: AdapterConstructor) -> Result<()> {
        let kind = kind.into();
        if self.constructors.contains_key(&kind) {
            return Err(Error::DuplicateRegistration(kind));
        }
        debug!("Registered adapter kind '{kind}'");
        self.constructors.insert(kind, ctor);
        Ok(())
    }

    /// Registered adapter kind names.
    pub fn kinds(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Names of logical models with a ready (fully set-up) instance, sorted.
    pub fn loaded(&self) -> Vec<String> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Resolve a logical model name to its adapter instance, building and
    /// caching it on first use.
    ///
    /// Construction is serialized per name: concurrent first-callers share
    /// one build (exactly one constructor/`setup()` run) and all observe its
    /// outcome. Failed builds are not cached.
    pub async fn resolve(&self, name: &str) -> Result<SharedAdapter> {
        let build = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            match slots.get(name) {
                Some(Slot::Ready(adapter)) => return Ok(Arc::clone(adapter)),
                Some(Slot::Building(build)) => build.clone(),
                None => {
                    let build = self.start_build(name)?;
                    slots.insert(name.to_string(), Slot::Building(build.clone()));
                    build
                }
            }
        };

        // Await outside the lock; other names resolve in parallel.
        let result = build.clone().await;

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match result {
            Ok(adapter) => {
                slots.insert(name.to_string(), Slot::Ready(Arc::clone(&adapter)));
                Ok(adapter)
            }
            Err(e) => {
                // Clear the slot so a later request can retry, but only if it
                // still holds this build (a retry may already be underway).
                if let Some(Slot::Building(current)) = slots.get(name)
                    && current.ptr_eq(&build)
                {
                    slots.remove(name);
                }
                Err(e)
            }
        }
    }

    /// Look up config and constructor for `name` and start its build future.
    fn start_build(&self, name: &str) -> Result<BuildFuture> {
        let model = self
            .config
            .model(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let ctor = self
            .constructors
            .get(&model.adapter)
            .ok_or_else(|| Error::UnknownAdapter {
                model: name.to_string(),
                kind: model.adapter.clone(),
            })?
            .clone();

        let ctx = AdapterContext {
            name: name.to_string(),
            params: model.params.clone(),
            huggingface: self.config.huggingface.clone(),
        };
        let name = name.to_string();

        Ok(async move {
            info!("Building adapter for model '{name}'");
            let mut adapter = ctor(ctx).map_err(|e| classify_setup(&name, e))?;
            adapter
                .setup()
                .await
                .map_err(|e| classify_setup(&name, e))?;
            info!("Model '{name}' is ready");
            let adapter: SharedAdapter = Arc::from(adapter);
            Ok(adapter)
        }
        .boxed()
        .shared())
    }
}

/// Keep already-classified errors; wrap anything else as a setup failure
/// annotated with the logical model name.
fn classify_setup(name: &str, e: Error) -> Error {
    if e.is_classified() {
        e
    } else {
        Error::setup(name, e.to_string())
    }
}
