//! Integration tests for polyglot-core
//!
//! These tests verify the end-to-end behavior of the registry and dispatcher:
//! - at-most-once adapter construction under concurrent first use
//! - independence of builds for distinct model names
//! - retry after failed construction (no permanent poisoning)
//! - parameter merging across all three layers

use async_trait::async_trait;
use polyglot_core::{
    AdapterContext, AdapterRegistry, Error, GlobalConfig, Params, TranslateRequest,
    TranslationAdapter, TranslationService,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

// =============================================================================
// Scripted adapter for testing
// =============================================================================

/// Shared script controlling how constructed adapters behave.
#[derive(Debug, Default)]
struct Script {
    /// Number of `setup()` invocations observed, across all instances.
    setups: AtomicUsize,
    /// How many initial `setup()` calls should fail.
    fail_setups: AtomicUsize,
    /// When present, `setup()` for the named model blocks until a permit is
    /// added; other models are unaffected.
    hold: Option<(String, Arc<Semaphore>)>,
}

#[derive(Debug)]
struct ScriptedAdapter {
    name: String,
    script: Arc<Script>,
}

#[async_trait]
impl TranslationAdapter for ScriptedAdapter {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    async fn setup(&mut self) -> polyglot_core::Result<()> {
        self.script.setups.fetch_add(1, Ordering::SeqCst);

        if let Some((held_model, hold)) = &self.script.hold
            && *held_model == self.name
        {
            let permit = hold
                .acquire()
                .await
                .map_err(|_| Error::setup(&self.name, "hold semaphore closed"))?;
            permit.forget();
        }

        let remaining = self.script.fail_setups.load(Ordering::SeqCst);
        if remaining > 0 {
            self.script.fail_setups.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::setup(&self.name, "scripted setup failure"));
        }
        Ok(())
    }

    async fn translate(&self, text: &str, params: &Params) -> polyglot_core::Result<String> {
        // Echo the effective token budget so merge precedence is observable.
        let budget = params.get_u64("max_new_tokens").unwrap_or(0);
        Ok(format!("[{}:{}] {}", self.name, budget, text))
    }
}

fn config(toml: &str) -> Arc<GlobalConfig> {
    Arc::new(GlobalConfig::from_toml_str(toml).unwrap())
}

fn scripted_registry(config: Arc<GlobalConfig>, script: Arc<Script>) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new(config);
    registry
        .register(
            "scripted",
            Arc::new(move |ctx: AdapterContext| {
                Ok(Box::new(ScriptedAdapter {
                    name: ctx.name,
                    script: Arc::clone(&script),
                }) as Box<dyn TranslationAdapter>)
            }),
        )
        .unwrap();
    registry
}

const TWO_MODELS: &str = r#"
    [models.m1]
    adapter = "scripted"
    [models.m2]
    adapter = "scripted"
"#;

// =============================================================================
// Registry concurrency properties
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_first_use_constructs_exactly_once() {
    let script = Arc::new(Script::default());
    let registry = Arc::new(scripted_registry(config(TWO_MODELS), Arc::clone(&script)));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move { registry.resolve("m1").await }));
    }

    let mut instances = Vec::new();
    for handle in handles {
        instances.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(script.setups.load(Ordering::SeqCst), 1);
    for instance in &instances[1..] {
        assert!(Arc::ptr_eq(&instances[0], instance));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn a_blocked_build_does_not_delay_other_models() {
    let hold = Arc::new(Semaphore::new(0));
    let script = Arc::new(Script {
        hold: Some(("m1".to_string(), Arc::clone(&hold))),
        ..Default::default()
    });
    let registry = Arc::new(scripted_registry(config(TWO_MODELS), Arc::clone(&script)));

    // Start building m1; its setup blocks on the semaphore.
    let blocked = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.resolve("m1").await })
    };

    // Wait until m1's setup has actually started.
    while script.setups.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // m2 must resolve while m1 is still building.
    let resolved = tokio::time::timeout(Duration::from_secs(1), registry.resolve("m2")).await;
    assert!(resolved.expect("m2 blocked behind m1's build").is_ok());

    // Unblock m1 and let it finish.
    hold.add_permits(1);
    blocked.await.unwrap().unwrap();
    assert_eq!(script.setups.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_waiters_observe_the_same_failure_and_later_calls_retry() {
    let hold = Arc::new(Semaphore::new(0));
    let script = Arc::new(Script {
        fail_setups: AtomicUsize::new(1),
        hold: Some(("m1".to_string(), Arc::clone(&hold))),
        ..Default::default()
    });
    let registry = Arc::new(scripted_registry(config(TWO_MODELS), Arc::clone(&script)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move { registry.resolve("m1").await }));
    }

    // All eight callers share one build; one permit releases it.
    while script.setups.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    hold.add_permits(1);

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Setup { .. }));
        assert_eq!(err.to_string(), "[m1] scripted setup failure");
    }
    assert_eq!(script.setups.load(Ordering::SeqCst), 1);

    // The failure was not cached: the next call retries and succeeds.
    hold.add_permits(1);
    registry.resolve("m1").await.unwrap();
    assert_eq!(script.setups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn repeated_resolution_is_identity_stable() {
    let script = Arc::new(Script::default());
    let registry = scripted_registry(config(TWO_MODELS), Arc::clone(&script));

    let first = registry.resolve("m1").await.unwrap();
    for _ in 0..5 {
        let again = registry.resolve("m1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
    assert_eq!(script.setups.load(Ordering::SeqCst), 1);
    assert_eq!(registry.loaded(), vec!["m1"]);
}

// =============================================================================
// Dispatcher over a scripted registry
// =============================================================================

const LAYERED: &str = r#"
    [defaults]
    model = "m1"
    [defaults.generation]
    max_new_tokens = 256

    [models.m1]
    adapter = "scripted"
    [models.m1.params]
    max_new_tokens = 128

    [models.m2]
    adapter = "scripted"
"#;

fn layered_service() -> TranslationService {
    let config = config(LAYERED);
    let registry = scripted_registry(Arc::clone(&config), Arc::new(Script::default()));
    TranslationService::with_registry(config, registry).unwrap()
}

#[tokio::test]
async fn request_params_override_model_params_override_defaults() {
    let svc = layered_service();

    let mut params = Params::new();
    params.insert("max_new_tokens", serde_json::json!(64));
    let result = svc
        .translate(&TranslateRequest {
            text: "hola".to_string(),
            model: Some("m1".to_string()),
            params: Some(params),
        })
        .await
        .unwrap();
    assert_eq!(result.output, "[m1:64] hola");

    // Without a request override the model config wins.
    let result = svc
        .translate(&TranslateRequest {
            text: "hola".to_string(),
            model: Some("m1".to_string()),
            params: None,
        })
        .await
        .unwrap();
    assert_eq!(result.output, "[m1:128] hola");

    // A model with no override falls back to the global default.
    let result = svc
        .translate(&TranslateRequest {
            text: "hola".to_string(),
            model: Some("m2".to_string()),
            params: None,
        })
        .await
        .unwrap();
    assert_eq!(result.output, "[m2:256] hola");
}

#[tokio::test]
async fn dispatcher_reports_the_adapter_kind_of_the_serving_model() {
    let svc = layered_service();
    let result = svc
        .translate(&TranslateRequest {
            text: "hola".to_string(),
            model: None,
            params: None,
        })
        .await
        .unwrap();
    assert_eq!(result.model, "m1");
    assert_eq!(result.adapter, "scripted");
}

#[tokio::test]
async fn setup_failures_surface_as_classified_errors_with_model_name() {
    let config = config(LAYERED);
    let script = Arc::new(Script {
        fail_setups: AtomicUsize::new(1),
        ..Default::default()
    });
    let registry = scripted_registry(Arc::clone(&config), script);
    let svc = TranslationService::with_registry(config, registry).unwrap();

    let err = svc
        .translate(&TranslateRequest {
            text: "hola".to_string(),
            model: Some("m1".to_string()),
            params: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Setup { .. }));
    assert!(err.to_string().starts_with("[m1]"));

    // The dispatcher never caches the failure either: retry works.
    svc.translate(&TranslateRequest {
        text: "hola".to_string(),
        model: Some("m1".to_string()),
        params: None,
    })
    .await
    .unwrap();
}
