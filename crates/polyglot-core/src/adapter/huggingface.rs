use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use super::{AdapterContext, TranslationAdapter};
use crate::error::{Error, Result};
use crate::params::Params;

/// Default number of retry attempts for inference requests
pub const DEFAULT_RETRY_COUNT: u64 = 3;
/// Default delay between retries in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
/// Default endpoint for local-path models (a TGI/llama.cpp-style server)
const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:8080";

/// Where the model weights live.
#[derive(Debug, Clone)]
enum ModelSource {
    /// Local directory with a converted/downloaded model. Resolution is
    /// offline and authentication is never attempted.
    Local(PathBuf),
    /// Remote hub repo id, e.g. `Helsinki-NLP/opus-mt-en-es`.
    Hub(String),
}

/// HuggingFace-backed adapter.
///
/// Supported params:
///   - `model_id`: hub repo id (remote), or
///   - `model_path`: local model directory (offline, no authentication)
///   - `endpoint`: inference server base URL (defaults to the hosted
///     inference API for hub models, `http://localhost:8080` for local ones)
///   - `token`: access token (request-level overrides win via the merge)
///   - `revision`: hub revision to validate against
///   - generation: `max_new_tokens`, `num_beams`, `do_sample`, `temperature`,
///     `src_lang`, `tgt_lang`
///   - `retry_count`, `retry_delay_ms`
///
/// `setup` validates the model source: a local path is checked on disk, a hub
/// id is checked against the hub metadata API with the resolved token, which
/// is where gated/private repos and rejected tokens surface. `translate`
/// posts to the inference endpoint with merged generation parameters.
#[derive(Debug)]
pub struct HuggingFaceAdapter {
    client: Client,
    /// Logical model name, used to annotate errors.
    name: String,
    source: ModelSource,
    endpoint: String,
    hub: String,
    /// Token resolved from model config, global config, then environment.
    /// Always `None` for local-path models.
    configured_token: Option<String>,
    revision: Option<String>,
    strict_auth: bool,
    retry_count: u64,
    retry_delay_ms: u64,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
    options: InferenceOptions,
}

#[derive(Debug, Default, PartialEq, Serialize)]
struct GenerationParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_new_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_beams: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    do_sample: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    src_lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tgt_lang: Option<String>,
}

#[derive(Debug, Serialize)]
struct InferenceOptions {
    wait_for_model: bool,
}

/// The hosted API answers with `translation_text` for translation pipelines
/// and `generated_text` for text2text ones; local servers vary too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceOutput {
    Translation { translation_text: String },
    Generated { generated_text: String },
}

impl InferenceOutput {
    fn into_text(self) -> String {
        match self {
            Self::Translation { translation_text } => translation_text,
            Self::Generated { generated_text } => generated_text,
        }
    }
}

/// Subset of the hub's model metadata we care about during setup.
#[derive(Debug, Deserialize)]
struct ModelInfo {
    #[serde(default)]
    gated: serde_json::Value,
    #[serde(default)]
    private: bool,
}

impl ModelInfo {
    /// The hub reports `gated` as `false` or a mode string ("auto"/"manual").
    fn requires_token(&self) -> bool {
        self.private
            || match &self.gated {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::String(_) => true,
                _ => false,
            }
    }
}

impl HuggingFaceAdapter {
    pub fn new(ctx: AdapterContext) -> Result<Self> {
        let source = match (ctx.params.get_str("model_path"), ctx.params.get_str("model_id")) {
            (Some(path), _) => ModelSource::Local(PathBuf::from(path)),
            (None, Some(id)) => ModelSource::Hub(id.to_string()),
            (None, None) => {
                return Err(Error::setup(
                    &ctx.name,
                    "provide either 'model_id' (hub) or 'model_path' (local)",
                ));
            }
        };

        // Local models are resolved offline; tokens are ignored entirely.
        let configured_token = match source {
            ModelSource::Local(_) => None,
            ModelSource::Hub(_) => ctx
                .params
                .get_str("token")
                .map(str::to_string)
                .or_else(|| ctx.huggingface.resolved_token()),
        };

        let endpoint = ctx
            .params
            .get_str("endpoint")
            .map_or_else(
                || match source {
                    ModelSource::Local(_) => DEFAULT_LOCAL_ENDPOINT.to_string(),
                    ModelSource::Hub(_) => ctx.huggingface.endpoint.clone(),
                },
                str::to_string,
            );

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::setup(&ctx.name, format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            name: ctx.name,
            source,
            endpoint,
            hub: ctx.huggingface.hub.clone(),
            configured_token,
            revision: ctx.params.get_str("revision").map(str::to_string),
            strict_auth: ctx.huggingface.strict_auth,
            retry_count: ctx
                .params
                .get_u64("retry_count")
                .unwrap_or(DEFAULT_RETRY_COUNT)
                .max(1),
            retry_delay_ms: ctx
                .params
                .get_u64("retry_delay_ms")
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
        })
    }

    /// Token to authenticate a translate call with.
    ///
    /// Request-merged params win over the configured fallback chain; local
    /// models never authenticate, whatever the request supplies.
    fn auth_token(&self, params: &Params) -> Option<String> {
        match self.source {
            ModelSource::Local(_) => None,
            ModelSource::Hub(_) => params
                .get_str("token")
                .map(str::to_string)
                .or_else(|| self.configured_token.clone()),
        }
    }

    /// Inference URL for this model.
    fn inference_url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        match &self.source {
            // A local server is already bound to one model.
            ModelSource::Local(_) => base.to_string(),
            ModelSource::Hub(id) => format!("{base}/models/{id}"),
        }
    }

    /// Extract generation parameters from the merged parameter bag.
    fn generation_parameters(params: &Params) -> GenerationParameters {
        GenerationParameters {
            max_new_tokens: params.get_u64("max_new_tokens"),
            num_beams: params.get_u64("num_beams"),
            do_sample: params.get_bool("do_sample"),
            temperature: params.get_f64("temperature"),
            src_lang: params.get_str("src_lang").map(str::to_string),
            tgt_lang: params.get_str("tgt_lang").map(str::to_string),
        }
    }

    /// Verify a local model directory without touching the network.
    fn setup_local(&self, path: &std::path::Path) -> Result<()> {
        if !path.is_dir() {
            return Err(Error::setup(
                &self.name,
                format!(
                    "'model_path' must be an existing directory: {}",
                    path.display()
                ),
            ));
        }
        if !path.join("config.json").is_file() {
            return Err(Error::setup(
                &self.name,
                format!("no config.json in model directory {}", path.display()),
            ));
        }
        debug!("Resolved local model directory {}", path.display());
        Ok(())
    }

    /// Validate a hub repo id against the hub metadata API.
    ///
    /// This is where authentication problems surface at setup time:
    /// - 401 with a token: the token was rejected - hard failure under strict
    ///   auth, anonymous retry otherwise
    /// - 401/403 without a token: the repo requires authentication
    /// - 404: no such repo
    async fn setup_hub(&self, id: &str) -> Result<()> {
        let revision = self.revision.as_deref().unwrap_or("main");
        let url = format!(
            "{}/api/models/{id}/revision/{revision}",
            self.hub.trim_end_matches('/')
        );

        let info = self.fetch_model_info(&url, self.configured_token.as_deref()).await;
        let info = match info {
            Err(Error::Auth { .. })
                if self.configured_token.is_some() && !self.strict_auth =>
            {
                // Non-strict mode: the provided token was rejected, fall back
                // to anonymous access for public repos.
                warn!(
                    "[{}] token rejected for '{id}', retrying anonymously (strict_auth off)",
                    self.name
                );
                self.fetch_model_info(&url, None).await?
            }
            other => other?,
        };

        if info.requires_token() && self.configured_token.is_none() && self.strict_auth {
            return Err(Error::auth(
                &self.name,
                format!("model '{id}' is gated and no access token could be resolved"),
            ));
        }

        debug!("Resolved hub model '{id}'");
        Ok(())
    }

    async fn fetch_model_info(&self, url: &str, token: Option<&str>) -> Result<ModelInfo> {
        let mut req = self.client.get(url);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::setup(&self.name, format!("hub request failed: {e}")))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                if token.is_some() {
                    Err(Error::auth(
                        &self.name,
                        "authentication failed with the provided token".to_string(),
                    ))
                } else {
                    Err(Error::auth(
                        &self.name,
                        "model requires authentication and no token could be resolved"
                            .to_string(),
                    ))
                }
            }
            StatusCode::NOT_FOUND => Err(Error::setup(
                &self.name,
                "model not found on the hub (404)".to_string(),
            )),
            status if status.is_success() => response
                .json::<ModelInfo>()
                .await
                .map_err(|e| Error::setup(&self.name, format!("invalid hub response: {e}"))),
            status => Err(Error::setup(
                &self.name,
                format!("hub returned HTTP {status}"),
            )),
        }
    }

    async fn request_with_retry(&self, text: &str, params: &Params) -> Result<String> {
        let url = self.inference_url();
        let request = InferenceRequest {
            inputs: text,
            parameters: Self::generation_parameters(params),
            options: InferenceOptions {
                wait_for_model: true,
            },
        };

        let mut token = self.auth_token(params);
        let mut last_error = None;

        for attempt in 0..self.retry_count {
            debug!(
                "[{}] inference attempt {}/{} to {url}",
                self.name,
                attempt + 1,
                self.retry_count
            );

            let mut req = self.client.post(&url).json(&request);
            if let Some(ref t) = token {
                req = req.bearer_auth(t);
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let outputs = response
                            .json::<Vec<InferenceOutput>>()
                            .await
                            .map_err(|e| {
                                Error::translate(
                                    &self.name,
                                    format!("invalid inference response: {e}"),
                                )
                            })?;
                        return outputs.into_iter().next().map(InferenceOutput::into_text).ok_or_else(
                            || Error::translate(&self.name, "empty inference response".to_string()),
                        );
                    } else if status == StatusCode::UNAUTHORIZED
                        || status == StatusCode::FORBIDDEN
                    {
                        if token.is_some() {
                            if self.strict_auth {
                                // No silent anonymous fallback when a token
                                // was supplied and rejected.
                                return Err(Error::auth(
                                    &self.name,
                                    "authentication failed with the provided token".to_string(),
                                ));
                            }
                            warn!("[{}] token rejected, retrying anonymously", self.name);
                            token = None;
                            continue;
                        }
                        return Err(Error::auth(
                            &self.name,
                            "model requires authentication and no token could be resolved"
                                .to_string(),
                        ));
                    } else if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse().ok());

                        warn!("[{}] rate limited, retry after {retry_after:?}s", self.name);
                        last_error =
                            Some(Error::translate(&self.name, "rate limited".to_string()));

                        tokio::time::sleep(Duration::from_millis(backoff_millis(retry_after)))
                            .await;
                        continue;
                    } else if status == StatusCode::SERVICE_UNAVAILABLE {
                        // The hosted API answers 503 while the model loads.
                        warn!("[{}] model still loading, retrying", self.name);
                        last_error = Some(Error::translate(
                            &self.name,
                            "model is still loading".to_string(),
                        ));
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        warn!("[{}] inference error: {status} - {body}", self.name);
                        last_error = Some(Error::translate(
                            &self.name,
                            format!("inference request failed: HTTP {status}: {body}"),
                        ));
                    }
                }
                Err(e) => {
                    warn!("[{}] request failed: {e}", self.name);
                    let reason = if e.is_timeout() {
                        "inference request timed out".to_string()
                    } else {
                        format!("inference request failed: {e}")
                    };
                    last_error = Some(Error::translate(&self.name, reason));
                }
            }

            if attempt < self.retry_count - 1 {
                tokio::time::sleep(Duration::from_millis(self.retry_delay_ms)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::translate(
                &self.name,
                format!("translation failed after {} attempts", self.retry_count),
            )
        }))
    }
}

/// Backoff after a 429, honoring `retry-after` but capped so a garbage header
/// cannot stall the retry loop or overflow the conversion to milliseconds.
fn backoff_millis(retry_after: Option<u64>) -> u64 {
    retry_after.unwrap_or(5).min(60) * 1000
}

#[async_trait]
impl TranslationAdapter for HuggingFaceAdapter {
    fn kind(&self) -> &'static str {
        super::HUGGINGFACE_KIND
    }

    async fn setup(&mut self) -> Result<()> {
        match self.source.clone() {
            ModelSource::Local(path) => self.setup_local(&path),
            ModelSource::Hub(id) => self.setup_hub(&id).await,
        }
    }

    async fn translate(&self, text: &str, params: &Params) -> Result<String> {
        self.request_with_retry(text, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HuggingFaceConfig;
    use axum::Router;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use serde_json::json;

    /// Spin up a throwaway HTTP server and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    fn ctx(pairs: &[(&str, serde_json::Value)], hf: HuggingFaceConfig) -> AdapterContext {
        AdapterContext {
            name: "test-model".to_string(),
            params: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            huggingface: hf,
        }
    }

    #[test]
    fn requires_model_id_or_model_path() {
        let err = HuggingFaceAdapter::new(ctx(&[], HuggingFaceConfig::default())).unwrap_err();
        assert!(matches!(err, Error::Setup { .. }));
        assert!(err.to_string().contains("model_id"));
    }

    #[test]
    fn local_models_ignore_all_tokens() {
        let hf = HuggingFaceConfig {
            token: Some("hf_global".to_string()),
            ..Default::default()
        };
        let adapter = HuggingFaceAdapter::new(ctx(
            &[
                ("model_path", json!("/models/opus-en-es")),
                ("token", json!("hf_configured")),
            ],
            hf,
        ))
        .unwrap();

        let mut request = Params::new();
        request.insert("token", json!("hf_request"));
        assert_eq!(adapter.auth_token(&request), None);
        assert_eq!(adapter.configured_token, None);
    }

    #[test]
    fn request_token_wins_over_configured_and_global() {
        let hf = HuggingFaceConfig {
            token: Some("hf_global".to_string()),
            ..Default::default()
        };
        let adapter = HuggingFaceAdapter::new(ctx(
            &[
                ("model_id", json!("org/model")),
                ("token", json!("hf_model")),
            ],
            hf,
        ))
        .unwrap();
        assert_eq!(adapter.configured_token.as_deref(), Some("hf_model"));

        let mut request = Params::new();
        request.insert("token", json!("hf_request"));
        assert_eq!(adapter.auth_token(&request).as_deref(), Some("hf_request"));
        assert_eq!(
            adapter.auth_token(&Params::new()).as_deref(),
            Some("hf_model")
        );
    }

    #[test]
    fn global_token_is_the_fallback_for_hub_models() {
        let hf = HuggingFaceConfig {
            token: Some("hf_global".to_string()),
            ..Default::default()
        };
        let adapter =
            HuggingFaceAdapter::new(ctx(&[("model_id", json!("org/model"))], hf)).unwrap();
        assert_eq!(
            adapter.auth_token(&Params::new()).as_deref(),
            Some("hf_global")
        );
    }

    #[test]
    fn inference_url_for_hub_and_local() {
        let adapter = HuggingFaceAdapter::new(ctx(
            &[("model_id", json!("Helsinki-NLP/opus-mt-en-es"))],
            HuggingFaceConfig::default(),
        ))
        .unwrap();
        assert_eq!(
            adapter.inference_url(),
            "https://api-inference.huggingface.co/models/Helsinki-NLP/opus-mt-en-es"
        );

        let adapter = HuggingFaceAdapter::new(ctx(
            &[
                ("model_path", json!("/models/opus")),
                ("endpoint", json!("http://localhost:9000/")),
            ],
            HuggingFaceConfig::default(),
        ))
        .unwrap();
        assert_eq!(adapter.inference_url(), "http://localhost:9000");
    }

    #[test]
    fn extracts_generation_parameters() {
        let params: Params = [
            ("max_new_tokens".to_string(), json!(64)),
            ("num_beams".to_string(), json!(4)),
            ("do_sample".to_string(), json!(false)),
            ("src_lang".to_string(), json!("spa_Latn")),
            ("tgt_lang".to_string(), json!("eng_Latn")),
            ("unrelated".to_string(), json!("passes through elsewhere")),
        ]
        .into_iter()
        .collect();

        let generation = HuggingFaceAdapter::generation_parameters(&params);
        assert_eq!(
            generation,
            GenerationParameters {
                max_new_tokens: Some(64),
                num_beams: Some(4),
                do_sample: Some(false),
                temperature: None,
                src_lang: Some("spa_Latn".to_string()),
                tgt_lang: Some("eng_Latn".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn setup_fails_for_missing_local_directory() {
        let mut adapter = HuggingFaceAdapter::new(ctx(
            &[("model_path", json!("/definitely/not/a/model"))],
            HuggingFaceConfig::default(),
        ))
        .unwrap();
        let err = adapter.setup().await.unwrap_err();
        assert!(matches!(err, Error::Setup { .. }));
        assert!(err.to_string().starts_with("[test-model]"));
    }

    #[tokio::test]
    async fn setup_accepts_a_local_model_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();

        let mut adapter = HuggingFaceAdapter::new(ctx(
            &[("model_path", json!(dir.path().to_str().unwrap()))],
            HuggingFaceConfig::default(),
        ))
        .unwrap();
        adapter.setup().await.unwrap();
    }

    #[tokio::test]
    async fn strict_auth_fails_hard_when_the_supplied_token_is_rejected() {
        let hub = serve(Router::new().fallback(|| async { StatusCode::UNAUTHORIZED })).await;
        let hf = HuggingFaceConfig {
            token: Some("hf_bad".to_string()),
            hub,
            ..Default::default()
        };
        let mut adapter =
            HuggingFaceAdapter::new(ctx(&[("model_id", json!("org/model"))], hf)).unwrap();

        let err = adapter.setup().await.unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
        assert_eq!(
            err.to_string(),
            "[test-model] authentication failed with the provided token"
        );
    }

    #[tokio::test]
    async fn gated_model_without_a_token_is_an_auth_error_under_strict_auth() {
        let hub = serve(Router::new().fallback(|| async {
            axum::Json(json!({"gated": "auto", "private": false}))
        }))
        .await;
        let hf = HuggingFaceConfig {
            hub,
            ..Default::default()
        };
        let mut adapter =
            HuggingFaceAdapter::new(ctx(&[("model_id", json!("org/gated"))], hf)).unwrap();

        let err = adapter.setup().await.unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
        assert!(err.to_string().contains("gated"));
    }

    #[tokio::test]
    async fn rejected_token_falls_back_to_anonymous_when_strict_auth_is_off() {
        // 401 whenever credentials are presented, public metadata otherwise.
        async fn meta(headers: HeaderMap) -> axum::response::Response {
            if headers.contains_key("authorization") {
                StatusCode::UNAUTHORIZED.into_response()
            } else {
                axum::Json(json!({"gated": false, "private": false})).into_response()
            }
        }
        let hub = serve(Router::new().fallback(meta)).await;
        let hf = HuggingFaceConfig {
            token: Some("hf_stale".to_string()),
            strict_auth: false,
            hub,
            ..Default::default()
        };
        let mut adapter =
            HuggingFaceAdapter::new(ctx(&[("model_id", json!("org/public"))], hf)).unwrap();

        adapter.setup().await.unwrap();
    }

    #[tokio::test]
    async fn a_bad_request_token_under_strict_auth_never_falls_back_to_anonymous() {
        let endpoint = serve(Router::new().fallback(|| async { StatusCode::UNAUTHORIZED })).await;
        let adapter = HuggingFaceAdapter::new(ctx(
            &[
                ("model_id", json!("org/model")),
                ("endpoint", json!(endpoint)),
            ],
            HuggingFaceConfig::default(),
        ))
        .unwrap();

        let mut request = Params::new();
        request.insert("token", json!("hf_bad"));
        let err = adapter.translate("hola", &request).await.unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
        assert_eq!(
            err.to_string(),
            "[test-model] authentication failed with the provided token"
        );
    }

    #[test]
    fn retry_backoff_is_capped() {
        assert_eq!(backoff_millis(None), 5_000);
        assert_eq!(backoff_millis(Some(2)), 2_000);
        assert_eq!(backoff_millis(Some(u64::MAX)), 60_000);
    }

    #[tokio::test]
    async fn setup_rejects_local_directory_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = HuggingFaceAdapter::new(ctx(
            &[("model_path", json!(dir.path().to_str().unwrap()))],
            HuggingFaceConfig::default(),
        ))
        .unwrap();
        let err = adapter.setup().await.unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }
}
