//! Embedder client: batched text -> vector calls against an
//! OpenAI-compatible `/embeddings` endpoint, with provider routing, bounded
//! retry, and a connection pool keyed by `(provider, credential)`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};

const HOSTED_OPEN_MODEL_URL: &str = "https://api.deepinfra.com/v1/openai/embeddings";
const FIRST_PARTY_CLOUD_URL: &str = "https://api.openai.com/v1/embeddings";

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(2);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Static lookup table for known models' vector dimensions. Unknown models
/// require the caller to supply a dimension at collection creation.
fn known_vector_sizes() -> &'static HashMap<&'static str, usize> {
    static SIZES: std::sync::OnceLock<HashMap<&'static str, usize>> = std::sync::OnceLock::new();
    SIZES.get_or_init(|| {
        HashMap::from([
            ("Qwen/Qwen3-Embedding-8B", 4096),
            ("BAAI/bge-large-en-v1.5", 1024),
            ("BAAI/bge-base-en-v1.5", 768),
            ("BAAI/bge-small-en-v1.5", 384),
            ("intfloat/e5-large-v2", 1024),
            ("intfloat/e5-base-v2", 768),
            ("sentence-transformers/all-MiniLM-L6-v2", 384),
            ("text-embedding-3-small", 1536),
            ("text-embedding-3-large", 3072),
            ("text-embedding-ada-002", 1536),
        ])
    })
}

/// Looks up the vector dimension for a known model, or `None` if the caller
/// must supply it explicitly.
pub fn vector_size_for_model(model: &str) -> Option<usize> {
    known_vector_sizes().get(model).copied()
}

/// A "/" in the model name routes to the hosted open-model provider;
/// anything else routes to the first-party cloud provider. Pure syntactic
/// rule, no other inference.
fn endpoint_for_model(model: &str) -> &'static str {
    if model.contains('/') {
        HOSTED_OPEN_MODEL_URL
    } else {
        FIRST_PARTY_CLOUD_URL
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
    model: &'a str,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

/// Batched embedding contract: input order in, equal-length output.
pub trait EmbeddingProvider: Send + Sync {
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = AppResult<Vec<Vec<f32>>>> + Send;
}

/// HTTP implementation of [`EmbeddingProvider`] against an OpenAI-compatible
/// `/embeddings` endpoint, bearer-authenticated, with exponential-backoff
/// retry on transient failures.
pub struct HttpEmbedder {
    client: reqwest::Client,
    model: String,
    endpoint: String,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, model: impl Into<String>) -> Self {
        let model = model.into();
        let endpoint = endpoint_for_model(&model).to_string();
        Self {
            client,
            model,
            endpoint,
        }
    }
}

impl EmbeddingProvider for HttpEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let body = EmbedRequest {
            input: texts,
            model: &self.model,
            encoding_format: "float",
        };

        let mut last_err: Option<AppError> = None;

        for attempt in 0..MAX_RETRIES {
            let result = self.client.post(&self.endpoint).json(&body).send().await;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        return Err(AppError::EmbedderAuth(format!(
                            "embedding provider returned {status}"
                        )));
                    }
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(AppError::EmbedderModelNotFound(self.model.clone()));
                    }
                    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        last_err = Some(AppError::EmbedderTransient(format!(
                            "embedding provider returned {status}"
                        )));
                    } else if !status.is_success() {
                        return Err(AppError::EmbedderTransient(format!(
                            "embedding provider returned {status}"
                        )));
                    } else {
                        let parsed: EmbedResponse = resp.json().await?;
                        return Ok(parsed.data.into_iter().map(|d| d.embedding).collect());
                    }
                }
                Err(err) => {
                    last_err = Some(AppError::EmbedderTransient(err.to_string()));
                }
            }

            if attempt + 1 < MAX_RETRIES {
                let wait = BASE_BACKOFF * 2u32.pow(attempt);
                warn!(
                    "embedding request failed (attempt {}/{}), retrying in {:?}: {:?}",
                    attempt + 1,
                    MAX_RETRIES,
                    wait,
                    last_err
                );
                tokio::time::sleep(wait).await;
            }
        }

        Err(last_err.unwrap_or_else(|| AppError::EmbedderTransient("exhausted retries".into())))
    }
}

/// Process-wide cache of embedder clients keyed by `(provider, credential
/// prefix)`, created lazily and not invalidated during the process lifetime.
/// Owned explicitly by the caller rather than a hidden global.
#[derive(Default)]
pub struct EmbedderPool {
    clients: DashMap<(String, String), Arc<reqwest::Client>>,
}

impl EmbedderPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn embedder_for(&self, model: &str, api_token: &str) -> AppResult<HttpEmbedder> {
        let provider = endpoint_for_model(model).to_string();
        let credential_prefix: String = api_token.chars().take(8).collect();
        let key = (provider, credential_prefix);

        let client = self
            .clients
            .entry(key)
            .or_try_insert_with(|| build_client(api_token).map(Arc::new))?
            .clone();

        Ok(HttpEmbedder::new((*client).clone(), model))
    }
}

fn build_client(api_token: &str) -> AppResult<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_token}"))
        .map_err(|e| AppError::Config(format!("invalid api token: {e}")))?;
    auth.set_sensitive(true);
    headers.insert(reqwest::header::AUTHORIZATION, auth);
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(READ_TIMEOUT)
        .build()
        .map_err(AppError::from)
}
