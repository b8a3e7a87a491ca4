//! Ollama provider: `/api/generate` (buffered and NDJSON streaming) and
//! `/api/embeddings`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::GenerateRequest;
use crate::core::config::OllamaConfig;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
    embed_client: Client,
    /// No overall timeout; a generation stream may legitimately run long.
    stream_client: Client,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.generate_timeout_secs))
            .build()
            .map_err(ApiError::internal)?;
        let embed_client = Client::builder()
            .timeout(Duration::from_secs(config.embed_timeout_secs))
            .build()
            .map_err(ApiError::internal)?;
        let stream_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            embed_client,
            stream_client,
        })
    }

    fn generate_body(request: &GenerateRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": stream,
        });
        if let Some(obj) = body.as_object_mut() {
            if request.json_format {
                obj.insert("format".to_string(), json!("json"));
            }
            if let Some(t) = request.temperature {
                obj.insert("options".to_string(), json!({ "temperature": t }));
            }
        }
        body
    }
}

/// One NDJSON line of an Ollama generation stream.
#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

/// Parse a single stream line. Returns `None` for blank or malformed lines,
/// which callers skip without aborting the stream.
fn parse_stream_line(line: &str) -> Option<StreamLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamLine>(line) {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Skipping non-JSON stream line ({} bytes)", line.len());
            None
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String, ApiError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = Self::generate_body(&request, false);

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "generate failed with {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;
        let response = payload
            .get("response")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ApiError::Upstream("generate response missing field".to_string()))?;

        Ok(response.trim().to_string())
    }

    async fn stream_generate(
        &self,
        request: GenerateRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = Self::generate_body(&request, true);

        let res = self
            .stream_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "stream failed with {}: {}",
                status, text
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            // NDJSON lines can be split across transport chunks.
            let mut buffer = String::new();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = buffer.find('\n') {
                            let line: String = buffer.drain(..=pos).collect();
                            let Some(parsed) = parse_stream_line(&line) else {
                                continue;
                            };
                            if let Some(token) = parsed.response {
                                if !token.is_empty() && tx.send(Ok(token)).await.is_err() {
                                    // Receiver dropped: client disconnected.
                                    return;
                                }
                            }
                            if parsed.done {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(ApiError::upstream(err))).await;
                        return;
                    }
                }
            }
            // Stream ended without a done flag; trailing partial line is noise.
            if let Some(parsed) = parse_stream_line(&buffer) {
                if let Some(token) = parsed.response {
                    if !token.is_empty() {
                        let _ = tx.send(Ok(token)).await;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, ApiError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = json!({ "model": model, "prompt": text });

        let res = self
            .embed_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "embed failed with {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;
        let embedding = payload
            .get("embedding")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ApiError::Upstream("embed response missing field".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        Ok(embedding)
    }
}
