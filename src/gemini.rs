//! Client for the generative language `generateContent` endpoint.
//!
//! The API key travels in the `key` query parameter of every request and is
//! never attached to follow-up downloads of hosted images.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine;
use base64::engine::general_purpose;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::backend::{EncodedImage, ImageBackend, TextBackend};
use crate::config::{GenerationParams, PipelineConfig};
use crate::decode::{ImagePayload, decode_base64, decode_image_response};
use crate::error::{RemoteError, SynthesisError};
use crate::model::ReferenceImage;

// -----------------------------
// Request bodies
// -----------------------------

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    Inline {
        inline_data: InlineData,
    },
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<[&'static str; 2]>,
}

impl From<&GenerationParams> for GenerationConfig {
    fn from(params: &GenerationParams) -> Self {
        Self {
            temperature: Some(params.temperature),
            top_k: Some(params.top_k),
            top_p: Some(params.top_p),
            max_output_tokens: Some(params.max_output_tokens),
            response_modalities: None,
        }
    }
}

// -----------------------------
// Text response
// -----------------------------

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Talks to the remote text and image models.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    text_model: String,
    image_model: String,
    debug_dir: Option<PathBuf>,
}

impl GeminiClient {
    /// Builds a client from pipeline configuration and a user-supplied key.
    pub fn new(config: &PipelineConfig, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            debug_dir: None,
        }
    }

    /// Saves every raw response body into `dir` for troubleshooting.
    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    fn endpoint(&self, model: &str) -> Result<Url, RemoteError> {
        Url::parse_with_params(
            &format!("{}/models/{}:generateContent", self.api_base, model),
            &[("key", self.api_key.as_str())],
        )
        .map_err(|err| RemoteError::InvalidResponse(format!("Bad endpoint URL: {err}")))
    }

    async fn post(
        &self,
        model: &str,
        body: &GenerateContentRequest<'_>,
        prefix: &str,
    ) -> Result<Vec<u8>, RemoteError> {
        let resp = self
            .client
            .post(self.endpoint(model)?)
            .json(body)
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.without_url()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| RemoteError::Transport(err.without_url()))?;
        self.write_api_response(prefix, &bytes);

        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).chars().take(512).collect(),
            });
        }
        Ok(bytes.to_vec())
    }

    fn write_api_response(&self, prefix: &str, bytes: &[u8]) {
        static API_RESPONSE_SEQ: AtomicUsize = AtomicUsize::new(0);
        let Some(dir) = self.debug_dir.as_deref() else {
            return;
        };
        let seq = API_RESPONSE_SEQ.fetch_add(1, Ordering::Relaxed);
        let ts = chrono::Utc::now().timestamp_millis();
        let path = dir.join(format!("debug_{prefix}_{ts}_{seq}.json"));
        if let Err(err) = write_debug_file(dir, &path, bytes) {
            warn!("Failed to save response to {}: {err}", path.display());
        } else {
            debug!("Response saved to {}", path.display());
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, SynthesisError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(RemoteError::Transport)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(RemoteError::Transport)?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: format!("image download from {url}"),
            }
            .into());
        }
        Ok(bytes.to_vec())
    }
}

fn write_debug_file(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(path, bytes)
}

/// Joins the text parts of a text response.
fn extract_text(bytes: &[u8]) -> Result<String, RemoteError> {
    let parsed: GenerateContentResponse = serde_json::from_slice(bytes)?;
    if let Some(err) = parsed.error {
        return Err(RemoteError::InvalidResponse(format!("API returned error: {err}")));
    }
    let text: String = parsed
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(RemoteError::Empty);
    }
    Ok(text)
}

impl TextBackend for GeminiClient {
    async fn generate_text(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, RemoteError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::Text { text: prompt }],
            }],
            generation_config: GenerationConfig::from(params),
        };
        let bytes = self.post(&self.text_model, &body, "text").await?;
        extract_text(&bytes)
    }
}

impl ImageBackend for GeminiClient {
    async fn generate_image(
        &self,
        prompt: &str,
        reference: Option<&ReferenceImage>,
    ) -> Result<EncodedImage, SynthesisError> {
        let mut parts = vec![Part::Text { text: prompt }];
        if let Some(reference) = reference {
            parts.push(Part::Inline {
                inline_data: InlineData {
                    mime_type: reference.mime_type.clone(),
                    data: general_purpose::STANDARD.encode(&reference.data),
                },
            });
        }
        let body = GenerateContentRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                temperature: Some(1.0),
                response_modalities: Some(["TEXT", "IMAGE"]),
                ..GenerationConfig::default()
            },
        };

        let bytes = self.post(&self.image_model, &body, "image").await?;
        let value: Value = serde_json::from_slice(&bytes).map_err(RemoteError::from)?;

        match decode_image_response(&value)? {
            ImagePayload::Url(url) => {
                debug!("Fetching hosted image");
                let bytes = self.download(&url).await?;
                Ok(EncodedImage {
                    mime_type: None,
                    bytes,
                })
            }
            ImagePayload::Inline { mime_type, data } => Ok(EncodedImage {
                mime_type,
                bytes: decode_base64(&data)?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_carries_key_in_query() {
        let config = PipelineConfig {
            api_base: "https://example.org/v1beta".to_string(),
            ..crate::testing::offline_config()
        };
        let client = GeminiClient::new(&config, "secret-key");
        let url = client.endpoint("gemini-test").expect("valid url");
        assert_eq!(url.path(), "/v1beta/models/gemini-test:generateContent");
        assert_eq!(url.query(), Some("key=secret-key"));
    }

    #[test]
    fn text_request_serialises_generation_params() {
        let params = GenerationParams::default();
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::Text { text: "hi" }],
            }],
            generation_config: GenerationConfig::from(&params),
        };
        let value = serde_json::to_value(&body).expect("serialise");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(value["generationConfig"]["topK"], 40);
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 2048);
        assert!(value["generationConfig"].get("responseModalities").is_none());
    }

    #[test]
    fn extract_text_joins_parts() {
        let body = br#"{"candidates":[{"content":{"parts":[{"text":"[{\"text\":"},{"text":"\"hi\"}]"}]}}]}"#;
        assert_eq!(extract_text(body).expect("text"), r#"[{"text":"hi"}]"#);
        assert!(matches!(
            extract_text(br#"{"candidates":[]}"#),
            Err(RemoteError::Empty)
        ));
        assert!(matches!(
            extract_text(b"<html>"),
            Err(RemoteError::InvalidResponse(_))
        ));
    }
}
