use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;

// ── Error type ───────────────────────────────────────────────────────────────

/// Failures from the generation model. Display strings carry the provider's
/// reason verbatim so the caller can match on markers like `SAFETY`.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("RequestError: {0}")]
    Request(String),
    #[error("Gemini returned {status}: {body}")]
    Upstream {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("prompt blocked: {0}")]
    PromptBlocked(String),
    #[error("generation stopped: {0}")]
    CandidateBlocked(String),
    #[error("no text in model response")]
    EmptyResponse,
}

// ── Model seam ───────────────────────────────────────────────────────────────

/// Given an instruction plus an inline base64 image, return a description.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn describe_image(
        &self,
        instruction: &str,
        mime_type: &str,
        image_base64: &str,
    ) -> Result<String, ModelError>;
}

// ── Wire types (generateContent) ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData<'a>>,
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Gemini client. Constructed once at startup and injected into the router
/// state; holds its own connection pool for the process lifetime.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.gemini_base_url.trim_end_matches('/'),
            config.gemini_model
        );

        let client = reqwest::ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .unwrap();

        Self {
            endpoint,
            api_key: config.gemini_api_key.clone(),
            client,
        }
    }
}

#[async_trait]
impl VisionModel for GeminiClient {
    async fn describe_image(
        &self,
        instruction: &str,
        mime_type: &str,
        image_base64: &str,
    ) -> Result<String, ModelError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(instruction),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type,
                            data: image_base64,
                        }),
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(ModelError::Upstream { status, body });
        }

        extract_text(&body)
    }
}

/// Pull the first candidate's text out of a generateContent payload. A blocked
/// prompt or a candidate terminated early surfaces the provider reason.
fn extract_text(body: &str) -> Result<String, ModelError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ModelError::Request(format!("invalid response payload: {}", e)))?;

    if let Some(feedback) = parsed.prompt_feedback {
        if let Some(reason) = feedback.block_reason {
            return Err(ModelError::PromptBlocked(reason));
        }
    }

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or(ModelError::EmptyResponse)?;

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|t| !t.is_empty());

    match text {
        Some(t) => Ok(t),
        None => match candidate.finish_reason {
            Some(reason) if reason != "STOP" => Err(ModelError::CandidateBlocked(reason)),
            _ => Err(ModelError::EmptyResponse),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_candidate_text() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "Imagem de um gato."}]},
                "finishReason": "STOP"
            }]
        }"#;
        assert_eq!(extract_text(body).unwrap(), "Imagem de um gato.");
    }

    #[test]
    fn joins_multiple_text_parts() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "Imagem de "}, {"text": "uma praia."}]}
            }]
        }"#;
        assert_eq!(extract_text(body).unwrap(), "Imagem de uma praia.");
    }

    #[test]
    fn blocked_prompt_carries_reason_in_description() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}, "candidates": []}"#;
        let err = extract_text(body).unwrap_err();
        assert!(matches!(err, ModelError::PromptBlocked(_)));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn candidate_stopped_for_safety_carries_reason() {
        let body = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let err = extract_text(body).unwrap_err();
        assert!(matches!(err, ModelError::CandidateBlocked(_)));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn empty_payload_is_an_empty_response() {
        let err = extract_text("{}").unwrap_err();
        assert!(matches!(err, ModelError::EmptyResponse));
    }

    #[test]
    fn request_serializes_text_and_inline_data_parts() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some("descreva"),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: "image/jpeg",
                            data: "aGVsbG8=",
                        }),
                    },
                ],
            }],
        };

        let value = serde_json::to_value(&request).unwrap();
        let parts = &value["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "descreva");
        assert!(parts[0].get("inline_data").is_none());
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[1]["inline_data"]["data"], "aGVsbG8=");
        assert!(parts[1].get("text").is_none());
    }
}
