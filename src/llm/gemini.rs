//! Google Gemini `generateContent` driver.
//!
//! Implements [`CompletionService`] against
//! `POST {base}/v1beta/models/{model}:generateContent`.

use serde::{Deserialize, Serialize};

use super::{
    CompletionRequest, CompletionService, GeminiSettings, GenerationConfig, Role, ServiceError,
    Turn,
};

/// Driver for the Gemini REST API.
#[derive(Clone)]
pub struct GeminiDriver {
    http: reqwest::Client,
    settings: GeminiSettings,
}

impl std::fmt::Debug for GeminiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl GeminiDriver {
    /// Create a new driver with the given settings.
    #[must_use]
    pub fn new(settings: GeminiSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// Endpoint for the configured model.
    pub fn endpoint(&self) -> Result<url::Url, url::ParseError> {
        let base = url::Url::parse(&self.settings.base_url)?;
        let path = format!(
            "{}/v1beta/models/{}:generateContent",
            base.path().trim_end_matches('/'),
            self.settings.model
        );
        base.join(&path)
    }
}

#[async_trait::async_trait]
impl CompletionService for GeminiDriver {
    async fn complete(&self, req: &CompletionRequest) -> Result<String, ServiceError> {
        let url = self
            .endpoint()
            .map_err(|e| ServiceError::NetworkOrQuota {
                status: None,
                message: format!("invalid base URL: {e}"),
            })?;

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&GenerateContentRequest::from(req))
            .send()
            .await
            .map_err(|e| ServiceError::NetworkOrQuota {
                status: None,
                message: e.to_string(),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ServiceError::NetworkOrQuota {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(ServiceError::NetworkOrQuota {
                status: Some(status.as_u16()),
                message: api_error_message(&body).unwrap_or_else(|| {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                }),
            });
        }

        parse_reply(&body)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: &'a GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

impl<'a> Content<'a> {
    fn turn(turn: &'a Turn) -> Self {
        Self {
            role: Some(turn.role),
            parts: [Part { text: &turn.text }],
        }
    }
}

impl<'a> From<&'a CompletionRequest> for GenerateContentRequest<'a> {
    fn from(req: &'a CompletionRequest) -> Self {
        let mut contents: Vec<Content<'a>> = req.history.iter().map(Content::turn).collect();
        contents.push(Content {
            role: Some(Role::User),
            parts: [Part { text: &req.prompt }],
        });

        Self {
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: &req.system_instruction,
                }],
            },
            contents,
            generation_config: &req.generation,
        }
    }
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

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Pull the reply text out of a successful response body.
fn parse_reply(body: &str) -> Result<String, ServiceError> {
    let resp: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let Some(candidate) = resp.candidates.into_iter().next() else {
        let reason = resp
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .map_or_else(|| "no candidates".to_string(), |r| format!("prompt blocked ({r})"));
        return Err(ServiceError::MalformedResponse(reason));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate
            .finish_reason
            .map_or_else(|| "empty reply".to_string(), |r| format!("empty reply (finish reason {r})"));
        return Err(ServiceError::MalformedResponse(reason));
    }

    Ok(text)
}

fn api_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .map(|e| e.error.message)
}
