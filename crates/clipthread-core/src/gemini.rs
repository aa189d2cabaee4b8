use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ClipthreadError, Result};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Interval between remote-file state fetches.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Upper bound on waiting for a remote file to leave PROCESSING.
pub const MAX_PROCESSING_WAIT: Duration = Duration::from_secs(600);
/// Per-request deadline for generation calls.
pub const GENERATION_DEADLINE: Duration = Duration::from_secs(600);

/// Readiness state of a file known to the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FileState {
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(other)]
    Unspecified,
}

/// Opaque handle for a file registered with the remote service. Short-lived:
/// owned by the call that uploaded it, never persisted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub name: String,
    pub uri: String,
    pub state: FileState,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Client for the Gemini file and generation APIs.
///
/// Constructed once at process start and passed to every component that
/// talks to the remote service.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Client against a non-default endpoint. Used by tests.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Register a local file with the remote service via the resumable
    /// upload protocol. The returned handle is typically still PROCESSING.
    pub async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteFile> {
        if !path.exists() {
            return Err(ClipthreadError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let bytes = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());

        debug!(path = %path.display(), size = bytes.len(), "starting upload session");
        let start_url = format!("{}/upload/v1beta/files?key={}", self.base_url, self.api_key);
        let start = self
            .http
            .post(&start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(map_transport_error)?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ClipthreadError::GenerationError {
                reason: "upload session did not return an upload URL".to_string(),
            })?;

        let response = self
            .http
            .post(&upload_url)
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("X-Goog-Upload-Offset", "0")
            .body(bytes)
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_status(response).await?;

        let uploaded: UploadResponse =
            response
                .json()
                .await
                .map_err(|e| ClipthreadError::GenerationError {
                    reason: format!("invalid upload response: {e}"),
                })?;
        info!(name = %uploaded.file.name, uri = %uploaded.file.uri, "upload complete");
        Ok(uploaded.file)
    }

    /// Fetch the current state of a remote file.
    pub async fn get_file(&self, name: &str) -> Result<RemoteFile> {
        let url = format!("{}/v1beta/{}?key={}", self.base_url, name, self.api_key);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ClipthreadError::GenerationError {
                reason: format!("invalid file state response: {e}"),
            })
    }

    /// Poll a remote file until it leaves PROCESSING.
    ///
    /// Returns the ready handle on ACTIVE, `ProcessingFailed` on FAILED with
    /// no further polling, and `Timeout` once `max_wait` is exceeded. The
    /// wait is a timer-based suspension, so other tasks keep making progress.
    pub async fn await_ready(
        &self,
        mut file: RemoteFile,
        poll_interval: Duration,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<RemoteFile> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            match file.state {
                FileState::Active => {
                    debug!(name = %file.name, "remote file ready");
                    return Ok(file);
                }
                FileState::Processing => {}
                FileState::Failed | FileState::Unspecified => {
                    return Err(ClipthreadError::ProcessingFailed {
                        name: file.name,
                        state: match file.state {
                            FileState::Failed => "FAILED".to_string(),
                            _ => "UNSPECIFIED".to_string(),
                        },
                    });
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ClipthreadError::Timeout {
                    what: format!("Processing of {}", file.name),
                    seconds: max_wait.as_secs(),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ClipthreadError::Cancelled),
                _ = tokio::time::sleep(poll_interval) => {}
            }

            file = self.get_file(&file.name).await?;
        }
    }

    /// Issue a single generation request for a remote file plus text prompts,
    /// constrained to the given response schema, and parse the returned JSON.
    ///
    /// No retry: one failed attempt aborts the pipeline.
    pub async fn generate<T>(&self, file: &RemoteFile, prompts: &[&str], schema: Value) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut parts = vec![json!({
            "file_data": {
                "mime_type": file.mime_type.as_deref().unwrap_or("video/mp4"),
                "file_uri": file.uri,
            }
        })];
        for prompt in prompts {
            parts.push(json!({ "text": prompt }));
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self
            .http
            .post(&url)
            .timeout(GENERATION_DEADLINE)
            .json(&json!({
                "contents": [{ "parts": parts }],
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "responseSchema": schema,
                }
            }))
            .send()
            .await
            .map_err(map_transport_error)?;
        let response = check_status(response).await?;

        let generated: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| ClipthreadError::GenerationError {
                    reason: format!("invalid generation response: {e}"),
                })?;

        let text = generated
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| ClipthreadError::MalformedResponse {
                reason: "no content in generation response".to_string(),
            })?;

        let text = strip_code_fences(text);
        serde_json::from_str(text).map_err(|e| ClipthreadError::MalformedResponse {
            reason: format!("response is not valid JSON for the requested shape: {e}"),
        })
    }
}

fn map_transport_error(err: reqwest::Error) -> ClipthreadError {
    if err.is_timeout() {
        ClipthreadError::Timeout {
            what: "Generation request".to_string(),
            seconds: GENERATION_DEADLINE.as_secs(),
        }
    } else {
        ClipthreadError::GenerationError {
            reason: err.to_string(),
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClipthreadError::GenerationError {
        reason: format!("Gemini API returned {status}: {body}"),
    })
}

/// Models occasionally wrap JSON output in markdown code fences.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_state_parses_service_names() {
        let file: RemoteFile = serde_json::from_str(
            r#"{"name":"files/abc","uri":"https://files/abc","state":"PROCESSING"}"#,
        )
        .unwrap();
        assert_eq!(file.state, FileState::Processing);

        let file: RemoteFile = serde_json::from_str(
            r#"{"name":"files/abc","uri":"https://files/abc","state":"ACTIVE","mimeType":"video/mp4"}"#,
        )
        .unwrap();
        assert_eq!(file.state, FileState::Active);
        assert_eq!(file.mime_type.as_deref(), Some("video/mp4"));

        let file: RemoteFile = serde_json::from_str(
            r#"{"name":"files/abc","uri":"https://files/abc","state":"SOMETHING_NEW"}"#,
        )
        .unwrap();
        assert_eq!(file.state, FileState::Unspecified);
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }
}
