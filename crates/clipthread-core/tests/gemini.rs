//! Client tests against a mocked Gemini HTTP surface.

use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clipthread_core::{
    ChapterBreakdown, ClipthreadError, FileState, GeminiClient, RemoteFile, TweetThread,
};

fn remote_file(state: &str) -> RemoteFile {
    serde_json::from_value(json!({
        "name": "files/demo",
        "uri": "https://example.test/files/demo",
        "state": state,
        "mimeType": "video/mp4"
    }))
    .unwrap()
}

fn file_json(state: &str) -> serde_json::Value {
    json!({
        "name": "files/demo",
        "uri": "https://example.test/files/demo",
        "state": state,
        "mimeType": "video/mp4"
    })
}

fn generation_json(text: &str) -> serde_json::Value {
    json!({
        "candidates": [
            { "content": { "parts": [ { "text": text } ] } }
        ]
    })
}

#[tokio::test]
async fn upload_then_poll_until_active() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-goog-upload-url", format!("{}/upload-session", server.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload-session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "file": file_json("PROCESSING") })))
        .expect(1)
        .mount(&server)
        .await;

    // Two PROCESSING polls, then ACTIVE: exactly k+1 = 3 state fetches.
    Mock::given(method("GET"))
        .and(path("/v1beta/files/demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json("PROCESSING")))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/files/demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json("ACTIVE")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("demo.mp4");
    std::fs::write(&video, b"not really a video").unwrap();

    let client = GeminiClient::with_base_url("test-key", server.uri());
    let file = client.upload_file(&video, "video/mp4").await.unwrap();
    assert_eq!(file.state, FileState::Processing);

    let cancel = CancellationToken::new();
    let ready = client
        .await_ready(
            file,
            Duration::from_millis(10),
            Duration::from_secs(5),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(ready.state, FileState::Active);
}

#[tokio::test]
async fn upload_fails_for_missing_local_file() {
    let client = GeminiClient::with_base_url("test-key", "http://127.0.0.1:9");
    let err = client
        .upload_file(std::path::Path::new("/no/such/demo.mp4"), "video/mp4")
        .await
        .unwrap_err();
    assert!(matches!(err, ClipthreadError::NotFound { .. }));
}

#[tokio::test]
async fn failed_state_aborts_polling_immediately() {
    let server = MockServer::start().await;

    // A single fetch reports FAILED; no further polling may happen.
    Mock::given(method("GET"))
        .and(path("/v1beta/files/demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json("FAILED")))
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url("test-key", server.uri());
    let cancel = CancellationToken::new();
    let err = client
        .await_ready(
            remote_file("PROCESSING"),
            Duration::from_millis(10),
            Duration::from_secs(5),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClipthreadError::ProcessingFailed { .. }));
}

#[tokio::test]
async fn polling_times_out_when_processing_never_ends() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1beta/files/demo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_json("PROCESSING")))
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url("test-key", server.uri());
    let cancel = CancellationToken::new();
    let err = client
        .await_ready(
            remote_file("PROCESSING"),
            Duration::from_millis(10),
            Duration::from_millis(60),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClipthreadError::Timeout { .. }));
}

#[tokio::test]
async fn cancelled_token_stops_polling() {
    let client = GeminiClient::with_base_url("test-key", "http://127.0.0.1:9");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .await_ready(
            remote_file("PROCESSING"),
            Duration::from_secs(10),
            Duration::from_secs(600),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClipthreadError::Cancelled));
}

#[tokio::test]
async fn generate_parses_structured_chapter_breakdown() {
    let server = MockServer::start().await;

    let breakdown = json!({
        "chapters": [
            { "start_time": 0.0, "end_time": 30.0, "title": "Setup", "description": "Getting started" },
            { "start_time": 30.0, "end_time": 95.5, "title": "Demo", "description": "Feature walkthrough" }
        ]
    });
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash-exp:generateContent"))
        .and(body_string_contains("responseSchema"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(generation_json(&breakdown.to_string())),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url("test-key", server.uri());
    let parsed: ChapterBreakdown = client
        .generate(
            &remote_file("ACTIVE"),
            &["system", "breakdown please"],
            ChapterBreakdown::response_schema(),
        )
        .await
        .unwrap();

    assert_eq!(parsed.chapters.len(), 2);
    assert_eq!(parsed.chapters[0].title, "Setup");
    assert!((parsed.chapters[1].end_time - 95.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn generate_accepts_fenced_json() {
    let server = MockServer::start().await;

    let fenced = "```json\n{\"tweets\":[{\"number\":1,\"content\":\"hello\",\"character_count\":5}]}\n```";
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash-exp:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(generation_json(fenced)))
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url("test-key", server.uri());
    let thread: TweetThread = client
        .generate(
            &remote_file("ACTIVE"),
            &["system", "post please"],
            TweetThread::response_schema(),
        )
        .await
        .unwrap();
    assert_eq!(thread.tweets.len(), 1);
    assert_eq!(thread.tweets[0].content, "hello");
}

#[tokio::test]
async fn generate_rejects_unparseable_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash-exp:generateContent"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(generation_json("sorry, no JSON today")),
        )
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url("test-key", server.uri());
    let err = client
        .generate::<TweetThread>(
            &remote_file("ACTIVE"),
            &["system", "post please"],
            TweetThread::response_schema(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClipthreadError::MalformedResponse { .. }));
}

#[tokio::test]
async fn generate_rejects_empty_candidates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash-exp:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url("test-key", server.uri());
    let err = client
        .generate::<TweetThread>(
            &remote_file("ACTIVE"),
            &["system"],
            TweetThread::response_schema(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClipthreadError::MalformedResponse { .. }));
}

#[tokio::test]
async fn generate_surfaces_service_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash-exp:generateContent"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let client = GeminiClient::with_base_url("test-key", server.uri());
    let err = client
        .generate::<TweetThread>(
            &remote_file("ACTIVE"),
            &["system"],
            TweetThread::response_schema(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClipthreadError::GenerationError { .. }));
}
