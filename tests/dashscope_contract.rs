//! Contract tests for the DashScope client against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use auto_storyboard::api::qwen::{
    IMAGE_SYNTHESIS_PATH, SPEECH_SYNTHESIS_PATH, TASKS_PATH, TEXT_GENERATION_PATH,
};
use auto_storyboard::api::QwenClient;
use auto_storyboard::config::ServiceConfig;
use auto_storyboard::narration::DashScopeNarrator;
use auto_storyboard::services::{
    ImageService, NarrationEngine, NarrationEventKind, ScriptService, SpeechErrorCode,
    SpeechRequest, UtteranceId,
};
use auto_storyboard::{Language, MusicTheme, StoryboardError};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "sk-test";

fn client(server: &MockServer, dir: &TempDir) -> QwenClient {
    let config = ServiceConfig {
        api_key: Some(KEY.to_string()),
        task_poll_interval: Duration::from_millis(10),
        task_max_polls: 5,
        ..ServiceConfig::default()
    }
    .with_base_url(server.uri());
    QwenClient::new(config, dir.path().join("images")).unwrap()
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "output": {
            "choices": [
                { "message": { "role": "assistant", "content": content } }
            ]
        },
        "request_id": "req-1"
    })
}

const SCRIPT: &str = r#"```json
{
  "title": "The Rusty Wanderer",
  "musicTheme": "mysterious",
  "scenes": [
    {"sceneDescription": "A robot wakes.", "narratorScript": "It opened its eyes.", "imagePrompt": "robot waking in moss", "imageText": "Awake"},
    {"sceneDescription": "It walks.", "narratorScript": "It walked on.", "imagePrompt": "robot walking among pines", "imageText": ""}
  ]
}
```"#;

#[tokio::test]
async fn script_request_is_authorized_and_fenced_reply_parses() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(TEXT_GENERATION_PATH))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "qwen-plus",
            "parameters": { "result_format": "message" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(SCRIPT)))
        .expect(1)
        .mount(&server)
        .await;

    let board = client(&server, &dir)
        .acquire_script("a robot in a forest", Language::En, 2)
        .await
        .unwrap();

    assert_eq!(board.title, "The Rusty Wanderer");
    assert_eq!(board.music_theme, MusicTheme::Mysterious);
    assert_eq!(board.len(), 2);
    assert_eq!(board.scenes[0].description, "A robot wakes.");
    assert_eq!(board.scenes[0].narrative_text, "It opened its eyes.");
    assert_eq!(board.scenes[0].overlay_text, "Awake");
    assert_eq!(board.scenes[1].image_prompt, "robot walking among pines");
}

#[tokio::test]
async fn unparseable_script_is_generic() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(TEXT_GENERATION_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("Once upon a time")))
        .mount(&server)
        .await;

    let err = client(&server, &dir)
        .acquire_script("a robot in a forest", Language::En, 2)
        .await
        .unwrap_err();

    assert!(matches!(err, StoryboardError::Generic(_)));
}

#[tokio::test]
async fn rejected_key_is_not_configured() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(TEXT_GENERATION_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "InvalidApiKey",
            "message": "Invalid API-key provided."
        })))
        .mount(&server)
        .await;

    let err = client(&server, &dir)
        .acquire_script("a robot in a forest", Language::En, 2)
        .await
        .unwrap_err();

    assert!(matches!(err, StoryboardError::NotConfigured(_)));
}

#[tokio::test]
async fn http_429_is_rate_limited() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(IMAGE_SYNTHESIS_PATH))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = client(&server, &dir)
        .synthesize_image("robot waking in moss", "Awake")
        .await
        .unwrap_err();

    assert_eq!(err, StoryboardError::RateLimited);
}

#[tokio::test]
async fn throttling_code_in_body_is_rate_limited() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(IMAGE_SYNTHESIS_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "Throttling.RateQuota",
            "message": "Requests rate limit exceeded"
        })))
        .mount(&server)
        .await;

    let err = client(&server, &dir)
        .synthesize_image("robot waking in moss", "")
        .await
        .unwrap_err();

    assert_eq!(err, StoryboardError::RateLimited);
}

#[tokio::test]
async fn image_task_is_polled_and_downloaded() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(IMAGE_SYNTHESIS_PATH))
        .and(header("X-DashScope-Async", "enable"))
        .and(body_partial_json(json!({
            "model": "wanx-v1",
            "input": {
                "prompt": "robot waking in moss. Include the caption text \"Awake\" in the image."
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": { "task_id": "task-7", "task_status": "PENDING" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    // First poll still running, then done.
    Mock::given(method("GET"))
        .and(path(format!("{TASKS_PATH}/task-7")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": { "task_id": "task-7", "task_status": "RUNNING" }
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{TASKS_PATH}/task-7")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {
                "task_id": "task-7",
                "task_status": "SUCCEEDED",
                "results": [ { "url": format!("{}/files/scene.png", server.uri()) } ]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/scene.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G']))
        .mount(&server)
        .await;

    let image = client(&server, &dir)
        .synthesize_image("robot waking in moss", "Awake")
        .await
        .unwrap();

    let saved = dir.path().join("images").join("image_0.png");
    assert_eq!(image.as_str(), saved.to_string_lossy());
    assert_eq!(std::fs::read(&saved).unwrap(), vec![0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn expired_result_url_fails_only_the_scene() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(IMAGE_SYNTHESIS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": { "task_id": "task-8" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{TASKS_PATH}/task-8")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {
                "task_id": "task-8",
                "task_status": "SUCCEEDED",
                "results": [ { "url": format!("{}/files/x.png", server.uri()) } ]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/x.png"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            "<Error><Code>AccessDenied</Code><Message>Request has expired.</Message></Error>",
        ))
        .mount(&server)
        .await;

    let err = client(&server, &dir)
        .synthesize_image("robot", "")
        .await
        .unwrap_err();

    match err {
        StoryboardError::Generic(message) => assert!(message.contains("403")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!dir.path().join("images").join("image_0.png").exists());
}

#[tokio::test]
async fn failed_image_task_is_generic() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(IMAGE_SYNTHESIS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": { "task_id": "task-9" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{TASKS_PATH}/task-9")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {
                "task_id": "task-9",
                "task_status": "FAILED",
                "code": "DataInspectionFailed",
                "message": "Input data may contain inappropriate content."
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server, &dir)
        .synthesize_image("robot", "")
        .await
        .unwrap_err();

    match err {
        StoryboardError::Generic(message) => assert!(message.contains("inappropriate")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn image_task_that_never_finishes_times_out() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(IMAGE_SYNTHESIS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": { "task_id": "task-slow" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{TASKS_PATH}/task-slow")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": { "task_id": "task-slow", "task_status": "RUNNING" }
        })))
        .expect(5)
        .mount(&server)
        .await;

    let err = client(&server, &dir)
        .synthesize_image("robot", "")
        .await
        .unwrap_err();

    assert_eq!(err, StoryboardError::generic("Image generation timeout"));
}

#[tokio::test]
async fn narrator_writes_audio_and_reports_end() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(SPEECH_SYNTHESIS_PATH))
        .and(body_partial_json(json!({
            "model": "cosyvoice-v1",
            "input": { "text": "It opened its eyes." },
            "parameters": { "voice": "loongstella", "format": "mp3" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3audio".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let narrator = DashScopeNarrator::new(
        Arc::new(client(&server, &dir)),
        dir.path().join("narration"),
        tx,
    );
    narrator.speak(SpeechRequest {
        utterance: UtteranceId(1),
        text: "It opened its eyes.".into(),
        voice: None,
        lang: "en-US".into(),
    });

    let event = rx.recv().await.unwrap();
    assert_eq!(event.utterance, UtteranceId(1));
    assert_eq!(event.kind, NarrationEventKind::End);
    let audio = std::fs::read(dir.path().join("narration").join("narration_1.mp3")).unwrap();
    assert_eq!(audio, b"ID3audio");
}

#[tokio::test]
async fn narrator_reports_speech_failures() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("POST"))
        .and(path(SPEECH_SYNTHESIS_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("engine down"))
        .mount(&server)
        .await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let narrator = DashScopeNarrator::new(
        Arc::new(client(&server, &dir)),
        dir.path().join("narration"),
        tx,
    );
    assert!(narrator.voices().iter().any(|v| v.is_default && v.lang == "en-US"));
    narrator.speak(SpeechRequest {
        utterance: UtteranceId(4),
        text: "Hello".into(),
        voice: None,
        lang: "en-US".into(),
    });

    let event = rx.recv().await.unwrap();
    assert_eq!(event.utterance, UtteranceId(4));
    match event.kind {
        NarrationEventKind::Error(SpeechErrorCode::Other(reason)) => {
            assert!(reason.contains("engine down"))
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
