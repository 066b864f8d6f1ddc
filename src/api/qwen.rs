use crate::config::{Language, ServiceConfig};
use crate::error::{Result, StoryboardError};
use crate::pipeline::parse_script_payload;
use crate::scene::{ImageRef, Storyboard};
use crate::services::{ImageService, ScriptService};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

pub const TEXT_GENERATION_PATH: &str = "/api/v1/services/aigc/text-generation/generation";
pub const IMAGE_SYNTHESIS_PATH: &str = "/api/v1/services/aigc/text2image/image-synthesis";
pub const SPEECH_SYNTHESIS_PATH: &str = "/api/v1/services/aigc/text2speech/speech-synthesis";
pub const TASKS_PATH: &str = "/api/v1/tasks";

/// DashScope client covering script (Qwen), image (Wanx) and speech (CosyVoice).
pub struct QwenClient {
    config: ServiceConfig,
    client: Client,
    image_dir: PathBuf,
    images_written: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    output: ImageOutput,
}

#[derive(Debug, Deserialize)]
struct ImageOutput {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct ImageTaskResponse {
    output: ImageTaskOutput,
}

#[derive(Debug, Deserialize)]
struct ImageTaskOutput {
    task_status: String,
    results: Option<Vec<ImageResult>>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResult {
    url: String,
}

/// Maps a DashScope error code onto the shared taxonomy.
fn classify_code(code: &str, message: String) -> StoryboardError {
    if code.starts_with("Throttling") {
        StoryboardError::RateLimited
    } else if code == "InvalidApiKey" {
        StoryboardError::NotConfigured(message)
    } else {
        StoryboardError::Generic(message)
    }
}

/// Passes successful responses through and classifies failed ones.
async fn check_response(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    warn!("{} API error (HTTP {}): {}", what, status, error_text);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(StoryboardError::NotConfigured(format!(
                "DashScope rejected the API key: {}",
                error_text
            )))
        }
        StatusCode::TOO_MANY_REQUESTS => return Err(StoryboardError::RateLimited),
        _ => {}
    }

    if let Ok(body) = serde_json::from_str::<ApiErrorBody>(&error_text) {
        if let Some(code) = body.code.as_deref() {
            let message = body.message.unwrap_or_else(|| error_text.clone());
            return Err(classify_code(
                code,
                format!("{} API error: {}", what, message),
            ));
        }
    }

    Err(StoryboardError::Generic(format!(
        "{} API error: {}",
        what, error_text
    )))
}

fn script_prompt(prompt: &str, language: Language, scene_count: usize) -> String {
    format!(
        r#"You are a storyboard writer. Turn the idea below into a short illustrated story in {language} with exactly {scene_count} scenes.

Return a JSON object with these fields:
- "title": the story title
- "musicTheme": one of "epic", "calm", "mysterious", "upbeat", "none"
- "scenes": an array of exactly {scene_count} objects, each with
  - "sceneDescription": what happens in the scene
  - "narratorScript": one or two sentences of narration
  - "imagePrompt": a detailed English prompt for an illustration of the scene
  - "imageText": a very short caption to draw on the image (may be empty)

Idea:
{prompt}

Reply with the JSON object only, no other text."#,
        language = language.display_name(),
        scene_count = scene_count,
        prompt = prompt,
    )
}

impl QwenClient {
    pub fn new(config: ServiceConfig, image_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoryboardError::Generic(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            image_dir: image_dir.into(),
            images_written: AtomicUsize::new(0),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.config.api_key.as_deref().ok_or_else(|| {
            StoryboardError::NotConfigured(
                "DashScope API key is not configured. Set DASHSCOPE_API_KEY or pass --api-key."
                    .to_string(),
            )
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Asks Qwen for a storyboard script.
    pub async fn generate_script(
        &self,
        prompt: &str,
        language: Language,
        scene_count: usize,
    ) -> Result<Storyboard> {
        let api_key = self.api_key()?;
        info!("Generating script from prompt using Qwen...");

        let request_body = json!({
            "model": self.config.text_model,
            "input": {
                "messages": [
                    {
                        "role": "user",
                        "content": script_prompt(prompt, language, scene_count)
                    }
                ]
            },
            "parameters": {
                "result_format": "message"
            }
        });

        let response = self
            .client
            .post(self.url(TEXT_GENERATION_PATH))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;
        let response = check_response(response, "Qwen").await?;

        let response_json: serde_json::Value = response.json().await?;
        let generated_text = response_json["output"]["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| StoryboardError::generic("Failed to extract generated text"))?;

        debug!("Generated script text: {}", generated_text);
        parse_script_payload(generated_text)
    }

    /// Generates an image and saves it to `output_path`.
    pub async fn generate_image(&self, prompt: &str, output_path: &Path) -> Result<()> {
        let api_key = self.api_key()?;
        info!("Generating image for prompt: {}", prompt);

        let request_body = json!({
            "model": self.config.image_model,
            "input": {
                "prompt": prompt
            },
            "parameters": {
                "style": "<auto>",
                "size": "1280*720",
                "n": 1
            }
        });

        let response = self
            .client
            .post(self.url(IMAGE_SYNTHESIS_PATH))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .header("X-DashScope-Async", "enable")
            .json(&request_body)
            .send()
            .await?;
        let response = check_response(response, "Image generation").await?;

        let task_response: ImageGenerationResponse = response.json().await?;
        let task_id = task_response.output.task_id;
        info!("Image generation task submitted: {}", task_id);

        let image_url = self.wait_for_image_task(api_key, &task_id).await?;

        info!("Downloading image from: {}", image_url);
        let response = self.client.get(&image_url).send().await?;
        // Result URLs are pre-signed storage links; their statuses never
        // reflect the API key.
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Image download failed (HTTP {}): {}", status, error_text);
            return Err(StoryboardError::Generic(format!(
                "Image download failed (HTTP {})",
                status
            )));
        }
        let image_data = response.bytes().await?;

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output_path, image_data).await?;
        info!("Image saved to: {}", output_path.display());
        Ok(())
    }

    async fn wait_for_image_task(&self, api_key: &str, task_id: &str) -> Result<String> {
        let max_polls = self.config.task_max_polls;
        let get_url = format!("{}/{}", self.url(TASKS_PATH), task_id);

        for i in 0..max_polls {
            tokio::time::sleep(self.config.task_poll_interval).await;
            debug!("Querying task status: {}", get_url);

            let response = self
                .client
                .get(&get_url)
                .header("Authorization", format!("Bearer {}", api_key))
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::UNAUTHORIZED
                || status == StatusCode::FORBIDDEN
            {
                check_response(response, "Image task").await?;
                continue;
            }
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                warn!("Failed to get task status (HTTP {}): {}", status, error_text);
                continue;
            }

            let response_text = response.text().await?;
            let task_result: ImageTaskResponse = serde_json::from_str(&response_text).map_err(|e| {
                StoryboardError::Generic(format!("Failed to parse task response: {}", e))
            })?;

            let output = task_result.output;
            match output.task_status.as_str() {
                "SUCCEEDED" => {
                    return output
                        .results
                        .and_then(|results| results.into_iter().next())
                        .map(|first| first.url)
                        .ok_or_else(|| StoryboardError::generic("No image URL in response"));
                }
                "FAILED" | "UNKNOWN" => {
                    let message = format!(
                        "Image generation failed: {}",
                        output.message.as_deref().unwrap_or("no reason given")
                    );
                    return Err(match output.code.as_deref() {
                        Some(code) => classify_code(code, message),
                        None => StoryboardError::Generic(message),
                    });
                }
                other => {
                    debug!("Task status: {} (poll {}/{})", other, i + 1, max_polls);
                }
            }
        }

        Err(StoryboardError::generic("Image generation timeout"))
    }

    /// Synthesizes `text` with `voice` and saves the audio to `output_path`.
    pub async fn generate_speech(&self, text: &str, voice: &str, output_path: &Path) -> Result<()> {
        let api_key = self.api_key()?;
        info!("Generating speech for text: {}", text);

        let request_body = json!({
            "model": self.config.tts_model,
            "input": {
                "text": text
            },
            "parameters": {
                "voice": voice,
                "format": "mp3"
            }
        });

        let response = self
            .client
            .post(self.url(SPEECH_SYNTHESIS_PATH))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;
        let response = check_response(response, "TTS").await?;

        let audio_data = response.bytes().await?;
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output_path, audio_data).await?;

        info!("Speech saved to: {}", output_path.display());
        Ok(())
    }
}

#[async_trait]
impl ScriptService for QwenClient {
    async fn acquire_script(
        &self,
        prompt: &str,
        language: Language,
        scene_count: usize,
    ) -> Result<Storyboard> {
        self.generate_script(prompt, language, scene_count).await
    }
}

#[async_trait]
impl ImageService for QwenClient {
    async fn synthesize_image(&self, image_prompt: &str, overlay_text: &str) -> Result<ImageRef> {
        let prompt = if overlay_text.trim().is_empty() {
            image_prompt.to_string()
        } else {
            format!(
                "{}. Include the caption text \"{}\" in the image.",
                image_prompt,
                overlay_text.trim()
            )
        };

        let n = self.images_written.fetch_add(1, Ordering::SeqCst);
        let path = self.image_dir.join(format!("image_{}.png", n));
        self.generate_image(&prompt, &path).await?;
        Ok(ImageRef(path.to_string_lossy().into_owned()))
    }
}
