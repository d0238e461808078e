//! Media capabilities: storyboard illustration, speech and video.

use crate::error::CapabilityError;
use crate::story::Storyboard;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        AudioInput, CreateImageEditRequestArgs, CreateImageRequestArgs,
        CreateSpeechRequestArgs, CreateTranscriptionRequestArgs, Image, ImageInput, ImageModel,
        ImageResponseFormat, ImageSize, SpeechModel, Voice,
    },
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Renders a storyboard into image files: the hero portrait first,
    /// then one edited variant per scene. Returns the file paths.
    async fn render_storyboard(&self, storyboard: &Storyboard)
    -> Result<Vec<String>, CapabilityError>;
}

#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Text to speech; returns encoded audio bytes (mp3).
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CapabilityError>;

    /// Speech to text for one uploaded recording.
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, CapabilityError>;
}

#[async_trait]
pub trait VideoService: Send + Sync {
    /// Animates a still image into a short clip; returns output URLs.
    async fn animate(&self, image_path: &Path) -> Result<Vec<String>, CapabilityError>;
}

// --- OpenAI-backed images ---

pub struct OpenAiImageService {
    client: Client<OpenAIConfig>,
    model: String,
    output_dir: PathBuf,
}

impl OpenAiImageService {
    pub fn new(config: OpenAIConfig, model: String, output_dir: PathBuf) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            output_dir,
        }
    }

    async fn generate_hero(&self, prompt: &str, path: &Path) -> Result<Vec<u8>, CapabilityError> {
        let request = CreateImageRequestArgs::default()
            .model(ImageModel::Other(self.model.clone()))
            .prompt(prompt)
            .n(1)
            .size(ImageSize::S1024x1024)
            .response_format(ImageResponseFormat::B64Json)
            .build()
            .map_err(|e| CapabilityError::new("image", e))?;
        let response = self
            .client
            .images()
            .create(request)
            .await
            .map_err(|e| CapabilityError::new("image", e))?;
        let bytes = decode_first_image(&response.data)?;
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| CapabilityError::new("image", e))?;
        Ok(bytes)
    }

    async fn edit_scene(
        &self,
        hero_bytes: Vec<u8>,
        prompt: &str,
        path: &Path,
    ) -> Result<(), CapabilityError> {
        let request = CreateImageEditRequestArgs::default()
            .model(ImageModel::Other(self.model.clone()))
            .image(ImageInput::from_vec_u8("hero.png".to_string(), hero_bytes))
            .prompt(prompt)
            .build()
            .map_err(|e| CapabilityError::new("image", e))?;
        let response = self
            .client
            .images()
            .create_edit(request)
            .await
            .map_err(|e| CapabilityError::new("image", e))?;
        let bytes = decode_first_image(&response.data)?;
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| CapabilityError::new("image", e))?;
        Ok(())
    }
}

fn decode_first_image(data: &[std::sync::Arc<Image>]) -> Result<Vec<u8>, CapabilityError> {
    let image = data
        .first()
        .ok_or_else(|| CapabilityError::new("image", "no image data returned"))?;
    match image.as_ref() {
        Image::B64Json { b64_json, .. } => BASE64
            .decode(b64_json.as_str())
            .map_err(|e| CapabilityError::new("image", e)),
        Image::Url { .. } => Err(CapabilityError::new(
            "image",
            "expected base64 payload, got a URL",
        )),
    }
}

#[async_trait]
impl ImageService for OpenAiImageService {
    async fn render_storyboard(
        &self,
        storyboard: &Storyboard,
    ) -> Result<Vec<String>, CapabilityError> {
        let batch_dir = self.output_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&batch_dir)
            .await
            .map_err(|e| CapabilityError::new("image", e))?;

        let hero_path = batch_dir.join("img_0.png");
        let hero_bytes = self
            .generate_hero(&storyboard.main_character_description, &hero_path)
            .await?;

        // Every scene is an edit of the hero image so the character stays
        // visually consistent across pages.
        let scene_paths: Vec<PathBuf> = (1..=storyboard.scenes.len())
            .map(|i| batch_dir.join(format!("img_{i}.png")))
            .collect();
        let edits = storyboard.scenes.iter().zip(&scene_paths).map(|(scene, path)| {
            self.edit_scene(hero_bytes.clone(), &scene.image_prompt, path)
        });
        futures::future::try_join_all(edits).await?;

        info!(count = scene_paths.len() + 1, dir = %batch_dir.display(), "storyboard rendered");
        let mut paths = vec![hero_path.display().to_string()];
        paths.extend(scene_paths.iter().map(|p| p.display().to_string()));
        Ok(paths)
    }
}

/// Returns plausible paths without touching the filesystem.
pub struct MockImageService;

#[async_trait]
impl ImageService for MockImageService {
    async fn render_storyboard(
        &self,
        storyboard: &Storyboard,
    ) -> Result<Vec<String>, CapabilityError> {
        Ok((0..=storyboard.scenes.len())
            .map(|i| format!("mock_images/img_{i}.png"))
            .collect())
    }
}

// --- OpenAI-backed speech ---

pub struct OpenAiSpeechService {
    client: Client<OpenAIConfig>,
    tts_model: String,
    transcription_model: String,
}

impl OpenAiSpeechService {
    pub fn new(config: OpenAIConfig, tts_model: String, transcription_model: String) -> Self {
        Self {
            client: Client::with_config(config),
            tts_model,
            transcription_model,
        }
    }
}

#[async_trait]
impl SpeechService for OpenAiSpeechService {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CapabilityError> {
        let request = CreateSpeechRequestArgs::default()
            .model(SpeechModel::Other(self.tts_model.clone()))
            .voice(Voice::Nova)
            .input(text)
            .build()
            .map_err(|e| CapabilityError::new("speech", e))?;
        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e| CapabilityError::new("speech", e))?;
        Ok(response.bytes.to_vec())
    }

    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, CapabilityError> {
        let request = CreateTranscriptionRequestArgs::default()
            .model(&self.transcription_model)
            .file(AudioInput::from_vec_u8(filename.to_string(), audio))
            .build()
            .map_err(|e| CapabilityError::new("speech", e))?;
        let response = self
            .client
            .audio()
            .transcribe(request)
            .await
            .map_err(|e| CapabilityError::new("speech", e))?;
        Ok(response.text)
    }
}

/// Echo implementation: synthesis tags the text, transcription treats the
/// uploaded bytes as UTF-8. Lets tests post "audio" as plain text.
pub struct MockSpeechService;

#[async_trait]
impl SpeechService for MockSpeechService {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CapabilityError> {
        Ok(format!("tts:{text}").into_bytes())
    }

    async fn transcribe(&self, audio: Vec<u8>, _filename: &str) -> Result<String, CapabilityError> {
        Ok(String::from_utf8_lossy(&audio).trim().to_string())
    }
}

// --- Runway-style video ---

/// REST client for an image-to-video endpoint: submit a task, then poll
/// until it settles.
pub struct RunwayVideoService {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl RunwayVideoService {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: "https://api.dev.runwayml.com".to_string(),
            poll_interval: Duration::from_secs(5),
            max_polls: 60,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl VideoService for RunwayVideoService {
    async fn animate(&self, image_path: &Path) -> Result<Vec<String>, CapabilityError> {
        let image_bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| CapabilityError::new("video", e))?;
        let prompt_image = format!("data:image/png;base64,{}", BASE64.encode(&image_bytes));

        let submit: serde_json::Value = self
            .http
            .post(format!("{}/v1/image_to_video", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-Runway-Version", "2024-11-06")
            .json(&serde_json::json!({
                "model": "gen4_turbo",
                "promptImage": prompt_image,
                "promptText": "Follow a main character in a fairytale world.",
                "ratio": "1280:720",
            }))
            .send()
            .await
            .map_err(|e| CapabilityError::new("video", e))?
            .error_for_status()
            .map_err(|e| CapabilityError::new("video", e))?
            .json()
            .await
            .map_err(|e| CapabilityError::new("video", e))?;

        let task_id = submit["id"]
            .as_str()
            .ok_or_else(|| CapabilityError::new("video", "submit response had no task id"))?
            .to_string();
        info!(%task_id, "video task submitted");

        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            let task: serde_json::Value = self
                .http
                .get(format!("{}/v1/tasks/{task_id}", self.base_url))
                .bearer_auth(&self.api_key)
                .header("X-Runway-Version", "2024-11-06")
                .send()
                .await
                .map_err(|e| CapabilityError::new("video", e))?
                .json()
                .await
                .map_err(|e| CapabilityError::new("video", e))?;

            match task["status"].as_str() {
                Some("SUCCEEDED") => {
                    let urls = task["output"]
                        .as_array()
                        .map(|arr| {
                            arr.iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    return Ok(urls);
                }
                Some("FAILED") => {
                    return Err(CapabilityError::new("video", "generation task failed"));
                }
                _ => {}
            }
        }
        Err(CapabilityError::new("video", "timed out waiting for task"))
    }
}

pub struct MockVideoService;

#[async_trait]
impl VideoService for MockVideoService {
    async fn animate(&self, _image_path: &Path) -> Result<Vec<String>, CapabilityError> {
        Ok(vec!["https://videos.invalid/mock.mp4".to_string()])
    }
}
