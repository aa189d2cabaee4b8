use std::path::{Path, PathBuf};

use crate::error::{ClipthreadError, Result};

/// Environment variable holding the inference-service credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Filesystem layout for prompts and per-video results.
#[derive(Debug, Clone)]
pub struct Config {
    pub prompts_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl Config {
    /// Layout rooted at the given directory: `<root>/prompts`, `<root>/results`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            prompts_dir: root.join("prompts"),
            results_dir: root.join("results"),
        }
    }

    /// Default layout relative to the working directory.
    pub fn from_cwd() -> Self {
        Self::new(".")
    }

    /// Read and trim `prompts/<name>.txt`.
    pub fn load_prompt(&self, name: &str) -> Result<String> {
        let prompt_path = self.prompts_dir.join(format!("{name}.txt"));
        if !prompt_path.exists() {
            return Err(ClipthreadError::NotFound { path: prompt_path });
        }
        Ok(std::fs::read_to_string(&prompt_path)?.trim().to_string())
    }

    /// Result directory for a video, keyed by its filename stem. Created on
    /// demand.
    pub fn result_dir(&self, video_path: &Path) -> Result<PathBuf> {
        let stem = video_path
            .file_stem()
            .ok_or_else(|| ClipthreadError::NotFound {
                path: video_path.to_path_buf(),
            })?;
        let dir = self.results_dir.join(stem);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// All named prompts, loaded once at startup and passed to the components
/// that need them.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub system_prompt: String,
    pub feature_explanation: String,
    pub enhance_audio: String,
    pub chapter_breakdown: String,
    pub feature_to_post: String,
    pub feature_to_post_short: String,
    pub feature_to_post_long: String,
}

impl PromptSet {
    pub fn load(config: &Config) -> Result<Self> {
        Ok(Self {
            system_prompt: config.load_prompt("system_prompt")?,
            feature_explanation: config.load_prompt("feature_explanation")?,
            enhance_audio: config.load_prompt("enhance_audio")?,
            chapter_breakdown: config.load_prompt("chapter_breakdown")?,
            feature_to_post: config.load_prompt("feature_to_post")?,
            feature_to_post_short: config.load_prompt("feature_to_post_short")?,
            feature_to_post_long: config.load_prompt("feature_to_post_long")?,
        })
    }

    /// Post prompt for a full-video analysis: short-form up to 60 seconds
    /// inclusive, long-form above.
    pub fn post_prompt_for_duration(&self, duration_seconds: f64) -> &str {
        if duration_seconds <= 60.0 {
            &self.feature_to_post_short
        } else {
            &self.feature_to_post_long
        }
    }
}

/// Read the inference-service credential from the environment.
pub fn api_key_from_env() -> Result<String> {
    std::env::var(API_KEY_ENV).map_err(|_| ClipthreadError::MissingApiKey {
        env_var: API_KEY_ENV.to_string(),
    })
}
