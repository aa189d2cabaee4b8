//! Clipthread Core Library
//!
//! Core functionality for chaptering a video with Gemini, cutting one clip
//! per chapter with ffmpeg, and generating a structured post thread for
//! each clip.

pub mod config;
pub mod error;
pub mod gemini;
pub mod media;
pub mod pipeline;
pub mod types;

// Re-export commonly used items at crate root
pub use config::{API_KEY_ENV, Config, PromptSet, api_key_from_env};
pub use error::{ClipthreadError, Result};
pub use gemini::{FileState, GeminiClient, RemoteFile};
pub use media::{chapter_output_path, probe_duration, segment};
pub use pipeline::{VideoProcessor, full_video_chapter, validate_chapters};
pub use types::{AnalysisResult, Chapter, ChapterBreakdown, Tweet, TweetThread};
