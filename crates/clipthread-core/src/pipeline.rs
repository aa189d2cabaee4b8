use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{Config, PromptSet, api_key_from_env};
use crate::error::{ClipthreadError, Result};
use crate::gemini::{GeminiClient, MAX_PROCESSING_WAIT, POLL_INTERVAL, RemoteFile};
use crate::media::{chapter_output_path, probe_duration, segment};
use crate::types::{AnalysisResult, Chapter, ChapterBreakdown, TweetThread};

pub const VIDEO_MIME: &str = "video/mp4";

/// Runs the chaptered-analysis pipeline for one video:
/// upload → readiness → chapters → clips → one post thread per clip,
/// or the single-chapter shortcut when splitting is disabled.
pub struct VideoProcessor {
    client: GeminiClient,
    prompts: PromptSet,
    config: Config,
}

impl VideoProcessor {
    /// Build the processor from the filesystem layout and the environment
    /// credential. Fails early when the key or a prompt file is missing.
    pub fn new(config: Config) -> Result<Self> {
        let api_key = api_key_from_env()?;
        let prompts = PromptSet::load(&config)?;
        Ok(Self {
            client: GeminiClient::new(api_key),
            prompts,
            config,
        })
    }

    /// Processor with an explicit client. Used by tests.
    pub fn with_client(config: Config, client: GeminiClient) -> Result<Self> {
        let prompts = PromptSet::load(&config)?;
        Ok(Self {
            client,
            prompts,
            config,
        })
    }

    /// Main processing pipeline. On success the combined result has been
    /// written to `results/<stem>/analysis.json`; on any failure the run
    /// aborts with no artifact written.
    pub async fn process_video(
        &self,
        video_path: &Path,
        split_chapters: bool,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        if !video_path.exists() {
            return Err(ClipthreadError::NotFound {
                path: video_path.to_path_buf(),
            });
        }
        let video_path = std::fs::canonicalize(video_path)?;
        let output_dir = self.config.result_dir(&video_path)?;

        info!(video = %video_path.display(), split_chapters, "uploading video");
        let video_file = self.client.upload_file(&video_path, VIDEO_MIME).await?;
        let video_file = self
            .client
            .await_ready(video_file, POLL_INTERVAL, MAX_PROCESSING_WAIT, cancel)
            .await?;

        let result = if split_chapters {
            let chapters = self.plan_chapters(&video_file).await?;
            info!(chapters = chapters.len(), "chapter breakdown received");

            segment(&video_path, &chapters, &output_dir, cancel).await?;
            let tweet_threads = self.analyze_chunks(&chapters, &output_dir, cancel).await?;
            AnalysisResult {
                chapters,
                tweet_threads,
            }
        } else {
            let duration = probe_duration(&video_path).await?;
            link_source_clip(&video_path, &output_dir).await?;

            if cancel.is_cancelled() {
                return Err(ClipthreadError::Cancelled);
            }
            let thread = self.analyze_full_video(&video_file, duration).await?;
            AnalysisResult {
                chapters: vec![full_video_chapter(duration)],
                tweet_threads: vec![thread],
            }
        };

        let results_file = output_dir.join("analysis.json");
        tokio::fs::write(&results_file, serde_json::to_string_pretty(&result)?).await?;
        info!(path = %results_file.display(), "results persisted");

        Ok(result)
    }

    /// Ask the model for a chapter breakdown of the whole video and validate
    /// the returned list.
    pub async fn plan_chapters(&self, video_file: &RemoteFile) -> Result<Vec<Chapter>> {
        debug!("requesting chapter breakdown");
        let breakdown: ChapterBreakdown = self
            .client
            .generate(
                video_file,
                &[&self.prompts.system_prompt, &self.prompts.chapter_breakdown],
                ChapterBreakdown::response_schema(),
            )
            .await?;

        validate_chapters(&breakdown.chapters)?;
        Ok(breakdown.chapters)
    }

    /// Analyze every chapter clip, strictly sequentially and in index order.
    async fn analyze_chunks(
        &self,
        chapters: &[Chapter],
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<TweetThread>> {
        let mut threads = Vec::with_capacity(chapters.len());
        for index in 0..chapters.len() {
            if cancel.is_cancelled() {
                return Err(ClipthreadError::Cancelled);
            }
            let clip_path = chapter_output_path(output_dir, index);
            info!(chapter = index + 1, clip = %clip_path.display(), "analyzing chapter");
            let thread = self
                .analyze_chapter(&clip_path, cancel)
                .await
                .map_err(|e| ClipthreadError::ChapterAnalysisFailed {
                    chapter: index + 1,
                    source: Box::new(e),
                })?;
            threads.push(thread);
        }
        Ok(threads)
    }

    /// Upload one chapter clip, wait for readiness, and request its post
    /// thread with the fixed chaptered-mode prompt.
    pub async fn analyze_chapter(
        &self,
        clip_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<TweetThread> {
        let clip = self.client.upload_file(clip_path, VIDEO_MIME).await?;
        let clip = self
            .client
            .await_ready(clip, POLL_INTERVAL, MAX_PROCESSING_WAIT, cancel)
            .await?;

        self.client
            .generate(
                &clip,
                &[&self.prompts.system_prompt, &self.prompts.feature_to_post],
                TweetThread::response_schema(),
            )
            .await
    }

    /// Request a post thread for the whole video, with the prompt variant
    /// selected by duration.
    pub async fn analyze_full_video(
        &self,
        video_file: &RemoteFile,
        duration: f64,
    ) -> Result<TweetThread> {
        let post_prompt = self.prompts.post_prompt_for_duration(duration);
        debug!(duration, "analyzing full video");
        self.client
            .generate(
                video_file,
                &[&self.prompts.system_prompt, post_prompt],
                TweetThread::response_schema(),
            )
            .await
    }
}

/// The synthetic chapter spanning the whole video in no-split mode.
pub fn full_video_chapter(duration: f64) -> Chapter {
    Chapter {
        start_time: 0.0,
        end_time: duration,
        title: "Full Video".to_string(),
        description: "Complete video analysis".to_string(),
    }
}

/// Planner output is an external invariant this caller checks rather than
/// assumes: non-empty, non-negative starts, positive durations, ordered by
/// start time. Overlap and full coverage are not enforced.
pub fn validate_chapters(chapters: &[Chapter]) -> Result<()> {
    if chapters.is_empty() {
        return Err(ClipthreadError::MalformedResponse {
            reason: "chapter breakdown is empty".to_string(),
        });
    }
    for (index, chapter) in chapters.iter().enumerate() {
        if chapter.start_time < 0.0 || chapter.end_time <= chapter.start_time {
            return Err(ClipthreadError::MalformedResponse {
                reason: format!(
                    "chapter {} has invalid interval [{}, {}]",
                    index + 1,
                    chapter.start_time,
                    chapter.end_time
                ),
            });
        }
        if index > 0 && chapter.start_time < chapters[index - 1].start_time {
            return Err(ClipthreadError::MalformedResponse {
                reason: format!("chapter {} is out of time order", index + 1),
            });
        }
    }
    Ok(())
}

/// In no-split mode the result directory still gets a `chapter_1.mp4`, so it
/// is self-contained. Symlinked where possible, copied otherwise.
async fn link_source_clip(video_path: &Path, output_dir: &Path) -> Result<()> {
    let target: PathBuf = chapter_output_path(output_dir, 0);
    if target.exists() {
        return Ok(());
    }
    #[cfg(unix)]
    tokio::fs::symlink(video_path, &target).await?;
    #[cfg(not(unix))]
    tokio::fs::copy(video_path, &target).await.map(|_| ())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(start: f64, end: f64) -> Chapter {
        Chapter {
            start_time: start,
            end_time: end,
            title: "t".to_string(),
            description: "d".to_string(),
        }
    }

    #[test]
    fn full_video_chapter_spans_whole_duration() {
        let chapter = full_video_chapter(45.0);
        assert_eq!(chapter.start_time, 0.0);
        assert_eq!(chapter.end_time, 45.0);
        assert_eq!(chapter.title, "Full Video");
    }

    #[test]
    fn valid_chapter_lists_pass_validation() {
        let chapters = vec![chapter(0.0, 10.0), chapter(10.0, 25.0), chapter(25.0, 30.0)];
        assert!(validate_chapters(&chapters).is_ok());
    }

    #[test]
    fn empty_breakdown_is_rejected() {
        let err = validate_chapters(&[]).unwrap_err();
        assert!(matches!(err, ClipthreadError::MalformedResponse { .. }));
    }

    #[test]
    fn inverted_interval_is_rejected() {
        let err = validate_chapters(&[chapter(10.0, 5.0)]).unwrap_err();
        assert!(matches!(err, ClipthreadError::MalformedResponse { .. }));
    }

    #[test]
    fn negative_start_is_rejected() {
        let err = validate_chapters(&[chapter(-1.0, 5.0)]).unwrap_err();
        assert!(matches!(err, ClipthreadError::MalformedResponse { .. }));
    }

    #[test]
    fn out_of_order_chapters_are_rejected() {
        let err = validate_chapters(&[chapter(20.0, 30.0), chapter(0.0, 10.0)]).unwrap_err();
        assert!(matches!(err, ClipthreadError::MalformedResponse { .. }));
    }
}
