use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A labeled time interval of the source video selected for independent
/// treatment. Produced by the chapter planner in time order; included
/// verbatim in the final artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub start_time: f64,
    pub end_time: f64,
    pub title: String,
    pub description: String,
}

impl Chapter {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// The whole structured response of one chapter-planning call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterBreakdown {
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tweet {
    pub number: u32,
    pub content: String,
    pub character_count: u32,
}

/// One post thread, generated per chapter clip (or once for the whole
/// video in no-split mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetThread {
    pub tweets: Vec<Tweet>,
}

/// Final artifact of one run, persisted as `analysis.json`.
///
/// `tweet_threads` is index-aligned with `chapters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub chapters: Vec<Chapter>,
    pub tweet_threads: Vec<TweetThread>,
}

impl ChapterBreakdown {
    /// Response schema constraining the model to the ChapterBreakdown shape,
    /// in the Gemini structured-output dialect.
    pub fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "chapters": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "start_time": { "type": "NUMBER" },
                            "end_time": { "type": "NUMBER" },
                            "title": { "type": "STRING" },
                            "description": { "type": "STRING" }
                        },
                        "required": ["start_time", "end_time", "title", "description"]
                    }
                }
            },
            "required": ["chapters"]
        })
    }
}

impl TweetThread {
    /// Response schema constraining the model to the TweetThread shape.
    pub fn response_schema() -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "tweets": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "number": { "type": "INTEGER" },
                            "content": { "type": "STRING" },
                            "character_count": { "type": "INTEGER" }
                        },
                        "required": ["number", "content", "character_count"]
                    }
                }
            },
            "required": ["tweets"]
        })
    }
}
