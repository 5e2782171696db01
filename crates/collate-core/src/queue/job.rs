//! Job kinds and the processor that runs them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::task::{CancelToken, StatusStore};

/// The closed set of work the queue knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Download,
    Upload,
    Batch,
    Subtitle,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Download => "download",
            JobKind::Upload => "upload",
            JobKind::Batch => "batch",
            JobKind::Subtitle => "subtitle",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-job switches forwarded to the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Produce text only, skipping media artifacts
    #[serde(default = "default_true")]
    pub text_only: bool,
    /// Run the extracted text through the refiner
    #[serde(default = "default_true")]
    pub polish: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            text_only: true,
            polish: true,
        }
    }
}

/// What a job works on. Each variant maps to exactly one [`Processor`] method.
#[derive(Debug, Clone)]
pub enum JobPayload {
    Download {
        url: String,
        options: ProcessOptions,
    },
    Upload {
        path: PathBuf,
        options: ProcessOptions,
        /// Delete the uploaded file once processing ends
        remove_after: bool,
    },
    Batch {
        urls: Vec<String>,
        options: ProcessOptions,
    },
    Subtitle {
        video_path: PathBuf,
    },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Download { .. } => JobKind::Download,
            JobPayload::Upload { .. } => JobKind::Upload,
            JobPayload::Batch { .. } => JobKind::Batch,
            JobPayload::Subtitle { .. } => JobKind::Subtitle,
        }
    }

    /// Input file owned by the job, to be deleted after processing.
    pub(crate) fn disposable_input(&self) -> Option<&Path> {
        match self {
            JobPayload::Upload {
                path,
                remove_after: true,
                ..
            } => Some(path),
            _ => None,
        }
    }

    pub(crate) fn dispatch(
        &self,
        processor: &dyn Processor,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput> {
        match self {
            JobPayload::Download { url, options } => {
                processor.download_and_process(url, options, cancel)
            }
            JobPayload::Upload { path, options, .. } => {
                processor.process_upload(path, options, cancel)
            }
            JobPayload::Batch { urls, options } => processor.process_batch(urls, options, cancel),
            JobPayload::Subtitle { video_path } => processor.generate_subtitles(video_path, cancel),
        }
    }
}

/// Result of one processor call.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Kind-specific payload (text, output directory, subtitle paths...)
    pub output: serde_json::Value,
    pub extract_time: Duration,
    pub polish_time: Duration,
    /// Packaged artifacts, if the processor produced any
    pub archive: Option<PathBuf>,
    /// Chunks that kept their original text after exhausting retries
    pub degraded_chunks: usize,
}

impl ProcessOutput {
    /// JSON stored as the task's result.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "output": self.output,
            "extract_time": self.extract_time.as_secs_f64(),
            "polish_time": self.polish_time.as_secs_f64(),
            "archive": self.archive.as_ref().map(|p| p.display().to_string()),
            "degraded_chunks": self.degraded_chunks,
        })
    }

    /// Completion message; degraded output says so.
    pub fn summary(&self) -> String {
        match self.degraded_chunks {
            0 => "completed".to_string(),
            n => format!("completed; {n} chunk(s) left unrefined after retries"),
        }
    }
}

/// The blocking collaborator that does a job's heavy work.
///
/// Methods run on tokio's blocking pool, one at a time. Implementations call
/// [`CancelToken::check`] between their stages and propagate the error so the
/// queue records the task as cancelled.
pub trait Processor: Send + Sync + 'static {
    fn download_and_process(
        &self,
        url: &str,
        options: &ProcessOptions,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput>;

    fn process_upload(
        &self,
        path: &Path,
        options: &ProcessOptions,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput>;

    fn process_batch(
        &self,
        urls: &[String],
        options: &ProcessOptions,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput>;

    fn generate_subtitles(&self, video_path: &Path, cancel: &CancelToken)
    -> Result<ProcessOutput>;
}

/// Queue entry: a payload plus the store its terminal status goes to.
#[derive(Debug)]
pub(crate) struct Job {
    pub task_id: String,
    pub payload: JobPayload,
    pub statuses: StatusStore,
}
