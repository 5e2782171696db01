//! Queue processor for plain-text transcripts.
//!
//! Handles uploaded `.txt` transcripts: strip recognizer tags, polish the
//! text and write `<name>.polished.txt` next to the input. Other job kinds
//! need media tooling this binary does not ship.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use collate_core::queue::{JobKind, ProcessOptions, ProcessOutput, Processor};
use collate_core::refine::ConcurrentRefiner;
use collate_core::{CancelToken, clean_asr_text};
use tokio::runtime::Handle;
use tracing::info;

pub struct TextFileProcessor {
    refiner: Option<Arc<ConcurrentRefiner>>,
    runtime: Handle,
}

impl TextFileProcessor {
    /// `runtime` drives the async refiner from the queue's blocking thread.
    pub fn new(refiner: Option<Arc<ConcurrentRefiner>>, runtime: Handle) -> Self {
        Self { refiner, runtime }
    }

    fn unsupported(kind: JobKind) -> anyhow::Error {
        anyhow::anyhow!("{kind} jobs are not supported for plain-text transcripts")
    }
}

/// Where the polished copy of `input` is written
pub fn polished_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("transcript");
    input.with_file_name(format!("{stem}.polished.txt"))
}

impl Processor for TextFileProcessor {
    fn download_and_process(
        &self,
        _url: &str,
        _options: &ProcessOptions,
        _cancel: &CancelToken,
    ) -> Result<ProcessOutput> {
        Err(Self::unsupported(JobKind::Download))
    }

    fn process_upload(
        &self,
        path: &Path,
        options: &ProcessOptions,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput> {
        cancel.check()?;

        let started = Instant::now();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let text = clean_asr_text(&raw);
        let extract_time = started.elapsed();
        info!(task_id = cancel.task_id(), chars = text.chars().count(), "transcript loaded");

        cancel.check()?;

        let (polished, degraded_chunks, polish_time) = if options.polish {
            let Some(refiner) = &self.refiner else {
                bail!("polishing requested but no refiner is configured");
            };
            let started = Instant::now();
            let outcome = self
                .runtime
                .block_on(refiner.polish(&text, Some(cancel)))
                .with_context(|| format!("Failed to polish {}", path.display()))?;
            (outcome.text.clone(), outcome.fallback_count(), started.elapsed())
        } else {
            (text, 0, Duration::ZERO)
        };

        cancel.check()?;

        let output_file = polished_path(path);
        fs::write(&output_file, &polished)
            .with_context(|| format!("Failed to write {}", output_file.display()))?;

        Ok(ProcessOutput {
            output: serde_json::json!({
                "polished_text": polished,
                "output_file": output_file.display().to_string(),
            }),
            extract_time,
            polish_time,
            archive: None,
            degraded_chunks,
        })
    }

    fn process_batch(
        &self,
        _urls: &[String],
        _options: &ProcessOptions,
        _cancel: &CancelToken,
    ) -> Result<ProcessOutput> {
        Err(Self::unsupported(JobKind::Batch))
    }

    fn generate_subtitles(&self, _video_path: &Path, _cancel: &CancelToken) -> Result<ProcessOutput> {
        Err(Self::unsupported(JobKind::Subtitle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collate_core::TaskRegistry;
    use collate_core::refine::{PolishConfig, Refiner};

    struct ShoutingRefiner;

    #[async_trait::async_trait]
    impl Refiner for ShoutingRefiner {
        async fn refine(&self, text: &str) -> anyhow::Result<String> {
            Ok(text.to_uppercase())
        }

        fn output_budget(&self) -> usize {
            1000
        }
    }

    fn processor(refiner: Option<Arc<ConcurrentRefiner>>) -> TextFileProcessor {
        TextFileProcessor::new(refiner, Handle::current())
    }

    #[test]
    fn test_polished_path() {
        assert_eq!(
            polished_path(Path::new("/data/talk.txt")),
            PathBuf::from("/data/talk.polished.txt")
        );
    }

    #[tokio::test]
    async fn test_upload_without_polish_cleans_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("talk.txt");
        fs::write(&input, "<|en|><|NEUTRAL|>Hello there. How are you?").unwrap();

        let registry = TaskRegistry::new();
        registry.create("t1");
        let cancel = registry.token("t1");
        let options = ProcessOptions {
            text_only: true,
            polish: false,
        };

        let processor = processor(None);
        let path = input.clone();
        let output = tokio::task::spawn_blocking(move || processor.process_upload(&path, &options, &cancel))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(output.output["polished_text"], "Hello there. How are you?");
        assert_eq!(
            fs::read_to_string(dir.path().join("talk.polished.txt")).unwrap(),
            "Hello there. How are you?"
        );
        assert_eq!(output.degraded_chunks, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upload_is_polished_through_refiner() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        fs::write(&input, "first point. second point.").unwrap();

        let registry = TaskRegistry::new();
        registry.create("t5");
        let cancel = registry.token("t5");
        let refiner = ConcurrentRefiner::new(Arc::new(ShoutingRefiner), PolishConfig::for_budget(1000));

        let processor = processor(Some(Arc::new(refiner)));
        let path = input.clone();
        let output = tokio::task::spawn_blocking(move || {
            processor.process_upload(&path, &ProcessOptions::default(), &cancel)
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(output.output["polished_text"], "FIRST POINT. SECOND POINT.");
        assert_eq!(
            output.output["output_file"],
            dir.path().join("notes.polished.txt").display().to_string()
        );
    }

    #[tokio::test]
    async fn test_cancelled_upload_stops_before_reading() {
        let registry = TaskRegistry::new();
        registry.create("t2");
        registry.request_cancel("t2");
        let cancel = registry.token("t2");

        let processor = processor(None);
        let err = tokio::task::spawn_blocking(move || {
            processor.process_upload(Path::new("missing.txt"), &ProcessOptions::default(), &cancel)
        })
        .await
        .unwrap()
        .unwrap_err();

        assert_eq!(collate_core::Error::cancelled_in(&err), Some("t2"));
    }

    #[tokio::test]
    async fn test_polish_without_refiner_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("talk.txt");
        fs::write(&input, "Some text.").unwrap();

        let registry = TaskRegistry::new();
        registry.create("t3");
        let cancel = registry.token("t3");

        let processor = processor(None);
        let err = tokio::task::spawn_blocking(move || {
            processor.process_upload(&input, &ProcessOptions::default(), &cancel)
        })
        .await
        .unwrap()
        .unwrap_err();
        assert!(err.to_string().contains("no refiner"));
    }

    #[tokio::test]
    async fn test_other_kinds_are_unsupported() {
        let registry = TaskRegistry::new();
        let cancel = registry.token("t4");
        let processor = processor(None);
        let err = processor
            .generate_subtitles(Path::new("talk.mp4"), &cancel)
            .unwrap_err();
        assert!(err.to_string().starts_with("subtitle jobs"));
    }
}
