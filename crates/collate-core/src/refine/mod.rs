//! Chunked, rate-limited, retrying transcript refinement.
//!
//! Long transcripts are split into sentence-aligned chunks, each chunk is sent
//! through a [`Refiner`] (usually an LLM chat endpoint), and the refined chunks
//! are reassembled in their original order no matter which call finished
//! first.
//!
//! # Failure handling
//!
//! A chunk whose refine call keeps failing is retried with a linear backoff.
//! Once its attempts are used up the default policy keeps the chunk's original
//! text, so the output is degraded but complete. The number of such chunks is
//! reported in [`PolishOutcome`]. [`FailurePolicy::FailHard`] turns that
//! into an error instead.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use collate_core::refine::{ChatRefiner, ConcurrentRefiner, PolishConfig};
//!
//! let refiner = Arc::new(ChatRefiner::from_settings(&settings.refine)?);
//! let engine = ConcurrentRefiner::new(refiner, PolishConfig::default());
//! let outcome = engine.polish(&transcript, None).await?;
//! println!("{}", outcome.text);
//! ```

mod chat;
mod rate_limit;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::task::CancelToken;
use crate::text::split_sentences;

pub use chat::{ChatRefiner, DEFAULT_POLISH_PROMPT, DEFAULT_TEMPERATURE};
pub use rate_limit::{RateLimiter, WINDOW};

/// Separator placed between refined chunks
const CHUNK_SEPARATOR: &str = "\n\n";

/// External text-improvement operation applied to one chunk.
#[async_trait]
pub trait Refiner: Send + Sync {
    /// Refine one chunk of text. Errors are treated as transient and retried.
    async fn refine(&self, text: &str) -> anyhow::Result<String>;

    /// Maximum output size (in characters/tokens) of one refine response.
    fn output_budget(&self) -> usize;
}

/// How chunks are dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolishMode {
    #[default]
    Concurrent,
    /// One chunk at a time in index order (debugging, deterministic runs)
    Sequential,
}

/// What to do with a chunk whose attempts are exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Keep the original chunk text and carry on
    #[default]
    Fallback,
    /// Abort the whole polish call
    FailHard,
}

/// Tuning for one [`ConcurrentRefiner`].
#[derive(Debug, Clone, PartialEq)]
pub struct PolishConfig {
    /// Maximum characters per chunk
    pub split_limit: usize,
    /// Maximum chunks in flight at once
    pub max_concurrency: usize,
    /// Maximum refine calls admitted per trailing minute
    pub max_per_minute: usize,
    /// Total attempts per chunk
    pub max_retries: u32,
    /// Delay before attempt `n + 1` is `backoff_base * n`
    pub backoff_base: Duration,
    pub mode: PolishMode,
    pub on_failure: FailurePolicy,
}

impl Default for PolishConfig {
    fn default() -> Self {
        Self {
            split_limit: 1000,
            max_concurrency: 5,
            max_per_minute: 10,
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
            mode: PolishMode::Concurrent,
            on_failure: FailurePolicy::Fallback,
        }
    }
}

impl PolishConfig {
    /// Default settings with the largest split limit `output_budget` allows.
    pub fn for_budget(output_budget: usize) -> Self {
        Self {
            split_limit: max_split_limit(output_budget),
            ..Self::default()
        }
    }

    /// Check the settings against the refiner's output budget.
    ///
    /// A chunk may use at most 70% of the budget so refined output is not cut
    /// off by the refine call's own cap.
    pub fn validate(&self, output_budget: usize) -> Result<()> {
        if self.split_limit == 0 {
            return Err(Error::Configuration("split limit must be positive".into()));
        }
        if self.split_limit > max_split_limit(output_budget) {
            return Err(Error::Configuration(format!(
                "split limit {} exceeds 70% of the refine output budget {} (max {})",
                self.split_limit,
                output_budget,
                max_split_limit(output_budget)
            )));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Configuration("max concurrency must be positive".into()));
        }
        if self.max_per_minute == 0 {
            return Err(Error::Configuration(
                "max requests per minute must be positive".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(Error::Configuration("max retries must be at least 1".into()));
        }
        Ok(())
    }
}

/// Largest split limit allowed for a refine output budget (70%, rounded down).
pub fn max_split_limit(output_budget: usize) -> usize {
    output_budget.saturating_mul(7) / 10
}

/// Final state of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkState {
    Succeeded,
    /// Every attempt failed, original text kept
    FailedFallback,
}

/// What happened to one chunk during a polish call.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub index: usize,
    pub original: String,
    pub refined: String,
    pub attempts: u32,
    pub state: ChunkState,
    /// Last refine error, for chunks that fell back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of [`ConcurrentRefiner::polish`].
#[derive(Debug, Clone, Serialize)]
pub struct PolishOutcome {
    /// Reassembled text
    pub text: String,
    /// Per-chunk reports in index order
    pub chunks: Vec<ChunkReport>,
}

impl PolishOutcome {
    /// Chunks that kept their original text after all attempts failed
    pub fn fallback_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.state == ChunkState::FailedFallback)
            .count()
    }

    pub fn is_degraded(&self) -> bool {
        self.fallback_count() > 0
    }

    /// Side-by-side listing of every chunk before and after refinement.
    pub fn debug_report(&self) -> String {
        let mut report = String::new();
        for chunk in &self.chunks {
            report.push_str(&format!("Chunk {}", chunk.index + 1));
            if chunk.state == ChunkState::FailedFallback {
                report.push_str(" (unrefined)");
            }
            report.push_str(&format!(
                ":\nOriginal: {}\nPolished: {}\n\n",
                chunk.original, chunk.refined
            ));
        }
        report
    }
}

impl fmt::Display for PolishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Everything a chunk task needs, shared by all chunks of one call.
struct ChunkContext {
    refiner: Arc<dyn Refiner>,
    limiter: Arc<RateLimiter>,
    max_retries: u32,
    backoff_base: Duration,
    on_failure: FailurePolicy,
    cancel: Option<CancelToken>,
}

impl ChunkContext {
    fn checkpoint(&self) -> Result<()> {
        match &self.cancel {
            Some(cancel) => cancel.check(),
            None => Ok(()),
        }
    }

    async fn refine_chunk(&self, index: usize, original: String) -> Result<ChunkReport> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            self.checkpoint()?;
            self.limiter.acquire().await;

            debug!(chunk = index, attempt, "sending chunk");
            let result = match self.refiner.refine(&original).await {
                Ok(refined) if refined.trim().is_empty() => {
                    Err(anyhow::anyhow!("refine returned empty text"))
                }
                other => other,
            };

            match result {
                Ok(refined) => {
                    return Ok(ChunkReport {
                        index,
                        original,
                        refined,
                        attempts: attempt,
                        state: ChunkState::Succeeded,
                        error: None,
                    });
                }
                Err(e) => {
                    last_error = format!("{e:#}");
                    warn!(chunk = index, attempt, error = %last_error, "refine attempt failed");
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.backoff_base * attempt).await;
                    }
                }
            }
        }

        match self.on_failure {
            FailurePolicy::Fallback => {
                warn!(
                    chunk = index,
                    attempts = self.max_retries,
                    "giving up on chunk, keeping original text"
                );
                Ok(ChunkReport {
                    index,
                    refined: original.clone(),
                    original,
                    attempts: self.max_retries,
                    state: ChunkState::FailedFallback,
                    error: Some(last_error),
                })
            }
            FailurePolicy::FailHard => Err(Error::TransientRefine {
                index,
                attempts: self.max_retries,
                message: last_error,
            }),
        }
    }
}

/// Pushes chunks of a transcript through a [`Refiner`] with bounded
/// concurrency, rate limiting and retries.
///
/// Meant to be long-lived: the rate limiter lives as long as the refiner, so
/// consecutive or concurrent `polish` calls share one quota.
pub struct ConcurrentRefiner {
    refiner: Arc<dyn Refiner>,
    limiter: Arc<RateLimiter>,
    config: PolishConfig,
}

impl ConcurrentRefiner {
    pub fn new(refiner: Arc<dyn Refiner>, config: PolishConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.max_per_minute));
        Self {
            refiner,
            limiter,
            config,
        }
    }

    /// Share a rate limiter with other refiners calling the same API.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn config(&self) -> &PolishConfig {
        &self.config
    }

    /// Split, refine and reassemble `text`.
    ///
    /// Settings are validated before any refine call. If `cancel` is given it
    /// is checked before every attempt; a cancelled task stops dispatching and
    /// the call returns [`Error::Cancelled`].
    pub async fn polish(&self, text: &str, cancel: Option<&CancelToken>) -> Result<PolishOutcome> {
        self.config.validate(self.refiner.output_budget())?;

        let chunks = split_sentences(text, self.config.split_limit);
        info!(
            chunks = chunks.len(),
            split_limit = self.config.split_limit,
            mode = ?self.config.mode,
            "polishing text"
        );

        let ctx = Arc::new(ChunkContext {
            refiner: self.refiner.clone(),
            limiter: self.limiter.clone(),
            max_retries: self.config.max_retries,
            backoff_base: self.config.backoff_base,
            on_failure: self.config.on_failure,
            cancel: cancel.cloned(),
        });

        let reports = match self.config.mode {
            PolishMode::Sequential => polish_sequential(&ctx, chunks).await?,
            PolishMode::Concurrent => {
                polish_concurrent(ctx, chunks, self.config.max_concurrency).await?
            }
        };

        let text = reports
            .iter()
            .map(|r| r.refined.as_str())
            .collect::<Vec<_>>()
            .join(CHUNK_SEPARATOR)
            .trim()
            .to_string();

        let outcome = PolishOutcome {
            text,
            chunks: reports,
        };
        if outcome.is_degraded() {
            warn!(
                unrefined = outcome.fallback_count(),
                total = outcome.chunks.len(),
                "polish finished with unrefined chunks"
            );
        }
        Ok(outcome)
    }
}

async fn polish_sequential(ctx: &ChunkContext, chunks: Vec<String>) -> Result<Vec<ChunkReport>> {
    let mut reports = Vec::with_capacity(chunks.len());
    for (index, chunk) in chunks.into_iter().enumerate() {
        reports.push(ctx.refine_chunk(index, chunk).await?);
    }
    Ok(reports)
}

async fn polish_concurrent(
    ctx: Arc<ChunkContext>,
    chunks: Vec<String>,
    max_concurrency: usize,
) -> Result<Vec<ChunkReport>> {
    let total = chunks.len();
    let semaphore = Arc::new(Semaphore::new(max_concurrency));
    let mut set = JoinSet::new();

    for (index, chunk) in chunks.into_iter().enumerate() {
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        set.spawn(async move {
            // The semaphore is never closed
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| Error::Configuration(e.to_string()))?;
            ctx.refine_chunk(index, chunk).await
        });
    }

    let mut slots: Vec<Option<ChunkReport>> = (0..total).map(|_| None).collect();
    let mut failure = None;

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Ok(report)) => {
                let index = report.index;
                slots[index] = Some(report);
            }
            Ok(Err(e)) => {
                if failure.is_none() {
                    debug!(error = %e, "stopping remaining chunks");
                    set.abort_all();
                    failure = Some(e);
                }
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => {
                if failure.is_none() {
                    set.abort_all();
                    failure = Some(Error::Processor(format!(
                        "refine task panicked: {join_err}"
                    )));
                }
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| Error::Processor(format!("chunk {index} produced no result")))
        })
        .collect()
}
