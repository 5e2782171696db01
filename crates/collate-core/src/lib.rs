//! Task execution and transcript refinement engine.
//!
//! - [`queue`]: single-worker job queue with cooperative cancellation
//! - [`refine`]: chunked, rate-limited, retrying LLM refinement
//! - [`task`]: cancellation registry and task status store
//! - [`text`]: sentence-aware chunking and transcript cleanup

pub mod config;
pub mod error;
pub mod queue;
pub mod refine;
pub mod settings;
pub mod task;
pub mod text;

pub use config::RefineProvider;
pub use error::{Error, Result};
pub use queue::{
    DEFAULT_CAPACITY, InferenceQueue, JobKind, JobPayload, ProcessOptions, ProcessOutput,
    Processor,
};
pub use refine::{
    ChatRefiner, ConcurrentRefiner, FailurePolicy, PolishConfig, PolishMode, PolishOutcome,
    RateLimiter, Refiner,
};
pub use settings::Settings;
pub use task::{CancelToken, Outcome, StatusRecord, StatusStore, TaskRegistry, TaskStatus, new_task_id};
pub use text::{clean_asr_text, split_sentences};
