//! Transcript text utilities.

mod split;

pub use split::{clean_asr_text, split_sentences};
