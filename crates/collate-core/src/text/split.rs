//! Sentence-aware splitting of long transcripts.
//!
//! Refinement runs per chunk, so chunk boundaries fall between sentences and
//! every chunk stays within the size limit. The one exception is a single
//! sentence that is already longer than the limit: it is emitted on its own,
//! untruncated, so no text is ever lost.

/// Characters that end a sentence (ASCII and full-width).
const SENTENCE_TERMINATORS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

fn is_terminator(c: char) -> bool {
    SENTENCE_TERMINATORS.contains(&c)
}

/// Break text into sentences, keeping punctuation with the sentence it ends.
///
/// Runs of terminators ("?!", "。。") stay together, and trailing text
/// without a terminator becomes the last sentence.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if !is_terminator(next) {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }
        out.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Split `text` into ordered chunks of at most `limit` characters.
///
/// Sentences are packed greedily: when appending the next sentence would push
/// the running chunk past `limit`, the chunk is emitted and a new one starts
/// with that sentence. Chunks are trimmed and never empty.
pub fn split_sentences(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences(text) {
        let sentence_len = sentence.chars().count();
        if current_len > 0 && current_len + sentence_len > limit {
            push_trimmed(&mut chunks, &current);
            current.clear();
            current_len = 0;
        }
        current.push_str(sentence);
        current_len += sentence_len;
    }
    push_trimmed(&mut chunks, &current);

    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Remove `<|...|>` control tags some ASR models emit (language, emotion,
/// event markers). Matching is shortest-first; an unterminated `<|` is kept.
pub fn clean_asr_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("<|") {
        let after_open = &rest[open + 2..];
        match after_open.find("|>") {
            Some(close) => {
                out.push_str(&rest[..open]);
                rest = &after_open[close + 2..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_ws(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_split_empty_text() {
        assert!(split_sentences("", 100).is_empty());
        assert!(split_sentences("   \n ", 100).is_empty());
    }

    #[test]
    fn test_split_single_sentence() {
        let result = split_sentences("这是唯一的一句话。", 100);
        assert_eq!(result, vec!["这是唯一的一句话。"]);
    }

    #[test]
    fn test_split_mixed_punctuation_fits_one_chunk() {
        let text = "This is English. 这是中文。Another sentence! 另一句？";
        let result = split_sentences(text, 100);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0], text);
    }

    #[test]
    fn test_split_packs_sentences_up_to_limit() {
        // each sentence is 4 characters
        let result = split_sentences("第一句。第二句。第三句。第四句。", 8);
        assert_eq!(result, vec!["第一句。第二句。", "第三句。第四句。"]);
    }

    #[test]
    fn test_split_chunks_respect_limit() {
        let text = "这是一个很长的句子。".repeat(10);
        let result = split_sentences(&text, 30);
        assert!(result.len() > 1);
        for chunk in &result {
            assert!(chunk.chars().count() <= 30);
        }
    }

    #[test]
    fn test_oversized_sentence_kept_whole() {
        let long = "This sentence is far longer than the tiny limit allows.";
        let text = format!("Short. {long} Tail.");
        let result = split_sentences(&text, 10);
        assert_eq!(result, vec!["Short.", long, "Tail."]);
    }

    #[test]
    fn test_trailing_text_without_terminator_is_kept() {
        let result = split_sentences("第一句。第二句没有句号", 100);
        assert_eq!(result, vec!["第一句。第二句没有句号"]);

        let result = split_sentences("第一句。第二句没有句号", 4);
        assert_eq!(result, vec!["第一句。", "第二句没有句号"]);
    }

    #[test]
    fn test_consecutive_punctuation_stays_together() {
        let result = split_sentences("真的吗？？！！是的。。", 6);
        assert_eq!(result, vec!["真的吗？？！！", "是的。。"]);
    }

    #[test]
    fn test_zero_limit_gives_one_sentence_per_chunk() {
        let result = split_sentences("A. B. C.", 0);
        assert_eq!(result, vec!["A.", "B.", "C."]);
    }

    #[test]
    fn test_split_round_trip_preserves_content() {
        let text = "First sentence. Second one! Third?  第四句。第五句！没有结尾";
        for limit in [1, 5, 12, 20, 1000] {
            let chunks = split_sentences(text, limit);
            assert_eq!(strip_ws(&chunks.concat()), strip_ws(text), "limit {limit}");
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let text = "One. Two. Three. Four. Five.";
        assert_eq!(split_sentences(text, 10), split_sentences(text, 10));
    }

    #[test]
    fn test_clean_simple_tags() {
        assert_eq!(clean_asr_text("这是文本<|tag1|>内容<|tag2|>结束"), "这是文本内容结束");
    }

    #[test]
    fn test_clean_no_tags() {
        let text = "这是一段没有标签的正常文本";
        assert_eq!(clean_asr_text(text), text);
        assert_eq!(clean_asr_text(""), "");
    }

    #[test]
    fn test_clean_only_tags() {
        assert_eq!(clean_asr_text("<|zh|><|NEUTRAL|><|Speech|>"), "");
    }

    #[test]
    fn test_clean_nested_tags_shortest_match() {
        assert_eq!(clean_asr_text("文本<|outer<|inner|>|>结束"), "文本|>结束");
    }

    #[test]
    fn test_clean_incomplete_tags() {
        assert_eq!(
            clean_asr_text("文本<|incomplete 内容 |>incomplete> 结束"),
            "文本incomplete> 结束"
        );
        assert_eq!(clean_asr_text("开始<|未闭合"), "开始<|未闭合");
    }
}
