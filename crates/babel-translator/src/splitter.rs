//! Lossless text splitting.
//!
//! Chunks are borrowed slices of the input; concatenating them in order gives
//! back the input byte for byte. Paragraphs (`\n\n`) are preferred split
//! points, sentences the fallback. Nothing is ever cut mid-sentence: a single
//! unit larger than the limit becomes its own oversized chunk.

/// Default chunk ceiling in bytes.
pub const MAX_CHUNK_SIZE: usize = 20_000;

const TERMINALS: [char; 4] = ['.', '!', '?', '…'];

/// Split `text` into chunks of at most [`MAX_CHUNK_SIZE`] bytes.
pub fn split_text(text: &str) -> Vec<&str> {
    split_text_with_limit(text, MAX_CHUNK_SIZE)
}

/// Split `text` into chunks of at most `limit` bytes where split points allow.
///
/// Text within the limit (including empty text) comes back as one chunk.
pub fn split_text_with_limit(text: &str, limit: usize) -> Vec<&str> {
    if text.len() <= limit {
        return vec![text];
    }

    let mut units: Vec<&str> = Vec::new();
    for paragraph in text.split_inclusive("\n\n") {
        if paragraph.len() > limit {
            units.extend(split_by_sentences(paragraph));
        } else {
            units.push(paragraph);
        }
    }

    pack(text, &units, limit)
}

/// Greedily pack consecutive `units` (which tile `text`) into chunks.
fn pack<'a>(text: &'a str, units: &[&str], limit: usize) -> Vec<&'a str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut len = 0;

    for unit in units {
        if len > 0 && len + unit.len() > limit {
            chunks.push(&text[start..start + len]);
            start += len;
            len = 0;
        }
        len += unit.len();
    }
    if len > 0 {
        chunks.push(&text[start..start + len]);
    }
    chunks
}

/// Split `text` after sentence terminators (`.`, `!`, `?`, `…`) followed by
/// whitespace or end of text, and after a newline closing a non-blank line
/// that has no terminator. Delimiters stay with the preceding sentence.
pub fn split_by_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut line_start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = i + c.len_utf8();
        let boundary = match c {
            '.' | '!' | '?' | '…' => chars.peek().map_or(true, |&(_, next)| next.is_whitespace()),
            '\n' => {
                let line = text[line_start..i].trim();
                line_start = end;
                !line.is_empty() && !line.ends_with(TERMINALS)
            }
            _ => false,
        };
        if boundary {
            sentences.push(&text[start..end]);
            start = end;
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(sentence: &str, repeat: usize) -> String {
        sentence.repeat(repeat)
    }

    #[test]
    fn test_small_text_single_chunk() {
        assert_eq!(split_text("Hello world."), vec!["Hello world."]);
    }

    #[test]
    fn test_empty_text_single_empty_chunk() {
        assert_eq!(split_text(""), vec![""]);
    }

    #[test]
    fn test_paragraph_split_is_lossless() {
        let p = paragraph("Это предложение. ", 400); // ~12.4 KB of Cyrillic
        let text = format!("{p}\n\n{p}\n\n{p}");
        let chunks = split_text(&text);
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), text);
        for chunk in &chunks {
            assert!(chunk.len() <= MAX_CHUNK_SIZE);
        }
    }

    #[test]
    fn test_large_paragraph_falls_back_to_sentences() {
        let text = paragraph("The quick brown fox jumps over the lazy dog! ", 1000);
        assert!(text.len() > MAX_CHUNK_SIZE);
        let chunks = split_text(&text);
        assert!(chunks.len() >= 3);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.iter().all(|c| c.len() <= MAX_CHUNK_SIZE));
    }

    #[test]
    fn test_unsplittable_text_is_one_oversized_chunk() {
        let text = "x".repeat(MAX_CHUNK_SIZE + 500);
        let chunks = split_text(&text);
        assert_eq!(chunks, vec![text.as_str()]);
    }

    #[test]
    fn test_custom_limit() {
        let text = "One. Two. Three. Four.";
        let chunks = split_text_with_limit(text, 10);
        assert_eq!(chunks.concat(), text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 10));
    }

    #[test]
    fn test_sentence_count() {
        let sentences = split_by_sentences("First sentence. Second sentence! Third sentence?");
        assert_eq!(
            sentences,
            vec!["First sentence.", " Second sentence!", " Third sentence?"]
        );
    }

    #[test]
    fn test_sentence_ellipsis_and_trailing_fragment() {
        let text = "Wait… What? and then";
        let sentences = split_by_sentences(text);
        assert_eq!(sentences, vec!["Wait…", " What?", " and then"]);
        assert_eq!(sentences.concat(), text);
    }

    #[test]
    fn test_sentence_decimal_not_split() {
        assert_eq!(split_by_sentences("Pi is 3.14 roughly."), vec!["Pi is 3.14 roughly."]);
    }

    #[test]
    fn test_newline_ends_unpunctuated_line() {
        let text = "Chapter One\nIt was late. Very late.\n";
        let sentences = split_by_sentences(text);
        assert_eq!(sentences[0], "Chapter One\n");
        assert_eq!(sentences.concat(), text);
    }

    #[test]
    fn test_sentence_roundtrip_mixed() {
        let text = "Привет! Как дела?\n\nХорошо… Спасибо.\nConst line\nlast";
        assert_eq!(split_by_sentences(text).concat(), text);
    }
}
