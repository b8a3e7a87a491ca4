//! Character-window text chunking with overlap and sentence-boundary trim.

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
/// Chunks that are not the final one are trimmed back to the last sentence
/// boundary in their tail, when one exists.
pub fn split_into_chunks(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();

    if total == 0 || chunk_size == 0 {
        return chunks;
    }

    let mut start = 0;

    while start < total {
        let end = (start + chunk_size).min(total);
        let window = &chars[start..end];

        let cut = if end < total {
            find_sentence_boundary(window).unwrap_or(window.len())
        } else {
            window.len()
        };

        let chunk: String = window[..cut].iter().collect();
        let chunk = chunk.trim().to_string();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }

        if end == total {
            break;
        }
        // The next window starts relative to where this chunk actually
        // ended, so a sentence-boundary trim never skips text.
        start += cut.saturating_sub(overlap).max(1);
    }

    chunks
}

/// Index just past the last sentence ending in the final 20% of the window.
fn find_sentence_boundary(window: &[char]) -> Option<usize> {
    let search_start = (window.len() * 80) / 100;

    for i in (search_start..window.len().saturating_sub(1)).rev() {
        let c = window[i];
        let next = window[i + 1];
        if matches!(c, '.' | '!' | '?') && (next == ' ' || next == '\n') {
            return Some(i + 2);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_into_chunks("", 400, 20).is_empty());
        assert!(split_into_chunks("   ", 400, 20).len() <= 1);
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_into_chunks("Just one sentence.", 400, 20);
        assert_eq!(chunks, vec!["Just one sentence.".to_string()]);
    }

    #[test]
    fn long_text_produces_overlapping_chunks() {
        let text = "This is a sentence. ".repeat(50);
        let chunks = split_into_chunks(&text, 100, 20);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
    }

    #[test]
    fn chunks_prefer_sentence_boundaries() {
        let text = format!("{} End of part one. {}", "a".repeat(70), "b".repeat(200));
        let chunks = split_into_chunks(&text, 100, 10);
        assert!(chunks[0].ends_with("End of part one."));
    }

    #[test]
    fn boundary_trim_does_not_skip_following_text() {
        // A sentence ends early in the first window's tail; the text right
        // after the cut must still land in a later chunk.
        let text = format!("{}. {}{}", "x".repeat(81), "LOSTLOST", "z".repeat(120));
        let chunks = split_into_chunks(&text, 100, 10);

        assert!(
            chunks.iter().any(|c| c.contains("LOSTLOST")),
            "text after the sentence cut was dropped: {chunks:?}"
        );
    }

    #[test]
    fn every_sentence_appears_in_some_chunk() {
        let text: String = (0..40).map(|i| format!("Sentence number {i} here. ")).collect();
        let chunks = split_into_chunks(&text, 100, 20);

        for i in 0..40 {
            let needle = format!("number {i} here");
            assert!(
                chunks.iter().any(|c| c.contains(&needle)),
                "missing from every chunk: {needle}"
            );
        }
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "日本語のテキスト。".repeat(100);
        let chunks = split_into_chunks(&text, 50, 10);
        assert!(!chunks.is_empty());
    }
}
