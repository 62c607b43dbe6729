#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    pub target_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_chars: 800,
            overlap_chars: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub offset: usize,
}

/// Splits `text` into overlapping chunks around `config.target_chars`,
/// preferring to break at a paragraph boundary, then a sentence boundary,
/// then a word boundary, and only hard-cutting mid-word as a last resort. A
/// boundary candidate inside a fenced code block is skipped in favor of the
/// next safe one, so a chunk boundary never lands inside a ``` ``` span.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }
    let fences = code_fence_spans(text);
    let bytes = text.as_bytes();
    let len = bytes.len();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        let target_end = (start + config.target_chars).min(len);
        if target_end >= len {
            push_chunk(&mut chunks, text, start, len);
            break;
        }

        let end = find_boundary(text, &fences, start, target_end);
        push_chunk(&mut chunks, text, start, end);

        if end >= len {
            break;
        }
        let next_start = end.saturating_sub(config.overlap_chars);
        start = if next_start > start { next_start } else { end };
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: &str, start: usize, end: usize) {
    let slice = &text[start..end];
    if !slice.trim().is_empty() {
        chunks.push(Chunk {
            text: slice.to_string(),
            offset: start,
        });
    }
}

/// Returns byte spans covered by ``` fenced code blocks.
fn code_fence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut search_from = 0;
    while let Some(rel_start) = text[search_from..].find("```") {
        let fence_start = search_from + rel_start;
        let after = fence_start + 3;
        if let Some(rel_end) = text[after..].find("```") {
            let fence_end = after + rel_end + 3;
            spans.push((fence_start, fence_end));
            search_from = fence_end;
        } else {
            spans.push((fence_start, text.len()));
            break;
        }
    }
    spans
}

fn inside_fence(fences: &[(usize, usize)], pos: usize) -> bool {
    fences.iter().any(|(s, e)| pos > *s && pos < *e)
}

fn find_boundary(text: &str, fences: &[(usize, usize)], start: usize, target_end: usize) -> usize {
    if let Some(pos) = rfind_in_range(text, start, target_end, "\n\n") {
        if !inside_fence(fences, pos) {
            return pos;
        }
    }
    for sep in [". ", "! ", "? ", ".\n", "!\n", "?\n"] {
        if let Some(cut) = rfind_in_range(text, start, target_end, sep) {
            if !inside_fence(fences, cut) {
                return cut;
            }
        }
    }
    if let Some(pos) = rfind_in_range(text, start, target_end, " ") {
        if !inside_fence(fences, pos) {
            return pos;
        }
    }
    target_end
}

fn rfind_in_range(text: &str, start: usize, end: usize, needle: &str) -> Option<usize> {
    text.get(start..end)?.rfind(needle).map(|p| start + p + needle.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_becomes_a_single_chunk() {
        let chunks = chunk_text("hello world", &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].offset, 0);
    }

    #[test]
    fn splits_long_text_with_overlap() {
        let paragraph = "word ".repeat(10);
        let text = std::iter::repeat(paragraph.clone())
            .take(20)
            .collect::<Vec<_>>()
            .join("\n\n");
        let config = ChunkConfig {
            target_chars: 200,
            overlap_chars: 50,
        };
        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() > 1);
        // Overlap: the second chunk's offset is before the first chunk's end.
        assert!(chunks[1].offset < chunks[0].offset + chunks[0].text.len());
    }

    #[test]
    fn never_splits_inside_a_fenced_code_block() {
        let code = "```rust\n".to_string() + &"let x = 1;\n".repeat(40) + "```\n";
        let text = format!("intro paragraph.\n\n{code}\n\nmore text after.");
        let config = ChunkConfig {
            target_chars: 50,
            overlap_chars: 10,
        };
        let chunks = chunk_text(&text, &config);
        let fences = code_fence_spans(&text);
        for window in chunks.windows(1) {
            let end = window[0].offset + window[0].text.len();
            assert!(!inside_fence(&fences, end) || end == text.len());
        }
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunk_text("", &ChunkConfig::default()).is_empty());
    }
}
