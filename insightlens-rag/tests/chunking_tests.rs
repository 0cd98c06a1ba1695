//! Property tests for paragraph-aware chunking.

use insightlens_rag::{Chunker, Document, ParagraphChunker};
use proptest::prelude::*;

/// Text with frequent paragraph breaks, multibyte characters, and CRLF.
fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zé ]{0,40}(\n\n[a-zé ]{0,40}){0,20}",
        "[a-z \n\r\t]{0,400}",
        "(?s).{0,400}",
    ]
}

fn arb_settings() -> impl Strategy<Value = (usize, usize)> {
    (1usize..200).prop_flat_map(|size| (Just(size), 0..size))
}

/// Paragraphs of short words, each shorter than any chunk size used below.
fn arb_short_paragraphs() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z]{1,5}( [a-z]{1,5}){0,1}", 1..40)
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// *For any* text and valid settings, no chunk is blank and no chunk is
/// longer than `chunk_size` characters.
mod prop_chunk_bounds {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_are_non_blank_and_bounded(text in arb_text(), (size, overlap) in arb_settings()) {
            let chunker = ParagraphChunker::new(size, overlap).unwrap();
            for chunk in chunker.split(&text) {
                prop_assert!(!chunk.trim().is_empty());
                prop_assert!(chunk.chars().count() <= size, "{} > {size}", chunk.chars().count());
            }
        }

        #[test]
        fn overlap_at_or_above_size_is_rejected(size in 1usize..200, extra in 0usize..50) {
            prop_assert!(ParagraphChunker::new(size, size + extra).is_err());
        }
    }
}

/// *For any* text, chunks recover the paragraphs in order modulo whitespace.
mod prop_paragraph_recovery {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn without_overlap_no_text_is_lost_or_reordered(text in arb_text(), size in 1usize..200) {
            let chunker = ParagraphChunker::new(size, 0).unwrap();
            let chunks = chunker.split(&text);
            prop_assert_eq!(strip_whitespace(&chunks.concat()), strip_whitespace(&text));
        }

        #[test]
        fn small_paragraphs_are_joined_verbatim(
            paragraphs in arb_short_paragraphs(),
            size in 12usize..120,
            overlap in 0usize..12,
        ) {
            let chunker = ParagraphChunker::new(size, overlap).unwrap();
            let chunks = chunker.split(&paragraphs.join("\n\n"));
            prop_assert_eq!(chunks.join(" "), paragraphs.join(" "));
        }
    }
}

/// *For any* text, shrinking `chunk_size` never reduces the chunk count.
mod prop_chunk_count_monotonic {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn packing_needs_more_chunks_when_size_shrinks(
            paragraphs in arb_short_paragraphs(),
            small in 12usize..100,
            grow in 0usize..100,
        ) {
            let text = paragraphs.join("\n\n");
            let small_count = ParagraphChunker::new(small, 0).unwrap().split(&text).len();
            let large_count = ParagraphChunker::new(small + grow, 0).unwrap().split(&text).len();
            prop_assert!(small_count >= large_count, "{small_count} < {large_count}");
        }

        #[test]
        fn hard_split_needs_more_windows_when_size_shrinks(
            len in 1usize..2000,
            small in 20usize..300,
            grow in 0usize..300,
            overlap in 0usize..20,
        ) {
            let text = "x".repeat(len);
            let small_count = ParagraphChunker::new(small, overlap).unwrap().split(&text).len();
            let large_count =
                ParagraphChunker::new(small + grow, overlap).unwrap().split(&text).len();
            prop_assert!(small_count >= large_count, "{small_count} < {large_count}");
        }
    }
}

#[test]
fn long_paragraph_yields_three_windows_850_apart() {
    let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let chunker = ParagraphChunker::new(1000, 150).unwrap();
    let chunks = chunker.split(&text);

    assert_eq!(chunks.len(), 3);
    for (i, chunk) in chunks.iter().enumerate() {
        assert!(chunk.chars().count() <= 1000);
        assert_eq!(chunk.as_str(), &text[i * 850..(i * 850 + 1000).min(2500)]);
    }
}

#[test]
fn chunk_indices_follow_output_order() {
    let document = Document::new("notes.md", "alpha\n\nbeta\n\ngamma");
    let chunks = ParagraphChunker::new(6, 0).unwrap().chunk(&document);
    let summary: Vec<(usize, &str, String)> =
        chunks.iter().map(|c| (c.index, c.text.as_str(), c.record_id())).collect();
    assert_eq!(
        summary,
        vec![
            (0, "alpha", "notes.md_0".to_string()),
            (1, "beta", "notes.md_1".to_string()),
            (2, "gamma", "notes.md_2".to_string()),
        ]
    );
}
