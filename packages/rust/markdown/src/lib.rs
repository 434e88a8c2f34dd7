//! Text normalization for generated content and research extracts.
//!
//! Generated text is passed through a cleanup pipeline (see [`normalize_generated`])
//! that removes Markdown markup and normalizes paragraph spacing. Research
//! extracts are condensed into short bullet lists with [`bullet_points`], and
//! topic suggestions are parsed with [`parse_topic_list`].

mod cleanup;

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Marker prefixed to every summary point.
pub const BULLET: &str = "• ";

/// Normalize text returned by the generator.
///
/// Strips emphasis and heading markup, collapses runs of blank lines into one,
/// and inserts a paragraph break where a lower-case-ending line runs straight
/// into an upper-case-starting line.
pub fn normalize_generated(text: &str) -> String {
    let cleaned = cleanup::run_pipeline(text);
    debug!(raw_len = text.len(), cleaned_len = cleaned.len(), "normalized generated text");
    cleaned
}

/// Split text into sentences on `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let Some(&(next_i, next_ch)) = chars.peek() else {
            break;
        };
        if next_ch.is_whitespace() {
            let sentence = text[start..next_i].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = next_i;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Condense a raw extract into at most `max_points` bullet points.
///
/// The result is deterministic for a given extract.
pub fn bullet_points(extract: &str, max_points: usize) -> Vec<String> {
    split_sentences(extract)
        .into_iter()
        .take(max_points)
        .map(|sentence| format!("{BULLET}{sentence}"))
        .collect()
}

/// Parse a generated topic list into at most `limit` distinct topics.
///
/// List markers (`-`, `*`, `•`, `1.`, `2)`) and wrapping quotes are removed,
/// lines ending in `:` are treated as preamble, and duplicates are dropped
/// case-insensitively while keeping first occurrence order.
pub fn parse_topic_list(text: &str, limit: usize) -> Vec<String> {
    static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(?:[-•*+]\s*|\d+[.)]\s*)+").expect("valid regex")
    });

    let mut seen = HashSet::new();
    let mut topics = Vec::new();

    for line in text.lines() {
        let line = MARKER_RE.replace(line.trim(), "");
        let topic = line.trim().trim_matches('"').trim();

        if topic.is_empty() || topic.ends_with(':') {
            continue;
        }
        if !seen.insert(topic.to_lowercase()) {
            continue;
        }

        topics.push(topic.to_string());
        if topics.len() == limit {
            break;
        }
    }

    topics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let text = "Quantum computing uses qubits. It is fast! Is it ready? Not yet.";
        assert_eq!(
            split_sentences(text),
            vec![
                "Quantum computing uses qubits.",
                "It is fast!",
                "Is it ready?",
                "Not yet."
            ]
        );
    }

    #[test]
    fn decimals_do_not_split() {
        assert_eq!(
            split_sentences("Version 2.5 shipped. Then 3.0"),
            vec!["Version 2.5 shipped.", "Then 3.0"]
        );
    }

    #[test]
    fn bullet_points_cap_at_four() {
        let extract = "One. Two. Three. Four. Five. Six.";
        let points = bullet_points(extract, 4);
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], "• One.");
        assert_eq!(points[3], "• Four.");
    }

    #[test]
    fn bullet_points_of_empty_extract() {
        assert!(bullet_points("", 4).is_empty());
        assert!(bullet_points("   ", 4).is_empty());
    }

    #[test]
    fn normalize_removes_markup() {
        let out = normalize_generated("## Heading\n**Bold** text\n\n\n\nmore");
        assert!(!out.contains("**"));
        assert!(!out.contains("##"));
        assert!(!out.contains("\n\n\n"));
    }

    #[test]
    fn topic_list_strips_markers_and_dedupes() {
        let text = "Here are some ideas:\n1. Rust for beginners\n2) \"Async Rust\"\n- rust for Beginners\n* Error handling\n• Traits\n\n3. Macros\n4. Lifetimes";
        let topics = parse_topic_list(text, 5);
        assert_eq!(
            topics,
            vec![
                "Rust for beginners",
                "Async Rust",
                "Error handling",
                "Traits",
                "Macros"
            ]
        );
    }
}
