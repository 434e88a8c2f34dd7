//! Cleanup pipeline for generated text.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! The pipeline removes Markdown markup the generator tends to emit and
//! normalizes paragraph spacing so every stage returns the same shape of text.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on raw generated text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = text.replace("\r\n", "\n");

    result = strip_heading_markers(&result);
    result = strip_emphasis(&result);
    result = trim_lines(&result);
    result = collapse_blank_lines(&result);
    result = insert_paragraph_breaks(&result);

    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Heading markers
// ---------------------------------------------------------------------------

/// Drop `#` heading prefixes and any stray `##` left mid-line.
fn strip_heading_markers(text: &str) -> String {
    static LEADING_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*").expect("valid regex"));
    static STRAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#{2,}").expect("valid regex"));

    let without_prefix = LEADING_RE.replace_all(text, "");
    STRAY_RE.replace_all(&without_prefix, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Emphasis tokens
// ---------------------------------------------------------------------------

/// Remove `**`, `__` and `*` emphasis tokens, keeping the wrapped text.
fn strip_emphasis(text: &str) -> String {
    static EMPHASIS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*\*|__|\*").expect("valid regex"));

    EMPHASIS_RE.replace_all(text, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Per-line whitespace
// ---------------------------------------------------------------------------

/// Trim every line. Lines holding only removed markup become blank.
fn trim_lines(text: &str) -> String {
    text.lines().map(str::trim).collect::<Vec<_>>().join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Blank lines
// ---------------------------------------------------------------------------

/// Collapse any run of blank lines into a single blank line.
fn collapse_blank_lines(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(text, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Paragraph breaks
// ---------------------------------------------------------------------------

/// Split a lower-case-ending line from a following upper-case-starting line.
fn insert_paragraph_breaks(text: &str) -> String {
    static RUN_ON_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"([a-z])\n([A-Z])").expect("valid regex"));

    RUN_ON_RE.replace_all(text, "$1\n\n$2").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_headings() {
        assert_eq!(strip_heading_markers("## Intro\ntext ## more"), "Intro\ntext  more");
        assert_eq!(strip_heading_markers("   ### Deep"), "Deep");
    }

    #[test]
    fn strips_emphasis() {
        assert_eq!(strip_emphasis("a **bold** and *soft* __word__"), "a bold and soft word");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn breaks_run_on_paragraphs() {
        assert_eq!(insert_paragraph_breaks("ends here\nNext one"), "ends here\n\nNext one");
        // Sentence punctuation is left alone.
        assert_eq!(insert_paragraph_breaks("ends here.\nNext one"), "ends here.\nNext one");
        assert_eq!(insert_paragraph_breaks("a\nB\nc\nD"), "a\n\nB\nc\n\nD");
    }

    #[test]
    fn full_pipeline() {
        let raw = "## Intro\r\nQuantum **computing** is cool\nIt works.\n\n\n\n* End  ";
        assert_eq!(
            run_pipeline(raw),
            "Intro\n\nQuantum computing is cool\n\nIt works.\n\nEnd"
        );
    }

    #[test]
    fn pipeline_is_idempotent() {
        let once = run_pipeline("# Title\nbody text\nMore **text**\n\n\n\nlast");
        assert_eq!(run_pipeline(&once), once);
    }
}
