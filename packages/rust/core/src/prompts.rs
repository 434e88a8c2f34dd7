//! Prompt construction for each generating stage.

use std::fmt::Write;

use draftsmith_shared::ResearchBundle;

/// Number of topic ideas requested for an intent.
pub const TOPIC_IDEA_COUNT: usize = 5;

/// Ask for blog topic ideas based on a free-form intent.
pub fn topic_ideas(intent: &str) -> String {
    format!(
        "Generate a list of exactly {TOPIC_IDEA_COUNT} short, clear, and engaging blog topics \
         based on the following: {intent}\n\n\
         Return one topic per line with no numbering, commentary, or extra text."
    )
}

/// First-draft prompt embedding the topic and every research point.
pub fn draft(topic: &str, research: &ResearchBundle) -> String {
    let mut prompt = format!("Write a detailed first draft article about: \"{topic}\".\n\n");

    prompt.push_str("Base the article on this research:\n\n");
    let main = &research.main_topic;
    let _ = writeln!(prompt, "{}", main.title);
    if !main.description.is_empty() {
        let _ = writeln!(prompt, "({})", main.description);
    }
    for point in &main.summary {
        let _ = writeln!(prompt, "{point}");
    }

    if !research.related_topics.is_empty() {
        prompt.push_str("\nRelated topics:\n");
        for related in &research.related_topics {
            let _ = writeln!(prompt, "\n{}", related.title);
            for point in &related.summary {
                let _ = writeln!(prompt, "{point}");
            }
        }
    }

    prompt.push_str(
        "\nYour article should:\n\
         - Have a clear, engaging introduction\n\
         - Be well-structured with logical flow between paragraphs\n\
         - Be informative and fact-based\n\
         - Include a concise conclusion\n\
         - Be approximately 500-800 words in length\n\
         - Avoid unnecessary fluff and jargon\n\n\
         Use plain paragraphs separated by blank lines.",
    );
    prompt
}

/// Editor-persona prompt. `draft` and `instructions` are embedded verbatim.
pub fn edit(draft: &str, instructions: &str, style: Option<&str>) -> String {
    let tone = match style.map(str::trim).filter(|s| !s.is_empty()) {
        Some(style) => format!("Adopt a {style} tone."),
        None => "Maintain the original tone.".to_string(),
    };

    format!(
        "You are an expert blog editor named Max.\n\
         The user has requested your help to refine a blog post draft.\n\
         Refine the following draft according to the provided instructions.\n\n\
         Draft:\n{draft}\n\n\
         Instructions:\n{instructions}\n\n\
         Fix grammar, punctuation, and structural issues.\n\
         Ensure logical flow. {tone}\n\n\
         Return only suggestions for improvement without additional explanations."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftsmith_shared::TopicSummary;

    #[test]
    fn draft_prompt_embeds_topic_and_points() {
        let research = ResearchBundle {
            source: "wiki".into(),
            main_topic: TopicSummary {
                title: "Quantum computing".into(),
                description: "Computation with qubits".into(),
                summary: vec!["• Uses qubits.".into(), "• Is fast.".into()],
                url: String::new(),
            },
            related_topics: vec![TopicSummary {
                title: "Qubit".into(),
                description: String::new(),
                summary: vec!["• A unit.".into()],
                url: String::new(),
            }],
        };

        let prompt = draft("Quantum Computing", &research);
        assert!(prompt.contains("\"Quantum Computing\""));
        assert!(prompt.contains("• Uses qubits."));
        assert!(prompt.contains("• Is fast."));
        assert!(prompt.contains("Related topics:"));
        assert!(prompt.contains("• A unit."));
    }

    #[test]
    fn edit_prompt_embeds_inputs_verbatim() {
        let prompt = edit("My  draft\nline two", "Make it shorter", None);
        assert!(prompt.contains("My  draft\nline two"));
        assert!(prompt.contains("Make it shorter"));
        assert!(prompt.contains("Maintain the original tone."));

        let styled = edit("d", "i", Some("playful"));
        assert!(styled.contains("Adopt a playful tone."));
    }

    #[test]
    fn topic_prompt_asks_for_five() {
        assert!(topic_ideas("remote work").contains("exactly 5"));
    }
}
