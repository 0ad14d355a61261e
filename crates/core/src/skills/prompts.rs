//! Default prompt templates bundled at compile time.

/// Classifier - picks the ordered source tags for a query
pub const CLASSIFIER: &str = include_str!("defaults/classifier.md");

/// Synthesizer - writes the final answer from retrieved context
pub const SYNTHESIS: &str = include_str!("defaults/synthesis.md");

/// Citation and grounding rules appended to every synthesis request
pub const SYNTHESIS_INSTRUCTIONS: &str = include_str!("defaults/synthesis_instructions.md");

/// All bundled prompts with their slugs
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("classifier", CLASSIFIER),
        ("synthesis", SYNTHESIS),
        ("synthesis_instructions", SYNTHESIS_INSTRUCTIONS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_defaults_non_empty() {
        for (slug, content) in all_defaults() {
            assert!(!content.trim().is_empty(), "Prompt {} is empty", slug);
        }
    }

    #[test]
    fn test_classifier_prompt_names_every_label() {
        for label in ["QURAN", "HADITH", "TAFSEER", "GENERAL"] {
            assert!(CLASSIFIER.contains(label));
        }
    }

    #[test]
    fn test_instructions_forbid_internal_ids() {
        assert!(SYNTHESIS_INSTRUCTIONS.contains("identifiers"));
        assert!(SYNTHESIS_INSTRUCTIONS.contains("attribution"));
    }
}
