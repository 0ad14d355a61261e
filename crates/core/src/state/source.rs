//! # Source Tags
//!
//! The closed set of knowledge sources a query can be routed to, plus the
//! parser that turns free-text classifier labels into tags.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A knowledge-source category.
///
/// Equality and identity only. Visiting order is decided per query by the
/// classifier, and synthesis order by the synthesis policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// Primary revealed text
    Quran,
    /// Oral tradition: sayings and actions of the Prophet
    Hadith,
    /// Scholarly commentary
    Tafseer,
    /// Inconclusive or broad intent; triggers cross-source fallback
    General,
}

impl SourceTag {
    /// Tags backed by a concrete index, in fallback query order.
    pub const CONCRETE: [SourceTag; 3] = [SourceTag::Quran, SourceTag::Hadith, SourceTag::Tafseer];

    /// Get all tags
    pub fn all() -> Vec<SourceTag> {
        vec![
            SourceTag::Quran,
            SourceTag::Hadith,
            SourceTag::Tafseer,
            SourceTag::General,
        ]
    }

    /// Stable lower-case label, used as the key into retrieved documents
    pub fn label(&self) -> &'static str {
        match self {
            SourceTag::Quran => "quran",
            SourceTag::Hadith => "hadith",
            SourceTag::Tafseer => "tafseer",
            SourceTag::General => "general",
        }
    }

    /// Display name for logs and UI
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceTag::Quran => "Quran",
            SourceTag::Hadith => "Hadith",
            SourceTag::Tafseer => "Tafseer",
            SourceTag::General => "General",
        }
    }

    /// Whether this tag routes to the cross-source fallback
    pub fn is_fallback(&self) -> bool {
        matches!(self, SourceTag::General)
    }

    /// Resolve a label key back to its tag
    pub fn from_label(label: &str) -> Option<SourceTag> {
        match parse_label(label) {
            ParsedLabel::Known(tag) => Some(tag),
            ParsedLabel::Unrecognized(_) => None,
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of parsing one classifier label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLabel {
    Known(SourceTag),
    /// Normalized text of a label that maps to no tag
    Unrecognized(String),
}

/// Parse a single free-text label into a tag.
///
/// Total: every input lands in exactly one branch.
pub fn parse_label(raw: &str) -> ParsedLabel {
    let normalized = raw.trim().to_lowercase();
    let tag = match normalized.as_str() {
        "quran" | "qur'an" | "quraan" | "koran" => Some(SourceTag::Quran),
        "hadith" | "hadeeth" | "ahadith" | "sunnah" => Some(SourceTag::Hadith),
        "tafseer" | "tafsir" | "tafsir al-quran" | "commentary" => Some(SourceTag::Tafseer),
        "general" | "general_fallback" | "general fallback" | "generalfallback" | "all"
        | "any" => Some(SourceTag::General),
        _ => None,
    };

    match tag {
        Some(tag) => ParsedLabel::Known(tag),
        None => ParsedLabel::Unrecognized(normalized),
    }
}

/// Parse a classifier's label list, preserving order.
///
/// A label that is not itself recognized is split into words, so
/// `"QURAN + TAFSEER"` yields both tags. Only concrete sources are taken
/// from split words; `General` must be the whole label. Returns the tags
/// and the unrecognized fragments that were discarded.
pub fn parse_labels<S: AsRef<str>>(labels: &[S]) -> (Vec<SourceTag>, Vec<String>) {
    let mut tags = Vec::new();
    let mut unrecognized = Vec::new();

    for label in labels {
        match parse_label(label.as_ref()) {
            ParsedLabel::Known(tag) => tags.push(tag),
            ParsedLabel::Unrecognized(text) => {
                let words: Vec<&str> = text
                    .split(|c: char| !(c.is_alphanumeric() || c == '\''))
                    .filter(|w| !w.is_empty())
                    .collect();

                let mut matched = false;
                if words.len() > 1 {
                    for word in words {
                        match parse_label(word) {
                            ParsedLabel::Known(tag) if !tag.is_fallback() => {
                                tags.push(tag);
                                matched = true;
                            }
                            _ => {}
                        }
                    }
                }

                if !matched && !text.is_empty() {
                    unrecognized.push(text);
                }
            }
        }
    }

    (tags, unrecognized)
}
