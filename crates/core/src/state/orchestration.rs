//! # Orchestration State
//!
//! The per-query record threaded through classification, retrieval, and
//! synthesis. One instance is created per incoming query, owned by a
//! single run, and discarded once the final response is extracted.
//!
//! ## Invariants
//!
//! - `current_source_index` only moves forward, by exactly one per retrieval step.
//! - `required_sources` is assigned once and never reordered.
//! - A source's documents are written at most once.
//! - Once `final_response` is set the state is terminal.
//!
//! Mutators check every precondition before touching any field, so a
//! rejected call leaves the state exactly as it was.

use super::document::Document;
use super::source::SourceTag;
use crate::error::{RouterError, RouterResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Preamble used when the caller does not supply one
pub const DEFAULT_INSTRUCTION_PREAMBLE: &str =
    "Please provide a comprehensive Islamic answer to the following question:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationState {
    query: String,
    instruction_preamble: String,
    required_sources: Vec<SourceTag>,
    #[serde(default)]
    classification_rationale: Option<String>,
    completed_sources: HashSet<SourceTag>,
    /// Keyed by `SourceTag::label()`
    retrieved_documents: BTreeMap<String, Vec<Document>>,
    final_response: String,
    error_message: Option<String>,
    current_source_index: usize,
    #[serde(default)]
    sources_assigned: bool,
}

impl OrchestrationState {
    /// Create a fresh state for one query.
    ///
    /// An empty or missing preamble falls back to the default.
    pub fn new(query: impl Into<String>, instruction_preamble: Option<&str>) -> Self {
        let instruction_preamble = match instruction_preamble.map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => DEFAULT_INSTRUCTION_PREAMBLE.to_string(),
        };

        Self {
            query: query.into(),
            instruction_preamble,
            required_sources: Vec::new(),
            classification_rationale: None,
            completed_sources: HashSet::new(),
            retrieved_documents: BTreeMap::new(),
            final_response: String::new(),
            error_message: None,
            current_source_index: 0,
            sources_assigned: false,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn instruction_preamble(&self) -> &str {
        &self.instruction_preamble
    }

    pub fn required_sources(&self) -> &[SourceTag] {
        &self.required_sources
    }

    pub fn classification_rationale(&self) -> Option<&str> {
        self.classification_rationale.as_deref()
    }

    pub fn completed_sources(&self) -> &HashSet<SourceTag> {
        &self.completed_sources
    }

    pub fn retrieved_documents(&self) -> &BTreeMap<String, Vec<Document>> {
        &self.retrieved_documents
    }

    pub fn documents_for(&self, tag: SourceTag) -> Option<&[Document]> {
        self.retrieved_documents
            .get(tag.label())
            .map(|docs| docs.as_slice())
    }

    pub fn final_response(&self) -> &str {
        &self.final_response
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn current_source_index(&self) -> usize {
        self.current_source_index
    }

    /// Whether the synthesis step has written its response
    pub fn is_terminal(&self) -> bool {
        !self.final_response.is_empty()
    }

    /// Whether `General` appears anywhere in the required sources
    pub fn requires_fallback(&self) -> bool {
        self.required_sources.iter().any(SourceTag::is_fallback)
    }

    /// Whether any source produced at least one document
    pub fn has_documents(&self) -> bool {
        self.retrieved_documents.values().any(|docs| !docs.is_empty())
    }

    pub fn document_count(&self) -> usize {
        self.retrieved_documents.values().map(Vec::len).sum()
    }

    /// Per-source document counts, keyed by label
    pub fn document_counts(&self) -> BTreeMap<String, usize> {
        self.retrieved_documents
            .iter()
            .map(|(label, docs)| (label.clone(), docs.len()))
            .collect()
    }

    fn ensure_open(&self, operation: &str) -> RouterResult<()> {
        if self.is_terminal() {
            return Err(RouterError::InvalidTransition(format!(
                "{} after final response was written",
                operation
            )));
        }
        Ok(())
    }

    /// Assign the classifier's ordered sources. Allowed once per run.
    pub fn assign_sources(
        &mut self,
        sources: Vec<SourceTag>,
        rationale: Option<String>,
    ) -> RouterResult<()> {
        self.ensure_open("assign_sources")?;
        if self.sources_assigned {
            return Err(RouterError::InvalidTransition(
                "required sources already assigned".to_string(),
            ));
        }

        self.required_sources = sources;
        self.classification_rationale = rationale;
        self.current_source_index = 0;
        self.sources_assigned = true;
        Ok(())
    }

    /// Record a recoverable failure. Multiple failures are joined.
    pub fn record_error(&mut self, message: impl Into<String>) -> RouterResult<()> {
        self.ensure_open("record_error")?;
        let message = message.into();
        self.error_message = Some(match self.error_message.take() {
            Some(existing) => format!("{}; {}", existing, message),
            None => message,
        });
        Ok(())
    }

    /// Commit one retrieval step.
    ///
    /// `tag` must be the source under the cursor and must not have been
    /// retrieved yet. Writes the documents, marks the source completed, and
    /// advances the cursor by one, or changes nothing.
    pub fn commit_retrieval(&mut self, tag: SourceTag, documents: Vec<Document>) -> RouterResult<()> {
        self.ensure_open("commit_retrieval")?;

        let expected = self
            .required_sources
            .get(self.current_source_index)
            .copied()
            .ok_or_else(|| {
                RouterError::InvalidTransition(format!(
                    "cursor {} is past the last required source",
                    self.current_source_index
                ))
            })?;

        if expected != tag {
            return Err(RouterError::InvalidTransition(format!(
                "expected retrieval for {} at index {}, got {}",
                expected, self.current_source_index, tag
            )));
        }

        if self.retrieved_documents.contains_key(tag.label()) {
            return Err(RouterError::InvalidTransition(format!(
                "documents for {} were already retrieved",
                tag
            )));
        }

        self.retrieved_documents
            .insert(tag.label().to_string(), documents);
        self.completed_sources.insert(tag);
        self.current_source_index += 1;
        Ok(())
    }

    /// Step past a repeated tag without retrieving it again.
    ///
    /// Only valid when the source under the cursor was already retrieved
    /// earlier in this run. Its documents are kept as they were.
    pub fn skip_repeated(&mut self, tag: SourceTag) -> RouterResult<()> {
        self.ensure_open("skip_repeated")?;

        if self.required_sources.get(self.current_source_index) != Some(&tag) {
            return Err(RouterError::InvalidTransition(format!(
                "{} is not the source at index {}",
                tag, self.current_source_index
            )));
        }
        if !self.retrieved_documents.contains_key(tag.label()) {
            return Err(RouterError::InvalidTransition(format!(
                "{} has not been retrieved yet",
                tag
            )));
        }

        self.current_source_index += 1;
        Ok(())
    }

    /// Commit the cross-source fallback results.
    ///
    /// Entries are written under each concrete source's label. Sources that
    /// already hold documents are left alone. The cursor is not moved.
    pub fn commit_fallback(
        &mut self,
        results: Vec<(SourceTag, Vec<Document>)>,
    ) -> RouterResult<()> {
        self.ensure_open("commit_fallback")?;
        if !self.requires_fallback() {
            return Err(RouterError::InvalidTransition(
                "fallback committed without a general classification".to_string(),
            ));
        }

        for (tag, documents) in results {
            if self.retrieved_documents.contains_key(tag.label()) {
                continue;
            }
            self.retrieved_documents
                .insert(tag.label().to_string(), documents);
            self.completed_sources.insert(tag);
        }
        Ok(())
    }

    /// Write the final response. Terminal.
    pub fn finalize(&mut self, response: impl Into<String>) -> RouterResult<()> {
        self.ensure_open("finalize")?;
        let response = response.into();
        if response.is_empty() {
            return Err(RouterError::InvalidTransition(
                "final response must not be empty".to_string(),
            ));
        }
        self.final_response = response;
        Ok(())
    }

    /// Consume the state, yielding the final response
    pub fn into_response(self) -> String {
        self.final_response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(sources: Vec<SourceTag>) -> OrchestrationState {
        let mut state = OrchestrationState::new("What is zakat?", None);
        state.assign_sources(sources, None).unwrap();
        state
    }

    #[test]
    fn test_default_preamble() {
        let state = OrchestrationState::new("q", None);
        assert_eq!(state.instruction_preamble(), DEFAULT_INSTRUCTION_PREAMBLE);

        let state = OrchestrationState::new("q", Some("   "));
        assert_eq!(state.instruction_preamble(), DEFAULT_INSTRUCTION_PREAMBLE);

        let state = OrchestrationState::new("q", Some("Answer briefly:"));
        assert_eq!(state.instruction_preamble(), "Answer briefly:");
    }

    #[test]
    fn test_commit_retrieval_advances_cursor() {
        let mut state = classified(vec![SourceTag::Quran, SourceTag::Tafseer]);

        state
            .commit_retrieval(SourceTag::Quran, vec![Document::new("verse")])
            .unwrap();
        assert_eq!(state.current_source_index(), 1);
        assert!(state.completed_sources().contains(&SourceTag::Quran));
        assert_eq!(state.documents_for(SourceTag::Quran).unwrap().len(), 1);

        state.commit_retrieval(SourceTag::Tafseer, vec![]).unwrap();
        assert_eq!(state.current_source_index(), 2);
        assert_eq!(state.documents_for(SourceTag::Tafseer), Some(&[][..]));
    }

    #[test]
    fn test_commit_retrieval_rejects_out_of_order_without_mutation() {
        let mut state = classified(vec![SourceTag::Quran, SourceTag::Hadith]);

        let err = state.commit_retrieval(SourceTag::Hadith, vec![Document::new("x")]);
        assert!(err.is_err());
        assert_eq!(state.current_source_index(), 0);
        assert!(state.completed_sources().is_empty());
        assert!(state.retrieved_documents().is_empty());
    }

    #[test]
    fn test_duplicate_tag_is_never_written_twice() {
        let mut state = classified(vec![SourceTag::Quran, SourceTag::Quran]);
        state
            .commit_retrieval(SourceTag::Quran, vec![Document::new("first")])
            .unwrap();

        let err = state.commit_retrieval(SourceTag::Quran, vec![Document::new("second")]);
        assert!(err.is_err());
        assert_eq!(state.current_source_index(), 1);
        assert_eq!(
            state.documents_for(SourceTag::Quran).unwrap()[0].content,
            "first"
        );
    }

    #[test]
    fn test_skip_repeated_advances_only_for_seen_tag() {
        let mut state = classified(vec![SourceTag::Quran, SourceTag::Quran]);
        assert!(state.skip_repeated(SourceTag::Quran).is_err());

        state
            .commit_retrieval(SourceTag::Quran, vec![Document::new("first")])
            .unwrap();
        assert!(state.skip_repeated(SourceTag::Hadith).is_err());
        state.skip_repeated(SourceTag::Quran).unwrap();

        assert_eq!(state.current_source_index(), 2);
        assert_eq!(state.documents_for(SourceTag::Quran).unwrap().len(), 1);
    }

    #[test]
    fn test_sources_assigned_once() {
        let mut state = classified(vec![SourceTag::Hadith]);
        assert!(state.assign_sources(vec![SourceTag::Quran], None).is_err());
        assert_eq!(state.required_sources(), &[SourceTag::Hadith]);
    }

    #[test]
    fn test_finalize_is_terminal() {
        let mut state = classified(vec![SourceTag::Quran]);
        state.finalize("answer").unwrap();

        assert!(state.is_terminal());
        assert!(state.finalize("again").is_err());
        assert!(state.record_error("late").is_err());
        assert!(state.commit_retrieval(SourceTag::Quran, vec![]).is_err());
        assert_eq!(state.final_response(), "answer");
        assert_eq!(state.error_message(), None);
    }

    #[test]
    fn test_record_error_joins_messages() {
        let mut state = classified(vec![SourceTag::Quran]);
        state.record_error("first").unwrap();
        state.record_error("second").unwrap();
        assert_eq!(state.error_message(), Some("first; second"));
    }

    #[test]
    fn test_fallback_requires_general() {
        let mut state = classified(vec![SourceTag::Quran]);
        assert!(state
            .commit_fallback(vec![(SourceTag::Quran, vec![Document::new("x")])])
            .is_err());

        let mut state = classified(vec![SourceTag::General]);
        state
            .commit_fallback(vec![
                (SourceTag::Quran, vec![Document::new("a")]),
                (SourceTag::Hadith, vec![]),
            ])
            .unwrap();
        assert_eq!(state.current_source_index(), 0);
        assert!(state.has_documents());
        assert!(state.retrieved_documents().get("general").is_none());
        assert_eq!(state.document_count(), 1);
    }
}
