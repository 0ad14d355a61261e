//! # Noor Skills
//!
//! LLM-backed implementations of the router's capabilities.
//!
//! ```text
//! ClassifierSkill  -> router Classifier
//! SynthesisSkill   -> router Generator
//! ```

pub mod llm_helpers;
pub mod prompts;

pub mod classifier_skill;
pub mod synthesis_skill;

// Re-exports for convenience
pub use classifier_skill::{ClassificationOutput, ClassifierSkill};
pub use synthesis_skill::{SynthesisOutput, SynthesisSkill};
