pub mod answer_log;
pub mod db;
pub mod document;
pub mod orchestration;
pub mod source;

pub use db::NoorDb;

pub use answer_log::{AnswerLog, AnswerRecord};
pub use document::Document;
pub use orchestration::{OrchestrationState, DEFAULT_INSTRUCTION_PREAMBLE};
pub use source::{parse_label, parse_labels, ParsedLabel, SourceTag};
