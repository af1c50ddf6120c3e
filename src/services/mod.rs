//! Service layer shared by the HTTP API and the CLI.

pub mod words;

pub use words::{parse_word_list, LoadStats, WordList, WordService};
