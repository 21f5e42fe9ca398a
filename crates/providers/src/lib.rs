//! Tokenizer and Summarizer backends for Chronicle.
//!
//! All backends implement the `chronicle_core` collaborator traits. The
//! factory selects them from configuration.

pub mod ai_server;
pub mod extractive;
pub mod factory;
pub mod heuristic;
#[cfg(feature = "local")]
pub mod local;
pub mod openai_compat;
pub mod prompts;

#[cfg(test)]
mod test_support;

pub use ai_server::AiServerClient;
pub use extractive::ExtractiveSummarizer;
pub use factory::{build_summarizer, build_tokenizer};
pub use heuristic::{HeuristicTokenizer, estimate_tokens};
#[cfg(feature = "local")]
pub use local::HfTokenizer;
pub use openai_compat::OpenAiCompatSummarizer;
