//! Patient history summarization boundary.
//!
//! Assembles a patient's visit history into one prompt, hands it to a
//! pluggable asynchronous backend and cleans up the reply. Failures never
//! reach the caller: they become a fixed human-readable message.

pub mod prompts;
pub mod summarize;

pub use prompts::*;
pub use summarize::*;
