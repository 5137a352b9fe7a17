//! Vault layout and prompt text for generated notes.
//!
//! # Responsibility
//! - Map concept names to stable markdown file paths.
//! - Hold the instruction text sent to the generator.

pub mod paths;
pub mod prompts;
