//! Path helpers for vault notes (`Concepts/`, `Questions/`).

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static NON_SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid slug filter regex"));
static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-\s]+").expect("valid slug separator regex"));

const MAX_SLUG_CHARS: usize = 64;
const EMPTY_SLUG: &str = "untitled";

/// Produces a filesystem-safe slug: lowercase, word characters and single
/// hyphens, at most 64 characters.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let filtered = NON_SLUG_RE.replace_all(&lowered, "");
    let joined = SEPARATOR_RE.replace_all(&filtered, "-");
    let capped: String = joined
        .trim_matches('-')
        .chars()
        .take(MAX_SLUG_CHARS)
        .collect();
    let slug = capped.trim_matches('-');
    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// `<vault>/Concepts/<slug>.md`
pub fn concept_note_path(vault_dir: &Path, concept_name: &str) -> PathBuf {
    vault_dir
        .join("Concepts")
        .join(format!("{}.md", slugify(concept_name)))
}

/// `<vault>/Questions/<slug>.md`
pub fn question_note_path(vault_dir: &Path, concept_name: &str) -> PathBuf {
    vault_dir
        .join("Questions")
        .join(format!("{}.md", slugify(concept_name)))
}
