//! URL slugs for blog posts.

use slug::slugify;
use thiserror::Error;

const MAX_SLUG_LEN: usize = 96;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a slug from a post title, trimmed to a URL-friendly length on a
/// word boundary.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    if candidate.len() <= MAX_SLUG_LEN {
        return Ok(candidate);
    }

    let cut = candidate[..MAX_SLUG_LEN]
        .rfind('-')
        .unwrap_or(MAX_SLUG_LEN);
    Ok(candidate[..cut].to_string())
}
