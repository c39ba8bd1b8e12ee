//! Deterministic slugs for generated posts.
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
// Lowercase ASCII, digits, hyphen and precomposed Hangul syllables survive.
static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9가-힣-]").expect("valid slug charset regex"));

/// Lower-case, hyphenate whitespace runs and drop everything outside the slug charset.
pub fn normalize_keyword(keyword: &str) -> String {
    let lowered = keyword.trim().to_lowercase();
    let hyphenated = WHITESPACE.replace_all(&lowered, "-");
    DISALLOWED.replace_all(&hyphenated, "").into_owned()
}

/// Slug for a topic: `"{id}-{normalized keyword}"`.
pub fn derive_slug(id: u32, keyword: &str) -> String {
    format!("{}-{}", id, normalize_keyword(keyword))
}
