//! MDX documents: a YAML frontmatter block followed by a markdown body.
use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{FaqEntry, Post};

static IMAGE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\(([^)\s]+)\)").expect("valid image ref regex"));

/// Headings that mark a finished post.
const CONCLUSION_HEADINGS: [&str; 3] = ["## 마무리", "## 결론", "## 요약"];
/// Last characters of a post that ends on a complete sentence, link or image.
const TERMINAL_CHARS: [char; 7] = ['.', '!', '?', '다', '요', '>', ')'];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Frontmatter {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Keywords,
    #[serde(default)]
    pub category: String,
    #[serde(rename = "publishedAt", default)]
    pub published_at: String,
    #[serde(rename = "featuredImage", default)]
    pub featured_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faq: Vec<FaqEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// `keywords` as written by hand: a comma-separated string or a YAML list.
/// Re-rendering keeps whichever shape the file used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Keywords {
    Text(String),
    List(Vec<String>),
}

impl Default for Keywords {
    fn default() -> Self {
        Keywords::Text(String::new())
    }
}

impl Keywords {
    /// Single comma-separated string.
    pub fn joined(&self) -> String {
        match self {
            Keywords::Text(text) => text.clone(),
            Keywords::List(items) => items.join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub frontmatter: Frontmatter,
    pub body: String,
}

impl Document {
    /// Parse `---\n<yaml>\n---\n<body>`.
    pub fn parse(raw: &str) -> Result<Self> {
        let (yaml, body) =
            split_frontmatter(raw).ok_or_else(|| anyhow!("document has no frontmatter block"))?;
        let frontmatter: Frontmatter =
            serde_yaml::from_str(yaml).context("invalid frontmatter YAML")?;
        Ok(Self {
            frontmatter,
            body: body.to_string(),
        })
    }

    pub fn render(&self) -> Result<String> {
        let yaml = serde_yaml::to_string(&self.frontmatter).context("failed to encode frontmatter")?;
        Ok(format!("---\n{}---\n{}", yaml, self.body))
    }

    /// Convert into the post-store read model, defaulting the author.
    pub fn into_post(self, slug: &str, default_author: &str) -> Post {
        let fm = self.frontmatter;
        Post {
            slug: slug.to_string(),
            title: fm.title,
            description: fm.description,
            keywords: fm.keywords.joined(),
            category: fm.category,
            published_at: fm.published_at,
            featured_image: fm.featured_image,
            author: fm
                .author
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| default_author.to_string()),
            faq: fm.faq,
            content: self.body,
        }
    }
}

/// Split a raw document into (frontmatter YAML, body). Accepts `\n` and `\r\n`.
pub fn split_frontmatter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

/// Remove a surrounding ```` ```mdx ```` (or bare ```` ``` ````) fence from model output.
pub fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("```mdx\n")
        .or_else(|| trimmed.strip_prefix("```\n"));
    match inner {
        Some(inner) => inner.strip_suffix("\n```").unwrap_or(inner).to_string(),
        None => trimmed.to_string(),
    }
}

/// Image targets referenced from markdown `![alt](ref)` syntax, in order.
pub fn image_refs(body: &str) -> Vec<String> {
    IMAGE_REF
        .captures_iter(body)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Point the first markdown image at `new_ref`, keeping its alt text.
/// `None` when the body embeds no image.
pub fn replace_first_image(body: &str, new_ref: &str) -> Option<String> {
    let target = IMAGE_REF.captures(body)?.get(1)?;
    Some(format!(
        "{}{}{}",
        &body[..target.start()],
        new_ref,
        &body[target.end()..]
    ))
}

/// Heuristic for posts cut off mid-generation: no terminal punctuation at the
/// end, or no conclusion section.
pub fn looks_truncated(body: &str) -> bool {
    let trimmed = body.trim();
    let ends_cleanly = trimmed
        .chars()
        .last()
        .map(|c| TERMINAL_CHARS.contains(&c))
        .unwrap_or(false);
    let has_conclusion = CONCLUSION_HEADINGS.iter().any(|h| body.contains(h));
    !ends_cleanly || !has_conclusion
}
