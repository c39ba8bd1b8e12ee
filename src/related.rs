//! Internal-link candidates for a new post.
use std::collections::HashSet;

use crate::model::{Post, RelatedPost};

/// Upper bound on same-category links.
pub const MAX_SAME_CATEGORY: usize = 5;
/// Below this many same-category links, recent posts are appended.
pub const MIN_SAME_CATEGORY: usize = 3;
/// How many of the newest posts overall are considered as filler.
pub const RECENT_FALLBACK: usize = 3;

/// Pick related posts from `posts` (assumed newest first): up to five in the
/// same category, topped up with the three newest overall when fewer than
/// three match. De-duplicated by slug, first occurrence wins.
pub fn select_related(posts: &[Post], category: &str) -> Vec<RelatedPost> {
    let mut picked: Vec<&Post> = posts
        .iter()
        .filter(|p| p.category == category)
        .take(MAX_SAME_CATEGORY)
        .collect();

    if picked.len() < MIN_SAME_CATEGORY {
        picked.extend(posts.iter().take(RECENT_FALLBACK));
    }

    let mut seen = HashSet::new();
    picked
        .into_iter()
        .filter(|p| seen.insert(p.slug.clone()))
        .map(|p| RelatedPost {
            title: p.title.clone(),
            slug: p.slug.clone(),
        })
        .collect()
}

pub fn format_links(related: &[RelatedPost]) -> Vec<String> {
    related.iter().map(RelatedPost::markdown_link).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(slug: &str, category: &str) -> Post {
        Post {
            slug: slug.into(),
            title: format!("title {}", slug),
            category: category.into(),
            ..Default::default()
        }
    }

    fn slugs(related: &[RelatedPost]) -> Vec<&str> {
        related.iter().map(|r| r.slug.as_str()).collect()
    }

    #[test]
    fn takes_first_five_of_category_without_fallback() {
        let posts: Vec<Post> = (1..=6)
            .map(|i| post(&format!("a{}", i), "A"))
            .chain([post("b1", "B")])
            .collect();
        let related = select_related(&posts, "A");
        assert_eq!(slugs(&related), vec!["a1", "a2", "a3", "a4", "a5"]);
    }

    #[test]
    fn scarce_category_is_topped_up_with_recent_posts() {
        let posts = vec![post("b1", "B"), post("c1", "C"), post("b2", "B"), post("a1", "A")];
        let related = select_related(&posts, "A");
        assert_eq!(slugs(&related), vec!["a1", "b1", "c1", "b2"]);
    }

    #[test]
    fn fallback_skips_duplicates() {
        let posts = vec![post("a1", "A"), post("b1", "B"), post("c1", "C"), post("d1", "D")];
        let related = select_related(&posts, "A");
        assert_eq!(slugs(&related), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn three_matches_need_no_fallback() {
        let posts = vec![post("b1", "B"), post("a1", "A"), post("a2", "A"), post("a3", "A")];
        assert_eq!(slugs(&select_related(&posts, "A")), vec!["a1", "a2", "a3"]);
    }

    #[test]
    fn empty_store_yields_nothing() {
        assert!(select_related(&[], "A").is_empty());
    }

    #[test]
    fn formats_markdown_links() {
        let related = vec![RelatedPost {
            title: "임플란트 수명".into(),
            slug: "11-임플란트-수명".into(),
        }];
        assert_eq!(format_links(&related), vec!["- [임플란트 수명](/blog/11-임플란트-수명)"]);
    }
}
