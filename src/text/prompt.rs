//! Prompt construction for document generation and post completion.
use chrono::{DateTime, Datelike, SecondsFormat, Utc};

use super::GenerationRequest;

/// Number of trailing characters of a truncated post sent for completion.
const COMPLETION_TAIL_CHARS: usize = 2000;

/// Static writing guidance loaded once per client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    pub seo_rules: String,
    pub source_material: String,
    pub author: String,
}

/// Neighbouring subjects the model must only mention in passing, unless the
/// topic itself is one of the listed keywords.
const OFF_TOPIC_RULES: [(&[&str], &str); 4] = [
    (
        &["임플란트 29만원"],
        "\"29만원 임플란트\" 광고나 저가 임플란트 (이건 별도 주제임)",
    ),
    (
        &["오스템 임플란트 가격", "임플란트 종류"],
        "특정 브랜드(오스템, 스트라우만 등)의 상세 비교 (이건 별도 주제임)",
    ),
    (
        &["임플란트 보험", "건강보험 임플란트"],
        "건강보험 적용의 상세한 조건과 절차 (이건 별도 주제임)",
    ),
    (
        &["임플란트 뼈이식", "뼈이식 임플란트 과정"],
        "뼈이식의 상세한 과정과 비용 (이건 별도 주제임)",
    ),
];

pub fn off_topic_rules(keyword: &str) -> Vec<&'static str> {
    OFF_TOPIC_RULES
        .iter()
        .filter(|(owners, _)| !owners.contains(&keyword))
        .map(|(_, rule)| *rule)
        .collect()
}

pub fn build_generation_prompt(
    ctx: &PromptContext,
    req: &GenerationRequest,
    now: DateTime<Utc>,
) -> String {
    let topic = &req.topic;
    let keyword = topic.target_keyword.as_str();
    let year = now.year();

    let forbidden = off_topic_rules(keyword)
        .into_iter()
        .map(|rule| format!("- {}", rule))
        .collect::<Vec<_>>()
        .join("\n");
    let images = req
        .image_refs
        .iter()
        .enumerate()
        .map(|(i, url)| format!("{}. {}", i + 1, url))
        .collect::<Vec<_>>()
        .join("\n");
    let links = if req.related_links.is_empty() {
        "(사용 가능한 내부 링크 없음)".to_string()
    } else {
        req.related_links.join("\n")
    };
    let featured = req.image_refs.first().map(String::as_str).unwrap_or("");
    let published_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);

    format!(
        r###"당신은 전문 SEO 카피라이터입니다.

# 이번 글의 단 하나의 주제
**"{keyword}"**

검색 의도: {intent}

# 작성 기준 연도: {year}년

모든 내용은 {year}년 기준으로 작성하세요. 가격, 정책, 기술을 언급할 때는 "{year}년"으로 표기하고 과거 연도는 사용하지 마세요.

# 주제 집중 규칙

이 글은 오직 "{keyword}"에 대해서만 작성합니다.

## 금지 사항
다음 주제들은 상세히 다루지 마세요. 필요하면 1-2문장으로 언급만 합니다.
{forbidden}

## 글 구조 제한
- H2 제목: 최대 3개
- 각 H2는 "{keyword}"와 직접 관련된 내용만

# 참고 자료

아래 자료에서 "{keyword}"와 직접 관련된 정보만 골라서 사용하세요.

{source}

---

# SEO 글쓰기 규칙

{rules}

---

# 작성 요구사항

1. MDX frontmatter 포함
2. 본문 최소 2,000자 (한글 기준)
3. 메인 키워드 "{keyword}"를 본문에 5회 이상 자연스럽게 사용
4. H2 제목 최대 3개, H3 적절히 사용
5. FAQ 3개 (모두 메인 키워드 관련), 반드시 frontmatter의 `faq` 필드로 추가
6. 볼드(**), 이모지 사용 금지
7. 필요한 경우 간단한 표 사용

## 이미지
{images}

## 링크 삽입 규칙

### 내부 링크
아래 목록 중 문맥상 자연스러운 곳에 단 1개만 골라 문장 속 단어에 링크를 겁니다. 목록으로 나열하지 마세요.

{links}

### 외부 링크
공신력 있는 공공기관 사이트로 연결되는 외부 링크를 1개 이상 자연스럽게 포함합니다.

---

출력 형식:

```mdx
---
title: "{title}"
description: "[150자 이내, {keyword} 포함 요약]"
keywords: "{keyword}, [직접 관련 키워드 2개]"
category: "{category}"
publishedAt: "{published_at}"
featuredImage: "{featured}"
author: "{author}"
faq:
  - question: "질문 1"
    answer: "답변 1"
  - question: "질문 2"
    answer: "답변 2"
  - question: "질문 3"
    answer: "답변 3"
---

[도입부: {keyword}에 대한 질문 3줄]

![alt텍스트]({featured})

## {keyword} + 관련 소주제 1

## {keyword} + 관련 소주제 2

## {keyword} + 관련 소주제 3

## 마무리
```

다시 한 번 강조: 이 글은 "{keyword}"에만 집중합니다."###,
        keyword = keyword,
        intent = topic.search_intent,
        year = year,
        forbidden = forbidden,
        source = ctx.source_material.trim(),
        rules = ctx.seo_rules.trim(),
        images = images,
        links = links,
        title = topic.title,
        category = topic.category,
        published_at = published_at,
        featured = featured,
        author = ctx.author,
    )
}

/// Last `COMPLETION_TAIL_CHARS` characters, split on a char boundary.
pub fn content_tail(content: &str) -> &str {
    let count = content.chars().count();
    if count <= COMPLETION_TAIL_CHARS {
        return content;
    }
    let skip = count - COMPLETION_TAIL_CHARS;
    let start = content
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &content[start..]
}

pub fn build_completion_prompt(title: &str, content: &str) -> String {
    format!(
        r###"당신은 블로그 글 작성을 돕는 전문 에디터입니다.
아래는 작성 도중 끊긴 블로그 글입니다. 문맥을 파악하여 끊긴 부분을 자연스럽게 이어서 작성하고, "마무리" 섹션으로 글을 완성해주세요.

## 작성 규칙
1. 끊긴 문장을 자연스럽게 완성하거나 필요한 내용을 보충하세요.
2. 기존 글의 어조(전문적이면서도 친절한 해요체)를 유지하세요.
3. 주제를 요약하는 "## 마무리" 섹션을 반드시 포함하세요.
4. 기존 글과 동일한 마크다운 형식을 사용하세요.
5. 추가될 내용만 출력하고 기존 내용을 반복하지 마세요.

## 글 정보
- 제목: {title}

## 현재 내용 (마지막 부분)
{tail}

---
위 내용을 이어서 글을 완성해주세요."###,
        title = title,
        tail = content_tail(content),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TopicBrief;
    use chrono::TimeZone;

    fn request(keyword: &str, related: Vec<String>) -> GenerationRequest {
        GenerationRequest {
            topic: TopicBrief {
                id: 1,
                target_keyword: keyword.into(),
                title: "임플란트 1개 가격 가이드".into(),
                category: "임플란트-비용".into(),
                search_intent: "비용 정보".into(),
            },
            image_refs: vec!["/images/blog/a.webp".into(), "/images/blog/b.webp".into()],
            related_links: related,
        }
    }

    fn ctx() -> PromptContext {
        PromptContext {
            seo_rules: "규칙".into(),
            source_material: "자료".into(),
            author: "강남임플란트치과".into(),
        }
    }

    #[test]
    fn generation_prompt_carries_topic_images_and_links() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let prompt = build_generation_prompt(
            &ctx(),
            &request("임플란트 1개 가격", vec!["- [수명](/blog/11-수명)".into()]),
            now,
        );
        assert!(prompt.contains("**\"임플란트 1개 가격\"**"));
        assert!(prompt.contains("2026년 기준"));
        assert!(prompt.contains("1. /images/blog/a.webp\n2. /images/blog/b.webp"));
        assert!(prompt.contains("- [수명](/blog/11-수명)"));
        assert!(prompt.contains("featuredImage: \"/images/blog/a.webp\""));
        assert!(prompt.contains("publishedAt: \"2026-03-01T00:00:00.000Z\""));
        assert!(prompt.contains("author: \"강남임플란트치과\""));
        assert!(!prompt.contains("사용 가능한 내부 링크 없음"));
    }

    #[test]
    fn empty_related_list_is_announced() {
        let prompt = build_generation_prompt(&ctx(), &request("임플란트", vec![]), Utc::now());
        assert!(prompt.contains("(사용 가능한 내부 링크 없음)"));
    }

    #[test]
    fn off_topic_rules_exclude_own_subject() {
        assert_eq!(off_topic_rules("임플란트 1개 가격").len(), 4);
        let rules = off_topic_rules("임플란트 보험");
        assert_eq!(rules.len(), 3);
        assert!(rules.iter().all(|r| !r.contains("건강보험")));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let long: String = "가".repeat(2500);
        let tail = content_tail(&long);
        assert_eq!(tail.chars().count(), 2000);
        assert_eq!(content_tail("짧은 글"), "짧은 글");
    }

    #[test]
    fn completion_prompt_includes_title_and_tail() {
        let prompt = build_completion_prompt("임플란트 수명", "본문이 여기서 끊");
        assert!(prompt.contains("- 제목: 임플란트 수명"));
        assert!(prompt.contains("본문이 여기서 끊"));
        assert!(prompt.contains("\"## 마무리\" 섹션을 반드시 포함하세요."));
        assert!(prompt.ends_with("위 내용을 이어서 글을 완성해주세요."));
    }
}
