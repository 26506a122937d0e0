//! Prompt assembly for brief generation.

use std::fmt::Write as _;

use topiclens_core::Category;
use topiclens_db::{ClusterMemberRow, GscQueryAggregate, SerpAioRow, TimeseriesPoint};

pub const SYSTEM_PROMPT: &str = "You are a content strategist analyzing kitchen lifestyle topics. \
Always respond with valid JSON only.";

const MAX_SAMPLES: usize = 5;
const SAMPLE_BODY_CHARS: usize = 150;
const PROMPT_KEYWORDS: usize = 10;
const PROMPT_GSC_ROWS: usize = 5;
const AIO_CHARS: usize = 300;

/// Everything the prompt is built from. Empty inputs omit their section.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub members: &'a [ClusterMemberRow],
    pub keywords: &'a [String],
    /// Newest month first.
    pub timeseries: &'a [TimeseriesPoint],
    pub gsc: &'a [GscQueryAggregate],
    pub serp: Option<&'a SerpAioRow>,
}

/// First `max` characters of `text`.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Representative members by upvotes, highest first. Falls back to every
/// member when none is flagged.
#[must_use]
pub fn sample_posts(members: &[ClusterMemberRow], limit: usize) -> Vec<&ClusterMemberRow> {
    let mut samples: Vec<&ClusterMemberRow> =
        members.iter().filter(|m| m.is_representative).collect();
    if samples.is_empty() {
        samples = members.iter().collect();
    }
    samples.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));
    samples.truncate(limit);
    samples
}

#[must_use]
pub fn build_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut prompt = String::from(
        "Analyze this cluster of Reddit posts and write a content brief for a \
         kitchen lifestyle brand.\n",
    );

    let samples = sample_posts(inputs.members, MAX_SAMPLES);
    if !samples.is_empty() {
        prompt.push_str("\nSample posts:\n");
        for (i, post) in samples.iter().enumerate() {
            let body = truncate_chars(post.body.as_deref().unwrap_or_default(), SAMPLE_BODY_CHARS);
            let _ = writeln!(
                prompt,
                "{}. {} ({} upvotes, keyword: {})\n   {}",
                i + 1,
                post.title,
                post.upvotes,
                post.keyword.as_deref().unwrap_or("n/a"),
                body
            );
        }
    }

    if !inputs.keywords.is_empty() {
        let top: Vec<&str> = inputs
            .keywords
            .iter()
            .take(PROMPT_KEYWORDS)
            .map(String::as_str)
            .collect();
        let _ = writeln!(prompt, "\nTop keywords: {}", top.join(", "));
    }

    if !inputs.timeseries.is_empty() {
        prompt.push_str("\nRecent monthly activity:\n");
        for point in inputs.timeseries {
            let _ = writeln!(
                prompt,
                "- {}: {} posts, {} upvotes",
                point.month.format("%Y-%m"),
                point.post_count,
                point.weighted_score
            );
        }
    }

    if !inputs.gsc.is_empty() {
        prompt.push_str("\nGoogle Search Console queries:\n");
        for row in inputs.gsc.iter().take(PROMPT_GSC_ROWS) {
            let _ = writeln!(
                prompt,
                "- \"{}\": {} impressions, {} clicks",
                row.query, row.total_impressions, row.total_clicks
            );
        }
    }

    if let Some(serp) = inputs.serp {
        let _ = writeln!(
            prompt,
            "\nGoogle AI Overview for \"{}\":\n{}",
            serp.query,
            truncate_chars(&serp.aio_text, AIO_CHARS)
        );
    }

    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    let _ = write!(
        prompt,
        "\nChoose category from: {}.\n\
         Return a topic_title, the primary_question readers ask, related_questions, \
         a blog_angle, a social_angle, why_now (reason and trend) and an evidence_summary.",
        categories.join(", ")
    );

    prompt
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    use super::*;

    pub(crate) fn member(id: &str, upvotes: i32, representative: bool) -> ClusterMemberRow {
        ClusterMemberRow {
            reddit_post_id: id.to_string(),
            title: format!("Post {id}"),
            body: Some("b".repeat(400)),
            upvotes,
            created_utc: 1_711_929_600,
            permalink: Some(format!("/r/cooking/comments/{id}")),
            url: None,
            keyword: Some("fridge storage".to_string()),
            distance_to_centroid: 0.1,
            is_representative: representative,
        }
    }

    #[test]
    fn samples_prefer_representatives_by_upvotes() {
        let members = vec![
            member("a", 5, true),
            member("b", 100, false),
            member("c", 50, true),
        ];
        let ids: Vec<&str> = sample_posts(&members, 5)
            .iter()
            .map(|m| m.reddit_post_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn samples_fall_back_to_all_members_and_cap() {
        let members: Vec<ClusterMemberRow> =
            (0..8).map(|i| member(&i.to_string(), i, false)).collect();
        let samples = sample_posts(&members, 5);
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0].upvotes, 7);
    }

    #[test]
    fn prompt_truncates_bodies_and_omits_missing_sections() {
        let members = vec![member("a", 10, true)];
        let prompt = build_prompt(&PromptInputs {
            members: &members,
            keywords: &[],
            timeseries: &[],
            gsc: &[],
            serp: None,
        });

        assert!(prompt.contains("Post a (10 upvotes, keyword: fridge storage)"));
        assert!(prompt.contains(&"b".repeat(150)));
        assert!(!prompt.contains(&"b".repeat(151)));
        assert!(!prompt.contains("Top keywords"));
        assert!(!prompt.contains("Search Console"));
        assert!(!prompt.contains("AI Overview"));
        assert!(prompt.contains("REFRIGERATOR_ORGANIZATION"));
    }

    #[test]
    fn prompt_includes_every_available_signal() {
        let members = vec![member("a", 10, true)];
        let keywords = vec!["herbs".to_string(), "fridge".to_string()];
        let timeseries = vec![TimeseriesPoint {
            month: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            post_count: 4,
            weighted_score: 30.0,
        }];
        let gsc: Vec<GscQueryAggregate> = (0..7)
            .map(|i| GscQueryAggregate {
                query: format!("herbs query {i}"),
                total_impressions: 100 - i,
                total_clicks: 3,
                avg_ctr: 0.03,
                avg_position: Some(4.0),
            })
            .collect();
        let serp = SerpAioRow {
            query: "store herbs".to_string(),
            aio_text: "z".repeat(500),
            cited_sources: json!([]),
            snapshot_at: Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap(),
        };

        let prompt = build_prompt(&PromptInputs {
            members: &members,
            keywords: &keywords,
            timeseries: &timeseries,
            gsc: &gsc,
            serp: Some(&serp),
        });

        assert!(prompt.contains("Top keywords: herbs, fridge"));
        assert!(prompt.contains("2024-04: 4 posts"));
        assert!(prompt.contains("herbs query 4"));
        assert!(!prompt.contains("herbs query 5"));
        assert!(prompt.contains(&"z".repeat(300)));
        assert!(!prompt.contains(&"z".repeat(301)));
    }
}
