//! Evidence pack stored next to each brief: the posts, comments and search
//! data a reader can check the brief against.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;
use topiclens_db::{ClusterMemberRow, CommentRow, GscQueryAggregate, SerpAioRow};

use super::prompt::{sample_posts, truncate_chars};

pub const EVIDENCE_POSTS: usize = 5;
pub const COMMENTS_PER_POST: usize = 3;
pub const SOURCE_KEYWORDS: usize = 5;
pub const SERP_KEYWORDS: usize = 3;
pub const GSC_QUERIES: i64 = 10;

const SUMMARY_CHARS: usize = 200;
const COMMENT_CHARS: usize = 150;
const AIO_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidencePack {
    pub reddit_posts: Vec<EvidencePost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsc_data: Option<GscEvidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serp_aio: Option<SerpEvidence>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidencePost {
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    pub upvotes: i32,
    pub keyword: Option<String>,
    pub top_comments: Vec<EvidenceComment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceComment {
    pub body: String,
    pub upvotes: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GscEvidence {
    pub top_queries: Vec<GscQueryEvidence>,
    pub summary: GscSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GscQueryEvidence {
    pub query: String,
    pub impressions: i64,
    pub clicks: i64,
    pub ctr: f64,
    pub position: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GscSummary {
    pub total_queries: usize,
    pub total_impressions: i64,
    pub total_clicks: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerpEvidence {
    pub query: String,
    pub aio_summary: String,
    pub cited_sources: Value,
    pub snapshot_at: String,
}

impl EvidencePack {
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Representative members sorted by upvotes, highest first, capped at
/// [`EVIDENCE_POSTS`]. Falls back to all members when none is flagged.
#[must_use]
pub fn top_posts(members: &[ClusterMemberRow]) -> Vec<&ClusterMemberRow> {
    sample_posts(members, EVIDENCE_POSTS)
}

/// Distinct collection keywords of the members, sorted, capped at
/// [`SOURCE_KEYWORDS`].
#[must_use]
pub fn source_keywords(members: &[ClusterMemberRow]) -> Vec<String> {
    members
        .iter()
        .filter_map(|m| m.keyword.as_deref())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .take(SOURCE_KEYWORDS)
        .map(ToString::to_string)
        .collect()
}

fn summarize(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", truncate_chars(text, max))
    } else {
        text.to_string()
    }
}

fn post_link(post: &ClusterMemberRow) -> Option<String> {
    match (&post.permalink, &post.url) {
        (Some(permalink), _) => Some(format!("https://reddit.com{permalink}")),
        (None, Some(url)) => Some(url.clone()),
        (None, None) => None,
    }
}

/// Assemble the pack. `comments` may hold comments of any post; only the
/// best [`COMMENTS_PER_POST`] of each selected post are kept.
#[must_use]
pub fn build_evidence_pack(
    posts: &[&ClusterMemberRow],
    comments: &[CommentRow],
    gsc: &[GscQueryAggregate],
    serp: Option<&SerpAioRow>,
) -> EvidencePack {
    let reddit_posts = posts
        .iter()
        .map(|post| {
            let mut post_comments: Vec<&CommentRow> = comments
                .iter()
                .filter(|c| c.reddit_post_id == post.reddit_post_id)
                .filter(|c| c.body.as_deref().is_some_and(|b| !b.trim().is_empty()))
                .collect();
            post_comments.sort_by(|a, b| b.upvotes.cmp(&a.upvotes));

            EvidencePost {
                title: post.title.clone(),
                summary: summarize(post.body.as_deref().unwrap_or_default(), SUMMARY_CHARS),
                link: post_link(post),
                upvotes: post.upvotes,
                keyword: post.keyword.clone(),
                top_comments: post_comments
                    .into_iter()
                    .take(COMMENTS_PER_POST)
                    .map(|c| EvidenceComment {
                        body: truncate_chars(c.body.as_deref().unwrap_or_default(), COMMENT_CHARS),
                        upvotes: c.upvotes,
                    })
                    .collect(),
            }
        })
        .collect();

    let gsc_data = (!gsc.is_empty()).then(|| GscEvidence {
        top_queries: gsc
            .iter()
            .map(|r| GscQueryEvidence {
                query: r.query.clone(),
                impressions: r.total_impressions,
                clicks: r.total_clicks,
                ctr: r.avg_ctr,
                position: r.avg_position,
            })
            .collect(),
        summary: GscSummary {
            total_queries: gsc.len(),
            total_impressions: gsc.iter().map(|r| r.total_impressions).sum(),
            total_clicks: gsc.iter().map(|r| r.total_clicks).sum(),
        },
    });

    let serp_aio = serp.map(|s| SerpEvidence {
        query: s.query.clone(),
        aio_summary: truncate_chars(&s.aio_text, AIO_CHARS),
        cited_sources: s.cited_sources.clone(),
        snapshot_at: s.snapshot_at.to_rfc3339(),
    });

    EvidencePack {
        reddit_posts,
        gsc_data,
        serp_aio,
    }
}
