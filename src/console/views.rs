// src/console/views.rs
//! Plain-text tables for stored jobs and posts.

use std::fmt::Write;

use crate::storage::{JobDescription, LinkedInPost};
use crate::text::truncate_chars;

const TITLE_WIDTH: usize = 32;
const COMPANY_WIDTH: usize = 20;
const LOCATION_WIDTH: usize = 20;
const POST_TEXT_WIDTH: usize = 60;
const KEYWORD_WIDTH: usize = 18;

/// OSC-8 terminal hyperlink. With `plain`, the bare url.
pub fn hyperlink(url: &str, label: &str, plain: bool) -> String {
    if plain {
        url.to_string()
    } else {
        format!("\x1b]8;;{url}\x1b\\{label}\x1b]8;;\x1b\\")
    }
}

/// Feed url for a post urn. Fallback ids have no page of their own.
pub fn post_url(post_id: &str) -> Option<String> {
    post_id
        .starts_with("urn:li:")
        .then(|| format!("https://www.linkedin.com/feed/update/{}/", post_id))
}

fn cell(text: &str, width: usize) -> String {
    format!("{:<width$}", truncate_chars(text, width), width = width)
}

pub fn render_jobs(jobs: &[JobDescription], plain: bool) -> String {
    if jobs.is_empty() {
        return "No jobs stored yet.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>5}  {}  {}  {}  Link",
        "Score",
        cell("Title", TITLE_WIDTH),
        cell("Company", COMPANY_WIDTH),
        cell("Location", LOCATION_WIDTH)
    );
    let _ = writeln!(out, "{}", "-".repeat(5 + TITLE_WIDTH + COMPANY_WIDTH + LOCATION_WIDTH + 14));

    for job in jobs {
        let score = if job.model_response.is_some() {
            format!("{}%", job.score)
        } else {
            "-".to_string()
        };
        let _ = writeln!(
            out,
            "{:>5}  {}  {}  {}  {}",
            score,
            cell(&job.job_title, TITLE_WIDTH),
            cell(&job.company_name, COMPANY_WIDTH),
            cell(&job.job_location, LOCATION_WIDTH),
            hyperlink(&job.job_url, "open", plain)
        );
    }
    out
}

pub fn render_posts(posts: &[LinkedInPost], plain: bool) -> String {
    if posts.is_empty() {
        return "No posts stored yet.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10}  {}  {}  Link",
        "Published",
        cell("Keywords", KEYWORD_WIDTH),
        cell("Text", POST_TEXT_WIDTH)
    );
    let _ = writeln!(out, "{}", "-".repeat(10 + KEYWORD_WIDTH + POST_TEXT_WIDTH + 12));

    for post in posts {
        let published = post
            .publish_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        let link = post_url(&post.post_id)
            .or_else(|| post.publisher_url.clone())
            .map(|url| hyperlink(&url, "open", plain))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{:<10}  {}  {}  {}",
            published,
            cell(post.keyword_found.as_deref().unwrap_or("-"), KEYWORD_WIDTH),
            cell(&crate::text::clean_text(&post.post_text), POST_TEXT_WIDTH),
            link
        );
        if !post.emails.is_empty() {
            let _ = writeln!(out, "{:<10}  contacts: {}", "", post.emails.join(", "));
        }
    }
    out
}
