// src/storage/models.rs
//! Records written by the scrapers and rows read back for display.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::StorageError;

/// A job as the scraper/evaluator hands it to storage. `job_url` is the
/// natural key; a record without one is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_title: String,
    pub company_name: String,
    pub job_location: String,
    pub job_url: Option<String>,
    pub job_description: String,
    pub connections: i64,
    /// `None` means "not evaluated in this sighting"; an existing score is kept.
    pub score: Option<u8>,
    pub model_response: Option<String>,
}

impl JobRecord {
    pub fn natural_key(&self) -> Option<&str> {
        non_blank(self.job_url.as_deref())
    }
}

/// A feed post as the feed scraper hands it to storage. `post_id` is the
/// natural key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub post_id: Option<String>,
    pub publisher_url: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub post_text: String,
    pub links: Vec<String>,
    pub emails: Vec<String>,
    pub matched_keywords: Vec<String>,
}

impl PostRecord {
    pub fn natural_key(&self) -> Option<&str> {
        non_blank(self.post_id.as_deref())
    }

    pub fn keyword_summary(&self) -> Option<String> {
        if self.matched_keywords.is_empty() {
            None
        } else {
            Some(self.matched_keywords.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobDescription {
    pub id: i64,
    pub job_title: String,
    pub company_name: String,
    pub job_location: String,
    pub job_url: String,
    pub job_description: String,
    pub connections: i64,
    pub score: u8,
    pub model_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedInPost {
    pub id: i64,
    pub post_id: String,
    pub publisher_url: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub post_text: String,
    pub links: Vec<String>,
    pub emails: Vec<String>,
    pub keyword_found: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct JobDescriptionRow {
    pub id: i64,
    pub job_title: String,
    pub company_name: String,
    pub job_location: String,
    pub job_url: String,
    pub job_description: String,
    pub connections: i64,
    pub score: i64,
    pub model_response: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<JobDescriptionRow> for JobDescription {
    type Error = StorageError;

    fn try_from(row: JobDescriptionRow) -> Result<Self, Self::Error> {
        let corrupt = |message: String| StorageError::CorruptRow {
            table: "job_descriptions",
            id: row.id,
            message,
        };
        let created_at = from_db_timestamp(&row.created_at).map_err(|e| corrupt(e.to_string()))?;
        let updated_at = from_db_timestamp(&row.updated_at).map_err(|e| corrupt(e.to_string()))?;

        Ok(JobDescription {
            id: row.id,
            job_title: row.job_title,
            company_name: row.company_name,
            job_location: row.job_location,
            job_url: row.job_url,
            job_description: row.job_description,
            connections: row.connections,
            score: row.score.clamp(0, 100) as u8,
            model_response: row.model_response,
            created_at,
            updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LinkedInPostRow {
    pub id: i64,
    pub post_id: String,
    pub publisher_url: Option<String>,
    pub publish_date: Option<String>,
    pub post_text: String,
    pub links: Option<String>,
    pub emails: Option<String>,
    pub keyword_found: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<LinkedInPostRow> for LinkedInPost {
    type Error = StorageError;

    fn try_from(row: LinkedInPostRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |message: String| StorageError::CorruptRow {
            table: "linkedin_posts",
            id,
            message,
        };

        let publish_date = row
            .publish_date
            .as_deref()
            .map(from_db_timestamp)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(LinkedInPost {
            id,
            post_id: row.post_id,
            publisher_url: row.publisher_url,
            publish_date,
            post_text: row.post_text,
            links: decode_list(row.links.as_deref()).map_err(|e| corrupt(e.to_string()))?,
            emails: decode_list(row.emails.as_deref()).map_err(|e| corrupt(e.to_string()))?,
            keyword_found: row.keyword_found,
            created_at: from_db_timestamp(&row.created_at).map_err(|e| corrupt(e.to_string()))?,
            updated_at: from_db_timestamp(&row.updated_at).map_err(|e| corrupt(e.to_string()))?,
        })
    }
}

/// Timestamps are stored as RFC 3339 UTC text so the schema is identical on
/// every engine; the `Z` form also sorts lexicographically.
pub(crate) fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn from_db_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn encode_list(items: &[String]) -> Result<String, serde_json::Error> {
    serde_json::to_string(items)
}

pub(crate) fn decode_list(raw: Option<&str>) -> Result<Vec<String>, serde_json::Error> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(text) => serde_json::from_str(text),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
