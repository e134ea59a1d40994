// src/storage/posts.rs
use chrono::Utc;
use sqlx::AnyPool;
use tracing::{debug, error, info, warn};

use super::models::{encode_list, to_db_timestamp, LinkedInPost, LinkedInPostRow, PostRecord};
use super::{rollback_quietly, SaveReport, StorageError, UpsertOutcome};

const POST_COLUMNS: &str = "id, post_id, publisher_url, publish_date, post_text, links, emails, \
     keyword_found, created_at, updated_at";

pub struct PostRepository<'a> {
    pool: &'a AnyPool,
}

impl<'a> PostRepository<'a> {
    pub(crate) fn new(pool: &'a AnyPool) -> Self {
        Self { pool }
    }

    /// Insert a post or overwrite the row with the same post id.
    pub async fn upsert(&self, post: &PostRecord) -> Result<UpsertOutcome, StorageError> {
        let post_id = post.natural_key().ok_or(StorageError::MissingKey {
            record: "post",
            field: "post_id",
        })?;
        let links = encode_list(&post.links)?;
        let emails = encode_list(&post.emails)?;
        let keywords = post.keyword_summary();
        let publish_date = post.publish_date.map(to_db_timestamp);
        let now = to_db_timestamp(Utc::now());

        let mut tx = self.pool.begin().await?;
        let result = async {
            let existing: Option<(i64,)> =
                sqlx::query_as("SELECT id FROM linkedin_posts WHERE post_id = ?")
                    .bind(post_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            match existing {
                Some((id,)) => {
                    sqlx::query(
                        r#"
                        UPDATE linkedin_posts
                        SET publisher_url = COALESCE(?, publisher_url),
                            publish_date = COALESCE(?, publish_date),
                            post_text = ?, links = ?, emails = ?, keyword_found = ?,
                            updated_at = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(post.publisher_url.as_deref())
                    .bind(publish_date.as_deref())
                    .bind(&post.post_text)
                    .bind(&links)
                    .bind(&emails)
                    .bind(keywords.as_deref())
                    .bind(&now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    Ok::<_, sqlx::Error>(UpsertOutcome::Updated(id))
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO linkedin_posts
                            (post_id, publisher_url, publish_date, post_text, links, emails,
                             keyword_found, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(post_id)
                    .bind(post.publisher_url.as_deref())
                    .bind(publish_date.as_deref())
                    .bind(&post.post_text)
                    .bind(&links)
                    .bind(&emails)
                    .bind(keywords.as_deref())
                    .bind(&now)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;

                    let (id,): (i64,) =
                        sqlx::query_as("SELECT id FROM linkedin_posts WHERE post_id = ?")
                            .bind(post_id)
                            .fetch_one(&mut *tx)
                            .await?;
                    Ok(UpsertOutcome::Inserted(id))
                }
            }
        }
        .await;

        match result {
            Ok(outcome) => {
                tx.commit().await?;
                debug!("Saved post {} ({:?})", post_id, outcome);
                Ok(outcome)
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e.into())
            }
        }
    }

    pub async fn save_batch(&self, posts: &[PostRecord]) -> SaveReport {
        let mut report = SaveReport::default();
        for post in posts {
            let result = self.upsert(post).await;
            if let Err(e) = &result {
                match e {
                    StorageError::MissingKey { .. } => warn!("Skipping post: {}", e),
                    _ => error!("Error saving post {:?}: {}", post.post_id, e),
                }
            }
            report.record(&result);
        }
        info!(
            "Saved {} posts ({} new, {} updated, {} skipped, {} failed)",
            report.saved(),
            report.inserted,
            report.updated,
            report.skipped,
            report.failed
        );
        report
    }

    /// Most recently stored posts first.
    pub async fn list(&self, limit: Option<i64>) -> Result<Vec<LinkedInPost>, StorageError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM linkedin_posts ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        let rows: Vec<LinkedInPostRow> = sqlx::query_as(&sql)
            .bind(limit.unwrap_or(i64::MAX).max(0))
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(LinkedInPost::try_from).collect()
    }

    pub async fn find_by_post_id(&self, post_id: &str) -> Result<Option<LinkedInPost>, StorageError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM linkedin_posts WHERE post_id = ?");
        let row: Option<LinkedInPostRow> = sqlx::query_as(&sql)
            .bind(post_id.trim())
            .fetch_optional(self.pool)
            .await?;
        row.map(LinkedInPost::try_from).transpose()
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM linkedin_posts")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
