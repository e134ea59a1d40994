// src/storage/jobs.rs
use chrono::Utc;
use sqlx::AnyPool;
use tracing::{debug, error, info, warn};

use super::models::{to_db_timestamp, JobDescription, JobDescriptionRow, JobRecord};
use super::{rollback_quietly, SaveReport, StorageError, UpsertOutcome};

const JOB_COLUMNS: &str = "id, job_title, company_name, job_location, job_url, job_description, \
     connections, score, model_response, created_at, updated_at";

#[derive(Debug, Clone, Copy, Default)]
pub struct JobFilter {
    pub min_score: Option<u8>,
    pub limit: Option<i64>,
}

pub struct JobRepository<'a> {
    pool: &'a AnyPool,
}

impl<'a> JobRepository<'a> {
    pub(crate) fn new(pool: &'a AnyPool) -> Self {
        Self { pool }
    }

    /// Insert a job or overwrite the row with the same URL. A `None` score or
    /// model response leaves the stored value alone.
    pub async fn upsert(&self, job: &JobRecord) -> Result<UpsertOutcome, StorageError> {
        let job_url = job.natural_key().ok_or(StorageError::MissingKey {
            record: "job",
            field: "job_url",
        })?;
        let now = to_db_timestamp(Utc::now());

        let mut tx = self.pool.begin().await?;
        let result = async {
            let existing: Option<(i64,)> =
                sqlx::query_as("SELECT id FROM job_descriptions WHERE job_url = ?")
                    .bind(job_url)
                    .fetch_optional(&mut *tx)
                    .await?;

            match existing {
                Some((id,)) => {
                    sqlx::query(
                        r#"
                        UPDATE job_descriptions
                        SET job_title = ?, company_name = ?, job_location = ?,
                            job_description = ?, connections = ?,
                            score = COALESCE(?, score),
                            model_response = COALESCE(?, model_response),
                            updated_at = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(&job.job_title)
                    .bind(&job.company_name)
                    .bind(&job.job_location)
                    .bind(&job.job_description)
                    .bind(job.connections)
                    .bind(job.score.map(i64::from))
                    .bind(job.model_response.as_deref())
                    .bind(&now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    Ok::<_, sqlx::Error>(UpsertOutcome::Updated(id))
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO job_descriptions
                            (job_title, company_name, job_location, job_url, job_description,
                             connections, score, model_response, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&job.job_title)
                    .bind(&job.company_name)
                    .bind(&job.job_location)
                    .bind(job_url)
                    .bind(&job.job_description)
                    .bind(job.connections)
                    .bind(i64::from(job.score.unwrap_or(0)))
                    .bind(job.model_response.as_deref())
                    .bind(&now)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;

                    let (id,): (i64,) =
                        sqlx::query_as("SELECT id FROM job_descriptions WHERE job_url = ?")
                            .bind(job_url)
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
                debug!("Saved job {} ({:?})", job_url, outcome);
                Ok(outcome)
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e.into())
            }
        }
    }

    /// Save every record independently. Failures are logged and counted,
    /// never propagated.
    pub async fn save_batch(&self, jobs: &[JobRecord]) -> SaveReport {
        let mut report = SaveReport::default();
        for job in jobs {
            let result = self.upsert(job).await;
            if let Err(e) = &result {
                match e {
                    StorageError::MissingKey { .. } => {
                        warn!("Skipping job '{}' at {}: {}", job.job_title, job.company_name, e)
                    }
                    _ => error!("Error saving job '{}': {}", job.job_title, e),
                }
            }
            report.record(&result);
        }
        info!(
            "Saved {} jobs ({} new, {} updated, {} skipped, {} failed)",
            report.saved(),
            report.inserted,
            report.updated,
            report.skipped,
            report.failed
        );
        report
    }

    /// Jobs ordered by score, best first.
    pub async fn list(&self, filter: JobFilter) -> Result<Vec<JobDescription>, StorageError> {
        let min_score = i64::from(filter.min_score.unwrap_or(0));
        let limit = filter.limit.unwrap_or(i64::MAX).max(0);
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM job_descriptions WHERE score >= ? \
             ORDER BY score DESC, updated_at DESC LIMIT ?"
        );
        let rows: Vec<JobDescriptionRow> = sqlx::query_as(&sql)
            .bind(min_score)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(JobDescription::try_from).collect()
    }

    pub async fn find_by_url(&self, job_url: &str) -> Result<Option<JobDescription>, StorageError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM job_descriptions WHERE job_url = ?");
        let row: Option<JobDescriptionRow> = sqlx::query_as(&sql)
            .bind(job_url.trim())
            .fetch_optional(self.pool)
            .await?;
        row.map(JobDescription::try_from).transpose()
    }

    /// Jobs that were stored without an assessment.
    pub async fn list_unscored(&self, limit: Option<i64>) -> Result<Vec<JobDescription>, StorageError> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM job_descriptions WHERE model_response IS NULL \
             ORDER BY created_at DESC LIMIT ?"
        );
        let rows: Vec<JobDescriptionRow> = sqlx::query_as(&sql)
            .bind(limit.unwrap_or(i64::MAX).max(0))
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(JobDescription::try_from).collect()
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM job_descriptions")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

impl From<&JobDescription> for JobRecord {
    fn from(job: &JobDescription) -> Self {
        JobRecord {
            job_title: job.job_title.clone(),
            company_name: job.company_name.clone(),
            job_location: job.job_location.clone(),
            job_url: Some(job.job_url.clone()),
            job_description: job.job_description.clone(),
            connections: job.connections,
            score: None,
            model_response: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn job(url: &str, title: &str) -> JobRecord {
        JobRecord {
            job_title: title.to_string(),
            company_name: "Acme".to_string(),
            job_location: "Paris".to_string(),
            job_url: Some(url.to_string()),
            job_description: "Build things in Rust".to_string(),
            connections: 2,
            score: None,
            model_response: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_url() {
        let storage = Storage::in_memory().await.unwrap();
        let repo = storage.jobs();
        let record = job("https://www.linkedin.com/jobs/view/1/", "Engineer");

        let first = repo.upsert(&record).await.unwrap();
        let second = repo.upsert(&record).await.unwrap();

        assert!(matches!(first, UpsertOutcome::Inserted(_)));
        assert_eq!(second, UpsertOutcome::Updated(first.id()));
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_sighting_overwrites_fields() {
        let storage = Storage::in_memory().await.unwrap();
        let repo = storage.jobs();
        let url = "https://www.linkedin.com/jobs/view/2/";

        let mut first = job(url, "Engineer");
        first.score = Some(40);
        first.model_response = Some("meh".into());
        repo.upsert(&first).await.unwrap();

        let mut second = job(url, "Senior Engineer");
        second.score = Some(85);
        second.model_response = Some("strong match".into());
        repo.upsert(&second).await.unwrap();

        let stored = repo.find_by_url(url).await.unwrap().unwrap();
        assert_eq!(stored.job_title, "Senior Engineer");
        assert_eq!(stored.score, 85);
        assert_eq!(stored.model_response.as_deref(), Some("strong match"));
        assert!(stored.updated_at >= stored.created_at);
    }

    #[tokio::test]
    async fn test_unscored_sighting_keeps_existing_assessment() {
        let storage = Storage::in_memory().await.unwrap();
        let repo = storage.jobs();
        let url = "https://www.linkedin.com/jobs/view/3/";

        let mut scored = job(url, "Engineer");
        scored.score = Some(90);
        scored.model_response = Some("great".into());
        repo.upsert(&scored).await.unwrap();
        repo.upsert(&job(url, "Engineer II")).await.unwrap();

        let stored = repo.find_by_url(url).await.unwrap().unwrap();
        assert_eq!(stored.job_title, "Engineer II");
        assert_eq!(stored.score, 90);
        assert_eq!(stored.model_response.as_deref(), Some("great"));
    }

    #[tokio::test]
    async fn test_batch_skips_record_without_url() {
        let storage = Storage::in_memory().await.unwrap();
        let repo = storage.jobs();
        let mut missing = job("", "No link");
        missing.job_url = None;

        let batch = vec![
            job("https://www.linkedin.com/jobs/view/10/", "A"),
            missing,
            job("https://www.linkedin.com/jobs/view/11/", "B"),
        ];
        let report = repo.save_batch(&batch).await;

        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_orders_and_filters_by_score() {
        let storage = Storage::in_memory().await.unwrap();
        let repo = storage.jobs();
        for (n, score) in [(1, 50u8), (2, 95), (3, 80)] {
            let mut record = job(&format!("https://www.linkedin.com/jobs/view/{n}/"), "Dev");
            record.score = Some(score);
            record.model_response = Some(format!("score {score}"));
            repo.upsert(&record).await.unwrap();
        }
        repo.upsert(&job("https://www.linkedin.com/jobs/view/4/", "Unscored"))
            .await
            .unwrap();

        let all = repo.list(JobFilter::default()).await.unwrap();
        let scores: Vec<u8> = all.iter().map(|j| j.score).collect();
        assert_eq!(scores, vec![95, 80, 50, 0]);

        let good = repo
            .list(JobFilter {
                min_score: Some(80),
                limit: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].score, 95);

        let unscored = repo.list_unscored(None).await.unwrap();
        assert_eq!(unscored.len(), 1);
        assert_eq!(unscored[0].job_title, "Unscored");
    }
}
