// src/scheduler/notifier.rs
use serde::Serialize;
use tracing::info;

use crate::storage::JobRecord;

#[derive(Debug, Serialize)]
pub struct NotificationPayload<'a> {
    pub message: String,
    pub status: &'static str,
    pub job_descriptions: &'a [JobRecord],
}

impl<'a> NotificationPayload<'a> {
    pub fn new(job_title: &str, jobs: &'a [JobRecord]) -> Self {
        Self {
            message: format!("Scheduled update for {}", job_title),
            status: "active",
            job_descriptions: jobs,
        }
    }
}

/// Posts high-scoring matches to the notifications endpoint.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: reqwest::Client,
    api_url: String,
}

impl Notifier {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub async fn send(&self, job_title: &str, jobs: &[JobRecord]) -> Result<(), reqwest::Error> {
        let payload = NotificationPayload::new(job_title, jobs);
        self.client
            .post(&self.api_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        info!(
            "Sent notification for plan '{}' with {} jobs",
            job_title,
            jobs.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_shape() {
        let jobs = vec![JobRecord {
            job_title: "Rust Engineer".into(),
            company_name: "Acme".into(),
            job_location: "Berlin".into(),
            job_url: Some("https://www.linkedin.com/jobs/view/7/".into()),
            job_description: "Build things".into(),
            score: Some(91),
            model_response: Some("Match Score: 91%".into()),
            ..Default::default()
        }];
        let value = serde_json::to_value(NotificationPayload::new("Rust Engineer", &jobs)).unwrap();
        assert_eq!(value["message"], json!("Scheduled update for Rust Engineer"));
        assert_eq!(value["status"], json!("active"));
        assert_eq!(value["job_descriptions"][0]["score"], json!(91));
        assert_eq!(value["job_descriptions"][0]["job_url"], json!("https://www.linkedin.com/jobs/view/7/"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let notifier = Notifier::new("http://127.0.0.1:9/notify");
        assert!(notifier.send("Rust", &[]).await.is_err());
    }
}
