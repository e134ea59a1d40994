// src/evaluation/mod.rs
//! Job/resume fit scoring through a [`LanguageModel`].
//!
//! The model is asked for a JSON [`MatchAssessment`]. Replies that are not
//! JSON fall back to scanning prose for "Match Score: NN%".

pub mod prompt;
pub mod score;

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::ErrorKind;
use crate::llm::{strip_json_fences, LanguageModel, LlmError, ResponseFormat};
use crate::scraping::job_scraper::DESCRIPTION_NOT_FOUND;
use crate::storage::JobRecord;
use crate::tasks::CancelToken;

pub use prompt::PromptTemplate;
pub use score::{clamp_score, extract_match_score};

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("job has no description to evaluate")]
    EmptyDescription,

    #[error("model call failed: {0}")]
    Model(#[from] LlmError),

    #[error("no match score in model reply")]
    ScoreNotFound { response: String },
}

impl EvaluationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvaluationError::Model(e) => e.kind(),
            EvaluationError::EmptyDescription | EvaluationError::ScoreNotFound { .. } => {
                ErrorKind::DataShape
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAssessment {
    #[serde(deserialize_with = "lenient_score")]
    pub match_score: u32,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Accepts `82`, `82.0` or `"82%"`.
fn lenient_score<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let score = match &value {
        Value::Number(n) => n.as_f64().map(|f| f.round().max(0.0) as u32),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    score.ok_or_else(|| serde::de::Error::custom(format!("invalid match_score: {}", value)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: u8,
    /// Raw model reply, stored alongside the job.
    pub response: String,
    pub assessment: Option<MatchAssessment>,
}

/// Parse a model reply: structured JSON first, prose second.
pub fn interpret_reply(reply: &str) -> Result<Evaluation, EvaluationError> {
    let response = reply.trim().to_string();

    if let Ok(assessment) = serde_json::from_str::<MatchAssessment>(strip_json_fences(reply)) {
        return Ok(Evaluation {
            score: clamp_score(assessment.match_score),
            response,
            assessment: Some(assessment),
        });
    }

    match extract_match_score(reply) {
        Some(score) => Ok(Evaluation {
            score: clamp_score(score),
            response,
            assessment: None,
        }),
        None => Err(EvaluationError::ScoreNotFound { response }),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    pub scored: usize,
    pub unscored: usize,
}

#[derive(Clone)]
pub struct MatchEvaluator {
    model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
    resume: Arc<str>,
    concurrency: usize,
}

impl MatchEvaluator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        template: PromptTemplate,
        resume: impl Into<Arc<str>>,
        concurrency: usize,
    ) -> Self {
        Self {
            model,
            template,
            resume: resume.into(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub async fn evaluate(&self, job_description: &str) -> Result<Evaluation, EvaluationError> {
        if job_description.trim().is_empty() || job_description == DESCRIPTION_NOT_FOUND {
            return Err(EvaluationError::EmptyDescription);
        }
        let prompt = self.template.render(&self.resume, job_description);
        let reply = self.model.complete(&prompt, ResponseFormat::Json).await?;
        interpret_reply(&reply)
    }

    /// Score `job` in place. Failures leave the score unset.
    pub async fn evaluate_job(&self, index: usize, mut job: JobRecord) -> JobRecord {
        match self.evaluate(&job.job_description).await {
            Ok(evaluation) => {
                info!("Job {}: processed, match score {}%", index, evaluation.score);
                job.score = Some(evaluation.score);
                job.model_response = Some(evaluation.response);
            }
            Err(EvaluationError::EmptyDescription) => {
                warn!("Job {}: no description available, skipping", index);
            }
            Err(e) => {
                error!("Job {}: evaluation failed ({}): {}", index, e.kind(), e);
            }
        }
        job
    }

    /// Evaluate `jobs` with bounded concurrency, handing each result to
    /// `on_result` as soon as it is ready. Jobs not started before
    /// cancellation are dropped.
    pub async fn evaluate_all<F, Fut>(
        &self,
        jobs: Vec<JobRecord>,
        cancel: &CancelToken,
        mut on_result: F,
    ) -> EvaluationStats
    where
        F: FnMut(JobRecord) -> Fut,
        Fut: Future<Output = ()>,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        let total = jobs.len();

        for (index, job) in jobs.into_iter().enumerate() {
            let evaluator = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                if cancel.is_cancelled() {
                    return None;
                }
                Some(evaluator.evaluate_job(index + 1, job).await)
            });
        }

        let mut stats = EvaluationStats::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(job)) => {
                    if job.score.is_some() {
                        stats.scored += 1;
                    } else {
                        stats.unscored += 1;
                    }
                    on_result(job).await;
                }
                Ok(None) => {}
                Err(e) => error!("Evaluation task failed: {}", e),
            }
        }

        info!(
            "Evaluated {} of {} jobs ({} without a score)",
            stats.scored + stats.unscored,
            total,
            stats.unscored
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::fake::CannedModel;
    use crate::storage::Storage;

    fn job(url: &str, description: &str) -> JobRecord {
        JobRecord {
            job_title: "Engineer".into(),
            company_name: "Acme".into(),
            job_location: "Remote".into(),
            job_url: Some(url.into()),
            job_description: description.into(),
            ..Default::default()
        }
    }

    fn evaluator(model: CannedModel) -> MatchEvaluator {
        MatchEvaluator::new(
            Arc::new(model),
            PromptTemplate::new("CV: {resume_text}\nJOB: {job_description}").unwrap(),
            "Rust, Tokio, SQL",
            2,
        )
    }

    #[test]
    fn test_structured_reply() {
        let reply = "```json\n{\"match_score\": \"91%\", \"summary\": \"Strong\", \"strengths\": [\"Rust\"]}\n```";
        let evaluation = interpret_reply(reply).unwrap();
        assert_eq!(evaluation.score, 91);
        let assessment = evaluation.assessment.unwrap();
        assert_eq!(assessment.strengths, vec!["Rust"]);
        assert!(assessment.missing_skills.is_empty());
    }

    #[test]
    fn test_prose_reply_falls_back_to_score_scan() {
        let evaluation = interpret_reply("- Match Score: 82%\n- Strengths: Rust").unwrap();
        assert_eq!(evaluation.score, 82);
        assert!(evaluation.assessment.is_none());
    }

    #[test]
    fn test_reply_without_score() {
        let err = interpret_reply("I am unable to help with that.").unwrap_err();
        assert!(matches!(err, EvaluationError::ScoreNotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::DataShape);
    }

    #[test]
    fn test_scores_are_clamped() {
        assert_eq!(interpret_reply(r#"{"match_score": 250}"#).unwrap().score, 100);
    }

    #[tokio::test]
    async fn test_evaluate_renders_prompt_with_resume() {
        let model = CannedModel::new().reply_when("CV: Rust, Tokio, SQL", r#"{"match_score": 77}"#);
        let evaluation = evaluator(model).evaluate("Backend role").await.unwrap();
        assert_eq!(evaluation.score, 77);
    }

    #[tokio::test]
    async fn test_missing_description_is_not_sent() {
        let model = Arc::new(CannedModel::new());
        let evaluator = MatchEvaluator::new(model.clone(), PromptTemplate::default(), "cv", 1);
        let err = evaluator.evaluate(DESCRIPTION_NOT_FOUND).await.unwrap_err();
        assert!(matches!(err, EvaluationError::EmptyDescription));
        assert_eq!(model.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_evaluate_all_persists_each_result() {
        let storage = Storage::in_memory().await.unwrap();
        let model = CannedModel::new()
            .reply_when("JOB: great fit", "Match Score: 88%")
            .reply_when("JOB: poor fit", r#"{"match_score": 20}"#)
            .fail_when("JOB: broken", 500);
        let jobs = vec![
            job("https://www.linkedin.com/jobs/view/1/", "great fit"),
            job("https://www.linkedin.com/jobs/view/2/", "poor fit"),
            job("https://www.linkedin.com/jobs/view/3/", "broken"),
        ];

        let repo = storage.jobs();
        let stats = evaluator(model)
            .evaluate_all(jobs, &CancelToken::new(), |record| {
                let storage = storage.clone();
                async move {
                    storage.jobs().upsert(&record).await.unwrap();
                }
            })
            .await;

        assert_eq!(stats, EvaluationStats { scored: 2, unscored: 1 });
        let best = repo.find_by_url("https://www.linkedin.com/jobs/view/1/").await.unwrap().unwrap();
        assert_eq!(best.score, 88);
        let failed = repo.find_by_url("https://www.linkedin.com/jobs/view/3/").await.unwrap().unwrap();
        assert_eq!(failed.score, 0);
        assert_eq!(failed.model_response, None);
    }

    #[tokio::test]
    async fn test_cancelled_batch_evaluates_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut delivered = 0;
        let stats = evaluator(CannedModel::new().then_reply("Match Score: 50%"))
            .evaluate_all(vec![job("u", "desc")], &cancel, |_| {
                delivered += 1;
                async {}
            })
            .await;
        assert_eq!(stats, EvaluationStats::default());
        assert_eq!(delivered, 0);
    }
}
