// src/evaluation/prompt.rs
use std::path::Path;

use tracing::{info, warn};

use crate::config::ConfigError;

pub const RESUME_PLACEHOLDER: &str = "{resume_text}";
pub const JOB_PLACEHOLDER: &str = "{job_description}";

const DEFAULT_TEMPLATE: &str = r#"You are an experienced technical recruiter. Compare the candidate's resume with the job description.

### Resume:
{resume_text}

### Job Description:
{job_description}

Respond with a single JSON object and nothing else, using exactly these keys:
{"match_score": <integer 0-100>, "summary": "<two sentences>", "strengths": ["..."], "missing_skills": ["..."], "recommendations": ["..."]}

If you cannot produce JSON, answer in prose and include a line "Match Score: XX%"."#;

/// Evaluation prompt with `{resume_text}` and `{job_description}` slots.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, ConfigError> {
        let template = template.into();
        if !template.contains(JOB_PLACEHOLDER) {
            return Err(ConfigError::Invalid {
                key: "PROMPT_TEMPLATE_PATH".to_string(),
                message: format!("template must contain {}", JOB_PLACEHOLDER),
            });
        }
        if !template.contains(RESUME_PLACEHOLDER) {
            warn!("Prompt template has no {} slot", RESUME_PLACEHOLDER);
        }
        Ok(Self { template })
    }

    /// Load from `path`, or the built-in template when the file is missing.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                info!("Loaded prompt template from {}", path.display());
                Self::new(content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Prompt file not found: {}, using the built-in template", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn render(&self, resume_text: &str, job_description: &str) -> String {
        // job text may itself contain "{resume_text}", so fill the resume first
        self.template
            .replace(RESUME_PLACEHOLDER, resume_text)
            .replace(JOB_PLACEHOLDER, job_description)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_both_slots() {
        let prompt = PromptTemplate::new("R={resume_text} J={job_description}")
            .unwrap()
            .render("rust dev", "needs tokio");
        assert_eq!(prompt, "R=rust dev J=needs tokio");
    }

    #[test]
    fn test_template_without_job_slot_is_rejected() {
        let err = PromptTemplate::new("no slots here").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_default_template_asks_for_json() {
        let prompt = PromptTemplate::default().render("resume", "job");
        assert!(prompt.contains("\"match_score\""));
        assert!(prompt.contains("resume") && prompt.contains("job"));
        assert!(!prompt.contains(JOB_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let template = PromptTemplate::load(&dir.path().join("absent.txt")).await.unwrap();
        assert!(template.render("a", "b").contains("\"match_score\""));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "Job: {job_description} / CV: {resume_text}").unwrap();
        let template = PromptTemplate::load(&path).await.unwrap();
        assert_eq!(template.render("cv", "jd"), "Job: jd / CV: cv");
    }
}
