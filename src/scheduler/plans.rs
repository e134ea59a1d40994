// src/scheduler/plans.rs
//! Saved searches run by the notification scheduler.

use std::path::Path;

use tracing::info;

use crate::browser::JobQuery;
use crate::config::ConfigError;

/// Read the plans file: a JSON array of `{job_title, location, filters}`.
pub async fn load_plans(path: &Path) -> Result<Vec<JobQuery>, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let plans = parse_plans(&content).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    info!("Loaded {} notification plans from {}", plans.len(), path.display());
    Ok(plans)
}

pub fn parse_plans(content: &str) -> Result<Vec<JobQuery>, serde_json::Error> {
    serde_json::from_str(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::navigator::{job_search_url, DatePosted, RemoteOption};

    #[test]
    fn test_parse_plans_with_and_without_filters() {
        let plans = parse_plans(
            r#"[
                {"job_title": "Rust Engineer", "location": "Berlin",
                 "filters": {"date_posted": "Past 24 hours", "remote_options": ["Remote", "Hybrid"], "easy_apply": true}},
                {"job_title": "Data Engineer", "location": "Remote"}
            ]"#,
        )
        .unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].filters.date_posted, Some(DatePosted::Past24Hours));
        assert_eq!(plans[0].filters.remote_options, vec![RemoteOption::Remote, RemoteOption::Hybrid]);
        assert!(plans[0].filters.easy_apply);
        assert_eq!(plans[1].filters, Default::default());
    }

    #[test]
    fn test_any_and_unknown_labels_mean_no_filter() {
        let plans = parse_plans(
            r#"[{"job_title": "x", "location": "y",
                 "filters": {"date_posted": "Any Time", "experience_level": "Any",
                             "remote_options": ["Remote", "Anywhere"]}}]"#,
        )
        .unwrap();
        let filters = &plans[0].filters;
        assert_eq!(filters.date_posted, None);
        assert_eq!(filters.experience_level, None);
        assert_eq!(filters.remote_options, vec![RemoteOption::Remote]);

        let url = job_search_url(&plans[0]);
        assert!(!url.contains("f_TPR"));
        assert!(!url.contains("f_E="));
        assert!(url.ends_with("&f_WT=3"));
    }

    #[test]
    fn test_null_filters_are_absent() {
        let plans = parse_plans(
            r#"[{"job_title": "x", "filters": {"date_posted": null, "remote_options": null}}]"#,
        )
        .unwrap();
        assert_eq!(plans[0].filters, Default::default());
    }

    #[tokio::test]
    async fn test_load_plans_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_plans(&dir.path().join("plans.json")).await.unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_plans(&path).await.unwrap_err(), ConfigError::Parse { .. }));
    }
}
