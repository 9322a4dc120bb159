//! Callback URLs embedded in analysis tasks.
//!
//! A worker GETs `data_fetch`, computes, then POSTs to exactly one of `save`
//! or `failure`. Every URL hangs off the manager base URL.

use anyhow::{Context, Result};
use reqwest::Url;
use uuid::Uuid;

use crate::domain::models::{ClusterLevel, TaskUrls};

/// Builds [`TaskUrls`] for each analysis type.
#[derive(Debug, Clone)]
pub struct TaskUrlBuilder {
    base: Url,
}

impl TaskUrlBuilder {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("Invalid manager base URL: {base_url}"))?;
        Ok(Self { base })
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = self.base.clone();
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        url.to_string()
    }

    fn failure(&self, task_id: Uuid) -> String {
        self.url("learning/notify-failure", &[("taskId", task_id.to_string())])
    }

    /// Metric analysis over `[start_minute, end_minute]`, history included.
    pub fn time_series(
        &self,
        task_id: Uuid,
        config_id: &str,
        start_minute: i64,
        end_minute: i64,
        tag: Option<&str>,
    ) -> TaskUrls {
        let mut fetch = vec![
            ("cvConfigId", config_id.to_string()),
            ("startMinute", start_minute.to_string()),
            ("endMinute", end_minute.to_string()),
        ];
        let mut save = vec![
            ("cvConfigId", config_id.to_string()),
            ("analysisMinute", end_minute.to_string()),
            ("taskId", task_id.to_string()),
        ];
        if let Some(tag) = tag {
            fetch.push(("tag", tag.to_string()));
            save.push(("tag", tag.to_string()));
        }
        TaskUrls {
            data_fetch: self.url("cv/time-series/data", &fetch),
            save: self.url("cv/time-series/results", &save),
            failure: self.failure(task_id),
            historical: Some(self.url(
                "cv/time-series/history",
                &[("cvConfigId", config_id.to_string()), ("analysisMinute", end_minute.to_string())],
            )),
            ..TaskUrls::default()
        }
    }

    /// Clustering task saving at `target`, reading the level below it.
    pub fn log_cluster(
        &self,
        task_id: Uuid,
        scope_id: &str,
        start_minute: i64,
        end_minute: i64,
        target: ClusterLevel,
    ) -> TaskUrls {
        let source = target.previous().unwrap_or(ClusterLevel::L0);
        TaskUrls {
            data_fetch: self.url(
                "cv/logs/records",
                &[
                    ("cvConfigId", scope_id.to_string()),
                    ("startMinute", start_minute.to_string()),
                    ("endMinute", end_minute.to_string()),
                    ("level", source.to_string()),
                ],
            ),
            save: self.url(
                "cv/logs/clustered",
                &[
                    ("cvConfigId", scope_id.to_string()),
                    ("minute", end_minute.to_string()),
                    ("level", target.to_string()),
                    ("taskId", task_id.to_string()),
                ],
            ),
            failure: self.failure(task_id),
            ..TaskUrls::default()
        }
    }

    /// Log-ML analysis. Baseline runs fetch the control set, later runs the
    /// test set; predictive runs also get the previous analysis.
    pub fn log_analysis(
        &self,
        task_id: Uuid,
        config_id: &str,
        start_minute: i64,
        end_minute: i64,
        baseline_run: bool,
        predictive: bool,
    ) -> TaskUrls {
        let dataset = if baseline_run { "control" } else { "test" };
        TaskUrls {
            data_fetch: self.url(
                &format!("cv/logs/{dataset}"),
                &[
                    ("cvConfigId", config_id.to_string()),
                    ("startMinute", start_minute.to_string()),
                    ("endMinute", end_minute.to_string()),
                ],
            ),
            save: self.url(
                "cv/logs/analysis",
                &[
                    ("cvConfigId", config_id.to_string()),
                    ("analysisMinute", end_minute.to_string()),
                    ("taskId", task_id.to_string()),
                ],
            ),
            failure: self.failure(task_id),
            previous_analysis: predictive.then(|| {
                self.url(
                    "cv/logs/previous-analysis",
                    &[("cvConfigId", config_id.to_string()), ("analysisMinute", end_minute.to_string())],
                )
            }),
            ..TaskUrls::default()
        }
    }

    pub fn feedback_analysis(&self, task_id: Uuid, config_id: &str, analysis_minute: i64) -> TaskUrls {
        let minute_params = [("cvConfigId", config_id.to_string()), ("analysisMinute", analysis_minute.to_string())];
        TaskUrls {
            data_fetch: self.url("cv/logs/analysis", &minute_params),
            save: self.url(
                "cv/feedback/results",
                &[
                    ("cvConfigId", config_id.to_string()),
                    ("analysisMinute", analysis_minute.to_string()),
                    ("taskId", task_id.to_string()),
                ],
            ),
            failure: self.failure(task_id),
            feedback: Some(self.url("cv/feedback", &[("cvConfigId", config_id.to_string())])),
            ..TaskUrls::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_series_urls_carry_window_and_tag() {
        let builder = TaskUrlBuilder::new("http://manager:8080/api").unwrap();
        let id = Uuid::nil();
        let urls = builder.time_series(id, "cfg-1", 100, 235, Some("web tier"));
        assert!(urls.data_fetch.starts_with("http://manager:8080/api/cv/time-series/data?"));
        assert!(urls.data_fetch.contains("startMinute=100"));
        assert!(urls.data_fetch.contains("tag=web+tier"));
        assert!(urls.save.contains(&format!("taskId={id}")));
        assert_eq!(
            urls.failure,
            format!("http://manager:8080/api/learning/notify-failure?taskId={id}")
        );
    }

    #[test]
    fn test_cluster_urls_read_previous_level() {
        let builder = TaskUrlBuilder::new("http://manager:8080/").unwrap();
        let urls = builder.log_cluster(Uuid::nil(), "cfg-1", 86, 100, ClusterLevel::L2);
        assert!(urls.data_fetch.contains("level=L1"));
        assert!(urls.save.contains("level=L2"));
        assert!(!urls.data_fetch.contains("//cv"));
    }

    #[test]
    fn test_log_analysis_dataset_selection() {
        let builder = TaskUrlBuilder::new("http://manager").unwrap();
        let control = builder.log_analysis(Uuid::nil(), "cfg", 1, 15, true, false);
        assert!(control.data_fetch.contains("/cv/logs/control"));
        assert!(control.previous_analysis.is_none());
        let test = builder.log_analysis(Uuid::nil(), "cfg", 16, 30, false, true);
        assert!(test.data_fetch.contains("/cv/logs/test"));
        assert!(test.previous_analysis.is_some());
    }

    #[test]
    fn test_rejects_invalid_base() {
        assert!(TaskUrlBuilder::new("not a url").is_err());
    }
}
