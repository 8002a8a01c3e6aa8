//! HTTP client for the dashboard backend
//!
//! Every call decodes the JSON body and classifies it through
//! [`parse_reply`], so callers only ever see data or a [`FetchError`].

use crate::config::Config;
use crate::core::error::payload_text;
use crate::core::{parse_reply, FetchError, FetchResult, PageRequest, PageResult, Row};
use crate::services::frequency_service::FrequencyMap;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Async client for the dashboard REST API
#[derive(Debug, Clone)]
pub struct DashboardClient {
    http: reqwest::Client,
    base: Url,
}

/// Rows scored by the churn model, plus its accuracy on the sheet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub accuracy: Option<f64>,
}

#[derive(Deserialize)]
struct FilesReply {
    files: Vec<String>,
}

#[derive(Deserialize)]
struct SheetsReply {
    #[serde(default)]
    sheets: Vec<String>,
}

#[derive(Deserialize)]
struct ColumnsReply {
    #[serde(default)]
    columns: Vec<String>,
}

#[derive(Deserialize)]
struct FrequencyReply {
    frequency: FrequencyMap,
}

#[derive(Deserialize)]
struct PredictionsReply {
    #[serde(default)]
    columns: Option<Vec<String>>,
    #[serde(default)]
    preview: Vec<Row>,
    #[serde(default)]
    accuracy: Option<f64>,
}

impl From<PredictionsReply> for PredictionSet {
    fn from(reply: PredictionsReply) -> Self {
        let columns = reply.columns.unwrap_or_else(|| {
            reply
                .preview
                .first()
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_default()
        });
        Self {
            columns,
            rows: reply.preview,
            accuracy: reply.accuracy,
        }
    }
}

impl DashboardClient {
    /// Create a client for the backend rooted at `api_url`
    pub fn new(api_url: &str, timeout: Duration) -> FetchResult<Self> {
        let base = Url::parse(api_url)
            .map_err(|e| FetchError::Transport(format!("invalid API url '{api_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(FetchError::Transport(format!(
                "API url '{api_url}' cannot carry a path"
            )));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("sheetview/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http, base })
    }

    pub fn from_config(config: &Config) -> FetchResult<Self> {
        Self::new(
            &config.api_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Uploaded workbook names
    pub async fn files(&self) -> FetchResult<Vec<String>> {
        let body = self.get_json(&["get_files"], &[]).await?;
        Ok(parse_reply::<FilesReply>(body)?.files)
    }

    /// Sheet names of one workbook
    pub async fn sheets(&self, file: &str) -> FetchResult<Vec<String>> {
        let body = self.get_json(&["get_sheets", file], &[]).await?;
        Ok(parse_reply::<SheetsReply>(body)?.sheets)
    }

    /// Column names of one sheet
    pub async fn all_columns(&self, file: &str, sheet: &str) -> FetchResult<Vec<String>> {
        let body = self.get_json(&["get_all_columns", file, sheet], &[]).await?;
        Ok(parse_reply::<ColumnsReply>(body)?.columns)
    }

    /// One page of sheet rows, filtered when the request carries a search term
    pub async fn sheet_page(&self, request: &PageRequest) -> FetchResult<PageResult> {
        let mut query = vec![
            ("page", request.page.to_string()),
            ("page_size", request.page_size.to_string()),
        ];
        let mut segments = vec!["get_sheets", request.dataset.as_str(), request.sheet.as_str()];
        if request.is_search() {
            segments.push("search");
            query.push(("search", request.search_term.clone()));
        }
        let body = self.get_json(&segments, &query).await?;
        Ok(parse_reply::<PageResult>(body)?.normalized())
    }

    /// Raw value counts of one column
    pub async fn column_frequency(
        &self,
        file: &str,
        sheet: &str,
        column: &str,
    ) -> FetchResult<FrequencyMap> {
        let body = self
            .get_json(&["get_column_data", file, sheet, column], &[])
            .await?;
        Ok(parse_reply::<FrequencyReply>(body)?.frequency)
    }

    /// Every row of a sheet with the model's churn prediction attached
    pub async fn predictions(&self, file: &str, sheet: &str) -> FetchResult<PredictionSet> {
        let body = self.get_json(&["predict_churn", file, sheet], &[]).await?;
        Ok(parse_reply::<PredictionsReply>(body)?.into())
    }

    /// Delete an uploaded workbook, returning the backend's confirmation
    pub async fn delete_file(&self, file: &str) -> FetchResult<String> {
        let url = self.endpoint(&["delete_file", file])?;
        debug!("DELETE {}", url);
        let response = self.http.delete(url).send().await?;
        let body = decode_body(response).await?;
        if let Some(error) = payload_text(&body, "error") {
            return Err(FetchError::Logical(error));
        }
        payload_text(&body, "message")
            .ok_or_else(|| FetchError::Malformed("delete reply has no message".to_string()))
    }

    fn endpoint(&self, segments: &[&str]) -> FetchResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                FetchError::Transport(format!("API url '{}' cannot carry a path", self.base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, segments: &[&str], query: &[(&str, String)]) -> FetchResult<Value> {
        let url = self.endpoint(segments)?;
        debug!("GET {} {:?}", url, query);
        let response = self.http.get(url).query(query).send().await?;
        decode_body(response).await
    }
}

/// Read a response body as JSON, keeping error payloads of failed statuses
async fn decode_body(response: reqwest::Response) -> FetchResult<Value> {
    let status = response.status();
    let text = response.text().await?;
    let parsed = serde_json::from_str::<Value>(&text);

    if !status.is_success() {
        warn!("backend returned HTTP {}", status);
        let has_payload = |body: &Value| {
            payload_text(body, "error").is_some() || payload_text(body, "message").is_some()
        };
        return match parsed {
            Ok(body) if has_payload(&body) => Ok(body),
            _ => Err(FetchError::Transport(format!("HTTP {status}"))),
        };
    }

    parsed.map_err(|e| FetchError::Malformed(format!("body is not JSON: {e}")))
}
