use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::config::ServerConfig;
use crate::model::{AckPayload, AttemptData, AttemptResults};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("server rejected request: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// The server endpoints one attempt talks to.
pub trait AttemptApi: Send + Sync {
    fn fetch_data(&self, attempt_id: u64) -> Result<AttemptData, ApiError>;

    fn save_answer(
        &self,
        attempt_id: u64,
        variant_task_id: u64,
        answer_text: &str,
    ) -> Result<(), ApiError>;

    fn finish(&self, attempt_id: u64) -> Result<(), ApiError>;

    fn fetch_results(&self, attempt_id: u64) -> Result<AttemptResults, ApiError>;

    fn results_page_url(&self, attempt_id: u64) -> String;
}

#[derive(Debug, Serialize)]
struct SaveAnswerRequest<'a> {
    variant_task_id: u64,
    answer_text: &'a str,
}

#[derive(Debug)]
pub struct HttpAttemptApi {
    http: Client,
    base_url: String,
}

impl HttpAttemptApi {
    pub fn new(config: &ServerConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let cookie = config.session_cookie.trim();
        if !cookie.is_empty() {
            let value = HeaderValue::from_str(&format!("session={cookie}"))
                .map_err(|_| ApiError::Config("session cookie is not a valid header".into()))?;
            headers.insert(COOKIE, value);
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url: normalize_base_url(&config.base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn attempt_url(&self, attempt_id: u64, suffix: &str) -> String {
        format!("{}/attempts/{attempt_id}/{suffix}", self.base_url)
    }
}

impl AttemptApi for HttpAttemptApi {
    fn fetch_data(&self, attempt_id: u64) -> Result<AttemptData, ApiError> {
        let url = self.attempt_url(attempt_id, "data");
        debug!(%url, "fetching attempt data");
        let response = self.http.get(url).send()?;
        parse_json(expect_success(response)?)
    }

    fn save_answer(
        &self,
        attempt_id: u64,
        variant_task_id: u64,
        answer_text: &str,
    ) -> Result<(), ApiError> {
        let url = self.attempt_url(attempt_id, "save-answer");
        debug!(%url, variant_task_id, "saving answer");
        let response = self
            .http
            .post(url)
            .json(&SaveAnswerRequest {
                variant_task_id,
                answer_text,
            })
            .send()?;
        expect_ack(expect_success(response)?)
    }

    fn finish(&self, attempt_id: u64) -> Result<(), ApiError> {
        let url = self.attempt_url(attempt_id, "finish");
        debug!(%url, "finishing attempt");
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()?;
        expect_ack(expect_success(response)?)
    }

    fn fetch_results(&self, attempt_id: u64) -> Result<AttemptResults, ApiError> {
        let url = self.attempt_url(attempt_id, "results");
        debug!(%url, "fetching attempt results");
        let response = self.http.get(url).send()?;
        parse_json(expect_success(response)?)
    }

    fn results_page_url(&self, attempt_id: u64) -> String {
        self.attempt_url(attempt_id, "results-page")
    }
}

pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn expect_success(response: Response) -> Result<String, ApiError> {
    let status = response.status();
    let body = response.text()?;
    if status.is_success() {
        return Ok(body);
    }
    Err(ApiError::Status {
        status: status.as_u16(),
        message: server_error_message(status, &body),
    })
}

fn expect_ack(body: String) -> Result<(), ApiError> {
    if body.trim().is_empty() {
        return Ok(());
    }
    // Some endpoints answer with a bare 2xx and no JSON; only an explicit `ok: false` fails.
    let Ok(ack) = serde_json::from_str::<AckPayload>(&body) else {
        return Ok(());
    };
    if ack.ok == Some(false) {
        return Err(ApiError::Rejected(
            ack.error.unwrap_or_else(|| "request was not accepted".to_string()),
        ));
    }
    Ok(())
}

fn parse_json<T: DeserializeOwned>(body: String) -> Result<T, ApiError> {
    serde_json::from_str(&body).map_err(|err| ApiError::Malformed(err.to_string()))
}

fn server_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<AckPayload>(body)
        .ok()
        .and_then(|ack| ack.error)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        })
}

#[cfg(test)]
#[path = "../tests/unit/fake_api.rs"]
pub mod fake;

#[cfg(test)]
#[path = "../tests/unit/api_tests.rs"]
mod tests;
