use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{self, AnswerShape};

const NAIVE_TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S",
];

/// Payload of `GET /attempts/{id}/data`.
#[derive(Debug, Clone, Deserialize)]
pub struct AttemptData {
    #[serde(default)]
    pub attempt: Option<AttemptRecord>,
    pub tasks: Vec<TaskPayload>,
    #[serde(default)]
    pub stats: Option<AttemptStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttemptRecord {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub variant_id: Option<u64>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AttemptStats {
    #[serde(default)]
    pub answered: usize,
    #[serde(default)]
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskPayload {
    pub variant_task_id: u64,
    pub number: u32,
    #[serde(default)]
    pub answer_type: Option<String>,
    #[serde(default)]
    pub statement_html: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub current_answer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl Attachment {
    pub fn link(&self) -> &str {
        self.download_url
            .as_deref()
            .or(self.url.as_deref())
            .unwrap_or("")
    }
}

/// A task as loaded for this attempt. The client only ever changes its answer,
/// which lives in [`AnswerBook`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub variant_task_id: u64,
    pub number: u32,
    pub shape: AnswerShape,
    pub statement_html: String,
    pub attachments: Vec<Attachment>,
}

impl Task {
    pub fn from_payload(payload: &TaskPayload) -> Self {
        Self {
            variant_task_id: payload.variant_task_id,
            number: payload.number,
            shape: AnswerShape::resolve(payload.answer_type.as_deref(), payload.number),
            statement_html: payload.statement_html.clone(),
            attachments: payload.attachments.clone(),
        }
    }
}

/// Transport strings of saved answers keyed by `variant_task_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerBook {
    entries: HashMap<u64, String>,
}

impl AnswerBook {
    pub fn get(&self, task_id: u64) -> Option<&str> {
        self.entries.get(&task_id).map(String::as_str)
    }

    pub fn set(&mut self, task_id: u64, answer_text: String) {
        self.entries.insert(task_id, answer_text);
    }

    pub fn is_answered(&self, task: &Task) -> bool {
        self.get(task.variant_task_id)
            .is_some_and(|raw| codec::is_answered(task.shape, raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptMetadata {
    pub attempt_id: u64,
    pub variant_id: Option<u64>,
    pub duration_secs: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AttemptMetadata {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Payload of `GET /attempts/{id}/results`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttemptResults {
    pub attempt_id: u64,
    #[serde(default)]
    pub variant_id: Option<u64>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub results: Vec<TaskResult>,
    #[serde(default)]
    pub total_tasks: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskResult {
    pub task_number: u32,
    #[serde(default)]
    pub user_answer: Option<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct AckPayload {
    #[serde(default)]
    pub ok: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Parses server timestamps. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|naive| naive.and_utc())
}
