use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AttemptApi};
use crate::codec::{self, AnswerValue};
use crate::gateway::{AttemptGateway, GatewayEvent, SaveDispatch, SaveFailure};
use crate::model::{AnswerBook, AttemptData, AttemptMetadata, AttemptResults, Task, parse_timestamp};
use crate::navigation::{self, Navigation, Progress, SelectorFacet};
use crate::render::{self, InfoSlideView, TaskSlideView};
use crate::timer::{CountdownTimer, TimerTick};

const SAVED_INDICATOR_TTL: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum LoadFailure {
    #[error("failed to load attempt: {0}")]
    Api(#[from] ApiError),
    #[error("attempt has no start time")]
    MissingStartTime,
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("attempt has no tasks")]
    EmptyTaskList,
}

/// Launch-time values. Timestamps stay raw until they are merged with the
/// `attempt` block of the data payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchMetadata {
    pub attempt_id: u64,
    pub variant_id: Option<u64>,
    pub duration_secs: u64,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishTrigger {
    Manual,
    TimerExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Finishing { trigger: FinishTrigger },
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveIndicator {
    Saving,
    Saved { at: Instant },
    Error(String),
    NetworkError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResultsState {
    #[default]
    NotRequested,
    Loading,
    Loaded(AttemptResults),
    Failed(String),
}

/// All mutable state of one attempt. Owned by the UI thread; worker threads
/// only report back through [`GatewayEvent`]s.
#[derive(Debug)]
pub struct Session {
    metadata: AttemptMetadata,
    tasks: Vec<Task>,
    slides: Vec<TaskSlideView>,
    answers: AnswerBook,
    drafts: HashMap<u64, Vec<String>>,
    indicators: HashMap<u64, SaveIndicator>,
    navigation: Navigation,
    timer: Option<CountdownTimer>,
    phase: Phase,
    /// Finish is held back until the outstanding save reports.
    finish_deferred: bool,
    results: ResultsState,
}

impl Session {
    pub fn initialize(launch: LaunchMetadata, api: &dyn AttemptApi) -> Result<Self, LoadFailure> {
        info!(attempt_id = launch.attempt_id, "loading attempt");
        let data = api.fetch_data(launch.attempt_id)?;
        Self::from_data(launch, data)
    }

    pub fn from_data(launch: LaunchMetadata, data: AttemptData) -> Result<Self, LoadFailure> {
        if data.tasks.is_empty() {
            return Err(LoadFailure::EmptyTaskList);
        }
        let metadata = merge_metadata(&launch, &data)?;

        let mut answers = AnswerBook::default();
        let mut tasks = Vec::with_capacity(data.tasks.len());
        let mut slides = Vec::with_capacity(data.tasks.len());
        let mut drafts = HashMap::new();
        for payload in &data.tasks {
            let task = Task::from_payload(payload);
            if let Some(raw) = &payload.current_answer {
                answers.set(task.variant_task_id, raw.clone());
            }
            let slide = render::render_task(&task, payload.current_answer.as_deref());
            drafts.insert(task.variant_task_id, slide.answer.field_values());
            slides.push(slide);
            tasks.push(task);
        }

        let (timer, phase) = if metadata.is_finished() {
            (None, Phase::Finished)
        } else {
            (
                Some(CountdownTimer::start(
                    metadata.started_at,
                    metadata.duration_secs,
                )),
                Phase::Active,
            )
        };

        let session = Self {
            metadata,
            navigation: Navigation::new(tasks.len()),
            tasks,
            slides,
            answers,
            drafts,
            indicators: HashMap::new(),
            timer,
            phase,
            finish_deferred: false,
            results: ResultsState::NotRequested,
        };
        let progress = session.progress();
        if let Some(stats) = data.stats
            && (stats.answered != progress.answered || stats.total != progress.total)
        {
            debug!(
                server_answered = stats.answered,
                server_total = stats.total,
                "server stats differ from decoded answers"
            );
        }
        info!(
            attempt_id = session.metadata.attempt_id,
            tasks = progress.total,
            answered = progress.answered,
            finished = session.metadata.is_finished(),
            ends_at = ?session.timer.as_ref().map(CountdownTimer::end_at),
            "attempt loaded"
        );
        Ok(session)
    }

    pub fn metadata(&self) -> &AttemptMetadata {
        &self.metadata
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn slide(&self, index: usize) -> Option<&TaskSlideView> {
        self.slides.get(index)
    }

    #[cfg(test)]
    pub fn answers(&self) -> &AnswerBook {
        &self.answers
    }

    pub fn navigation(&self) -> &Navigation {
        &self.navigation
    }

    pub fn navigation_mut(&mut self) -> &mut Navigation {
        &mut self.navigation
    }

    pub fn timer(&self) -> Option<&CountdownTimer> {
        self.timer.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn results(&self) -> &ResultsState {
        &self.results
    }

    pub fn is_editable(&self) -> bool {
        self.phase == Phase::Active
    }

    pub fn progress(&self) -> Progress {
        navigation::progress(&self.tasks, &self.answers)
    }

    pub fn selectors(&self) -> Vec<SelectorFacet> {
        self.navigation.selectors(&self.tasks, &self.answers)
    }

    pub fn info_view(&self) -> InfoSlideView {
        render::render_info(&self.metadata, self.progress())
    }

    pub fn indicator(&self, task_id: u64) -> Option<&SaveIndicator> {
        self.indicators.get(&task_id)
    }

    pub fn drafts(&self, task_id: u64) -> &[String] {
        self.drafts.get(&task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Field values of a task for editing. `None` once the attempt is no
    /// longer active.
    pub fn drafts_mut(&mut self, task_id: u64) -> Option<&mut Vec<String>> {
        if !self.is_editable() {
            return None;
        }
        self.drafts.get_mut(&task_id)
    }

    fn task(&self, task_id: u64) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|task| task.variant_task_id == task_id)
    }

    pub fn encode_drafts(&self, task_id: u64) -> Option<String> {
        let task = self.task(task_id)?;
        let value = AnswerValue::from_fields(task.shape, self.drafts(task_id));
        Some(codec::encode(task.shape, &value))
    }

    /// True when the drafts decode differently from the stored answer.
    pub fn has_unsaved_changes(&self, task_id: u64) -> bool {
        let Some(task) = self.task(task_id) else {
            return false;
        };
        let stored = codec::decode(task.shape, self.answers.get(task_id).unwrap_or(""));
        let drafted = AnswerValue::from_fields(task.shape, self.drafts(task_id));
        let drafted = codec::decode(task.shape, &codec::encode(task.shape, &drafted));
        stored != drafted
    }

    /// Autosave on blur. Returns `None` when nothing was dispatched: the
    /// attempt is not active or the answer is unchanged.
    pub fn save(&mut self, task_id: u64, gateway: &AttemptGateway) -> Option<SaveDispatch> {
        if !self.is_editable() || !self.has_unsaved_changes(task_id) {
            return None;
        }
        let answer_text = self.encode_drafts(task_id)?;
        let dispatch = gateway.save(task_id, answer_text);
        match dispatch {
            SaveDispatch::Sent | SaveDispatch::Queued => {
                self.indicators.insert(task_id, SaveIndicator::Saving);
            }
            SaveDispatch::Dropped => {}
        }
        debug!(task_id, ?dispatch, "autosave dispatched");
        Some(dispatch)
    }

    pub fn commit_save(&mut self, task_id: u64, answer_text: String, now: Instant) {
        self.answers.set(task_id, answer_text);
        self.indicators
            .insert(task_id, SaveIndicator::Saved { at: now });
    }

    /// Records the failure. The stored answer keeps its last committed value.
    pub fn save_failed(&mut self, task_id: u64, reason: SaveFailure) {
        let indicator = match reason {
            SaveFailure::Http(message) => SaveIndicator::Error(message),
            SaveFailure::Network(message) => SaveIndicator::NetworkError(message),
        };
        self.indicators.insert(task_id, indicator);
    }

    pub fn clear_stale_indicators(&mut self, now: Instant) {
        self.indicators.retain(|_, indicator| match indicator {
            SaveIndicator::Saved { at } => now.duration_since(*at) < SAVED_INDICATOR_TTL,
            _ => true,
        });
    }

    /// Advances the countdown. Returns true exactly once, on the tick that
    /// reaches the deadline.
    pub fn tick_timer(&mut self, now: DateTime<Utc>) -> bool {
        let Some(timer) = self.timer.as_mut() else {
            return false;
        };
        if !timer.should_tick(now) {
            return false;
        }
        matches!(timer.tick(now), TimerTick::Expired { fire_finish: true })
    }

    /// Enters `Finishing` and cancels the timer. Only the first call while
    /// active succeeds.
    pub fn begin_finish(&mut self, trigger: FinishTrigger) -> bool {
        if self.phase != Phase::Active {
            debug!(?trigger, phase = ?self.phase, "finish ignored");
            return false;
        }
        if let Some(timer) = self.timer.as_mut() {
            timer.cancel();
        }
        self.phase = Phase::Finishing { trigger };
        info!(attempt_id = self.metadata.attempt_id, ?trigger, "finishing attempt");
        true
    }

    /// Starts finishing. The request goes out once no answer save is in
    /// flight, so a save dispatched on the way here lands first.
    pub fn finish(&mut self, trigger: FinishTrigger, gateway: &AttemptGateway) -> bool {
        if !self.begin_finish(trigger) {
            return false;
        }
        if gateway.is_saving() {
            debug!("waiting for the outstanding save before finishing");
            self.finish_deferred = true;
        } else {
            gateway.finish();
        }
        true
    }

    fn send_deferred_finish(&mut self, gateway: &AttemptGateway) {
        if self.finish_deferred
            && matches!(self.phase, Phase::Finishing { .. })
            && !gateway.is_saving()
        {
            self.finish_deferred = false;
            gateway.finish();
        }
    }

    pub fn on_finish_failed(&mut self) {
        let Phase::Finishing { trigger } = self.phase else {
            return;
        };
        self.phase = Phase::Active;
        if trigger == FinishTrigger::Manual
            && let Some(timer) = self.timer.as_mut()
        {
            timer.rearm();
        }
        warn!(attempt_id = self.metadata.attempt_id, ?trigger, "finish failed; attempt is active again");
    }

    pub fn on_finished(&mut self, now: DateTime<Utc>) {
        self.phase = Phase::Finished;
        if let Some(timer) = self.timer.as_mut() {
            timer.cancel();
        }
        if self.metadata.finished_at.is_none() {
            self.metadata.finished_at = Some(now);
        }
        self.navigation.show_info();
    }

    pub fn request_results(&mut self, gateway: &AttemptGateway) {
        if matches!(self.results, ResultsState::Loading | ResultsState::Loaded(_)) {
            return;
        }
        self.results = ResultsState::Loading;
        gateway.load_results();
    }

    /// Applies one worker outcome. Returns a message for a blocking alert when
    /// the user has to act on it.
    pub fn apply_event(&mut self, event: GatewayEvent, gateway: &AttemptGateway) -> Option<String> {
        match event {
            GatewayEvent::Saved {
                task_id,
                answer_text,
            } => {
                self.commit_save(task_id, answer_text, Instant::now());
                self.send_deferred_finish(gateway);
                None
            }
            GatewayEvent::SaveFailed { task_id, reason } => {
                self.save_failed(task_id, reason);
                self.send_deferred_finish(gateway);
                None
            }
            GatewayEvent::Finished => {
                self.on_finished(Utc::now());
                self.request_results(gateway);
                None
            }
            GatewayEvent::FinishFailed(message) => {
                self.on_finish_failed();
                Some(format!("Could not finish the attempt: {message}"))
            }
            GatewayEvent::ResultsLoaded(results) => {
                self.results = ResultsState::Loaded(results);
                None
            }
            GatewayEvent::ResultsFailed(message) => {
                warn!(error = %message, "results request failed");
                self.results = ResultsState::Failed(message);
                None
            }
        }
    }
}

fn merge_metadata(launch: &LaunchMetadata, data: &AttemptData) -> Result<AttemptMetadata, LoadFailure> {
    let record = data.attempt.clone().unwrap_or_default();
    if let Some(id) = record.id
        && id != launch.attempt_id
    {
        warn!(requested = launch.attempt_id, served = id, "server returned a different attempt id");
    }
    let started_raw = launch
        .started_at
        .as_deref()
        .or(record.started_at.as_deref())
        .filter(|raw| !raw.trim().is_empty())
        .ok_or(LoadFailure::MissingStartTime)?;
    let started_at = timestamp(started_raw)?;
    let finished_at = launch
        .finished_at
        .as_deref()
        .or(record.finished_at.as_deref())
        .filter(|raw| !raw.trim().is_empty())
        .map(timestamp)
        .transpose()?;
    Ok(AttemptMetadata {
        attempt_id: launch.attempt_id,
        variant_id: launch.variant_id.or(record.variant_id),
        duration_secs: launch.duration_secs,
        started_at,
        finished_at,
    })
}

fn timestamp(raw: &str) -> Result<DateTime<Utc>, LoadFailure> {
    parse_timestamp(raw).ok_or_else(|| LoadFailure::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
#[path = "../tests/unit/session_tests.rs"]
mod tests;
