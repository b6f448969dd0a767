use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, info, warn};

use crate::api::{ApiError, AttemptApi};
use crate::config::SaveOverlapPolicy;
use crate::model::AttemptResults;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveFailure {
    Http(String),
    Network(String),
}

impl From<&ApiError> for SaveFailure {
    fn from(err: &ApiError) -> Self {
        if err.is_network() {
            Self::Network(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Saved { task_id: u64, answer_text: String },
    SaveFailed { task_id: u64, reason: SaveFailure },
    Finished,
    FinishFailed(String),
    ResultsLoaded(AttemptResults),
    ResultsFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveDispatch {
    Sent,
    /// Held as the task's newest pending value; sent after the outstanding save.
    Queued,
    /// Another save was outstanding; nothing was sent.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingSave {
    task_id: u64,
    answer_text: String,
}

#[derive(Debug, Default)]
struct SaveSlot {
    in_flight: bool,
    /// One entry per task, in the order tasks were first queued.
    pending: Vec<PendingSave>,
}

impl SaveSlot {
    fn queue(&mut self, task_id: u64, answer_text: String) {
        match self.pending.iter_mut().find(|save| save.task_id == task_id) {
            Some(save) => save.answer_text = answer_text,
            None => self.pending.push(PendingSave {
                task_id,
                answer_text,
            }),
        }
    }

    /// Next queued save, or clears `in_flight` when nothing is left.
    fn next_pending(&mut self) -> Option<PendingSave> {
        if self.pending.is_empty() {
            self.in_flight = false;
            return None;
        }
        Some(self.pending.remove(0))
    }
}

/// Runs attempt requests off the UI thread and reports outcomes as
/// [`GatewayEvent`]s. At most one save is outstanding at a time.
pub struct AttemptGateway {
    api: Arc<dyn AttemptApi>,
    attempt_id: u64,
    overlap: SaveOverlapPolicy,
    save_slot: Arc<Mutex<SaveSlot>>,
    event_tx: Sender<GatewayEvent>,
    event_rx: Receiver<GatewayEvent>,
}

impl AttemptGateway {
    pub fn new(api: Arc<dyn AttemptApi>, attempt_id: u64, overlap: SaveOverlapPolicy) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        Self {
            api,
            attempt_id,
            overlap,
            save_slot: Arc::new(Mutex::new(SaveSlot::default())),
            event_tx,
            event_rx,
        }
    }

    pub fn results_page_url(&self) -> String {
        self.api.results_page_url(self.attempt_id)
    }

    pub fn is_saving(&self) -> bool {
        self.save_slot
            .lock()
            .map(|slot| slot.in_flight)
            .unwrap_or(false)
    }

    pub fn save(&self, task_id: u64, answer_text: String) -> SaveDispatch {
        let Ok(mut slot) = self.save_slot.lock() else {
            return SaveDispatch::Dropped;
        };
        if slot.in_flight {
            return match self.overlap {
                SaveOverlapPolicy::Drop => {
                    warn!(task_id, "save already in flight; dropping edit");
                    SaveDispatch::Dropped
                }
                SaveOverlapPolicy::Coalesce => {
                    debug!(task_id, "save already in flight; queueing newest value");
                    slot.queue(task_id, answer_text);
                    SaveDispatch::Queued
                }
            };
        }
        slot.in_flight = true;
        drop(slot);

        let api = self.api.clone();
        let attempt_id = self.attempt_id;
        let save_slot = self.save_slot.clone();
        let tx = self.event_tx.clone();
        thread::spawn(move || {
            let mut next = Some(PendingSave {
                task_id,
                answer_text,
            });
            while let Some(save) = next.take() {
                let result = api.save_answer(attempt_id, save.task_id, &save.answer_text);
                next = match save_slot.lock() {
                    Ok(mut slot) => slot.next_pending(),
                    Err(_) => None,
                };
                let event = match result {
                    Ok(()) => GatewayEvent::Saved {
                        task_id: save.task_id,
                        answer_text: save.answer_text,
                    },
                    Err(err) => {
                        warn!(task_id = save.task_id, error = %err, "answer save failed");
                        GatewayEvent::SaveFailed {
                            task_id: save.task_id,
                            reason: SaveFailure::from(&err),
                        }
                    }
                };
                let _ = tx.send(event);
            }
        });
        SaveDispatch::Sent
    }

    /// Sends the finish request. Callers guard against repeated calls.
    pub fn finish(&self) {
        let api = self.api.clone();
        let attempt_id = self.attempt_id;
        let tx = self.event_tx.clone();
        thread::spawn(move || {
            let event = match api.finish(attempt_id) {
                Ok(()) => {
                    info!(attempt_id, "attempt finished");
                    GatewayEvent::Finished
                }
                Err(err) => {
                    warn!(attempt_id, error = %err, "finish request failed");
                    GatewayEvent::FinishFailed(err.to_string())
                }
            };
            let _ = tx.send(event);
        });
    }

    pub fn load_results(&self) {
        let api = self.api.clone();
        let attempt_id = self.attempt_id;
        let tx = self.event_tx.clone();
        thread::spawn(move || {
            let event = match api.fetch_results(attempt_id) {
                Ok(results) => GatewayEvent::ResultsLoaded(results),
                Err(err) => GatewayEvent::ResultsFailed(err.to_string()),
            };
            let _ = tx.send(event);
        });
    }

    #[cfg(test)]
    pub fn drain_events(&self) -> Vec<GatewayEvent> {
        self.drain_events_limited(usize::MAX)
    }

    pub fn drain_events_limited(&self, max_events: usize) -> Vec<GatewayEvent> {
        let mut events = Vec::new();
        while events.len() < max_events {
            let Ok(event) = self.event_rx.try_recv() else {
                break;
            };
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
#[path = "../tests/unit/gateway_tests.rs"]
mod tests;
