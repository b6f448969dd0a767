use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::events::AppEvent;
use crate::gateway::{AttemptGateway, GatewayEvent, SaveDispatch};
use crate::navigation::Cursor;
use crate::render::TaskSlideView;
use crate::session::{FinishTrigger, Phase, Session};

const DROPPED_SAVE_NOTICE: &str = "Another save is still running; leave the field again to save this edit.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Sidebar,
    Field(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    ConfirmFinish,
    /// Leaving mid-attempt; the timer keeps running on the server.
    ConfirmQuit,
    Alert(String),
}

/// UI state around a [`Session`]. Entry 0 of the sidebar is the info slide,
/// entry `n` is task `n - 1`.
#[derive(Debug)]
pub struct App {
    pub running: bool,
    pub ticks: u64,
    session: Session,
    focus: Focus,
    sidebar_selected: usize,
    edit_cursor: usize,
    overlay: Option<Overlay>,
    notice: Option<String>,
    results_scroll: u16,
    results_page_url: String,
}

impl App {
    pub fn new(session: Session, results_page_url: String) -> Self {
        Self {
            running: true,
            ticks: 0,
            session,
            focus: Focus::Sidebar,
            sidebar_selected: 0,
            edit_cursor: 0,
            overlay: None,
            notice: None,
            results_scroll: 0,
            results_page_url,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn sidebar_selected(&self) -> usize {
        self.sidebar_selected
    }

    pub fn sidebar_len(&self) -> usize {
        self.session.tasks().len() + 1
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn edit_cursor(&self) -> usize {
        self.edit_cursor
    }

    pub fn results_scroll(&self) -> u16 {
        self.results_scroll
    }

    pub fn results_page_url(&self) -> &str {
        &self.results_page_url
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    pub fn active_slide(&self) -> Option<&TaskSlideView> {
        self.session
            .navigation()
            .active_task()
            .and_then(|index| self.session.slide(index))
    }

    fn active_task_id(&self) -> Option<u64> {
        self.active_slide().map(|slide| slide.task_id)
    }

    fn active_field_count(&self) -> usize {
        self.session
            .navigation()
            .active_task()
            .and_then(|index| self.session.tasks().get(index))
            .map_or(0, |task| task.shape.field_count())
    }

    /// Current text of the focused field, if a field has focus.
    pub fn focused_value(&self) -> Option<&str> {
        let Focus::Field(field) = self.focus else {
            return None;
        };
        let task_id = self.active_task_id()?;
        self.session
            .drafts(task_id)
            .get(field)
            .map(String::as_str)
    }

    pub fn handle_event(&mut self, event: AppEvent, gateway: &AttemptGateway) {
        if event == AppEvent::Tick {
            return;
        }
        self.notice = None;
        if event == AppEvent::Quit {
            self.request_quit(gateway);
            return;
        }

        match self.overlay.take() {
            Some(Overlay::Alert(message)) => {
                if !matches!(event, AppEvent::Submit | AppEvent::ShowInfo) {
                    self.overlay = Some(Overlay::Alert(message));
                }
                return;
            }
            Some(Overlay::ConfirmQuit) => {
                match event {
                    AppEvent::Submit | AppEvent::InputChar('y' | 'Y') => {
                        self.leave_field(gateway);
                        self.quit();
                    }
                    AppEvent::ShowInfo | AppEvent::InputChar('n' | 'N') => {}
                    _ => self.overlay = Some(Overlay::ConfirmQuit),
                }
                return;
            }
            Some(Overlay::ConfirmFinish) => {
                match event {
                    AppEvent::Submit | AppEvent::InputChar('y' | 'Y') => self.confirm_finish(gateway),
                    AppEvent::ShowInfo | AppEvent::InputChar('n' | 'N') => {}
                    _ => self.overlay = Some(Overlay::ConfirmFinish),
                }
                return;
            }
            None => {}
        }

        if self.session.phase() == Phase::Finished {
            match event {
                AppEvent::MoveUp => self.results_scroll = self.results_scroll.saturating_sub(1),
                AppEvent::MoveDown => self.results_scroll = self.results_scroll.saturating_add(1),
                _ => {}
            }
            return;
        }

        match event {
            AppEvent::Tick | AppEvent::Quit | AppEvent::MouseLeftClick(_, _) => {}
            AppEvent::NextField => self.cycle_focus(gateway, true),
            AppEvent::PrevField => self.cycle_focus(gateway, false),
            AppEvent::NextSlide => {
                self.leave_field(gateway);
                self.session.navigation_mut().next();
                self.after_slide_change();
            }
            AppEvent::PrevSlide => {
                self.leave_field(gateway);
                self.session.navigation_mut().prev();
                self.after_slide_change();
            }
            AppEvent::ShowInfo => {
                self.leave_field(gateway);
                self.session.navigation_mut().show_info();
                self.after_slide_change();
            }
            AppEvent::MoveUp => match self.focus {
                Focus::Sidebar => self.sidebar_selected = self.sidebar_selected.saturating_sub(1),
                Focus::Field(_) => self.move_field_vertical(gateway, false),
            },
            AppEvent::MoveDown => match self.focus {
                Focus::Sidebar => {
                    self.sidebar_selected = (self.sidebar_selected + 1).min(self.sidebar_len() - 1);
                }
                Focus::Field(_) => self.move_field_vertical(gateway, true),
            },
            AppEvent::CursorLeft => self.edit_cursor = self.edit_cursor.saturating_sub(1),
            AppEvent::CursorRight => {
                let len = self.focused_value().map_or(0, |value| value.chars().count());
                self.edit_cursor = (self.edit_cursor + 1).min(len);
            }
            AppEvent::InputChar(c) => self.insert_char(c),
            AppEvent::Backspace => self.backspace(),
            AppEvent::Submit => match self.focus {
                Focus::Sidebar => self.open_entry(self.sidebar_selected, gateway),
                Focus::Field(_) => self.advance_field(gateway),
            },
            AppEvent::RequestFinish => {
                if self.session.phase() == Phase::Active {
                    self.overlay = Some(Overlay::ConfirmFinish);
                }
            }
        }
    }

    /// Opens a sidebar entry (0 is the info slide). Leaving the current
    /// field counts as blur.
    pub fn open_entry(&mut self, entry: usize, gateway: &AttemptGateway) {
        if self.session.phase() == Phase::Finished || self.overlay.is_some() {
            return;
        }
        self.leave_field(gateway);
        if entry == 0 {
            self.session.navigation_mut().show_info();
        } else if !self.session.navigation_mut().show_task(entry - 1) {
            return;
        }
        self.after_slide_change();
    }

    /// Per-loop housekeeping: indicator expiry and the countdown.
    pub fn on_clock(&mut self, now: DateTime<Utc>, instant: Instant, gateway: &AttemptGateway) {
        self.ticks = self.ticks.saturating_add(1);
        self.session.clear_stale_indicators(instant);
        if self.session.tick_timer(now) {
            info!("time is up; submitting attempt");
            self.leave_field(gateway);
            if self.overlay == Some(Overlay::ConfirmFinish) {
                self.overlay = None;
            }
            self.session.finish(FinishTrigger::TimerExpired, gateway);
        }
    }

    pub fn on_gateway_event(&mut self, event: GatewayEvent, gateway: &AttemptGateway) {
        if let Some(message) = self.session.apply_event(event, gateway) {
            self.overlay = Some(Overlay::Alert(message));
        }
        if self.session.phase() == Phase::Finished {
            self.focus = Focus::Sidebar;
            if self.overlay == Some(Overlay::ConfirmFinish) {
                self.overlay = None;
            }
        }
    }

    /// Ctrl+C. Quits at once when the attempt is over or when asked twice;
    /// otherwise asks first.
    fn request_quit(&mut self, gateway: &AttemptGateway) {
        if self.session.phase() == Phase::Finished || self.overlay == Some(Overlay::ConfirmQuit) {
            self.leave_field(gateway);
            self.quit();
            return;
        }
        self.overlay = Some(Overlay::ConfirmQuit);
    }

    fn confirm_finish(&mut self, gateway: &AttemptGateway) {
        self.leave_field(gateway);
        self.session.finish(FinishTrigger::Manual, gateway);
    }

    /// Blur: saves the active task when its drafts changed.
    fn leave_field(&mut self, gateway: &AttemptGateway) {
        let Focus::Field(_) = self.focus else {
            return;
        };
        let Some(task_id) = self.active_task_id() else {
            return;
        };
        if self.session.save(task_id, gateway) == Some(SaveDispatch::Dropped) {
            self.notice = Some(DROPPED_SAVE_NOTICE.to_string());
        }
    }

    fn after_slide_change(&mut self) {
        let cursor = self.session.navigation().cursor();
        self.sidebar_selected = match cursor {
            Cursor::Info => 0,
            Cursor::Task(index) => index + 1,
        };
        self.focus = if self.session.is_editable() && self.active_field_count() > 0 {
            Focus::Field(0)
        } else {
            Focus::Sidebar
        };
        self.move_cursor_to_end();
    }

    fn cycle_focus(&mut self, gateway: &AttemptGateway, forward: bool) {
        let count = self.active_field_count();
        if count == 0 {
            self.focus = Focus::Sidebar;
            return;
        }
        self.leave_field(gateway);
        self.focus = match (self.focus, forward) {
            (Focus::Sidebar, true) => Focus::Field(0),
            (Focus::Field(field), true) if field + 1 < count => Focus::Field(field + 1),
            (Focus::Field(_), true) => Focus::Sidebar,
            (Focus::Sidebar, false) => Focus::Field(count - 1),
            (Focus::Field(0), false) => Focus::Sidebar,
            (Focus::Field(field), false) => Focus::Field(field - 1),
        };
        self.move_cursor_to_end();
    }

    fn advance_field(&mut self, gateway: &AttemptGateway) {
        let Focus::Field(field) = self.focus else {
            return;
        };
        self.leave_field(gateway);
        if field + 1 < self.active_field_count() {
            self.focus = Focus::Field(field + 1);
        }
        self.move_cursor_to_end();
    }

    fn move_field_vertical(&mut self, gateway: &AttemptGateway, down: bool) {
        let Focus::Field(field) = self.focus else {
            return;
        };
        let Some(cols) = self.active_slide().map(|slide| slide.answer.cols.max(1)) else {
            return;
        };
        let target = if down {
            field + cols
        } else if field >= cols {
            field - cols
        } else {
            return;
        };
        if target >= self.active_field_count() {
            return;
        }
        self.leave_field(gateway);
        self.focus = Focus::Field(target);
        self.move_cursor_to_end();
    }

    fn move_cursor_to_end(&mut self) {
        self.edit_cursor = self
            .focused_value()
            .map_or(0, |value| value.chars().count());
    }

    fn focused_draft_mut(&mut self) -> Option<&mut String> {
        let Focus::Field(field) = self.focus else {
            return None;
        };
        let task_id = self.active_task_id()?;
        self.session.drafts_mut(task_id)?.get_mut(field)
    }

    fn insert_char(&mut self, c: char) {
        if c.is_control() {
            return;
        }
        let cursor = self.edit_cursor;
        let Some(value) = self.focused_draft_mut() else {
            return;
        };
        let at = byte_offset(value, cursor);
        value.insert(at, c);
        self.edit_cursor = cursor + 1;
    }

    fn backspace(&mut self) {
        let cursor = self.edit_cursor;
        if cursor == 0 {
            return;
        }
        let Some(value) = self.focused_draft_mut() else {
            return;
        };
        let at = byte_offset(value, cursor - 1);
        if at >= value.len() {
            return;
        }
        value.remove(at);
        self.edit_cursor = cursor - 1;
    }
}

fn byte_offset(value: &str, char_index: usize) -> usize {
    value
        .char_indices()
        .nth(char_index)
        .map_or(value.len(), |(offset, _)| offset)
}

#[cfg(test)]
#[path = "../tests/unit/app_tests.rs"]
mod tests;
