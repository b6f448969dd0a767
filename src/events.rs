use std::io;
use std::time::Duration;

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Tick,
    Quit,
    NextField,
    PrevField,
    NextSlide,
    PrevSlide,
    ShowInfo,
    MoveUp,
    MoveDown,
    CursorLeft,
    CursorRight,
    InputChar(char),
    Backspace,
    Submit,
    RequestFinish,
    MouseLeftClick(u16, u16),
}

fn map_key_event(key_event: KeyEvent) -> AppEvent {
    if key_event.kind != KeyEventKind::Press {
        return AppEvent::Tick;
    }

    if key_event.modifiers.contains(KeyModifiers::CONTROL) {
        return match key_event.code {
            KeyCode::Char('c') => AppEvent::Quit,
            KeyCode::Char('f') => AppEvent::RequestFinish,
            _ => AppEvent::Tick,
        };
    }

    match key_event.code {
        KeyCode::Tab => AppEvent::NextField,
        KeyCode::BackTab => AppEvent::PrevField,
        KeyCode::PageDown => AppEvent::NextSlide,
        KeyCode::PageUp => AppEvent::PrevSlide,
        KeyCode::Esc => AppEvent::ShowInfo,
        KeyCode::Up => AppEvent::MoveUp,
        KeyCode::Down => AppEvent::MoveDown,
        KeyCode::Left => AppEvent::CursorLeft,
        KeyCode::Right => AppEvent::CursorRight,
        KeyCode::Backspace => AppEvent::Backspace,
        KeyCode::Enter => AppEvent::Submit,
        KeyCode::Char(c) => AppEvent::InputChar(c),
        _ => AppEvent::Tick,
    }
}

pub fn next_event() -> io::Result<AppEvent> {
    if event::poll(Duration::from_millis(16))? {
        match event::read()? {
            Event::Key(key_event) => return Ok(map_key_event(key_event)),
            Event::Mouse(mouse_event)
                if mouse_event.kind == MouseEventKind::Down(MouseButton::Left) =>
            {
                return Ok(AppEvent::MouseLeftClick(
                    mouse_event.column,
                    mouse_event.row,
                ));
            }
            _ => {}
        }
    }

    Ok(AppEvent::Tick)
}
