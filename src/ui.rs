use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Clear, Padding, Paragraph, Wrap};

use crate::app::{App, Focus, Overlay};
use crate::codec::AnswerShape;
use crate::navigation::Cursor;
use crate::render::TaskSlideView;
use crate::session::{Phase, ResultsState, SaveIndicator};
use crate::theme::Theme;
use crate::timer::TimerLevel;

const STATUS_HEIGHT: u16 = 3;
const TITLE_BAR_HEIGHT: u16 = 3;
const TEXT_PADDING: u16 = 1;
const SIDEBAR_WIDTH: u16 = 24;
const SIDEBAR_HEADER_LINES: u16 = 2;
const ROW_LABEL_WIDTH: usize = 9;
const FIELD_WIDTH: usize = 16;
const FIELD_STRIDE: usize = FIELD_WIDTH + 3;
const SELECTED_BG: Color = Color::Rgb(90, 145, 200);
const SELECTED_FG: Color = Color::Black;
const ACTIVE_HELP_TEXT: &str =
    "Tab/Shift+Tab field | PgUp/PgDn slide | Esc info | Ctrl+F finish | Ctrl+C quit";
const FINISHED_HELP_TEXT: &str = "Up/Down scroll results | Ctrl+C quit";

struct ScreenAreas {
    sidebar_title: Rect,
    sidebar_content: Rect,
    main_title: Rect,
    main_content: Rect,
    status: Rect,
}

fn screen_areas(screen: Rect) -> ScreenAreas {
    let [body, status] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(STATUS_HEIGHT)]).areas(screen);
    let [sidebar, main] =
        Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(0)]).areas(body);
    let [sidebar_title, sidebar_content] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(sidebar);
    let [main_title, main_content] =
        Layout::vertical([Constraint::Length(TITLE_BAR_HEIGHT), Constraint::Min(0)]).areas(main);
    ScreenAreas {
        sidebar_title,
        sidebar_content,
        main_title,
        main_content,
        status,
    }
}

fn sidebar_visible_entries(content: Rect) -> usize {
    content
        .height
        .saturating_sub(TEXT_PADDING * 2 + SIDEBAR_HEADER_LINES) as usize
}

fn sidebar_offset(visible: usize, selected: usize) -> usize {
    if visible == 0 {
        return 0;
    }
    selected.saturating_sub(visible - 1)
}

/// Maps a click to a sidebar entry (0 is the info slide).
pub fn sidebar_entry_at(screen: Rect, app: &App, x: u16, y: u16) -> Option<usize> {
    let content = screen_areas(screen).sidebar_content;
    if !point_in_rect(content, x, y) {
        return None;
    }
    let first_row = content.y + TEXT_PADDING + SIDEBAR_HEADER_LINES;
    if y < first_row {
        return None;
    }
    let row = (y - first_row) as usize;
    let visible = sidebar_visible_entries(content);
    if row >= visible {
        return None;
    }
    let entry = sidebar_offset(visible, app.sidebar_selected()) + row;
    (entry < app.sidebar_len()).then_some(entry)
}

pub fn render(frame: &mut Frame, app: &App, theme: &Theme) {
    let areas = screen_areas(frame.area());

    render_sidebar(frame, &areas, app, theme);
    if app.session().phase() == Phase::Finished {
        render_results(frame, &areas, app, theme);
    } else if let Some(slide) = app.active_slide() {
        render_task_slide(frame, &areas, app, slide, theme);
    } else {
        render_info_slide(frame, &areas, app, theme);
    }
    render_status(frame, areas.status, app, theme);

    match app.overlay() {
        Some(Overlay::ConfirmFinish) => render_dialog(
            frame,
            "Finish attempt?",
            &[
                "Answers cannot be changed after finishing.".to_string(),
                String::new(),
                "[y] Finish    [n] Keep working".to_string(),
            ],
            theme.warning_fg,
            theme,
        ),
        Some(Overlay::ConfirmQuit) => render_dialog(
            frame,
            "Leave the exam?",
            &[
                "The attempt stays open and its time keeps running.".to_string(),
                String::new(),
                "[y] Leave    [n] Stay".to_string(),
            ],
            theme.warning_fg,
            theme,
        ),
        Some(Overlay::Alert(message)) => render_dialog(
            frame,
            "Error",
            &[message.clone(), String::new(), "Press Enter to close".to_string()],
            theme.error_fg,
            theme,
        ),
        None => {}
    }
}

fn render_title_bar(frame: &mut Frame, area: Rect, line: Line, bg: Color) {
    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(bg)).block(
            Block::default()
                .style(Style::default().bg(bg))
                .padding(Padding::uniform(TEXT_PADDING)),
        ),
        area,
    );
}

fn padded_block(bg: Color) -> Block<'static> {
    Block::default()
        .style(Style::default().bg(bg))
        .padding(Padding::uniform(TEXT_PADDING))
}

fn render_sidebar(frame: &mut Frame, areas: &ScreenAreas, app: &App, theme: &Theme) {
    let (timer_text, timer_fg) = timer_label(app, theme);
    render_title_bar(
        frame,
        areas.sidebar_title,
        Line::from(Span::styled(
            timer_text,
            Style::default().fg(timer_fg).add_modifier(Modifier::BOLD),
        )),
        title_bar_bg(theme.sidebar_bg),
    );

    let session = app.session();
    let progress = session.progress();
    let mut lines = vec![
        Line::from(Span::styled(
            format!("{}/{} answers", progress.answered, progress.total),
            Style::default().fg(theme.muted_fg),
        )),
        Line::default(),
    ];

    let visible = sidebar_visible_entries(areas.sidebar_content);
    let offset = sidebar_offset(visible, app.sidebar_selected());
    let sidebar_focused = app.focus() == Focus::Sidebar && app.overlay().is_none();
    let info_active = session.navigation().cursor() == Cursor::Info;
    let mut entries = vec![("Info".to_string(), info_active, false)];
    entries.extend(session.selectors().into_iter().map(|facet| {
        let mark = if facet.answered { " ✓" } else { "" };
        (format!("KIM № {}{mark}", facet.number), facet.active, facet.answered)
    }));

    for (entry, (label, active, answered)) in entries.into_iter().enumerate().skip(offset).take(visible) {
        let marker = if active { "▸ " } else { "  " };
        let mut style = Style::default().fg(if answered {
            theme.answered_fg
        } else {
            theme.text_fg
        });
        if active {
            style = style.fg(theme.active_fg).add_modifier(Modifier::BOLD);
        }
        if sidebar_focused && entry == app.sidebar_selected() {
            style = style.bg(SELECTED_BG).fg(SELECTED_FG);
        }
        lines.push(Line::from(Span::styled(format!("{marker}{label}"), style)));
    }

    frame.render_widget(
        Paragraph::new(lines).block(padded_block(theme.sidebar_bg)),
        areas.sidebar_content,
    );
}

fn timer_label(app: &App, theme: &Theme) -> (String, Color) {
    let session = app.session();
    match session.phase() {
        Phase::Finished => ("Finished".to_string(), theme.muted_fg),
        Phase::Finishing { .. } => ("Submitting...".to_string(), theme.warning_fg),
        Phase::Active => match session.timer() {
            Some(timer) => (
                format!("Time left {}", timer.display()),
                level_color(timer.level(), theme),
            ),
            None => (String::new(), theme.muted_fg),
        },
    }
}

fn level_color(level: TimerLevel, theme: &Theme) -> Color {
    match level {
        TimerLevel::Normal => theme.text_fg,
        TimerLevel::Warning => theme.warning_fg,
        TimerLevel::Critical => theme.critical_fg,
    }
}

fn render_info_slide(frame: &mut Frame, areas: &ScreenAreas, app: &App, theme: &Theme) {
    let view = app.session().info_view();
    render_title_bar(
        frame,
        areas.main_title,
        Line::from(Span::styled(view.title, Style::default().fg(theme.active_fg))),
        title_bar_bg(theme.slide_bg),
    );
    let lines = view
        .lines
        .into_iter()
        .map(|line| Line::from(Span::styled(line, Style::default().fg(theme.text_fg))))
        .collect::<Vec<_>>();
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(padded_block(theme.slide_bg)),
        areas.main_content,
    );
}

fn render_task_slide(
    frame: &mut Frame,
    areas: &ScreenAreas,
    app: &App,
    slide: &TaskSlideView,
    theme: &Theme,
) {
    render_title_bar(
        frame,
        areas.main_title,
        Line::from(Span::styled(
            slide.header.clone(),
            Style::default()
                .fg(theme.active_fg)
                .add_modifier(Modifier::BOLD),
        )),
        title_bar_bg(theme.slide_bg),
    );

    let answer_height = answer_region_height(slide).min(areas.main_content.height);
    let [statement_area, answer_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(answer_height)])
            .areas(areas.main_content);

    let text_style = Style::default().fg(theme.text_fg);
    let mut lines = slide
        .statement
        .iter()
        .map(|line| Line::from(Span::styled(line.clone(), text_style)))
        .collect::<Vec<_>>();
    if !slide.attachments.is_empty() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "Attachments:",
            Style::default().fg(theme.muted_fg),
        )));
        for attachment in &slide.attachments {
            lines.push(Line::from(vec![
                Span::styled(attachment.label.clone(), text_style),
                Span::raw("  "),
                Span::styled(attachment.url.clone(), Style::default().fg(theme.muted_fg)),
            ]));
        }
    }
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(padded_block(theme.slide_bg)),
        statement_area,
    );

    render_answer_region(frame, answer_area, app, slide, theme);
}

fn answer_region_height(slide: &TaskSlideView) -> u16 {
    let header = u16::from(!slide.answer.column_headers.is_empty());
    TEXT_PADDING * 2 + 1 + header + slide.answer.rows as u16
}

fn render_answer_region(
    frame: &mut Frame,
    area: Rect,
    app: &App,
    slide: &TaskSlideView,
    theme: &Theme,
) {
    let session = app.session();
    let editable = session.is_editable();
    let drafts = session.drafts(slide.task_id);
    let answer = &slide.answer;
    let cols = answer.cols.max(1);
    let focused = match app.focus() {
        Focus::Field(index) if index < answer.fields.len() => Some(index),
        _ => None,
    };

    let mut title = vec![Span::styled(
        format!("Your answer ({})", answer.shape.label()),
        Style::default().fg(theme.muted_fg),
    )];
    if !editable {
        title.push(Span::styled(
            "  read-only",
            Style::default().fg(theme.warning_fg),
        ));
    }
    let mut lines = vec![Line::from(title)];
    if !answer.column_headers.is_empty() {
        let mut header = " ".repeat(ROW_LABEL_WIDTH);
        for column in &answer.column_headers {
            header.push_str(&format!("{column:<width$}", width = FIELD_STRIDE));
        }
        lines.push(Line::from(Span::styled(
            header,
            Style::default().fg(theme.muted_fg),
        )));
    }
    let header_lines = lines.len() as u16;

    let visible_rows = area
        .height
        .saturating_sub(TEXT_PADDING * 2 + header_lines) as usize;
    let focused_row = focused.map_or(0, |index| index / cols);
    let row_offset = if visible_rows == 0 {
        0
    } else {
        focused_row.saturating_sub(visible_rows - 1)
    };

    let mut cursor_position = None;
    for row in (0..answer.rows).skip(row_offset).take(visible_rows.max(1)) {
        let row_label = match answer.shape {
            AnswerShape::Table { .. } => answer
                .fields
                .get(row * cols)
                .map(|field| field.label.clone())
                .unwrap_or_default(),
            AnswerShape::Single | AnswerShape::Double => "Answer".to_string(),
        };
        let mut spans = vec![Span::styled(
            format!("{row_label:<width$}", width = ROW_LABEL_WIDTH),
            Style::default().fg(theme.muted_fg),
        )];
        for col in 0..cols {
            let index = row * cols + col;
            if index >= answer.fields.len() {
                break;
            }
            let value = drafts.get(index).map(String::as_str).unwrap_or("");
            let is_focused = focused == Some(index);
            let cursor = is_focused.then_some(app.edit_cursor());
            let (window, cursor_col) = field_window(value, cursor);
            let bg = if is_focused {
                theme.focused_input_bg
            } else {
                theme.input_bg
            };
            spans.push(Span::styled("[", Style::default().fg(theme.muted_fg)));
            spans.push(Span::styled(window, Style::default().bg(bg).fg(theme.text_fg)));
            spans.push(Span::styled("] ", Style::default().fg(theme.muted_fg)));
            if let Some(cursor_col) = cursor_col {
                let x = area.x as usize
                    + TEXT_PADDING as usize
                    + ROW_LABEL_WIDTH
                    + col * FIELD_STRIDE
                    + 1
                    + cursor_col;
                let y = area.y as usize
                    + TEXT_PADDING as usize
                    + header_lines as usize
                    + (row - row_offset);
                cursor_position = Some((x, y));
            }
        }
        lines.push(Line::from(spans));
    }

    frame.render_widget(
        Paragraph::new(lines).block(padded_block(theme.slide_bg)),
        area,
    );

    if editable
        && app.overlay().is_none()
        && let Some((x, y)) = cursor_position
        && let (Ok(x), Ok(y)) = (u16::try_from(x), u16::try_from(y))
        && point_in_rect(area, x, y)
    {
        frame.set_cursor_position((x, y));
    }
}

/// The visible slice of a field value, padded to the field width, and the
/// cursor column inside it.
fn field_window(value: &str, cursor: Option<usize>) -> (String, Option<usize>) {
    let chars = value.chars().collect::<Vec<_>>();
    let start = cursor.map_or(0, |cursor| {
        cursor.min(chars.len()).saturating_sub(FIELD_WIDTH - 1)
    });
    let shown = chars
        .iter()
        .skip(start)
        .take(FIELD_WIDTH)
        .collect::<String>();
    let window = format!("{shown:<width$}", width = FIELD_WIDTH);
    (window, cursor.map(|cursor| cursor.min(chars.len()) - start))
}

fn render_results(frame: &mut Frame, areas: &ScreenAreas, app: &App, theme: &Theme) {
    render_title_bar(
        frame,
        areas.main_title,
        Line::from(Span::styled(
            format!("Results of attempt #{}", app.session().metadata().attempt_id),
            Style::default()
                .fg(theme.active_fg)
                .add_modifier(Modifier::BOLD),
        )),
        title_bar_bg(theme.slide_bg),
    );

    let text_style = Style::default().fg(theme.text_fg);
    let muted = Style::default().fg(theme.muted_fg);
    let mut lines = Vec::new();
    match app.session().results() {
        ResultsState::NotRequested | ResultsState::Loading => {
            lines.push(Line::from(Span::styled("Loading results...", muted)));
        }
        ResultsState::Failed(message) => {
            lines.push(Line::from(Span::styled(
                format!("Could not load results: {message}"),
                Style::default().fg(theme.error_fg),
            )));
        }
        ResultsState::Loaded(results) => {
            lines.push(Line::from(Span::styled(
                format!("{:<8}{:<28}{}", "KIM №", "Your answer", "Correct answer"),
                muted,
            )));
            for result in &results.results {
                let user = result_text(result.user_answer.as_deref());
                let correct = result_text(result.correct_answer.as_deref());
                let style = if user == correct && !user.is_empty() {
                    Style::default().fg(theme.answered_fg)
                } else {
                    text_style
                };
                lines.push(Line::from(Span::styled(
                    format!("{:<8}{:<28}{}", result.task_number, user, correct),
                    style,
                )));
            }
            if let Some(total) = results.total_tasks {
                lines.push(Line::default());
                lines.push(Line::from(Span::styled(format!("Tasks: {total}"), muted)));
            }
        }
    }
    lines.push(Line::default());
    lines.push(Line::from(Span::styled("Full results page:", muted)));
    lines.push(Line::from(Span::styled(
        app.results_page_url().to_string(),
        text_style,
    )));

    frame.render_widget(
        Paragraph::new(lines)
            .scroll((app.results_scroll(), 0))
            .block(padded_block(theme.slide_bg)),
        areas.main_content,
    );
}

fn result_text(raw: Option<&str>) -> String {
    raw.unwrap_or("").trim().replace('\n', " / ")
}

fn render_status(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let help = if app.session().phase() == Phase::Finished {
        FINISHED_HELP_TEXT
    } else {
        ACTIVE_HELP_TEXT
    };
    let mut spans = Vec::new();
    if let Some((message, color)) = status_message(app, theme) {
        spans.push(Span::styled(message, Style::default().fg(color)));
        spans.push(Span::raw(" | "));
    }
    spans.push(Span::styled(help, Style::default().fg(theme.muted_fg)));
    frame.render_widget(
        Paragraph::new(Line::from(spans)).block(padded_block(theme.status_bg)),
        area,
    );
}

fn status_message(app: &App, theme: &Theme) -> Option<(String, Color)> {
    if let Some(notice) = app.notice() {
        return Some((notice.to_string(), theme.warning_fg));
    }
    let task_id = app.active_slide()?.task_id;
    let message = match app.session().indicator(task_id)? {
        SaveIndicator::Saving => ("Saving...".to_string(), theme.muted_fg),
        SaveIndicator::Saved { .. } => ("Saved".to_string(), theme.answered_fg),
        SaveIndicator::Error(message) => (format!("Not saved: {message}"), theme.error_fg),
        SaveIndicator::NetworkError(message) => {
            (format!("Network error, not saved: {message}"), theme.error_fg)
        }
    };
    Some(message)
}

fn render_dialog(frame: &mut Frame, title: &str, body: &[String], accent: Color, theme: &Theme) {
    let screen = frame.area();
    let width = screen.width.min(64).max(30).min(screen.width);
    let height = (body.len() as u16 + 4).min(screen.height);
    let x = screen.x + screen.width.saturating_sub(width) / 2;
    let y = screen.y + screen.height.saturating_sub(height) / 2;
    let overlay = Rect::new(x, y, width, height);

    let mut lines = vec![Line::from(Span::styled(
        title.to_string(),
        Style::default().fg(accent).add_modifier(Modifier::BOLD),
    ))];
    lines.extend(
        body.iter()
            .map(|line| Line::from(Span::styled(line.clone(), Style::default().fg(theme.text_fg)))),
    );
    frame.render_widget(Clear, overlay);
    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(padded_block(theme.status_bg)),
        overlay,
    );
}

fn title_bar_bg(base: Color) -> Color {
    match base {
        Color::Rgb(r, g, b) => {
            let delta = -12;
            Color::Rgb(
                adjust_channel(r, delta),
                adjust_channel(g, delta),
                adjust_channel(b, delta),
            )
        }
        _ => base,
    }
}

fn point_in_rect(rect: Rect, x: u16, y: u16) -> bool {
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

fn adjust_channel(channel: u8, delta: i16) -> u8 {
    let value = channel as i16 + delta;
    value.clamp(0, 255) as u8
}

#[cfg(test)]
#[path = "../tests/unit/ui_tests.rs"]
mod tests;
