use super::*;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::api::AttemptApi;
use crate::api::fake::FakeApi;
use crate::config::SaveOverlapPolicy;
use crate::session::LaunchMetadata;

fn data_json(started_at: &str, finished_at: Option<&str>) -> String {
    let finished = finished_at
        .map(|value| format!(r#""{value}""#))
        .unwrap_or_else(|| "null".to_string());
    format!(
        r#"{{
            "attempt": {{"started_at": "{started_at}", "finished_at": {finished}}},
            "tasks": [
                {{"variant_task_id": 101, "number": 1, "statement_html": "<p>2+2?</p>", "current_answer": "4"}},
                {{"variant_task_id": 125, "number": 25, "statement_html": "<p>grid</p>"}}
            ]
        }}"#
    )
}

fn setup(started_at: &str, finished_at: Option<&str>) -> (App, AttemptGateway, Arc<FakeApi>) {
    let api = Arc::new(FakeApi::with_data_json(&data_json(started_at, finished_at)));
    let launch = LaunchMetadata {
        attempt_id: 7,
        duration_secs: 3600,
        ..LaunchMetadata::default()
    };
    let session = Session::initialize(launch, api.as_ref()).expect("session should load");
    let dyn_api: Arc<dyn AttemptApi> = api.clone();
    let gateway = AttemptGateway::new(dyn_api, 7, SaveOverlapPolicy::Drop);
    let app = App::new(session, gateway.results_page_url());
    (app, gateway, api)
}

fn active_setup() -> (App, AttemptGateway, Arc<FakeApi>) {
    setup(&Utc::now().to_rfc3339(), None)
}

fn pump(app: &mut App, gateway: &AttemptGateway, expected: usize) {
    let mut seen = 0;
    for _ in 0..200 {
        for event in gateway.drain_events() {
            seen += 1;
            app.on_gateway_event(event, gateway);
        }
        if seen >= expected {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("expected {expected} gateway events, saw {seen}");
}

fn send(app: &mut App, gateway: &AttemptGateway, events: &[AppEvent]) {
    for event in events {
        app.handle_event(*event, gateway);
    }
}

#[test]
fn starts_on_info_with_sidebar_focus() {
    let (app, _gateway, _api) = active_setup();
    assert_eq!(app.focus(), Focus::Sidebar);
    assert_eq!(app.sidebar_selected(), 0);
    assert_eq!(app.sidebar_len(), 3);
    assert!(app.active_slide().is_none());
    assert_eq!(app.results_page_url(), "http://exam.test/attempts/7/results-page");
}

#[test]
fn editing_then_tab_saves_the_field_once() {
    let (mut app, gateway, api) = active_setup();
    app.open_entry(1, &gateway);
    assert_eq!(app.focus(), Focus::Field(0));
    assert_eq!(app.edit_cursor(), 1);

    send(
        &mut app,
        &gateway,
        &[AppEvent::Backspace, AppEvent::InputChar('1'), AppEvent::InputChar('2')],
    );
    assert_eq!(app.focused_value(), Some("12"));
    app.handle_event(AppEvent::NextField, &gateway);
    assert_eq!(app.focus(), Focus::Sidebar);
    pump(&mut app, &gateway, 1);

    assert_eq!(api.saves(), vec![(101, "12".to_string())]);
    assert_eq!(app.session().answers().get(101), Some("12"));
    app.handle_event(AppEvent::PrevField, &gateway);
    app.handle_event(AppEvent::NextField, &gateway);
    assert_eq!(api.saves().len(), 1);
}

#[test]
fn cursor_edits_in_the_middle_of_a_value() {
    let (mut app, gateway, _api) = active_setup();
    app.open_entry(1, &gateway);
    send(
        &mut app,
        &gateway,
        &[
            AppEvent::InputChar('5'),
            AppEvent::CursorLeft,
            AppEvent::CursorLeft,
            AppEvent::InputChar('-'),
            AppEvent::CursorRight,
            AppEvent::Backspace,
        ],
    );
    assert_eq!(app.focused_value(), Some("-5"));
}

#[test]
fn changing_slide_counts_as_blur() {
    let (mut app, gateway, api) = active_setup();
    app.open_entry(2, &gateway);
    send(&mut app, &gateway, &[AppEvent::InputChar('a'), AppEvent::PrevSlide]);
    pump(&mut app, &gateway, 1);
    assert_eq!(api.saves(), vec![(125, "a,".to_string())]);
    assert_eq!(app.sidebar_selected(), 1);
    assert_eq!(app.focus(), Focus::Field(0));

    app.handle_event(AppEvent::ShowInfo, &gateway);
    assert_eq!(app.focus(), Focus::Sidebar);
    assert_eq!(app.sidebar_selected(), 0);
    assert_eq!(api.saves().len(), 1);
}

#[test]
fn up_and_down_move_between_table_rows() {
    let (mut app, gateway, _api) = active_setup();
    app.open_entry(2, &gateway);
    app.handle_event(AppEvent::MoveDown, &gateway);
    assert_eq!(app.focus(), Focus::Field(2));
    app.handle_event(AppEvent::NextField, &gateway);
    assert_eq!(app.focus(), Focus::Field(3));
    app.handle_event(AppEvent::MoveUp, &gateway);
    app.handle_event(AppEvent::MoveUp, &gateway);
    assert_eq!(app.focus(), Focus::Field(1));
}

#[test]
fn sidebar_selection_opens_slides() {
    let (mut app, gateway, _api) = active_setup();
    send(
        &mut app,
        &gateway,
        &[AppEvent::MoveDown, AppEvent::MoveDown, AppEvent::MoveDown],
    );
    assert_eq!(app.sidebar_selected(), 2);
    app.handle_event(AppEvent::Submit, &gateway);
    assert_eq!(app.active_slide().map(|slide| slide.task_id), Some(125));
}

#[test]
fn finish_requires_confirmation_and_is_sent_once() {
    let (mut app, gateway, api) = active_setup();
    let release = api.hold_finish();

    send(&mut app, &gateway, &[AppEvent::RequestFinish, AppEvent::InputChar('n')]);
    assert!(app.overlay().is_none());
    assert_eq!(app.session().phase(), Phase::Active);

    send(&mut app, &gateway, &[AppEvent::RequestFinish, AppEvent::InputChar('y')]);
    assert!(matches!(app.session().phase(), Phase::Finishing { .. }));
    send(&mut app, &gateway, &[AppEvent::RequestFinish, AppEvent::Submit]);
    assert!(app.overlay().is_none());

    release.send(()).expect("release finish");
    pump(&mut app, &gateway, 1);
    assert_eq!(app.session().phase(), Phase::Finished);
    assert_eq!(api.finish_count(), 1);
}

#[test]
fn finish_failure_shows_alert_until_dismissed() {
    let (mut app, gateway, api) = active_setup();
    api.reject_finish(Some("server unavailable"));
    send(&mut app, &gateway, &[AppEvent::RequestFinish, AppEvent::Submit]);
    pump(&mut app, &gateway, 1);

    match app.overlay() {
        Some(Overlay::Alert(message)) => assert!(message.contains("server unavailable")),
        other => panic!("unexpected overlay: {other:?}"),
    }
    app.handle_event(AppEvent::MoveDown, &gateway);
    assert!(app.overlay().is_some());
    app.handle_event(AppEvent::Submit, &gateway);
    assert!(app.overlay().is_none());
    assert_eq!(app.session().phase(), Phase::Active);
}

#[test]
fn finished_attempt_ignores_editing_and_finish_requests() {
    let (mut app, gateway, api) = setup("2025-05-20T10:00:00Z", Some("2025-05-20T11:00:00Z"));
    app.open_entry(1, &gateway);
    send(
        &mut app,
        &gateway,
        &[AppEvent::InputChar('9'), AppEvent::NextField, AppEvent::RequestFinish],
    );
    assert!(app.overlay().is_none());
    assert!(app.active_slide().is_none());
    assert_eq!(app.session().drafts(101), ["4".to_string()]);
    assert!(api.saves().is_empty());

    app.handle_event(AppEvent::MoveDown, &gateway);
    assert_eq!(app.results_scroll(), 1);
}

#[test]
fn clock_submits_once_when_time_runs_out() {
    let (mut app, gateway, api) = setup("2025-05-20T10:00:00Z", None);
    app.handle_event(AppEvent::RequestFinish, &gateway);
    let now = Utc::now();
    app.on_clock(now, Instant::now(), &gateway);
    app.on_clock(now + chrono::TimeDelta::seconds(2), Instant::now(), &gateway);
    assert!(app.overlay().is_none());
    assert_eq!(
        app.session().phase(),
        Phase::Finishing {
            trigger: FinishTrigger::TimerExpired
        }
    );
    pump(&mut app, &gateway, 1);
    assert_eq!(api.finish_count(), 1);
}

#[test]
fn last_edit_at_expiry_is_saved_before_finishing() {
    let (mut app, gateway, api) = setup("2025-05-20T10:00:00Z", None);
    let release = api.hold_saves();
    app.open_entry(1, &gateway);
    app.handle_event(AppEvent::InputChar('2'), &gateway);

    app.on_clock(Utc::now(), Instant::now(), &gateway);
    assert_eq!(
        app.session().phase(),
        Phase::Finishing {
            trigger: FinishTrigger::TimerExpired
        }
    );
    thread::sleep(Duration::from_millis(50));
    assert_eq!(api.saves(), vec![(101, "42".to_string())]);
    assert_eq!(api.finish_count(), 0);

    release.send(()).expect("release save");
    pump(&mut app, &gateway, 2);
    assert_eq!(app.session().phase(), Phase::Finished);
    assert_eq!(app.session().answers().get(101), Some("42"));
    assert_eq!(api.finish_count(), 1);
}

#[test]
fn quitting_an_active_attempt_asks_first() {
    let (mut app, gateway, _api) = active_setup();
    app.handle_event(AppEvent::Quit, &gateway);
    assert!(app.running);
    assert_eq!(app.overlay(), Some(&Overlay::ConfirmQuit));

    app.handle_event(AppEvent::InputChar('n'), &gateway);
    assert!(app.running);
    assert!(app.overlay().is_none());

    send(&mut app, &gateway, &[AppEvent::Quit, AppEvent::InputChar('y')]);
    assert!(!app.running);
}

#[test]
fn second_ctrl_c_quits_even_over_another_overlay() {
    let (mut app, gateway, _api) = active_setup();
    send(&mut app, &gateway, &[AppEvent::RequestFinish, AppEvent::Quit]);
    assert_eq!(app.overlay(), Some(&Overlay::ConfirmQuit));
    app.handle_event(AppEvent::Quit, &gateway);
    assert!(!app.running);
}

#[test]
fn confirmed_quit_saves_the_focused_field() {
    let (mut app, gateway, api) = active_setup();
    app.open_entry(1, &gateway);
    send(
        &mut app,
        &gateway,
        &[AppEvent::InputChar('2'), AppEvent::Quit, AppEvent::Submit],
    );
    assert!(!app.running);
    pump(&mut app, &gateway, 1);
    assert_eq!(api.saves(), vec![(101, "42".to_string())]);
}

#[test]
fn finished_attempt_quits_without_asking() {
    let (mut app, gateway, _api) = setup("2025-05-20T10:00:00Z", Some("2025-05-20T11:00:00Z"));
    app.handle_event(AppEvent::Quit, &gateway);
    assert!(!app.running);
}
