use super::*;

use std::sync::Arc;
use std::thread;

use chrono::TimeDelta;

use crate::api::fake::FakeApi;
use crate::config::SaveOverlapPolicy;
use crate::timer::TimerState;

fn data_json(started_at: &str, finished_at: Option<&str>) -> String {
    let finished = finished_at
        .map(|value| format!(r#""{value}""#))
        .unwrap_or_else(|| "null".to_string());
    format!(
        r#"{{
            "attempt": {{"id": 7, "variant_id": 3, "started_at": "{started_at}", "finished_at": {finished}}},
            "tasks": [
                {{"variant_task_id": 101, "number": 1, "statement_html": "<p>2+2?</p>", "current_answer": "4"}},
                {{"variant_task_id": 102, "number": 17, "statement_html": "<p>pair</p>"}},
                {{"variant_task_id": 103, "number": 25, "statement_html": "<p>grid</p>", "current_answer": "a,b\nc,d"}}
            ],
            "stats": {{"answered": 2, "total": 3}}
        }}"#
    )
}

fn launch() -> LaunchMetadata {
    LaunchMetadata {
        attempt_id: 7,
        duration_secs: 3600,
        ..LaunchMetadata::default()
    }
}

fn active_api() -> Arc<FakeApi> {
    let started = Utc::now().to_rfc3339();
    Arc::new(FakeApi::with_data_json(&data_json(&started, None)))
}

fn gateway_for(api: &Arc<FakeApi>) -> AttemptGateway {
    let api: Arc<dyn AttemptApi> = api.clone();
    AttemptGateway::new(api, 7, SaveOverlapPolicy::Drop)
}

fn pump(session: &mut Session, gateway: &AttemptGateway, expected: usize) -> Vec<String> {
    let mut seen = 0;
    let mut alerts = Vec::new();
    for _ in 0..200 {
        for event in gateway.drain_events() {
            seen += 1;
            alerts.extend(session.apply_event(event, gateway));
        }
        if seen >= expected {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert!(seen >= expected, "expected {expected} gateway events, saw {seen}");
    alerts
}

#[test]
fn initialize_merges_payload_metadata_and_seeds_answers() {
    let api = active_api();
    let session = Session::initialize(launch(), api.as_ref()).expect("session should load");

    assert_eq!(session.metadata().variant_id, Some(3));
    assert!(!session.metadata().is_finished());
    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(session.tasks().len(), 3);
    assert_eq!(session.answers().get(101), Some("4"));
    assert_eq!(session.progress(), Progress { answered: 2, total: 3 });
    assert_eq!(session.drafts(101), ["4".to_string()]);
    assert_eq!(session.drafts(103)[..4], ["a", "b", "c", "d"]);
    assert_eq!(session.navigation().active_task(), None);
    assert_eq!(
        session.timer().map(CountdownTimer::state),
        Some(TimerState::Running)
    );
}

#[test]
fn launch_values_take_precedence_over_payload() {
    let api = active_api();
    let session = Session::initialize(
        LaunchMetadata {
            variant_id: Some(9),
            started_at: Some("2025-05-20T10:00:00Z".to_string()),
            ..launch()
        },
        api.as_ref(),
    )
    .expect("session should load");
    assert_eq!(session.metadata().variant_id, Some(9));
    assert_eq!(
        session.metadata().started_at.to_rfc3339(),
        "2025-05-20T10:00:00+00:00"
    );
}

#[test]
fn load_failures_are_classified() {
    let missing = FakeApi::default();
    assert!(matches!(
        Session::initialize(launch(), &missing),
        Err(LoadFailure::Api(ApiError::Status { status: 404, .. }))
    ));

    let no_tasks = FakeApi::with_data_json(r#"{"tasks": []}"#);
    assert!(matches!(
        Session::initialize(launch(), &no_tasks),
        Err(LoadFailure::EmptyTaskList)
    ));

    let no_start = FakeApi::with_data_json(
        r#"{"attempt": {"started_at": ""}, "tasks": [{"variant_task_id": 1, "number": 1}]}"#,
    );
    assert!(matches!(
        Session::initialize(launch(), &no_start),
        Err(LoadFailure::MissingStartTime)
    ));

    let bad_start = FakeApi::with_data_json(&data_json("not a time", None));
    assert!(matches!(
        Session::initialize(launch(), &bad_start),
        Err(LoadFailure::InvalidTimestamp(raw)) if raw == "not a time"
    ));
}

#[test]
fn finished_attempt_never_starts_timer_or_allows_editing() {
    let api = Arc::new(FakeApi::with_data_json(&data_json(
        "2025-05-20T10:00:00Z",
        Some("2025-05-20T11:00:00Z"),
    )));
    let gateway = gateway_for(&api);
    let mut session = Session::initialize(launch(), api.as_ref()).expect("session should load");

    assert_eq!(session.phase(), Phase::Finished);
    assert!(session.timer().is_none());
    assert!(!session.is_editable());
    assert!(session.drafts_mut(101).is_none());
    assert!(!session.tick_timer(Utc::now() + TimeDelta::hours(10)));
    assert_eq!(session.save(101, &gateway), None);
    assert!(!session.finish(FinishTrigger::Manual, &gateway));
    assert!(api.saves().is_empty());
    assert_eq!(api.finish_count(), 0);
}

#[test]
fn finishing_twice_sends_one_request() {
    let api = active_api();
    let release = api.hold_finish();
    let gateway = gateway_for(&api);
    let mut session = Session::initialize(launch(), api.as_ref()).expect("session should load");

    assert!(session.finish(FinishTrigger::Manual, &gateway));
    assert!(!session.finish(FinishTrigger::Manual, &gateway));
    assert!(!session.finish(FinishTrigger::TimerExpired, &gateway));
    assert_eq!(
        session.timer().map(CountdownTimer::state),
        Some(TimerState::Cancelled)
    );
    assert!(!session.is_editable());

    release.send(()).expect("release finish");
    pump(&mut session, &gateway, 1);
    assert_eq!(session.phase(), Phase::Finished);
    assert!(session.metadata().is_finished());
    assert_eq!(api.finish_count(), 1);
    assert!(!session.finish(FinishTrigger::Manual, &gateway));
}

#[test]
fn finished_session_loads_results() {
    let started = Utc::now().to_rfc3339();
    let api = Arc::new(
        FakeApi::with_data_json(&data_json(&started, None)).with_results_json(
            r#"{"attempt_id": 7, "results": [{"task_number": 1, "user_answer": "4", "correct_answer": "4"}]}"#,
        ),
    );
    let gateway = gateway_for(&api);
    let mut session = Session::initialize(launch(), api.as_ref()).expect("session should load");

    session.finish(FinishTrigger::Manual, &gateway);
    pump(&mut session, &gateway, 2);
    match session.results() {
        ResultsState::Loaded(results) => assert_eq!(results.results[0].task_number, 1),
        other => panic!("unexpected results state: {other:?}"),
    }
}

#[test]
fn save_failure_keeps_last_committed_answer() {
    let api = active_api();
    api.reject_saves("attempt is locked");
    let gateway = gateway_for(&api);
    let mut session = Session::initialize(launch(), api.as_ref()).expect("session should load");

    session.drafts_mut(101).expect("editable")[0] = "5".to_string();
    assert_eq!(session.save(101, &gateway), Some(SaveDispatch::Sent));
    assert_eq!(session.indicator(101), Some(&SaveIndicator::Saving));
    pump(&mut session, &gateway, 1);

    assert_eq!(session.answers().get(101), Some("4"));
    assert_eq!(session.drafts(101), ["5".to_string()]);
    assert!(matches!(session.indicator(101), Some(SaveIndicator::Error(message)) if message.contains("locked")));
}

#[test]
fn successful_save_commits_and_updates_progress() {
    let api = active_api();
    let gateway = gateway_for(&api);
    let mut session = Session::initialize(launch(), api.as_ref()).expect("session should load");

    let drafts = session.drafts_mut(102).expect("editable");
    drafts[0] = "x".to_string();
    drafts[1] = "y".to_string();
    assert_eq!(session.save(102, &gateway), Some(SaveDispatch::Sent));
    pump(&mut session, &gateway, 1);

    assert_eq!(api.saves(), vec![(102, "x,y".to_string())]);
    assert_eq!(session.answers().get(102), Some("x,y"));
    assert_eq!(session.progress(), Progress { answered: 3, total: 3 });
    assert!(matches!(session.indicator(102), Some(SaveIndicator::Saved { .. })));
}

#[test]
fn unchanged_drafts_are_not_saved() {
    let api = active_api();
    let gateway = gateway_for(&api);
    let mut session = Session::initialize(launch(), api.as_ref()).expect("session should load");

    session.drafts_mut(101).expect("editable")[0] = " 4 ".to_string();
    assert_eq!(session.save(101, &gateway), None);
    assert_eq!(session.save(102, &gateway), None);
    assert!(api.saves().is_empty());
}

#[test]
fn timer_expiry_finishes_once_and_failure_keeps_timer_expired() {
    let api = Arc::new(FakeApi::with_data_json(&data_json("2025-05-20T10:00:00Z", None)));
    api.reject_finish(Some("server unavailable"));
    let gateway = gateway_for(&api);
    let mut session = Session::initialize(launch(), api.as_ref()).expect("session should load");

    let now = Utc::now();
    assert!(session.tick_timer(now));
    assert!(session.finish(FinishTrigger::TimerExpired, &gateway));
    assert!(!session.tick_timer(now + TimeDelta::seconds(5)));

    let alerts = pump(&mut session, &gateway, 1);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("server unavailable"));
    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(
        session.timer().map(CountdownTimer::state),
        Some(TimerState::Expired)
    );
    assert!(!session.tick_timer(now + TimeDelta::seconds(10)));
    assert_eq!(api.finish_count(), 1);
}

#[test]
fn manual_finish_failure_rearms_the_timer() {
    let api = active_api();
    api.reject_finish(Some("try again"));
    let gateway = gateway_for(&api);
    let mut session = Session::initialize(launch(), api.as_ref()).expect("session should load");

    session.finish(FinishTrigger::Manual, &gateway);
    pump(&mut session, &gateway, 1);
    assert_eq!(session.phase(), Phase::Active);
    assert_eq!(
        session.timer().map(CountdownTimer::state),
        Some(TimerState::Running)
    );
    assert!(session.finish(FinishTrigger::Manual, &gateway));
}

#[test]
fn saved_indicator_clears_after_two_seconds() {
    let api = active_api();
    let mut session = Session::initialize(launch(), api.as_ref()).expect("session should load");
    let at = Instant::now();
    session.commit_save(101, "7".to_string(), at);
    session.save_failed(102, SaveFailure::Network("offline".to_string()));

    session.clear_stale_indicators(at + Duration::from_millis(1500));
    assert!(session.indicator(101).is_some());
    session.clear_stale_indicators(at + Duration::from_secs(2));
    assert!(session.indicator(101).is_none());
    assert_eq!(
        session.indicator(102),
        Some(&SaveIndicator::NetworkError("offline".to_string()))
    );
}

#[test]
fn queued_saves_for_different_tasks_all_commit() {
    let api = active_api();
    let release = api.hold_saves();
    let dyn_api: Arc<dyn AttemptApi> = api.clone();
    let gateway = AttemptGateway::new(dyn_api, 7, SaveOverlapPolicy::Coalesce);
    let mut session = Session::initialize(launch(), api.as_ref()).expect("session should load");

    session.drafts_mut(101).expect("editable")[0] = "5".to_string();
    session.drafts_mut(102).expect("editable")[0] = "x".to_string();
    session.drafts_mut(103).expect("editable")[0] = "z".to_string();
    assert_eq!(session.save(101, &gateway), Some(SaveDispatch::Sent));
    assert_eq!(session.save(102, &gateway), Some(SaveDispatch::Queued));
    assert_eq!(session.save(103, &gateway), Some(SaveDispatch::Queued));

    for _ in 0..3 {
        release.send(()).expect("release save");
    }
    pump(&mut session, &gateway, 3);

    assert_eq!(api.saves().len(), 3);
    for task_id in [101, 102, 103] {
        assert!(!session.has_unsaved_changes(task_id), "task {task_id} not committed");
        assert!(matches!(session.indicator(task_id), Some(SaveIndicator::Saved { .. })));
    }
    assert_eq!(session.answers().get(102), Some("x,"));
}

#[test]
fn finish_waits_for_the_outstanding_save() {
    let api = active_api();
    let release = api.hold_saves();
    let gateway = gateway_for(&api);
    let mut session = Session::initialize(launch(), api.as_ref()).expect("session should load");

    session.drafts_mut(101).expect("editable")[0] = "42".to_string();
    assert_eq!(session.save(101, &gateway), Some(SaveDispatch::Sent));
    assert!(session.finish(FinishTrigger::Manual, &gateway));
    assert!(!session.finish(FinishTrigger::Manual, &gateway));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(api.finish_count(), 0);

    release.send(()).expect("release save");
    pump(&mut session, &gateway, 2);
    assert_eq!(api.saves(), vec![(101, "42".to_string())]);
    assert_eq!(session.answers().get(101), Some("42"));
    assert_eq!(session.phase(), Phase::Finished);
    assert_eq!(api.finish_count(), 1);
}
