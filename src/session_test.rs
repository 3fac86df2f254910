use std::time::Duration;

use super::*;
use crate::control::VisualState;
use crate::mode_guard::AutoConfirm;
use crate::prefs::MemoryPrefs;
use crate::status;
use crate::transport::test_helpers::MockTransport;

const P1_IDLE: &str = r#"<status><player index index="1" status="stop" show="00" time=""/></status>"#;
const P1_PLAYING_03: &str =
    r#"<status><player index index="1" status="play" show="03" time="00h00m01s"/></status>"#;

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn multi_status(rows: &[(PlayerId, &str, &str)]) -> String {
    let players: String = rows
        .iter()
        .map(|(index, status, show)| {
            format!(r#"<player index index="{index}" status="{status}" show="{show}" time="00h00m00s"/>"#)
        })
        .collect();
    format!("<status>{players}</status>")
}

struct Harness {
    mock: Arc<MockTransport>,
    prefs: Arc<MemoryPrefs>,
    session: Arc<Session>,
}

fn harness(stored_mode: Option<&str>, status: &str) -> Harness {
    let mock = Arc::new(MockTransport::new());
    mock.set_status(status);
    let prefs = Arc::new(MemoryPrefs::new());
    if let Some(id) = stored_mode {
        prefs.set(LAST_MODE_KEY, id).unwrap();
    }
    let session = Arc::new(Session::new(mock.clone(), prefs.clone(), Timings::default()));
    Harness { mock, prefs, session }
}

fn state(session: &Session, player: PlayerId, verb: Verb) -> VisualState {
    session.snapshot().controls.control(player, verb).unwrap().state()
}

fn stored_mode(prefs: &MemoryPrefs) -> Option<String> {
    prefs.get(LAST_MODE_KEY).unwrap()
}

// =============================================================================
// startup
// =============================================================================

#[tokio::test(start_paused = true)]
async fn start_restores_persisted_mode_without_rewriting_it() {
    let h = harness(Some("1"), P1_IDLE);
    h.session.start().await;

    assert_eq!(h.session.mode(), Some(Mode::MultiHtp));
    assert_eq!(h.session.active_player_count(), 4);
    assert_eq!(h.mock.sent(), vec!["MS1"]);
    assert_eq!(stored_mode(&h.prefs).as_deref(), Some("1"));
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn restored_recording_sends_single_wire_code() {
    let h = harness(Some("4"), P1_IDLE);
    h.session.start().await;
    assert_eq!(h.session.mode(), Some(Mode::Recording));
    assert_eq!(h.mock.sent(), vec!["MS0"]);
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn start_without_persisted_mode_leaves_everything_disabled() {
    let h = harness(None, P1_PLAYING_03);
    h.session.start().await;
    tokio::time::sleep(ms(10)).await;

    assert_eq!(h.session.mode(), None);
    assert_eq!(h.session.active_player_count(), 0);
    assert!(h.mock.sent().is_empty());
    let view = h.session.snapshot();
    assert!(view.controls.iter().all(|c| c.state() == VisualState::Disabled));
    assert!(matches!(
        h.session.click(1, Verb::Play).await,
        Err(ClickError::Unavailable { player: 1, verb: Verb::Play })
    ));
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn unknown_persisted_mode_is_ignored() {
    let h = harness(Some("9"), P1_IDLE);
    h.session.start().await;
    assert_eq!(h.session.mode(), None);
    assert!(h.mock.sent().is_empty());
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn start_loads_catalog() {
    let h = harness(Some("0"), P1_IDLE);
    h.mock.set_catalog(Ok(r#"<toc><show index="1">Opening</show><show index="02">Finale</show></toc>"#.into()));
    h.session.start().await;

    let view = h.session.snapshot();
    assert_eq!(view.catalog.entries().len(), 2);
    assert_eq!(view.catalog.label(&ShowId::new("01")), Some("Opening"));
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn catalog_failure_does_not_block_polling() {
    let h = harness(Some("0"), P1_PLAYING_03);
    h.mock.set_catalog(Err(DeviceError::HttpStatus { status: 404 }));
    h.session.start().await;
    tokio::time::sleep(ms(10)).await;

    assert!(h.session.snapshot().catalog.is_empty());
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::Active);
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn reconciliation_bumps_revision() {
    let h = harness(Some("0"), P1_PLAYING_03);
    let mut revisions = h.session.subscribe();
    h.session.start().await;
    revisions.borrow_and_update();

    tokio::time::sleep(ms(10)).await;
    assert!(revisions.has_changed().unwrap());
    h.session.stop();
}

// =============================================================================
// clicks
// =============================================================================

#[tokio::test(start_paused = true)]
async fn select_then_play_round_trip() {
    let h = harness(Some("0"), P1_IDLE);
    h.session.start().await;
    tokio::time::sleep(ms(10)).await;
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::Disabled);

    assert!(h.session.select_show(1, ShowId::new("03")));
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::Enabled);

    h.mock.set_command_latency(ms(100));
    h.mock.set_status(P1_PLAYING_03);
    let click = tokio::spawn({
        let session = h.session.clone();
        async move { session.click(1, Verb::Play).await }
    });

    tokio::time::sleep(ms(1)).await;
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::InFlight);
    assert!(!h.session.is_polling_active());

    assert_eq!(click.await.unwrap().unwrap(), "1ST03");
    assert_eq!(h.mock.sent(), vec!["MS0", "1ST03"]);
    let fetches = h.mock.status_fetches();

    tokio::time::sleep(ms(600)).await;
    assert_eq!(h.mock.status_fetches(), fetches, "polling held during settle delay");
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::InFlight);

    tokio::time::sleep(ms(100)).await;
    assert_eq!(h.mock.status_fetches(), fetches + 1);
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::Active);
    assert!(h.session.is_polling_active());
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn snapshot_fetched_before_a_click_cannot_clear_in_flight() {
    let h = harness(None, P1_IDLE);
    h.session.assume_mode(Mode::Single);
    h.session.select_show(1, ShowId::new("03"));
    let before_click = h.session.poller.snapshot_now(status::parse_status(P1_PLAYING_03).unwrap());

    h.mock.set_command_latency(ms(100));
    let click = tokio::spawn({
        let session = h.session.clone();
        async move { session.click(1, Verb::Play).await }
    });
    tokio::time::sleep(ms(1)).await;
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::InFlight);

    assert_eq!(apply_snapshot(&h.session.model, &h.session.poller, &before_click), None);
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::InFlight);
    assert!(matches!(
        h.session.click(1, Verb::Play).await,
        Err(ClickError::InFlight { player: 1, verb: Verb::Play })
    ));

    click.await.unwrap().unwrap();
    assert_eq!(apply_snapshot(&h.session.model, &h.session.poller, &before_click), None);
    let fresh = h.session.poller.snapshot_now(status::parse_status(P1_PLAYING_03).unwrap());
    assert!(apply_snapshot(&h.session.model, &h.session.poller, &fresh).is_some());
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::Active);
    assert_eq!(h.mock.sent(), vec!["1ST03"]);
}

#[tokio::test(start_paused = true)]
async fn reclick_while_in_flight_is_rejected() {
    let h = harness(Some("0"), P1_PLAYING_03);
    h.session.start().await;
    tokio::time::sleep(ms(10)).await;

    assert_eq!(h.session.click(1, Verb::Stop).await.unwrap(), "1SP");
    assert!(matches!(
        h.session.click(1, Verb::Stop).await,
        Err(ClickError::InFlight { player: 1, verb: Verb::Stop })
    ));
    assert_eq!(h.mock.sent(), vec!["MS0", "1SP"]);
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn failed_send_reverts_and_resumes_polling() {
    let h = harness(Some("0"), P1_PLAYING_03);
    h.session.start().await;
    tokio::time::sleep(ms(10)).await;
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::Active);

    h.mock.fail_commands(Some(DeviceError::Network("refused".into())));
    let result = h.session.click(1, Verb::Play).await;
    assert!(matches!(result, Err(ClickError::Send(DeviceError::Network(_)))));
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::Active);
    assert!(h.session.is_polling_active());

    let fetches = h.mock.status_fetches();
    tokio::time::sleep(ms(10)).await;
    assert_eq!(h.mock.status_fetches(), fetches + 1, "polls right away after a failure");
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn hold_toggles_to_continue_while_held() {
    let h = harness(Some("1"), &multi_status(&[(3, "hold", "05")]));
    h.session.start().await;
    tokio::time::sleep(ms(10)).await;
    assert_eq!(state(&h.session, 3, Verb::Hold), VisualState::Active);

    assert_eq!(h.session.click(3, Verb::Hold).await.unwrap(), "3CT");
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn clicks_outside_mode_or_grid_are_rejected() {
    let h = harness(Some("0"), &multi_status(&[(1, "stop", "02"), (2, "stop", "02")]));
    h.session.start().await;
    tokio::time::sleep(ms(10)).await;

    assert!(matches!(h.session.click(2, Verb::Play).await, Err(ClickError::Unavailable { .. })));
    assert!(matches!(h.session.click(1, Verb::Record).await, Err(ClickError::Unavailable { .. })));
    assert!(matches!(h.session.click(9, Verb::Play).await, Err(ClickError::UnknownControl { .. })));
    assert!(matches!(h.session.click(1, Verb::Mode).await, Err(ClickError::UnknownControl { .. })));
    assert_eq!(h.mock.sent(), vec!["MS0"]);
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn click_without_show_is_disabled() {
    let h = harness(Some("0"), P1_IDLE);
    h.session.start().await;
    tokio::time::sleep(ms(10)).await;
    assert!(matches!(h.session.click(1, Verb::Play).await, Err(ClickError::Disabled { .. })));
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn pending_selection_survives_polls_until_sent() {
    let h = harness(Some("0"), &multi_status(&[(1, "stop", "02")]));
    h.session.start().await;
    tokio::time::sleep(ms(10)).await;

    h.session.select_show(1, ShowId::new("07"));
    tokio::time::sleep(ms(1000)).await;
    let view = h.session.snapshot();
    let panel = view.controls.player(1).unwrap();
    assert_eq!(panel.selection().as_str(), "07");
    assert!(panel.has_pending_selection());

    assert_eq!(h.session.click(1, Verb::Load).await.unwrap(), "1LD07");
    assert!(!h.session.snapshot().controls.player(1).unwrap().has_pending_selection());
    h.session.stop();
}

// =============================================================================
// mode transitions
// =============================================================================

#[tokio::test(start_paused = true)]
async fn multi_to_single_declined_rolls_back() {
    let h = harness(Some("2"), P1_IDLE);
    h.session.start().await;

    let outcome = h.session.change_mode(Mode::Single, &AutoConfirm(false)).await.unwrap();
    assert_eq!(outcome, ModeOutcome::Cancelled);
    let view = h.session.snapshot();
    assert_eq!(view.mode, Some(Mode::MultiLtp));
    assert_eq!(view.selector, Some(Mode::MultiLtp));
    assert_eq!(h.mock.sent(), vec!["MS2"]);
    assert_eq!(stored_mode(&h.prefs).as_deref(), Some("2"));
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn multi_to_single_confirmed_applies_and_persists() {
    let h = harness(Some("1"), &multi_status(&[(1, "play", "01"), (2, "play", "02")]));
    h.session.start().await;
    tokio::time::sleep(ms(10)).await;
    assert_eq!(state(&h.session, 2, Verb::Stop), VisualState::Enabled);

    let outcome = h.session.change_mode(Mode::Single, &AutoConfirm(true)).await.unwrap();
    assert_eq!(outcome, ModeOutcome::Applied(Mode::Single));
    assert_eq!(h.mock.sent(), vec!["MS1", "MS0"]);
    assert_eq!(stored_mode(&h.prefs).as_deref(), Some("0"));
    assert_eq!(h.session.active_player_count(), 1);
    assert_eq!(state(&h.session, 2, Verb::Stop), VisualState::Disabled);
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn single_to_recording_needs_no_confirmation() {
    let h = harness(Some("0"), &multi_status(&[(1, "stop", "04")]));
    h.session.start().await;
    tokio::time::sleep(ms(10)).await;

    let outcome = h.session.change_mode(Mode::Recording, &AutoConfirm(false)).await.unwrap();
    assert_eq!(outcome, ModeOutcome::Applied(Mode::Recording));
    assert_eq!(h.mock.sent(), vec!["MS0", "MS0"]);
    assert_eq!(stored_mode(&h.prefs).as_deref(), Some("4"));
    assert_eq!(state(&h.session, 1, Verb::Record), VisualState::Enabled);
    assert_eq!(state(&h.session, 1, Verb::Play), VisualState::Disabled);
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn same_mode_is_unchanged() {
    let h = harness(Some("3"), P1_IDLE);
    h.session.start().await;
    let outcome = h.session.change_mode(Mode::MultiPriority, &AutoConfirm(false)).await.unwrap();
    assert_eq!(outcome, ModeOutcome::Unchanged);
    assert_eq!(h.mock.sent(), vec!["MS3"]);
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn failed_mode_send_rolls_back_selector() {
    let h = harness(Some("0"), P1_IDLE);
    h.session.start().await;
    h.mock.fail_commands(Some(DeviceError::HttpStatus { status: 503 }));

    let result = h.session.change_mode(Mode::MultiHtp, &AutoConfirm(true)).await;
    assert_eq!(result, Err(DeviceError::HttpStatus { status: 503 }));
    let view = h.session.snapshot();
    assert_eq!(view.mode, Some(Mode::Single));
    assert_eq!(view.selector, Some(Mode::Single));
    assert_eq!(stored_mode(&h.prefs).as_deref(), Some("0"));
    assert!(view.polling_active);
    h.session.stop();
}

#[tokio::test(start_paused = true)]
async fn first_mode_choice_proceeds_and_persists() {
    let h = harness(None, P1_IDLE);
    h.session.start().await;
    let outcome = h.session.change_mode(Mode::MultiHtp, &AutoConfirm(false)).await.unwrap();
    assert_eq!(outcome, ModeOutcome::Applied(Mode::MultiHtp));
    assert_eq!(h.mock.sent(), vec!["MS1"]);
    assert_eq!(stored_mode(&h.prefs).as_deref(), Some("1"));
    h.session.stop();
}
