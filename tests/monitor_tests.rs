mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use common::*;
use hockey_score_notifier::error::MonitorError;
use hockey_score_notifier::event::NotificationEvent;
use hockey_score_notifier::game::{GameStatus, PlayId, ScorePair, Side};
use hockey_score_notifier::monitor::GameMonitor;
use hockey_score_notifier::source::Schedule;
use hockey_score_notifier::store::{MemoryStore, StateStore};

/// 07:00 in Los Angeles on game day.
fn seven_am() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 10, 2, 14, 0, 0).unwrap()
}

fn six_am() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 10, 2, 13, 0, 0).unwrap()
}

async fn monitor(h: &Harness, status: &str) -> GameMonitor {
    GameMonitor::initialize(h.ctx.clone(), &schedule(status)).await.expect("initialize")
}

fn play_ids(events: &[NotificationEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| match e {
            NotificationEvent::Score(u) | NotificationEvent::GameWinningScore(u) => u.play_id.to_string(),
            NotificationEvent::PreGame(_) => "pre".to_string(),
        })
        .collect()
}

#[tokio::test]
async fn initialize_resolves_teams_and_persists_static_fields() {
    let h = Harness::new(live("Scheduled", vec![]));
    let m = monitor(&h, "Scheduled").await;

    let game = m.game();
    assert_eq!(game.home.name, "Golden Knights");
    assert_eq!(game.away.name, "Sharks");
    assert_eq!(game.tracked, Side::Home);
    assert_eq!(game.status(), GameStatus::Scheduled);
    assert_eq!(game.to_string(), "Sharks @ Golden Knights");
    assert_eq!(h.teams.calls_for(VGK), 1);
    assert_eq!(h.teams.calls_for(SJS), 1);

    assert_eq!(h.store_value("pre_updated").as_deref(), Some("2019-10-02"));
    assert_eq!(h.store_value("status").as_deref(), Some("Scheduled"));
    assert_eq!(h.store_value("my_field").as_deref(), Some("home"));
    assert_eq!(h.store_value("opp_id").as_deref(), Some("28"));
    assert_eq!(h.store_value("venue").as_deref(), Some("T-Mobile Arena"));
    assert!(h.store_value("home_team").unwrap().contains("Vegas Golden Knights"));
}

#[tokio::test]
async fn initialize_with_empty_schedule_reports_schedule_empty() {
    let h = Harness::new(live("Scheduled", vec![]));
    let empty = Schedule { date: game_date(), total_games: 0, games: vec![] };

    let err = GameMonitor::initialize(h.ctx.clone(), &empty).await.err().expect("should fail");
    assert!(matches!(err, MonitorError::ScheduleEmpty { date } if date == game_date()));
    assert_eq!(h.teams.total_calls(), 0);
}

#[tokio::test]
async fn initialize_fails_when_a_team_cannot_be_resolved() {
    let h = Harness::new(live("Scheduled", vec![]));
    h.teams.failing.lock().push(SJS);

    let err = GameMonitor::initialize(h.ctx.clone(), &schedule("Scheduled")).await.err().expect("should fail");
    assert!(matches!(err, MonitorError::Upstream(_)));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn pre_game_fires_once_at_trigger_hour() {
    let h = Harness::new(live("Scheduled", vec![]));
    let mut m = monitor(&h, "Scheduled").await;

    assert!(m.tick_at(six_am()).unwrap().is_empty());

    let events = m.tick_at(seven_am()).unwrap();
    assert_eq!(events.len(), 1);
    let NotificationEvent::PreGame(notice) = &events[0] else { panic!("expected pre-game, got {events:?}") };
    assert_eq!(notice.my_team, "Golden Knights");
    assert_eq!(notice.opponent_full_name, "San Jose Sharks");
    assert_eq!(notice.start_local, "7:00 PM");
    assert!(m.game().pre_notification_sent());
    assert_eq!(h.store_value("pre_sent").as_deref(), Some("Yes"));

    assert!(m.tick_at(seven_am()).unwrap().is_empty());
    assert!(m.tick_at(seven_am() + chrono::Duration::hours(3)).unwrap().is_empty());
}

#[tokio::test]
async fn single_goal_emits_score_and_records_state() {
    let h = Harness::new(live("In Progress", vec![("5", goal(VGK, 1, 0))]));
    let mut m = monitor(&h, "In Progress").await;

    let events = m.tick_at(seven_am()).unwrap();
    assert_eq!(events.len(), 1);
    let NotificationEvent::Score(update) = &events[0] else { panic!("expected score, got {events:?}") };
    assert_eq!((update.my_score, update.opponent_score), (1, 0));
    assert!(update.we_scored());
    assert_eq!(update.period, "2nd");
    assert_eq!(update.time_remaining, "12:34");

    let notified: Vec<&PlayId> = m.game().notified_plays().iter().collect();
    assert_eq!(notified, vec![&PlayId::from("5")]);
    assert_eq!(m.game().past_scores(), &[ScorePair(1, 0)]);
    assert_eq!(h.store_value("notified_plays").as_deref(), Some(r#"["5"]"#));
    assert_eq!(h.store_value("past_scores").as_deref(), Some("[[1,0]]"));
}

#[tokio::test]
async fn scoring_play_is_notified_at_most_once() {
    let h = Harness::new(live("In Progress", vec![("5", goal(VGK, 1, 0))]));
    let mut m = monitor(&h, "In Progress").await;

    assert_eq!(m.tick_at(seven_am()).unwrap().len(), 1);
    for _ in 0..3 {
        assert!(m.tick_at(seven_am()).unwrap().is_empty());
    }

    h.live.set(live("In Progress", vec![("5", goal(VGK, 1, 0)), ("12", goal(SJS, 1, 1))]));
    assert_eq!(play_ids(&m.tick_at(seven_am()).unwrap()), vec!["12"]);
    assert!(m.tick_at(seven_am()).unwrap().is_empty());
}

#[tokio::test]
async fn unnotified_plays_are_emitted_in_ascending_order() {
    let h = Harness::new(live(
        "In Progress",
        vec![("7", goal(VGK, 2, 0)), ("3", goal(VGK, 1, 0)), ("9", goal(SJS, 2, 1))],
    ));
    let mut m = monitor(&h, "In Progress").await;

    assert_eq!(play_ids(&m.tick_at(seven_am()).unwrap()), vec!["3", "7", "9"]);
    assert_eq!(m.game().past_scores(), &[ScorePair(1, 0), ScorePair(2, 0), ScorePair(2, 1)]);
}

#[tokio::test]
async fn numeric_play_ids_order_numerically() {
    let h = Harness::new(live("In Progress", vec![("10", goal(VGK, 2, 0)), ("9", goal(VGK, 1, 0))]));
    let mut m = monitor(&h, "In Progress").await;

    assert_eq!(play_ids(&m.tick_at(seven_am()).unwrap()), vec!["9", "10"]);
}

#[tokio::test]
async fn repeated_score_pair_is_marked_but_not_dispatched() {
    let h = Harness::new(live("In Progress", vec![("5", goal(VGK, 1, 0))]));
    let mut m = monitor(&h, "In Progress").await;
    assert_eq!(m.tick_at(seven_am()).unwrap().len(), 1);

    // Upstream re-issues the same goal under a new id.
    h.live.set(live("In Progress", vec![("5", goal(VGK, 1, 0)), ("6", goal(VGK, 1, 0))]));
    assert!(m.tick_at(seven_am()).unwrap().is_empty());
    assert!(m.game().is_notified(&PlayId::from("6")));
    assert_eq!(m.game().past_scores(), &[ScorePair(1, 0)]);
    assert_eq!(h.store_value("notified_plays").as_deref(), Some(r#"["5","6"]"#));
}

#[tokio::test]
async fn game_winning_goal_against_us_uses_their_framing() {
    let mut winner = goal(SJS, 2, 3);
    winner.game_winning = true;
    winner.period = "OT".into();
    let h = Harness::new(live("Game Over", vec![("40", winner)]));
    let mut m = monitor(&h, "In Progress").await;

    let events = m.tick_at(seven_am()).unwrap();
    let NotificationEvent::GameWinningScore(update) = &events[0] else { panic!("expected winner, got {events:?}") };
    assert!(!update.we_scored());
    assert_eq!(update.scoring_side, Side::Away);
    assert_eq!(update.scorer(), "Sharks");
    assert_eq!((update.my_score, update.opponent_score), (2, 3));
}

#[tokio::test]
async fn away_tracking_flips_score_perspective() {
    let mut h = Harness::new(live("In Progress", vec![("5", goal(SJS, 0, 1))]));
    h.ctx.settings.tracked_team = Some(SJS);
    let mut m = monitor(&h, "In Progress").await;
    assert_eq!(m.game().tracked, Side::Away);

    let events = m.tick_at(seven_am()).unwrap();
    let NotificationEvent::Score(update) = &events[0] else { panic!("expected score, got {events:?}") };
    assert!(update.we_scored());
    assert_eq!(update.my_team, "Sharks");
    assert_eq!((update.my_score, update.opponent_score), (1, 0));
    assert_eq!(h.store_value("my_field").as_deref(), Some("away"));
}

#[tokio::test]
async fn status_never_regresses() {
    let h = Harness::new(live("In Progress", vec![]));
    let mut m = monitor(&h, "Scheduled").await;

    m.tick_at(six_am()).unwrap();
    assert_eq!(m.game().status(), GameStatus::InProgress);
    assert_eq!(h.store_value("status").as_deref(), Some("InProgress"));

    h.live.set(live("Scheduled", vec![]));
    let events = m.tick_at(seven_am()).unwrap();
    assert_eq!(m.game().status(), GameStatus::InProgress);
    assert!(events.is_empty(), "a regressed poll must not trigger the pre-game message");
}

#[tokio::test]
async fn final_after_announcement_archives_and_clears_state() {
    let h = Harness::new(live("Scheduled", vec![]));
    let mut m = monitor(&h, "Scheduled").await;
    assert_eq!(m.tick_at(seven_am()).unwrap().len(), 1);
    assert!(!h.store.is_empty());

    h.live.set(live("Final", vec![]));
    assert!(m.tick_at(seven_am()).unwrap().is_empty());
    assert_eq!(m.game().status(), GameStatus::Archived);
    assert!(m.is_finished());
    assert!(h.store.is_empty());

    // Archived games are no longer polled.
    let calls = h.live.calls();
    assert!(m.tick_at(seven_am()).unwrap().is_empty());
    assert_eq!(h.live.calls(), calls);
}

#[tokio::test]
async fn final_without_announcement_is_a_no_op() {
    let h = Harness::new(live("Final", vec![]));
    let mut m = monitor(&h, "In Progress").await;
    let stored = h.store.len();

    assert!(m.tick_at(seven_am()).unwrap().is_empty());
    assert_eq!(m.game().status(), GameStatus::Final);
    assert_eq!(h.store.len(), stored);
    assert!(m.is_finished());
}

#[tokio::test]
async fn goals_seen_only_in_the_final_poll_are_still_announced() {
    let h = Harness::new(live("In Progress", vec![("5", goal(VGK, 1, 0))]));
    let mut m = monitor(&h, "In Progress").await;
    assert_eq!(m.tick_at(seven_am()).unwrap().len(), 1);

    h.live.set(live("Final", vec![("5", goal(VGK, 1, 0)), ("8", goal(VGK, 2, 0))]));
    assert_eq!(play_ids(&m.tick_at(seven_am()).unwrap()), vec!["8"]);
    assert!(m.tick_at(seven_am()).unwrap().is_empty());
}

#[tokio::test]
async fn rediscovery_after_archival_starts_clean() {
    let h = Harness::new(live("Scheduled", vec![]));
    let mut m = monitor(&h, "Scheduled").await;
    m.tick_at(seven_am()).unwrap();
    h.live.set(live("In Progress", vec![("5", goal(VGK, 1, 0))]));
    m.tick_at(seven_am()).unwrap();
    h.live.set(live("Final", vec![("5", goal(VGK, 1, 0))]));
    m.tick_at(seven_am()).unwrap();
    assert_eq!(m.game().status(), GameStatus::Archived);

    let fresh = monitor(&h, "Final").await;
    assert_eq!(fresh.game().status(), GameStatus::Final);
    assert!(fresh.game().notified_plays().is_empty());
    assert!(fresh.game().past_scores().is_empty());
    assert!(!fresh.game().pre_notification_sent());
    assert!(h.store.is_empty(), "a game first seen as final is not persisted");
}

#[tokio::test]
async fn restart_resumes_from_persisted_state() {
    let store = Arc::new(MemoryStore::new());
    let h = Harness::with_store(live("In Progress", vec![("5", goal(VGK, 1, 0))]), store.clone());
    let mut m = monitor(&h, "In Progress").await;
    assert_eq!(m.tick_at(seven_am()).unwrap().len(), 1);
    drop(m);

    // New process: fresh caches and sources, same store.
    let h = Harness::with_store(live("In Progress", vec![("5", goal(VGK, 1, 0))]), store);
    let mut m = monitor(&h, "Scheduled").await;
    assert_eq!(h.teams.total_calls(), 0, "teams come from the store on the same day");
    assert_eq!(m.game().status(), GameStatus::InProgress);
    assert!(m.game().is_notified(&PlayId::from("5")));
    assert!(m.tick_at(seven_am()).unwrap().is_empty());
}

#[tokio::test]
async fn rescheduled_game_ignores_state_from_its_original_date() {
    let h = Harness::new(live("Scheduled", vec![]));
    let mut m = monitor(&h, "Scheduled").await;
    // Postponed before the morning message went out: final, nothing announced, nothing cleared.
    let five_am = Utc.with_ymd_and_hms(2019, 10, 2, 12, 0, 0).unwrap();
    assert!(m.tick_at(five_am).unwrap().is_empty());
    h.live.set(live("Postponed", vec![]));
    assert!(m.tick_at(five_am).unwrap().is_empty());
    assert!(m.is_finished());
    assert_eq!(h.store_value("status").as_deref(), Some("Final"));

    let new_date = NaiveDate::from_ymd_opt(2019, 11, 20).unwrap();
    let mut entry = scheduled_game("Scheduled");
    entry.start = Utc.with_ymd_and_hms(2019, 11, 21, 3, 0, 0).unwrap();
    let rescheduled = Schedule { date: new_date, total_games: 1, games: vec![entry] };
    h.live.set(live("Scheduled", vec![]));
    let mut m = GameMonitor::initialize(h.ctx.clone(), &rescheduled).await.expect("initialize");

    assert_eq!(m.game().status(), GameStatus::Scheduled);
    assert!(!m.is_finished());
    assert!(!m.game().pre_notification_sent());
    assert_eq!(h.store_value("status").as_deref(), Some("Scheduled"));
    assert_eq!(h.store_value("pre_updated").as_deref(), Some("2019-11-20"));
    assert!(h.store_value("home_team").is_some());

    // 07:00 PST on the new date.
    let events = m.tick_at(Utc.with_ymd_and_hms(2019, 11, 20, 15, 0, 0).unwrap()).unwrap();
    let NotificationEvent::PreGame(notice) = &events[0] else { panic!("expected pre-game, got {events:?}") };
    assert_eq!(notice.start_local, "7:00 PM");
}

#[tokio::test]
async fn stale_progress_does_not_suppress_goals_after_rescheduling() {
    let store = Arc::new(MemoryStore::new());
    store.set(&format!("game:{GAME}:pre_updated"), "2019-09-30").unwrap();
    store.set(&format!("game:{GAME}:status"), "InProgress").unwrap();
    store.set(&format!("game:{GAME}:notified_plays"), r#"["5"]"#).unwrap();
    store.set(&format!("game:{GAME}:past_scores"), "[[1,0]]").unwrap();
    let h = Harness::with_store(live("In Progress", vec![("5", goal(VGK, 1, 0))]), store);

    let mut m = monitor(&h, "In Progress").await;
    assert!(m.game().notified_plays().is_empty());
    assert!(m.game().past_scores().is_empty());
    assert_eq!(play_ids(&m.tick_at(seven_am()).unwrap()), vec!["5"]);
}

#[tokio::test]
async fn corrupt_persisted_collections_are_treated_as_empty() {
    let store = Arc::new(MemoryStore::new());
    store.set(&format!("game:{GAME}:pre_updated"), "2019-10-02").unwrap();
    store.set(&format!("game:{GAME}:notified_plays"), "{not json").unwrap();
    store.set(&format!("game:{GAME}:past_scores"), "[[1,").unwrap();
    let h = Harness::with_store(live("In Progress", vec![("5", goal(VGK, 1, 0))]), store);

    let mut m = monitor(&h, "In Progress").await;
    assert!(m.game().notified_plays().is_empty());
    assert_eq!(m.tick_at(seven_am()).unwrap().len(), 1);
    assert_eq!(h.store_value("notified_plays").as_deref(), Some(r#"["5"]"#));
}

#[tokio::test]
async fn upstream_failure_surfaces_from_tick() {
    let h = Harness::new(live("In Progress", vec![]));
    let mut m = monitor(&h, "In Progress").await;
    h.live.push_error();

    assert!(matches!(m.tick_at(seven_am()), Err(MonitorError::Upstream(_))));
    assert!(m.tick_at(seven_am()).is_ok());
}

#[tokio::test]
async fn scoring_play_missing_from_feed_is_an_upstream_error() {
    let mut data = live("In Progress", vec![("5", goal(VGK, 1, 0))]);
    data.scoring_plays.push(PlayId::from("99"));
    let h = Harness::new(data);
    let mut m = monitor(&h, "In Progress").await;

    assert!(matches!(m.tick_at(seven_am()), Err(MonitorError::Upstream(_))));
    assert!(m.game().notified_plays().is_empty(), "a malformed batch is not partially applied");
    assert!(m.game().past_scores().is_empty());
}

#[tokio::test]
async fn unknown_status_is_an_upstream_error() {
    let h = Harness::new(live("Suspended by Aliens", vec![]));
    let mut m = monitor(&h, "In Progress").await;

    assert!(matches!(m.tick_at(seven_am()), Err(MonitorError::Upstream(_))));
    assert_eq!(m.game().status(), GameStatus::InProgress);
}

#[tokio::test]
async fn run_survives_poll_failures_and_exits_after_archival() {
    let h = Harness::new(live("Scheduled", vec![]));
    let mut m = monitor(&h, "Scheduled").await;
    m.tick_at(seven_am()).unwrap();

    h.live.push_error();
    h.live.push_error();
    h.live.set(live("Final", vec![]));
    let game = tokio::task::spawn_blocking(move || m.run()).await.unwrap();

    assert_eq!(game.status(), GameStatus::Archived);
    assert!(game.cancel_requested());
    assert!(h.live.calls() >= 4);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn run_dispatches_events_and_honours_cancellation() {
    let h = Harness::new(live("In Progress", vec![("5", goal(VGK, 1, 0))]));
    let m = monitor(&h, "In Progress").await;
    let cancel = m.game().cancel_flag().clone();

    let task = tokio::task::spawn_blocking(move || m.run());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());
    cancel.cancel();
    let game = task.await.unwrap();

    assert_eq!(game.status(), GameStatus::InProgress);
    let sent = h.notifier.sent.lock().clone();
    assert_eq!(sent.len(), 2, "one message per recipient, sent once");
    assert!(sent.iter().all(|(message, _, sender)| message.starts_with("Golden Knights score!!") && sender == "+15550000000"));
}

/// Run a monitor on an in-progress game for `window` and count the polls it made.
async fn polls_within(cycle: Duration, latency: Duration, window: Duration) -> usize {
    let mut h = Harness::new(live("In Progress", vec![]));
    h.ctx.settings.cycle_interval = cycle;
    let m = monitor(&h, "In Progress").await;
    h.live.set_latency(latency);
    let cancel = m.game().cancel_flag().clone();

    let task = tokio::task::spawn_blocking(move || m.run());
    tokio::time::sleep(window).await;
    cancel.cancel();
    task.await.unwrap();
    h.live.calls()
}

#[tokio::test(flavor = "multi_thread")]
async fn run_polls_once_per_cycle_without_spinning() {
    // 400ms at a 40ms cycle is about ten polls; a loop that never sleeps would make hundreds.
    let polls = polls_within(Duration::from_millis(40), Duration::ZERO, Duration::from_millis(400)).await;
    assert!((7..=13).contains(&polls), "polls = {polls}");
}

#[tokio::test(flavor = "multi_thread")]
async fn run_counts_fetch_latency_against_the_cycle() {
    // A 30ms fetch inside a 40ms cycle still gives about ten polls in 400ms. Sleeping the full
    // cycle after each fetch would drop that to about six; not sleeping at all would give
    // about thirteen.
    let polls = polls_within(Duration::from_millis(40), Duration::from_millis(30), Duration::from_millis(400)).await;
    assert!((8..=12).contains(&polls), "polls = {polls}");
}
