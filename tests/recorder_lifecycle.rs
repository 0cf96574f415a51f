use anyhow::anyhow;
use dec_drive::{
    config::Config,
    location::{FixFeeder, LocationError, LocationService, ManualFeed, WatchOptions},
    model::{GeoPoint, GradeMap},
    recorder::{IncidentAlert, SessionRecorder, TrackingStatus},
    render::{Viewport, project},
    util::now_millis,
};

fn recorder_with_feed(cfg: &Config) -> (SessionRecorder, FixFeeder) {
    let feed = ManualFeed::new();
    let feeder = feed.feeder();
    (SessionRecorder::new(cfg, Some(Box::new(feed))), feeder)
}

#[test]
fn fixes_are_kept_in_arrival_order_and_snapshot_is_frozen() {
    let cfg = Config::default();
    let (mut rec, feeder) = recorder_with_feed(&cfg);
    rec.start_tracking();
    assert_eq!(rec.status(), TrackingStatus::Searching);

    assert!(feeder.push_fix(45.0, 9.0, 1));
    assert!(feeder.push_fix(45.001, 9.001, 2));
    assert!(feeder.push_fix(45.002, 9.002, 3));
    rec.pump();
    assert_eq!(rec.status(), TrackingStatus::Active);

    let expected = vec![
        GeoPoint::new(45.0, 9.0, 1),
        GeoPoint::new(45.001, 9.001, 2),
        GeoPoint::new(45.002, 9.002, 3),
    ];
    assert_eq!(rec.path().points(), expected.as_slice());

    let session = rec.finalize("1", GradeMap::new());
    assert_eq!(session.path().points(), expected.as_slice());
    assert_eq!(rec.status(), TrackingStatus::Inactive);

    // The subscription is gone, so a late fix is never delivered.
    assert!(!feeder.push_fix(45.003, 9.003, 4));
    rec.pump();
    assert_eq!(session.path().len(), 3);

    // Even a fresh watch on the live recorder leaves the snapshot alone.
    rec.start_tracking();
    feeder.push_fix(45.004, 9.004, 5);
    rec.pump();
    assert_eq!(rec.path().len(), 4);
    assert_eq!(session.path().len(), 3);
}

#[test]
fn session_without_fixes_finalizes_with_empty_path() {
    let cfg = Config::default();
    let (mut rec, _feeder) = recorder_with_feed(&cfg);
    rec.start_tracking();
    let session = rec.finalize("1", GradeMap::new());
    assert!(session.path().is_empty());

    let viewport = Viewport {
        width: 300.0,
        height: 120.0,
        padding: 20.0,
    };
    assert!(project(session.path(), session.incidents(), &viewport).is_untracked());
}

#[test]
fn incident_before_first_fix_uses_zero_location() {
    let cfg = Config::default();
    let (mut rec, _feeder) = recorder_with_feed(&cfg);
    rec.start_tracking();
    let incident = rec.record_incident("frenata brusca").clone();
    assert_eq!(incident.location.latitude, 0.0);
    assert_eq!(incident.location.longitude, 0.0);
    assert_eq!(incident.location.captured_at_millis, incident.captured_at_millis);
    assert_eq!(incident.note, "frenata brusca");
    assert_eq!(rec.incidents().len(), 1);
}

#[test]
fn incident_uses_most_recent_fix_regardless_of_status() {
    let cfg = Config::default();
    let (mut rec, feeder) = recorder_with_feed(&cfg);
    rec.start_tracking();
    feeder.push_fix(44.40, 8.90, 10);
    feeder.push_fix(44.41, 8.91, 20);

    let first = rec.record_incident("a").clone();
    assert_eq!(first.location, GeoPoint::new(44.41, 8.91, 20));

    rec.stop_tracking();
    assert_eq!(rec.last_known(), Some(GeoPoint::new(44.41, 8.91, 20)));
    let second = rec.record_incident("b").clone();
    assert_eq!(second.location, GeoPoint::new(44.41, 8.91, 20));
    assert_ne!(first.id, second.id);
    assert_eq!(rec.incidents().len(), 2);
}

#[test]
fn stop_tracking_is_idempotent_and_keeps_path() {
    let cfg = Config::default();
    let (mut rec, feeder) = recorder_with_feed(&cfg);
    rec.stop_tracking();
    rec.start_tracking();
    feeder.push_fix(1.0, 2.0, 1);
    rec.pump();
    rec.stop_tracking();
    rec.stop_tracking();
    assert_eq!(rec.status(), TrackingStatus::Inactive);
    assert_eq!(rec.path().len(), 1);
}

#[test]
fn missing_capability_leaves_tracking_unavailable() {
    let cfg = Config::default();
    let mut rec = SessionRecorder::new(&cfg, None);
    rec.start_tracking();
    assert_eq!(rec.status(), TrackingStatus::Unavailable);
    let incident = rec.record_incident("x").clone();
    assert_eq!(incident.location.latitude, 0.0);
    let session = rec.finalize("1", GradeMap::new());
    assert!(session.path().is_empty());
    assert_eq!(session.incidents().len(), 1);
}

#[test]
fn denied_permission_degrades_without_retry() {
    let cfg = Config::default();
    let mut rec = SessionRecorder::new(&cfg, Some(Box::new(ManualFeed::denied())));
    rec.start_tracking();
    assert_eq!(rec.status(), TrackingStatus::Unavailable);
    rec.pump();
    assert_eq!(rec.status(), TrackingStatus::Unavailable);
}

#[test]
fn stream_error_releases_subscription() {
    let cfg = Config::default();
    let (mut rec, feeder) = recorder_with_feed(&cfg);
    rec.start_tracking();
    feeder.push_fix(1.0, 1.0, 1);
    feeder.push_error(LocationError::PositionUnavailable("lost".into()));
    rec.pump();
    assert_eq!(rec.status(), TrackingStatus::Unavailable);
    assert_eq!(rec.path().len(), 1);
    assert!(!feeder.push_fix(2.0, 2.0, 2));

    // Only an explicit restart resumes tracking.
    rec.start_tracking();
    assert_eq!(rec.status(), TrackingStatus::Searching);
    assert!(feeder.push_fix(2.0, 2.0, 2));
    rec.pump();
    assert_eq!(rec.status(), TrackingStatus::Active);
    assert_eq!(rec.path().len(), 2);
}

#[test]
fn restarting_replaces_the_previous_subscription() {
    let cfg = Config::default();
    let (mut rec, feeder) = recorder_with_feed(&cfg);
    rec.start_tracking();
    feeder.push_fix(1.0, 1.0, 1);
    rec.start_tracking();
    // The queued fix belonged to the cancelled watch.
    feeder.push_fix(2.0, 2.0, 2);
    rec.pump();
    assert_eq!(rec.path().points(), &[GeoPoint::new(2.0, 2.0, 2)]);
}

#[test]
fn no_fix_within_timeout_marks_unavailable() {
    let mut cfg = Config::default();
    cfg.tracking.fix_timeout_ms = 1;
    let (mut rec, _feeder) = recorder_with_feed(&cfg);
    rec.start_tracking();
    std::thread::sleep(std::time::Duration::from_millis(20));
    rec.pump();
    assert_eq!(rec.status(), TrackingStatus::Unavailable);
}

#[test]
fn watch_options_come_from_tracking_config() {
    let mut cfg = Config::default();
    cfg.tracking.fix_timeout_ms = 5_000;
    let opts = WatchOptions::from(&cfg.tracking);
    let mut feed = ManualFeed::new();
    let _sub = feed.watch(&opts).expect("watch");
    let seen = feed.last_options().expect("options recorded");
    assert!(seen.high_accuracy);
    assert_eq!(seen.max_age_ms, 0);
    assert_eq!(seen.fix_timeout_ms, 5_000);
}

struct FailingAlert;

impl IncidentAlert for FailingAlert {
    fn raise(&mut self, _pattern_ms: &[u64]) -> anyhow::Result<()> {
        Err(anyhow!("no vibration motor"))
    }
}

#[test]
fn alert_failure_does_not_block_recording() {
    let cfg = Config::default();
    let mut rec = SessionRecorder::new(&cfg, None).with_alert(Box::new(FailingAlert));
    rec.record_incident("x");
    assert_eq!(rec.incidents().len(), 1);
}

#[test]
fn drive_start_is_stamped_by_the_first_successful_watch() {
    let cfg = Config::default();
    let (mut rec, _feeder) = recorder_with_feed(&cfg);
    assert_eq!(rec.started_at_millis(), None);

    std::thread::sleep(std::time::Duration::from_millis(5));
    let before = now_millis();
    rec.start_tracking();
    let started = rec.started_at_millis().unwrap();
    assert!(started >= before);

    // A restart keeps the original start.
    rec.stop_tracking();
    rec.start_tracking();
    assert_eq!(rec.started_at_millis(), Some(started));

    let session = rec.finalize("1", GradeMap::new());
    assert_eq!(session.started_at_millis(), started);

    let mut denied = SessionRecorder::new(&cfg, Some(Box::new(ManualFeed::denied())));
    denied.start_tracking();
    assert_eq!(denied.started_at_millis(), None);
}
