use crate::{
    config::Config,
    location::{LocationError, LocationEvent, LocationService, Subscription, WatchOptions},
    model::{EvaluationSession, GeoPath, GeoPoint, GradeMap, IncidentEvent},
    util::{now_millis, now_rfc3339},
};
use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    Inactive,
    Searching,
    Active,
    /// Inactive because the platform has no location capability or the watch failed.
    Unavailable,
}

/// Short haptic or visual cue raised when an incident is flagged.
pub trait IncidentAlert {
    fn raise(&mut self, pattern_ms: &[u64]) -> Result<()>;
}

/// Default alert: a log line.
pub struct LogAlert;

impl IncidentAlert for LogAlert {
    fn raise(&mut self, pattern_ms: &[u64]) -> Result<()> {
        warn!(?pattern_ms, "critical incident flagged");
        Ok(())
    }
}

/// Owns the path and incident buffers of one evaluation drive.
pub struct SessionRecorder {
    location: Option<Box<dyn LocationService>>,
    alert: Box<dyn IncidentAlert>,
    options: WatchOptions,
    vibrate_pattern_ms: Vec<u64>,
    subscription: Option<Subscription>,
    watch_started: Option<Instant>,
    status: TrackingStatus,
    path: GeoPath,
    incidents: Vec<IncidentEvent>,
    last_known: Option<GeoPoint>,
    started_at_millis: Option<i64>,
}

impl SessionRecorder {
    /// `location` is `None` when the platform has no location capability.
    pub fn new(cfg: &Config, location: Option<Box<dyn LocationService>>) -> Self {
        Self {
            location,
            alert: Box::new(LogAlert),
            options: WatchOptions::from(&cfg.tracking),
            vibrate_pattern_ms: cfg.incident.vibrate_pattern_ms.clone(),
            subscription: None,
            watch_started: None,
            status: TrackingStatus::Inactive,
            path: GeoPath::new(),
            incidents: Vec::new(),
            last_known: None,
            started_at_millis: None,
        }
    }

    pub fn with_alert(mut self, alert: Box<dyn IncidentAlert>) -> Self {
        self.alert = alert;
        self
    }

    pub fn status(&self) -> TrackingStatus {
        self.status
    }

    pub fn path(&self) -> &GeoPath {
        &self.path
    }

    pub fn incidents(&self) -> &[IncidentEvent] {
        &self.incidents
    }

    pub fn last_known(&self) -> Option<GeoPoint> {
        self.last_known
    }

    /// Wall-clock time of the first successful watch, if any.
    pub fn started_at_millis(&self) -> Option<i64> {
        self.started_at_millis
    }

    pub fn start_tracking(&mut self) {
        if self.subscription.is_some() {
            debug!("replacing active location subscription");
            self.release_subscription();
        }
        let Some(service) = self.location.as_mut() else {
            warn!("no location capability; tracking unavailable");
            self.status = TrackingStatus::Unavailable;
            return;
        };

        self.status = TrackingStatus::Searching;
        match service.watch(&self.options) {
            Ok(sub) => {
                info!(subscription = sub.id(), "location watch started");
                self.started_at_millis.get_or_insert_with(now_millis);
                self.subscription = Some(sub);
                self.watch_started = Some(Instant::now());
            }
            Err(err) => {
                warn!("location watch refused: {err}");
                self.status = TrackingStatus::Unavailable;
            }
        }
    }

    /// Processes every queued location event in arrival order.
    pub fn pump(&mut self) {
        while let Some(ev) = self.subscription.as_ref().and_then(Subscription::try_next) {
            match ev {
                LocationEvent::Fix(fix) => {
                    let point = GeoPoint::new(fix.latitude, fix.longitude, fix.at_millis);
                    if self.status != TrackingStatus::Active {
                        info!("first fix acquired");
                    }
                    debug!(lat = point.latitude, lng = point.longitude, "fix");
                    self.status = TrackingStatus::Active;
                    self.last_known = Some(point);
                    self.path.push(point);
                }
                LocationEvent::Error(err) => {
                    self.fail(err);
                    return;
                }
            }
        }

        if self.status == TrackingStatus::Searching {
            let limit = Duration::from_millis(self.options.fix_timeout_ms);
            if self.watch_started.is_some_and(|t| t.elapsed() > limit) {
                self.fail(LocationError::Timeout(self.options.fix_timeout_ms));
            }
        }
    }

    pub fn stop_tracking(&mut self) {
        if self.subscription.is_some() {
            info!(points = self.path.len(), "location watch stopped");
        }
        self.release_subscription();
        self.status = TrackingStatus::Inactive;
    }

    /// Flags a critical incident at the last known location. Never fails.
    pub fn record_incident(&mut self, note: &str) -> &IncidentEvent {
        self.pump();
        let at = now_millis();
        let location = self.last_known.unwrap_or_else(|| GeoPoint::zero(at));
        if let Err(err) = self.alert.raise(&self.vibrate_pattern_ms) {
            debug!("incident alert failed: {err:#}");
        }
        let incident = IncidentEvent {
            id: Uuid::new_v4().simple().to_string(),
            location,
            note: note.to_string(),
            captured_at_millis: at,
        };
        info!(id = %incident.id, lat = location.latitude, lng = location.longitude, "incident recorded");
        let idx = self.incidents.len();
        self.incidents.push(incident);
        &self.incidents[idx]
    }

    /// Stops tracking and snapshots the drive. Later events never reach the snapshot.
    pub fn finalize(&mut self, student_id: &str, grades: GradeMap) -> EvaluationSession {
        self.pump();
        self.stop_tracking();
        info!(
            student = student_id,
            points = self.path.len(),
            incidents = self.incidents.len(),
            "session finalized"
        );
        let started_at = self.started_at_millis.unwrap_or_else(now_millis);
        EvaluationSession::new(
            student_id.to_string(),
            now_rfc3339(),
            started_at,
            grades,
            self.path.clone(),
            self.incidents.clone(),
        )
    }

    fn fail(&mut self, err: LocationError) {
        warn!("location tracking failed: {err}");
        self.release_subscription();
        self.status = TrackingStatus::Unavailable;
    }

    fn release_subscription(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.cancel();
        }
        self.watch_started = None;
    }
}

impl std::fmt::Debug for SessionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecorder")
            .field("status", &self.status)
            .field("points", &self.path.len())
            .field("incidents", &self.incidents.len())
            .finish()
    }
}
