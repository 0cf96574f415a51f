//! Replays a recorded drive log (JSON lines) through a recorder.
//!
//! ```text
//! {"kind":"fix","lat":44.41,"lng":8.93,"timestamp":1700000000000}
//! {"kind":"incident","note":"Precedenza non data"}
//! {"kind":"error","message":"signal lost"}
//! ```

use crate::{
    location::{FixFeeder, LocationError},
    recorder::SessionRecorder,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriveEvent {
    Fix {
        lat: f64,
        lng: f64,
        timestamp: i64,
    },
    Error {
        message: String,
    },
    Incident {
        #[serde(default)]
        note: Option<String>,
    },
}

pub fn parse_drive_log(raw: &str) -> Result<Vec<DriveEvent>> {
    raw.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .map(|(i, l)| {
            serde_json::from_str(l).with_context(|| format!("drive log line {}", i + 1))
        })
        .collect()
}

pub fn load_drive_log(path: &Path) -> Result<Vec<DriveEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading drive log: {}", path.display()))?;
    parse_drive_log(&raw)
}

/// Feeds events in order; location events go through the feed, incidents to the recorder.
pub fn replay(
    recorder: &mut SessionRecorder,
    feeder: &FixFeeder,
    events: &[DriveEvent],
    default_note: &str,
) {
    for ev in events {
        match ev {
            DriveEvent::Fix {
                lat,
                lng,
                timestamp,
            } => {
                if !feeder.push_fix(*lat, *lng, *timestamp) {
                    debug!("fix dropped: no live subscription");
                }
            }
            DriveEvent::Error { message } => {
                feeder.push_error(LocationError::PositionUnavailable(message.clone()));
            }
            DriveEvent::Incident { note } => {
                recorder.record_incident(note.as_deref().unwrap_or(default_note));
            }
        }
        recorder.pump();
    }
}
