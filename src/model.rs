use crate::util::sha256_hex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// One location fix. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    #[serde(rename = "timestamp")]
    pub captured_at_millis: i64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, captured_at_millis: i64) -> Self {
        Self {
            latitude,
            longitude,
            captured_at_millis,
        }
    }

    /// Stand-in location for incidents flagged before any fix arrived.
    pub fn zero(captured_at_millis: i64) -> Self {
        Self::new(0.0, 0.0, captured_at_millis)
    }

    /// Great-circle distance in kilometres.
    pub fn haversine_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentEvent {
    pub id: String,
    pub location: GeoPoint,
    pub note: String,
    #[serde(rename = "timestamp")]
    pub captured_at_millis: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

/// Ordered fixes in arrival order. Only the recorder appends to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeoPath(Vec<GeoPoint>);

impl GeoPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, point: GeoPoint) {
        self.0.push(point);
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A path needs two fixes before it can be drawn as a line.
    pub fn is_tracked(&self) -> bool {
        self.0.len() >= 2
    }

    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.0.first()?;
        let init = Bounds {
            min_lat: first.latitude,
            max_lat: first.latitude,
            min_lng: first.longitude,
            max_lng: first.longitude,
        };
        Some(self.0.iter().fold(init, |b, p| Bounds {
            min_lat: b.min_lat.min(p.latitude),
            max_lat: b.max_lat.max(p.latitude),
            min_lng: b.min_lng.min(p.longitude),
            max_lng: b.max_lng.max(p.longitude),
        }))
    }

    pub fn distance_km(&self) -> f64 {
        self.0.windows(2).map(|w| w[0].haversine_km(&w[1])).sum()
    }
}

impl From<Vec<GeoPoint>> for GeoPath {
    fn from(points: Vec<GeoPoint>) -> Self {
        Self(points)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Grade {
    Good,
    Warning,
    Critical,
    #[default]
    Unset,
}

impl Grade {
    pub fn is_set(self) -> bool {
        !matches!(self, Grade::Unset)
    }

    pub fn label(self) -> &'static str {
        match self {
            Grade::Good => "OTTIMO (Verde)",
            Grade::Warning => "DA MIGLIORARE (Giallo)",
            Grade::Critical => "GRAVE (Rosso)",
            Grade::Unset => "",
        }
    }
}

impl std::str::FromStr for Grade {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GOOD" => Ok(Grade::Good),
            "WARNING" => Ok(Grade::Warning),
            "CRITICAL" => Ok(Grade::Critical),
            "UNSET" => Ok(Grade::Unset),
            other => anyhow::bail!("unknown grade: {other}"),
        }
    }
}

/// Rubric item id -> grade.
pub type GradeMap = BTreeMap<String, Grade>;

/// A finished evaluation drive as it is stored in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSession {
    #[serde(default)]
    id: String,
    student_id: String,
    date: String,
    #[serde(default)]
    started_at_millis: i64,
    scores: GradeMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feedback: Option<String>,
    #[serde(default)]
    path: GeoPath,
    #[serde(default)]
    errors: Vec<IncidentEvent>,
}

impl EvaluationSession {
    pub(crate) fn new(
        student_id: String,
        date: String,
        started_at_millis: i64,
        scores: GradeMap,
        path: GeoPath,
        errors: Vec<IncidentEvent>,
    ) -> Self {
        let id = sha256_hex(format!("{student_id}:{date}:{started_at_millis}").as_bytes());
        Self {
            id,
            student_id,
            date,
            started_at_millis,
            scores,
            feedback: None,
            path,
            errors,
        }
    }

    pub fn with_feedback(mut self, text: String) -> Self {
        self.feedback = Some(text);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn started_at_millis(&self) -> i64 {
        self.started_at_millis
    }

    pub fn scores(&self) -> &GradeMap {
        &self.scores
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn path(&self) -> &GeoPath {
        &self.path
    }

    pub fn incidents(&self) -> &[IncidentEvent] {
        &self.errors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LicenseType {
    A,
    #[default]
    B,
    C,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub license_type: LicenseType,
    #[serde(default)]
    pub total_hours: u32,
    #[serde(default)]
    pub avatar_url: String,
}

impl Student {
    pub fn new(id: String, name: String) -> Self {
        let avatar_url = avatar_url_for(&name);
        Self {
            id,
            name,
            phone_number: None,
            license_type: LicenseType::B,
            total_hours: 0,
            avatar_url,
        }
    }
}

pub fn avatar_url_for(seed: &str) -> String {
    format!("https://api.dicebear.com/7.x/initials/svg?seed={seed}&backgroundColor=3b82f6")
}
