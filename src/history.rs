use crate::{
    config::Storage,
    model::{EvaluationSession, Student, avatar_url_for},
    store::KeyValueStore,
    util::now_millis,
};
use anyhow::{Result, anyhow};
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

const PHONE_PATTERN: &str = r"^\+?[0-9][0-9 ]{5,18}$";

/// Roster and session history for one device, owned explicitly by the caller.
pub struct SessionStore<S: KeyValueStore> {
    kv: S,
    history_key: String,
    students_key: String,
    students: Vec<Student>,
    history: Vec<EvaluationSession>,
}

impl<S: KeyValueStore> SessionStore<S> {
    /// Absent or malformed blobs load as empty data; the roster falls back to the default student.
    pub fn load(kv: S, cfg: &Storage) -> Self {
        let history: Vec<EvaluationSession> =
            decode_or_default(&kv, &cfg.history_key).unwrap_or_default();
        let students = decode_or_default(&kv, &cfg.students_key).unwrap_or_else(default_students);
        debug!(
            sessions = history.len(),
            students = students.len(),
            "session store loaded"
        );
        Self {
            kv,
            history_key: cfg.history_key.clone(),
            students_key: cfg.students_key.clone(),
            students,
            history,
        }
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn find_student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    /// Newest first.
    pub fn history(&self) -> &[EvaluationSession] {
        &self.history
    }

    pub fn history_for<'a>(
        &'a self,
        student_id: &'a str,
    ) -> impl Iterator<Item = &'a EvaluationSession> + 'a {
        self.history.iter().filter(move |h| h.student_id() == student_id)
    }

    /// Looks a session up by history index (`#0` is newest) or by id prefix.
    ///
    /// A bare number is read as an index while it is in range, otherwise as an
    /// id prefix.
    pub fn find_session(&self, selector: &str) -> Option<&EvaluationSession> {
        if let Some(idx) = selector.strip_prefix('#') {
            return idx.parse::<usize>().ok().and_then(|i| self.history.get(i));
        }
        if let Some(h) = selector
            .parse::<usize>()
            .ok()
            .and_then(|i| self.history.get(i))
        {
            return Some(h);
        }
        if selector.is_empty() {
            return None;
        }
        self.history.iter().find(|h| h.id().starts_with(selector))
    }

    pub fn add_student(&mut self, name: &str, phone_number: Option<&str>) -> Result<&Student> {
        let name: String = name.trim().nfc().collect();
        if name.is_empty() {
            return Err(anyhow!("student name is empty"));
        }
        let phone_number = match phone_number.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) if !Regex::new(PHONE_PATTERN)?.is_match(p) => {
                return Err(anyhow!("invalid phone number: {p}"));
            }
            Some(p) => Some(p.split_whitespace().collect::<String>()),
            None => None,
        };

        let mut id = now_millis();
        while self.students.iter().any(|s| s.id == id.to_string()) {
            id += 1;
        }
        let mut student = Student::new(id.to_string(), name);
        student.phone_number = phone_number;
        info!(id = %student.id, name = %student.name, "student added");
        self.students.push(student);
        self.persist();
        let idx = self.students.len() - 1;
        Ok(&self.students[idx])
    }

    /// Prepends a finished session and persists. Storage failures are logged, not returned.
    pub fn record(&mut self, session: EvaluationSession) {
        info!(id = %session.id(), student = session.student_id(), "session added to history");
        self.history.insert(0, session);
        self.persist();
    }

    pub fn persist(&mut self) {
        save_json(&mut self.kv, &self.history_key, &self.history);
        save_json(&mut self.kv, &self.students_key, &self.students);
    }

    pub fn into_inner(self) -> S {
        self.kv
    }
}

fn save_json<T: serde::Serialize>(kv: &mut impl KeyValueStore, key: &str, value: &T) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(err) => {
            warn!("encoding {key} failed: {err}");
            return;
        }
    };
    if let Err(err) = kv.save(key, &raw) {
        warn!("saving {key} failed; keeping in-memory state: {err:#}");
    }
}

fn decode_or_default<T: DeserializeOwned>(kv: &impl KeyValueStore, key: &str) -> Option<T> {
    let raw = kv.load(key)?;
    match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(err) => {
            warn!("stored {key} is malformed, ignoring it: {err}");
            None
        }
    }
}

fn default_students() -> Vec<Student> {
    let mut mario = Student::new("1".into(), "Mario Rossi".into());
    mario.total_hours = 12;
    mario.avatar_url = avatar_url_for("MR");
    vec![mario]
}
