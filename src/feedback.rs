//! Written feedback for a finished drive, produced by a generative-language service.
//!
//! Services report failure through [`FeedbackError`]; substituting the fallback
//! text is the caller's job (see [`crate::debrief`]).

use crate::{
    config::Feedback,
    model::{GeoPath, GradeMap, IncidentEvent},
    rubric,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedbackError {
    #[error("feedback generation is disabled")]
    Disabled,
    #[error("API key not set in ${0}")]
    MissingApiKey(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("empty response")]
    EmptyResponse,
}

/// Everything the service sees about one drive.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackRequest<'a> {
    pub student_name: &'a str,
    pub grades: &'a GradeMap,
    pub path: &'a GeoPath,
    pub incidents: &'a [IncidentEvent],
}

pub trait FeedbackService {
    fn generate(&self, req: &FeedbackRequest<'_>) -> Result<String, FeedbackError>;
}

impl<T: FeedbackService + ?Sized> FeedbackService for Box<T> {
    fn generate(&self, req: &FeedbackRequest<'_>) -> Result<String, FeedbackError> {
        (**self).generate(req)
    }
}

/// Prompt text sent to the model.
pub fn build_prompt(req: &FeedbackRequest<'_>, max_words: u32) -> String {
    let mut scores = String::new();
    for item in rubric::graded_items(req.grades) {
        let _ = writeln!(scores, "- {} > {}: {}", item.category, item.label, item.grade.label());
    }
    if scores.is_empty() {
        scores.push_str("Nessuna voce valutata.\n");
    }

    let notes = if req.incidents.is_empty() {
        "Nessun intervento critico registrato.".to_string()
    } else {
        req.incidents
            .iter()
            .map(|e| format!("- {}", e.note))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let route = if req.path.is_tracked() {
        format!(
            "L'allievo ha guidato per {:.1} km ({} rilevazioni GPS).",
            req.path.distance_km(),
            req.path.len()
        )
    } else {
        "Dati geografici limitati.".to_string()
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Agisci come Tutor esperto del \"Metodo DEC\" (Drive Elite Coach) per l'allievo {}.",
        req.student_name
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "RISULTATI VALUTAZIONE:");
    out.push_str(&scores);
    let _ = writeln!(out);
    let _ = writeln!(out, "INTERVENTI CRITICI ISTRUTTORE:");
    let _ = writeln!(out, "{notes}");
    let _ = writeln!(out);
    let _ = writeln!(out, "DATI PERCORSO:");
    let _ = writeln!(out, "{route}");
    let _ = writeln!(out);
    let _ = writeln!(out, "REQUISITI DEL REPORT:");
    let _ = writeln!(out, "1. Tono professionale, incoraggiante ma tecnicamente rigoroso.");
    let _ = writeln!(
        out,
        "2. Punti di forza (Verdi) e aree ancora da automatizzare (Gialli/Rossi)."
    );
    let _ = writeln!(out, "3. Lingua: Italiano.");
    let _ = writeln!(out, "4. Lunghezza: massimo {max_words} parole.");
    let _ = writeln!(out, "5. Formato: un unico paragrafo discorsivo, niente liste.");
    out
}

/// Always declines; the debrief falls back to the configured text.
pub struct DisabledFeedback;

impl FeedbackService for DisabledFeedback {
    fn generate(&self, _req: &FeedbackRequest<'_>) -> Result<String, FeedbackError> {
        Err(FeedbackError::Disabled)
    }
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Extracts the generated text from a `generateContent` response body.
pub fn parse_response(raw: &str) -> Result<String, FeedbackError> {
    let parsed: GenerateResponse =
        serde_json::from_str(raw).map_err(|e| FeedbackError::InvalidResponse(e.to_string()))?;
    let text = parsed
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    if text.is_empty() {
        return Err(FeedbackError::EmptyResponse);
    }
    Ok(text.to_string())
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiFeedback {
    cfg: Feedback,
    api_key: Option<String>,
}

impl GeminiFeedback {
    /// Reads the API key from the environment variable named in the config.
    pub fn from_env(cfg: &Feedback) -> Self {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::new(cfg, api_key)
    }

    pub fn new(cfg: &Feedback, api_key: Option<String>) -> Self {
        Self {
            cfg: cfg.clone(),
            api_key,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn url(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.cfg.endpoint.trim_end_matches('/'),
            self.cfg.model
        )
    }
}

impl FeedbackService for GeminiFeedback {
    fn generate(&self, req: &FeedbackRequest<'_>) -> Result<String, FeedbackError> {
        if !self.cfg.enabled {
            return Err(FeedbackError::Disabled);
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| FeedbackError::MissingApiKey(self.cfg.api_key_env.clone()))?;

        let prompt = build_prompt(req, self.cfg.max_words);
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.cfg.temperature,
            },
        };

        debug!("feedback request model={} chars={}", self.cfg.model, prompt.len());
        let response = ureq::post(&self.url())
            .set("x-goog-api-key", api_key)
            .set("content-type", "application/json")
            .timeout(Duration::from_secs(self.cfg.timeout_seconds.max(1)))
            .send_json(&body);

        match response {
            Ok(resp) => {
                let raw = resp
                    .into_string()
                    .map_err(|e| FeedbackError::InvalidResponse(e.to_string()))?;
                parse_response(&raw)
            }
            Err(ureq::Error::Status(code, resp)) => Err(FeedbackError::Status {
                code,
                body: resp.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(e)) => Err(FeedbackError::Network(e.to_string())),
        }
    }
}
