use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: Tracking,
    #[serde(default)]
    pub render: Render,
    #[serde(default)]
    pub feedback: Feedback,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub incident: Incident,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

/// Options handed to the location service when a session starts watching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracking {
    pub high_accuracy: bool,
    /// Maximum age of a cached fix the service may return; 0 means always fresh.
    pub max_age_ms: u64,
    /// Time allowed for the first fix before the watch is treated as failed.
    pub fix_timeout_ms: u64,
}
impl Default for Tracking {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            max_age_ms: 0,
            fix_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Render {
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f64,
    pub padding: f64,
    pub line_width: f64,
    pub marker_radius: f64,
    pub background: String,
    pub path_color: String,
    pub marker_color: String,
}
impl Default for Render {
    fn default() -> Self {
        Self {
            width: 360,
            height: 128,
            device_pixel_ratio: 1.0,
            padding: 20.0,
            line_width: 3.0,
            marker_radius: 5.0,
            background: "#f9fafb".into(),
            path_color: "#3b82f6".into(),
            marker_color: "#ef4444".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub max_words: u32,
    pub fallback_text: String,
}
impl Default for Feedback {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models".into(),
            model: "gemini-3-flash-preview".into(),
            api_key_env: "API_KEY".into(),
            temperature: 0.7,
            timeout_seconds: 30,
            max_words: 100,
            fallback_text: DEFAULT_FALLBACK_TEXT.into(),
        }
    }
}

/// Written into the session whenever the feedback service cannot produce text.
pub const DEFAULT_FALLBACK_TEXT: &str = "Analisi completata. L'allievo mostra una progressione costante. \
Si consiglia di focalizzarsi sul perfezionamento della coordinazione dei comandi (pedali/cambio) \
e sulla visione periferica durante le rotatorie. Gli automatismi stanno migliorando, \
ma serve ancora pratica nelle zone ad alto traffico.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    pub data_dir: String,
    pub history_key: String,
    pub students_key: String,
}
impl Default for Storage {
    fn default() -> Self {
        Self {
            data_dir: ".dec-drive".into(),
            history_key: "driving_history".into(),
            students_key: "driving_students".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub default_note: String,
    pub vibrate_pattern_ms: Vec<u64>,
}
impl Default for Incident {
    fn default() -> Self {
        Self {
            default_note: "Intervento critico dell'istruttore".into(),
            vibrate_pattern_ms: vec![100, 50, 100],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
