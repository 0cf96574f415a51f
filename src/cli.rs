use crate::{
    config::Config,
    debrief::Debrief,
    feedback::{DisabledFeedback, FeedbackService, GeminiFeedback},
    history::SessionStore,
    location::ManualFeed,
    model::{Grade, GradeMap},
    recorder::SessionRecorder,
    render::{self, RasterSurface, RenderStyle, Sketch, SvgSurface},
    replay, report, rubric,
    store::FileStore,
    util::{display_date, ensure_dir},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dec-drive")]
#[command(about = "Driving evaluation recorder (GPS path + critical incidents + feedback + history)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./dec-drive.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show effective configuration, storage and feedback readiness
    Doctor {},
    /// Manage the student roster
    Students {
        #[command(subcommand)]
        cmd: StudentsCommand,
    },
    /// Record a session by replaying a drive log, then generate feedback and save it
    Record {
        #[arg(long)]
        student: String,
        /// JSON-lines drive log (fix / error / incident events)
        #[arg(long)]
        drive: Option<PathBuf>,
        /// JSON object mapping rubric item id to GOOD / WARNING / CRITICAL / UNSET
        #[arg(long)]
        grades: Option<PathBuf>,
        /// Skip the feedback service and store the fallback text
        #[arg(long)]
        offline: bool,
    },
    /// List recorded sessions, newest first
    History {
        #[arg(long)]
        student: Option<String>,
    },
    /// Draw a session's path and incidents (.png or .svg)
    Render {
        /// History index (#0 = newest) or session id prefix
        #[arg(long)]
        session: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        #[arg(long)]
        dpr: Option<f64>,
    },
    /// Write the shareable text report for a session
    Export {
        #[arg(long)]
        session: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum StudentsCommand {
    List {},
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: Option<String>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref());
    let cfg = match &cfg_path {
        Some(p) => Config::load(p)?,
        None => Config::default(),
    };
    let _guard = init_logging(&args, &cfg)?;

    let mut store = SessionStore::load(FileStore::new(&cfg.storage.data_dir), &cfg.storage);

    match args.cmd {
        Command::Doctor {} => doctor(&cfg, cfg_path.as_deref(), &store),
        Command::Students { cmd } => students(&mut store, cmd),
        Command::Record {
            student,
            drive,
            grades,
            offline,
        } => record(&cfg, &mut store, &student, drive.as_deref(), grades.as_deref(), offline),
        Command::History { student } => history(&store, student.as_deref()),
        Command::Render {
            session,
            out,
            width,
            height,
            dpr,
        } => {
            let mut render_cfg = cfg.render.clone();
            render_cfg.width = width.unwrap_or(render_cfg.width);
            render_cfg.height = height.unwrap_or(render_cfg.height);
            render_cfg.device_pixel_ratio = dpr.unwrap_or(render_cfg.device_pixel_ratio);
            render_session(&store, &session, &out, &RenderStyle::from_config(&render_cfg)?)
        }
        Command::Export { session, out } => export(&store, &session, out.as_deref()),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["dec-drive.toml", "dec-drive.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = match resolve_log_path(cfg) {
        Some(path) => {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            ensure_dir(parent)?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open log file: {}", path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.storage.data_dir).join("dec-drive.log"))
}

fn doctor(cfg: &Config, cfg_path: Option<&Path>, store: &SessionStore<FileStore>) -> Result<()> {
    let gemini = GeminiFeedback::from_env(&cfg.feedback);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "config_file": cfg_path,
            "data_dir": cfg.storage.data_dir,
            "students": store.students().len(),
            "sessions": store.history().len(),
            "feedback": {
                "enabled": cfg.feedback.enabled,
                "model": cfg.feedback.model,
                "api_key_env": cfg.feedback.api_key_env,
                "api_key_present": gemini.has_api_key(),
            },
            "tracking": cfg.tracking,
            "render": cfg.render,
        }))?
    );
    Ok(())
}

fn students(store: &mut SessionStore<FileStore>, cmd: StudentsCommand) -> Result<()> {
    match cmd {
        StudentsCommand::List {} => {
            for s in store.students() {
                let sessions = store.history_for(&s.id).count();
                println!(
                    "{}\t{}\t{:?}\t{} ore\t{} guide",
                    s.id, s.name, s.license_type, s.total_hours, sessions
                );
            }
        }
        StudentsCommand::Add { name, phone } => {
            let s = store.add_student(&name, phone.as_deref())?;
            println!("{}\t{}", s.id, s.name);
        }
    }
    Ok(())
}

fn record(
    cfg: &Config,
    store: &mut SessionStore<FileStore>,
    student_id: &str,
    drive: Option<&Path>,
    grades: Option<&Path>,
    offline: bool,
) -> Result<()> {
    let student_name = store
        .find_student(student_id)
        .map(|s| s.name.clone())
        .ok_or_else(|| anyhow!("unknown student: {student_id}"))?;
    let grades = match grades {
        Some(p) => load_grades(p)?,
        None => GradeMap::new(),
    };

    let events = match drive {
        Some(p) => replay::load_drive_log(p)?,
        None => Vec::new(),
    };

    let feed = ManualFeed::new();
    let feeder = feed.feeder();
    let mut recorder = SessionRecorder::new(cfg, Some(Box::new(feed)));
    recorder.start_tracking();
    replay::replay(&mut recorder, &feeder, &events, &cfg.incident.default_note);
    info!(status = ?recorder.status(), "drive replayed");
    let session = recorder.finalize(student_id, grades);

    let feedback: Box<dyn FeedbackService> = if offline {
        Box::new(DisabledFeedback)
    } else {
        Box::new(GeminiFeedback::from_env(&cfg.feedback))
    };
    let debrief = Debrief::new(cfg, feedback);
    let session = debrief.conclude(session, &student_name, store);

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "session": session.id(),
            "student": student_name,
            "points": session.path().len(),
            "incidents": session.incidents().len(),
            "feedback": session.feedback(),
        }))?
    );
    Ok(())
}

fn load_grades(path: &Path) -> Result<GradeMap> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading grades: {}", path.display()))?;
    let parsed: BTreeMap<String, String> =
        serde_json::from_str(&raw).with_context(|| "parsing grades JSON")?;
    let mut grades = GradeMap::new();
    for (id, value) in parsed {
        if rubric::find_item(&id).is_none() {
            return Err(anyhow!("unknown rubric item: {id}"));
        }
        let grade: Grade = value.parse()?;
        grades.insert(id, grade);
    }
    Ok(grades)
}

fn history(store: &SessionStore<FileStore>, student: Option<&str>) -> Result<()> {
    for (i, h) in store.history().iter().enumerate() {
        if student.is_some_and(|s| s != h.student_id()) {
            continue;
        }
        let name = store
            .find_student(h.student_id())
            .map(|s| s.name.as_str())
            .unwrap_or("?");
        println!(
            "{}\t{}\t{}\t{}\t! {}\t{}",
            i,
            h.id().get(..12).unwrap_or(h.id()),
            display_date(h.date()),
            name,
            h.incidents().len(),
            h.feedback().unwrap_or("Report generato")
        );
    }
    Ok(())
}

fn render_session(
    store: &SessionStore<FileStore>,
    selector: &str,
    out: &Path,
    style: &RenderStyle,
) -> Result<()> {
    let session = store
        .find_session(selector)
        .ok_or_else(|| anyhow!("no session matches: {selector}"))?;
    let is_svg = out
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"));

    let sketch = if is_svg {
        let mut surface = SvgSurface::for_style(style);
        let sketch = render::draw(&mut surface, session.path(), session.incidents(), style);
        if !sketch.is_untracked() {
            std::fs::write(out, surface.finish())
                .with_context(|| format!("writing SVG: {}", out.display()))?;
        }
        sketch
    } else {
        let mut surface = RasterSurface::for_style(style)?;
        let sketch = render::draw(&mut surface, session.path(), session.incidents(), style);
        if !sketch.is_untracked() {
            surface.save_png(out)?;
        }
        sketch
    };

    match sketch {
        Sketch::Untracked => {
            warn!(points = session.path().len(), "path not tracked; nothing drawn");
            println!("Percorso non tracciato");
        }
        Sketch::Drawn { polyline, markers } => {
            info!(points = polyline.len(), markers = markers.len(), "path rendered");
            println!("{}", out.display());
        }
    }
    Ok(())
}

fn export(store: &SessionStore<FileStore>, selector: &str, out: Option<&Path>) -> Result<()> {
    let session = store
        .find_session(selector)
        .ok_or_else(|| anyhow!("no session matches: {selector}"))?;
    let name = store
        .find_student(session.student_id())
        .map(|s| s.name.as_str())
        .unwrap_or(session.student_id());
    let text = report::text_report(session, name);
    match out {
        Some(p) => {
            std::fs::write(p, &text).with_context(|| format!("writing report: {}", p.display()))?;
            println!("{}", p.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}
