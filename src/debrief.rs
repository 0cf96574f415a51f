use crate::{
    config::Config,
    feedback::{FeedbackRequest, FeedbackService},
    history::SessionStore,
    model::EvaluationSession,
    store::KeyValueStore,
};
use std::time::Instant;
use tracing::{info, warn};

/// Hands a finalized drive to the feedback service and then to history.
pub struct Debrief<F: FeedbackService> {
    cfg: Config,
    feedback: F,
}

impl<F: FeedbackService> Debrief<F> {
    pub fn new(cfg: &Config, feedback: F) -> Self {
        Self {
            cfg: cfg.clone(),
            feedback,
        }
    }

    /// Attaches feedback (or the fallback text) and prepends the session to history.
    pub fn conclude<S: KeyValueStore>(
        &self,
        session: EvaluationSession,
        student_name: &str,
        store: &mut SessionStore<S>,
    ) -> EvaluationSession {
        let started = Instant::now();
        let req = FeedbackRequest {
            student_name,
            grades: session.scores(),
            path: session.path(),
            incidents: session.incidents(),
        };
        let text = match self.feedback.generate(&req) {
            Ok(text) => {
                info!(
                    chars = text.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "feedback generated"
                );
                text
            }
            Err(err) => {
                warn!("feedback unavailable, using fallback text: {err}");
                self.cfg.feedback.fallback_text.clone()
            }
        };

        let session = session.with_feedback(text);
        store.record(session.clone());
        session
    }
}
