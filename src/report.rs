use crate::{
    model::{EvaluationSession, Grade},
    rubric,
    util::display_date,
};
use std::fmt::Write;

/// Plain-text report suitable for sharing with the student.
pub fn text_report(session: &EvaluationSession, student_name: &str) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "REPORT METODO DEC");
    let _ = writeln!(output, "Allievo: {student_name}");
    let _ = writeln!(output, "Data: {}", display_date(session.date()));
    let _ = writeln!(output, "Feedback: {}", session.feedback().unwrap_or("-"));
    let _ = writeln!(output);

    let path = session.path();
    if path.is_tracked() {
        let _ = writeln!(
            output,
            "Percorso: {:.1} km, {} rilevazioni",
            path.distance_km(),
            path.len()
        );
    } else {
        let _ = writeln!(output, "Percorso non tracciato");
    }
    let _ = writeln!(output, "Interventi critici: {}", session.incidents().len());

    let items = rubric::graded_items(session.scores());
    if !items.is_empty() {
        let mut current = "";
        for item in items {
            if item.category != current {
                let _ = writeln!(output);
                let _ = writeln!(output, "{}", item.category);
                current = item.category;
            }
            let _ = writeln!(output, "  {} {}", grade_symbol(item.grade), item.label);
        }
    }

    output
}

fn grade_symbol(grade: Grade) -> &'static str {
    match grade {
        Grade::Good => "[verde]",
        Grade::Warning => "[giallo]",
        Grade::Critical => "[rosso]",
        Grade::Unset => "",
    }
}
